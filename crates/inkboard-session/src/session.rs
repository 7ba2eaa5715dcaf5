//! Board session: one user's live view of one board.
//!
//! Wires a room connection, the edit pipeline, presence and autosave
//! together. Hosts feed it input events and call [`BoardSession::tick`]
//! regularly to pull in peers' changes and presence.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use inkboard_core::{ShapeStore, Tool};
use inkboard_sync::{PresenceManager, PresencePublisher, RemoteCursor, RoomConnection, RoomHub};
use tracing::{debug, info, warn};

use crate::boards::{Board, BoardError, BoardStore};
use crate::config::Config;
use crate::identity::{Identity, UserId};
use crate::pipeline::{EditPipeline, Key, PointerEvent};

pub struct BoardSession<B: BoardStore> {
    boards: B,
    board: Board,
    user: UserId,
    pipeline: EditPipeline<RoomConnection>,
    presence: PresenceManager,
    publisher: PresencePublisher,
    autosave_interval: Duration,
    last_save: Instant,
    unsaved: bool,
}

impl<B: BoardStore> BoardSession<B> {
    /// Join the room of an existing board as the current user.
    ///
    /// When nobody else is in the room and its live document is empty, the
    /// board's saved snapshot is loaded into it first.
    pub fn open(hub: &RoomHub, boards: B, identity: &impl Identity, room_id: &str, config: &Config) -> Result<Self> {
        let user = identity.current_user_id().ok_or(BoardError::Unauthenticated)?;
        let board = boards
            .get_by_room(room_id)?
            .ok_or_else(|| BoardError::NotFound(room_id.to_string()))?;
        let display_name = identity.display_name().or_else(|| config.display_name.clone());

        let mut connection = hub
            .acquire_room(room_id, display_name.clone())
            .with_context(|| format!("failed to join room {room_id}"))?;
        if hub.member_count(room_id) == 1 && connection.records()?.is_empty() {
            restore(&mut connection, &board)?;
        }
        connection.take_dirty();

        let connection_id = connection.connection_id();
        let pipeline = EditPipeline::new(connection, config.pipeline_options());
        info!(room = room_id, user = %user, connection = %connection_id, "board session opened");

        Ok(Self {
            publisher: PresencePublisher::new(
                connection_id,
                display_name,
                pipeline.tool(),
                config.throttle_interval,
            ),
            presence: PresenceManager::new(connection_id),
            boards,
            board,
            user,
            pipeline,
            autosave_interval: config.autosave_interval,
            last_save: Instant::now(),
            unsaved: false,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn pipeline(&self) -> &EditPipeline<RoomConnection> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut EditPipeline<RoomConnection> {
        &mut self.pipeline
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    /// Cursors to draw for the other peers in the room
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.presence.remote_cursors()
    }

    // --- Input ---

    pub fn pointer_down(&mut self, event: PointerEvent) {
        self.pipeline.pointer_down(event);
        self.publish_cursor(event);
    }

    pub fn pointer_move(&mut self, event: PointerEvent) {
        self.pipeline.pointer_move(event);
        self.publish_cursor(event);
    }

    pub fn pointer_up(&mut self, event: PointerEvent) {
        self.pipeline.pointer_up(event);
        self.publish_cursor(event);
    }

    /// Pointer left the canvas: peers drop our cursor right away
    pub fn pointer_leave(&mut self) {
        if let Err(e) = self.publisher.pointer_leave(self.pipeline.store_mut()) {
            warn!(error = %e, "failed to publish pointer leave");
        }
    }

    pub fn key(&mut self, key: Key) {
        self.pipeline.key(key);
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.pipeline.set_tool(tool);
        if let Err(e) = self.publisher.set_tool(tool, self.pipeline.store_mut()) {
            warn!(error = %e, "failed to publish tool change");
        }
    }

    pub fn undo(&mut self) -> bool {
        self.pipeline.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.pipeline.redo()
    }

    fn publish_cursor(&mut self, event: PointerEvent) {
        if let Err(e) = self.publisher.pointer_move(event.point, event.at, self.pipeline.store_mut()) {
            warn!(error = %e, "failed to publish cursor");
        }
    }

    // --- Background work ---

    /// Merge peers' changes, apply their presence, keep ours alive and
    /// autosave when due
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        self.pipeline.poll();

        let messages = self.pipeline.store_mut().drain_presence();
        for message in messages {
            if self.presence.apply(message, now) {
                debug!("peer joined, republishing presence");
                self.publisher.republish(self.pipeline.store_mut())?;
            }
        }
        self.presence.prune_stale(now);
        self.publisher.heartbeat(now, self.pipeline.store_mut())?;

        if self.pipeline.store_mut().take_dirty() {
            self.unsaved = true;
        }
        if self.unsaved && now.duration_since(self.last_save) >= self.autosave_interval {
            debug!(room = %self.board.room_id, "autosaving");
            self.save_at(now)?;
        }
        Ok(())
    }

    pub fn has_unsaved_changes(&mut self) -> bool {
        if self.pipeline.store_mut().take_dirty() {
            self.unsaved = true;
        }
        self.unsaved
    }

    /// Write the current snapshot to the board store
    pub fn save(&mut self) -> Result<()> {
        self.save_at(Instant::now())
    }

    fn save_at(&mut self, now: Instant) -> Result<()> {
        let records = self.pipeline.store().records()?;
        self.boards
            .save_board(&self.board.room_id, &records)
            .with_context(|| format!("failed to save board {}", self.board.name))?;
        self.board.board_data = Some(records);
        self.pipeline.store_mut().take_dirty();
        self.unsaved = false;
        self.last_save = now;
        Ok(())
    }

    /// Save and leave the room; dropping the connection announces the leave
    pub fn close(mut self) -> Result<()> {
        self.save()?;
        info!(room = %self.board.room_id, "board session closed");
        Ok(())
    }
}

/// Seed an empty room with the board's last saved snapshot
fn restore(connection: &mut RoomConnection, board: &Board) -> Result<()> {
    let Some(snapshot) = board.board_data.as_ref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    connection.mutate(|shapes| {
        for record in snapshot {
            if let Err(e) = shapes.push(record) {
                warn!(id = %record.id, error = %e, "skipping saved shape");
            }
        }
        Ok(())
    })?;
    info!(room = %board.room_id, shapes = snapshot.len(), "restored board snapshot");
    Ok(())
}
