//! In-process realtime room hub.
//!
//! Each room keeps a canonical automerge document and a broadcast channel.
//! A [`RoomConnection`] owns its own replica (a fork of the canonical
//! document), applies each committed change to the canonical copy and
//! relays the encoded change to every other connection; peers apply them
//! when they poll.
//! Presence messages travel over the same channel as msgpack bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use inkboard_core::{ConnectionId, Document, RecordData, ShapeList, ShapeStore};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::presence::{PresenceMessage, PresenceSink};

/// Per-room channel capacity before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 256;

/// Events relayed to every connection of a room
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A peer committed changes; only the new changes, encoded by automerge
    Changes { from: ConnectionId, bytes: Vec<u8> },
    /// Encoded [`PresenceMessage`]
    Presence { from: ConnectionId, bytes: Vec<u8> },
}

struct Room {
    id: String,
    canonical: Mutex<Document>,
    events: broadcast::Sender<RoomEvent>,
    members: AtomicUsize,
}

impl Room {
    fn canonical(&self) -> Result<MutexGuard<'_, Document>> {
        self.canonical
            .lock()
            .map_err(|_| anyhow!("room {} document lock poisoned", self.id))
    }
}

/// Registry of live rooms; connection ids are unique per hub
pub struct RoomHub {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    next_connection: AtomicU64,
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            // 0 is reserved for offline documents
            next_connection: AtomicU64::new(1),
        }
    }

    /// Join a room, creating it on first use
    pub fn acquire_room(&self, room_id: &str, display_name: Option<String>) -> Result<RoomConnection> {
        let room = {
            let mut rooms = self.rooms.lock().map_err(|_| anyhow!("room registry lock poisoned"))?;
            match rooms.get(room_id) {
                Some(room) => Arc::clone(room),
                None => {
                    let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
                    let room = Arc::new(Room {
                        id: room_id.to_string(),
                        canonical: Mutex::new(Document::new()?),
                        events,
                        members: AtomicUsize::new(0),
                    });
                    rooms.insert(room_id.to_string(), Arc::clone(&room));
                    info!(room = room_id, "room created");
                    room
                }
            }
        };

        let connection_id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        // Fork and subscribe under the lock so no change falls in between
        let (replica, events) = {
            let canonical = room.canonical()?;
            (Document::from_automerge(canonical.fork()), room.events.subscribe())
        };
        room.members.fetch_add(1, Ordering::Relaxed);
        debug!(room = room_id, connection = %connection_id, "joined room");

        let mut connection = RoomConnection {
            room,
            connection_id,
            display_name,
            replica,
            events,
            inbox: Vec::new(),
        };
        connection.publish(&PresenceMessage::RequestAll)?;
        Ok(connection)
    }

    /// Number of live connections in a room
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .ok()
            .and_then(|rooms| rooms.get(room_id).map(|r| r.members.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    /// Current canonical snapshot of a room, None if the room does not exist
    pub fn snapshot(&self, room_id: &str) -> Result<Option<Vec<RecordData>>> {
        let room = {
            let rooms = self.rooms.lock().map_err(|_| anyhow!("room registry lock poisoned"))?;
            rooms.get(room_id).cloned()
        };
        match room {
            Some(room) => Ok(Some(room.canonical()?.records()?)),
            None => Ok(None),
        }
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's handle on a room
pub struct RoomConnection {
    room: Arc<Room>,
    connection_id: ConnectionId,
    display_name: Option<String>,
    replica: Document,
    events: broadcast::Receiver<RoomEvent>,
    /// Presence from other peers, collected while polling
    inbox: Vec<PresenceMessage>,
}

impl RoomConnection {
    pub fn room_id(&self) -> &str {
        &self.room.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// The local replica
    pub fn document(&self) -> &Document {
        &self.replica
    }

    /// True if the replica changed since the last call
    pub fn take_dirty(&mut self) -> bool {
        let dirty = self.replica.is_dirty();
        self.replica.mark_clean();
        dirty
    }

    /// Presence messages received since the last call
    pub fn drain_presence(&mut self) -> Vec<PresenceMessage> {
        std::mem::take(&mut self.inbox)
    }

    /// Re-seed the replica from the canonical document after missing events
    fn resync(&mut self) -> Result<bool> {
        let mut canonical = self.room.canonical()?.automerge().clone();
        self.replica.merge(&mut canonical)
    }

    fn broadcast(&self, event: RoomEvent) {
        // Sending fails only when nobody else is listening
        let _ = self.room.events.send(event);
    }
}

impl ShapeStore for RoomConnection {
    fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    fn records(&self) -> Result<Vec<RecordData>> {
        self.replica.records()
    }

    fn mutate<R>(&mut self, f: impl FnOnce(&mut ShapeList<'_>) -> Result<R>) -> Result<R> {
        let before = self.replica.heads();
        let value = self.replica.mutate(f)?;
        if self.replica.heads() != before {
            let bytes = self.replica.changes_since(&before);
            // Broadcast under the lock so channel order matches canonical order
            let mut canonical = self.room.canonical()?;
            canonical.apply_changes(&bytes)?;
            self.broadcast(RoomEvent::Changes {
                from: self.connection_id,
                bytes,
            });
        }
        Ok(value)
    }

    fn poll_remote(&mut self) -> Result<bool> {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(RoomEvent::Changes { from, bytes }) if from != self.connection_id => {
                    changed |= self.replica.apply_changes(&bytes)?;
                }
                Ok(RoomEvent::Presence { from, bytes }) if from != self.connection_id => {
                    match PresenceMessage::decode(&bytes) {
                        Ok(message) => self.inbox.push(message),
                        Err(e) => warn!(from = %from, error = %e, "dropping undecodable presence"),
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(room = %self.room.id, missed, "room events lagged, resyncing");
                    changed |= self.resync()?;
                }
                Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        Ok(changed)
    }
}

impl PresenceSink for RoomConnection {
    fn publish(&mut self, message: &PresenceMessage) -> Result<()> {
        self.broadcast(RoomEvent::Presence {
            from: self.connection_id,
            bytes: message.encode()?,
        });
        Ok(())
    }
}

impl Drop for RoomConnection {
    fn drop(&mut self) {
        let leave = PresenceMessage::Leave {
            connection_id: self.connection_id,
        };
        if let Err(e) = self.publish(&leave) {
            warn!(error = %e, "failed to announce leave");
        }
        self.room.members.fetch_sub(1, Ordering::Relaxed);
        debug!(room = %self.room.id, connection = %self.connection_id, "left room");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceRecord;
    use inkboard_core::{Attributes, Tool};
    use tokio_test::{assert_err, assert_ok};

    fn record(id: &str) -> RecordData {
        RecordData {
            id: id.to_string(),
            shape_type: "circle".to_string(),
            owner_connection_id: 0,
            attributes: Attributes::new(),
        }
    }

    fn ids(conn: &RoomConnection) -> Vec<String> {
        conn.records().unwrap().into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn connections_get_distinct_ids() {
        let hub = RoomHub::new();
        let a = hub.acquire_room("r", None).unwrap();
        let b = hub.acquire_room("r", None).unwrap();
        assert_ne!(a.connection_id(), b.connection_id());
        assert_ne!(a.connection_id(), ConnectionId::OFFLINE);
        assert_eq!(hub.member_count("r"), 2);
        drop(a);
        assert_eq!(hub.member_count("r"), 1);
    }

    #[test]
    fn changes_reach_peers_on_poll() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();

        assert_ok!(a.mutate(|s| s.push(&record("one"))));
        assert!(ids(&b).is_empty());
        assert!(b.poll_remote().unwrap());
        assert_eq!(ids(&b), ["one"]);

        // Nothing new the second time
        assert!(!b.poll_remote().unwrap());
        // Own changes are not echoed back
        assert!(!a.poll_remote().unwrap());
    }

    #[test]
    fn concurrent_appends_converge() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        a.mutate(|s| s.push(&record("a1"))).unwrap();
        b.mutate(|s| s.push(&record("b1"))).unwrap();
        a.poll_remote().unwrap();
        b.poll_remote().unwrap();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a).len(), 2);
        assert_eq!(hub.snapshot("r").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn broadcasts_carry_only_the_new_change() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        a.mutate(|s| {
            for i in 0..50 {
                s.push(&record(&format!("s{i}")))?;
            }
            Ok(())
        })
        .unwrap();
        b.poll_remote().unwrap();

        let mut tap = a.room.events.subscribe();
        a.mutate(|s| s.push(&record("last"))).unwrap();
        match tap.try_recv() {
            Ok(RoomEvent::Changes { bytes, .. }) => {
                assert!(bytes.len() < a.document().automerge().save().len() / 4);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(b.poll_remote().unwrap());
        assert_eq!(ids(&b).len(), 51);
        assert_eq!(ids(&b).last().map(String::as_str), Some("last"));
    }

    #[test]
    fn late_joiner_starts_from_canonical() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        a.mutate(|s| s.push(&record("early"))).unwrap();
        let c = hub.acquire_room("r", None).unwrap();
        assert_eq!(ids(&c), ["early"]);
    }

    #[test]
    fn failed_mutation_is_not_broadcast() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        assert_err!(a.mutate(|s| {
            s.push(&record("x"))?;
            s.push(&record("x"))
        }));
        assert!(!b.poll_remote().unwrap());
        assert!(ids(&a).is_empty());
    }

    #[test]
    fn presence_relay_and_leave() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", Some("ann".into())).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        a.poll_remote().unwrap();
        // b's join asks everyone to republish
        assert_eq!(a.drain_presence(), vec![PresenceMessage::RequestAll]);

        let update = PresenceMessage::Update {
            connection_id: a.connection_id(),
            display_name: Some("ann".into()),
            record: PresenceRecord::new(Tool::Select),
        };
        a.publish(&update).unwrap();
        let a_id = a.connection_id();
        drop(a);

        b.poll_remote().unwrap();
        assert_eq!(
            b.drain_presence(),
            vec![update, PresenceMessage::Leave { connection_id: a_id }]
        );
    }

    #[test]
    fn lagging_connection_resyncs() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        for i in 0..(CHANNEL_CAPACITY + 10) {
            a.mutate(|s| s.push(&record(&format!("s{i}")))).unwrap();
        }
        assert!(b.poll_remote().unwrap());
        assert_eq!(ids(&b).len(), CHANNEL_CAPACITY + 10);
    }
}
