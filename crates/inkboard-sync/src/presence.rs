//! Presence: ephemeral per-connection cursor and tool state.
//!
//! Presence never touches the shape document. Each publish overwrites the
//! peer's previous record wholesale (last-write-wins, no merge).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use inkboard_core::{ConnectionId, Throttle, Tool};
use inkboard_geometry::Point;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Staleness threshold - remove cursors not updated in 5 seconds
pub const STALE_THRESHOLD: Duration = Duration::from_secs(5);

/// How often an idle publisher repeats its record, well inside [`STALE_THRESHOLD`]
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Label for peers that did not publish a display name
pub const ANONYMOUS_LABEL: &str = "Anonymous";

/// What one connection publishes about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    /// None while the pointer is off the canvas
    pub cursor: Option<Point>,
    pub selected_tool: Tool,
}

impl PresenceRecord {
    pub fn new(selected_tool: Tool) -> Self {
        Self { cursor: None, selected_tool }
    }
}

/// Presence message types relayed between peers of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresenceMessage {
    /// Full presence record, replacing the previous one
    Update {
        connection_id: ConnectionId,
        display_name: Option<String>,
        record: PresenceRecord,
    },
    /// Peer leaving gracefully
    Leave { connection_id: ConnectionId },
    /// Ask every peer to republish (sent on join)
    RequestAll,
}

impl PresenceMessage {
    /// Msgpack wire encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).context("failed to encode presence message")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).context("failed to decode presence message")
    }
}

/// Where presence messages go
pub trait PresenceSink {
    fn publish(&mut self, message: &PresenceMessage) -> Result<()>;
}

impl PresenceSink for Vec<PresenceMessage> {
    fn publish(&mut self, message: &PresenceMessage) -> Result<()> {
        self.push(message.clone());
        Ok(())
    }
}

/// A remote peer's latest presence
#[derive(Debug, Clone)]
pub struct PeerPresence {
    pub connection_id: ConnectionId,
    pub display_name: Option<String>,
    pub record: PresenceRecord,
    pub last_seen: Instant,
}

impl PeerPresence {
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(ANONYMOUS_LABEL)
    }
}

/// A cursor to draw for a remote peer
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub connection_id: ConnectionId,
    pub label: String,
    pub position: Point,
    pub tool: Tool,
}

/// Manages all remote peer presence states
#[derive(Debug)]
pub struct PresenceManager {
    local: ConnectionId,
    peers: HashMap<ConnectionId, PeerPresence>,
}

impl PresenceManager {
    pub fn new(local: ConnectionId) -> Self {
        Self {
            local,
            peers: HashMap::new(),
        }
    }

    /// Apply an incoming message; returns true when RequestAll asks us to republish
    pub fn apply(&mut self, message: PresenceMessage, now: Instant) -> bool {
        match message {
            PresenceMessage::Update {
                connection_id,
                display_name,
                record,
            } => {
                // Don't store our own presence
                if connection_id != self.local {
                    self.peers.insert(
                        connection_id,
                        PeerPresence {
                            connection_id,
                            display_name,
                            record,
                            last_seen: now,
                        },
                    );
                }
                false
            }
            PresenceMessage::Leave { connection_id } => {
                self.peers.remove(&connection_id);
                false
            }
            PresenceMessage::RequestAll => true,
        }
    }

    /// Remove peers not heard from within the stale threshold
    pub fn prune_stale(&mut self, now: Instant) {
        self.peers
            .retain(|_, peer| now.saturating_duration_since(peer.last_seen) < STALE_THRESHOLD);
    }

    pub fn peer(&self, connection_id: ConnectionId) -> Option<&PeerPresence> {
        self.peers.get(&connection_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// One cursor per peer whose pointer is on the canvas, ordered by connection
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        let mut cursors: Vec<RemoteCursor> = self
            .peers
            .values()
            .filter_map(|peer| {
                peer.record.cursor.map(|position| RemoteCursor {
                    connection_id: peer.connection_id,
                    label: peer.label().to_string(),
                    position,
                    tool: peer.record.selected_tool,
                })
            })
            .collect();
        cursors.sort_by_key(|c| c.connection_id);
        cursors
    }
}

/// Throttled publisher of the local presence record
#[derive(Debug)]
pub struct PresencePublisher {
    connection_id: ConnectionId,
    display_name: Option<String>,
    throttle: Throttle,
    current: PresenceRecord,
    /// Last timed publish, from pointer moves or heartbeats
    last_publish: Option<Instant>,
}

impl PresencePublisher {
    pub fn new(connection_id: ConnectionId, display_name: Option<String>, tool: Tool, interval: Duration) -> Self {
        Self {
            connection_id,
            display_name,
            throttle: Throttle::new(interval),
            current: PresenceRecord::new(tool),
            last_publish: None,
        }
    }

    pub fn current(&self) -> &PresenceRecord {
        &self.current
    }

    fn message(&self) -> PresenceMessage {
        PresenceMessage::Update {
            connection_id: self.connection_id,
            display_name: self.display_name.clone(),
            record: self.current.clone(),
        }
    }

    /// Pointer moved over the canvas; publishes at most once per window.
    ///
    /// Returns whether a message went out.
    pub fn pointer_move(&mut self, point: Point, now: Instant, sink: &mut impl PresenceSink) -> Result<bool> {
        self.current.cursor = Some(point);
        if !self.throttle.ready(now) {
            trace!(connection = %self.connection_id, "presence publish throttled");
            return Ok(false);
        }
        sink.publish(&self.message())?;
        self.last_publish = Some(now);
        Ok(true)
    }

    /// Repeat the current record when nothing went out for a heartbeat
    /// interval, so peers do not prune an idle user as stale.
    pub fn heartbeat(&mut self, now: Instant, sink: &mut impl PresenceSink) -> Result<bool> {
        if self
            .last_publish
            .is_some_and(|last| now.saturating_duration_since(last) < HEARTBEAT_INTERVAL)
        {
            return Ok(false);
        }
        sink.publish(&self.message())?;
        self.last_publish = Some(now);
        Ok(true)
    }

    /// Pointer left the canvas; always publishes immediately
    pub fn pointer_leave(&mut self, sink: &mut impl PresenceSink) -> Result<()> {
        self.current.cursor = None;
        self.throttle.reset();
        sink.publish(&self.message())
    }

    pub fn set_tool(&mut self, tool: Tool, sink: &mut impl PresenceSink) -> Result<()> {
        if self.current.selected_tool == tool {
            return Ok(());
        }
        self.current.selected_tool = tool;
        sink.publish(&self.message())
    }

    /// Publish the current record again, e.g. for a newly joined peer
    pub fn republish(&mut self, sink: &mut impl PresenceSink) -> Result<()> {
        sink.publish(&self.message())
    }

    /// Tell peers we are gone
    pub fn leave(&mut self, sink: &mut impl PresenceSink) -> Result<()> {
        sink.publish(&PresenceMessage::Leave {
            connection_id: self.connection_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const WINDOW: Duration = Duration::from_millis(50);

    fn publisher() -> PresencePublisher {
        PresencePublisher::new(ConnectionId(1), Some("ada".into()), Tool::Pen, WINDOW)
    }

    #[test]
    fn continuous_moves_publish_once_per_window() {
        let mut p = publisher();
        let mut sink = Vec::new();
        let start = Instant::now();
        // 100 moves over 500ms, one every 5ms
        for i in 0..100u32 {
            let at = start + Duration::from_millis(u64::from(i) * 5);
            assert_ok!(p.pointer_move(Point::new(f64::from(i), 0.0), at, &mut sink));
        }
        assert_eq!(sink.len(), 10);
    }

    #[test]
    fn leave_is_never_throttled() {
        let mut p = publisher();
        let mut sink = Vec::new();
        let start = Instant::now();
        assert!(p.pointer_move(Point::new(1.0, 1.0), start, &mut sink).unwrap());
        assert!(!p.pointer_move(Point::new(2.0, 2.0), start + Duration::from_millis(1), &mut sink).unwrap());
        assert_ok!(p.pointer_leave(&mut sink));
        assert_eq!(sink.len(), 2);
        match sink.last() {
            Some(PresenceMessage::Update { record, .. }) => assert_eq!(record.cursor, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn idle_publisher_heartbeats_before_peers_prune_it() {
        let mut p = publisher();
        let mut sink = Vec::new();
        let mut peers = PresenceManager::new(ConnectionId(2));
        let start = Instant::now();
        assert!(p.pointer_move(Point::new(3.0, 4.0), start, &mut sink).unwrap());

        // Idle for 12s, ticking every 500ms
        for tick in 1..=24u64 {
            let now = start + Duration::from_millis(tick * 500);
            p.heartbeat(now, &mut sink).unwrap();
            for message in sink.drain(..) {
                peers.apply(message, now);
            }
            peers.prune_stale(now);
            assert_eq!(peers.remote_cursors().len(), 1, "pruned at tick {tick}");
        }
    }

    #[test]
    fn heartbeat_waits_after_a_recent_move() {
        let mut p = publisher();
        let mut sink = Vec::new();
        let start = Instant::now();
        assert!(p.heartbeat(start, &mut sink).unwrap());
        assert!(p.pointer_move(Point::new(1.0, 1.0), start + Duration::from_secs(1), &mut sink).unwrap());
        assert!(!p.heartbeat(start + Duration::from_secs(2), &mut sink).unwrap());
        assert!(p.heartbeat(start + Duration::from_secs(3), &mut sink).unwrap());
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn manager_is_last_write_wins() {
        let mut m = PresenceManager::new(ConnectionId(1));
        let now = Instant::now();
        let update = |x: f64, name: Option<&str>| PresenceMessage::Update {
            connection_id: ConnectionId(2),
            display_name: name.map(str::to_string),
            record: PresenceRecord {
                cursor: Some(Point::new(x, 0.0)),
                selected_tool: Tool::Rectangle,
            },
        };
        m.apply(update(1.0, Some("bob")), now);
        m.apply(update(5.0, None), now);
        let cursors = m.remote_cursors();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].position, Point::new(5.0, 0.0));
        assert_eq!(cursors[0].label, ANONYMOUS_LABEL);
    }

    #[test]
    fn own_updates_and_absent_cursors_are_not_drawn() {
        let mut m = PresenceManager::new(ConnectionId(1));
        let now = Instant::now();
        m.apply(
            PresenceMessage::Update {
                connection_id: ConnectionId(1),
                display_name: None,
                record: PresenceRecord::new(Tool::Pen),
            },
            now,
        );
        m.apply(
            PresenceMessage::Update {
                connection_id: ConnectionId(3),
                display_name: Some("cy".into()),
                record: PresenceRecord::new(Tool::Pen),
            },
            now,
        );
        assert_eq!(m.peer_count(), 1);
        assert!(m.remote_cursors().is_empty());
    }

    #[test]
    fn stale_and_leaving_peers_are_dropped() {
        let mut m = PresenceManager::new(ConnectionId(1));
        let now = Instant::now();
        for id in [2, 3] {
            m.apply(
                PresenceMessage::Update {
                    connection_id: ConnectionId(id),
                    display_name: None,
                    record: PresenceRecord::new(Tool::Select),
                },
                now,
            );
        }
        m.apply(PresenceMessage::Leave { connection_id: ConnectionId(2) }, now);
        assert_eq!(m.peer_count(), 1);
        m.prune_stale(now + STALE_THRESHOLD);
        assert_eq!(m.peer_count(), 0);
    }

    #[test]
    fn wire_encoding_round_trips() {
        let msg = PresenceMessage::Update {
            connection_id: ConnectionId(7),
            display_name: Some("dee".into()),
            record: PresenceRecord {
                cursor: Some(Point::new(1.5, -2.0)),
                selected_tool: Tool::Eraser,
            },
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(PresenceMessage::decode(&bytes).unwrap(), msg);
        assert!(PresenceMessage::decode(&[0xc1]).is_err());
    }
}
