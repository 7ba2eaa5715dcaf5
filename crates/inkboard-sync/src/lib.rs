//! Realtime collaboration plumbing for inkboard.
//!
//! - [`room`]: room hub relaying automerge changes between connections
//! - [`presence`]: ephemeral cursor/tool presence and its throttled publisher

pub mod presence;
pub mod room;

pub use presence::{
    PeerPresence, PresenceManager, PresenceMessage, PresencePublisher, PresenceRecord, PresenceSink, RemoteCursor,
    ANONYMOUS_LABEL, HEARTBEAT_INTERVAL, STALE_THRESHOLD,
};
pub use room::{RoomConnection, RoomEvent, RoomHub};
