//! Sessions for inkboard: everything between user input and the room.
//!
//! - [`pipeline`]: the edit pipeline turning gestures into store mutations
//! - [`undo`]: the local undo/redo command log
//! - [`boards`]: board persistence
//! - [`identity`]: who the current user is
//! - [`config`]: file and environment configuration
//! - [`session`]: a live board session wiring all of the above to a room

pub mod boards;
pub mod config;
pub mod identity;
pub mod pipeline;
pub mod session;
pub mod undo;

pub use boards::{Board, BoardError, BoardStore, FileBoardStore};
pub use config::{Config, ConfigError, FileConfig};
pub use identity::{Identity, StaticIdentity, UserId};
pub use pipeline::{EditPipeline, Key, PipelineOptions, PointerEvent, TransformMode};
pub use session::BoardSession;
pub use undo::{UndoAction, UndoLog};
