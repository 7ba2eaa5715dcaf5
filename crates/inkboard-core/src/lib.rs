//! Core types for inkboard.
//!
//! - [`record`]: the plain, replicated Shape Record and its identifiers
//! - [`shapes`]: the typed attribute schema behind every record
//! - [`adapter`]: conversion between canvas objects and records
//! - [`canvas`]: the local, non-replicated rendering surface
//! - [`tools`]: the tool state machine and the canvas policy each tool implies
//! - [`document`]: the automerge document that holds a room's shapes
//! - [`store`]: the mutation/subscription interface the edit pipeline consumes

pub mod adapter;
pub mod canvas;
pub mod document;
pub mod error;
pub mod record;
pub mod shapes;
pub mod store;
pub mod throttle;
pub mod tools;

pub use canvas::{Canvas, CanvasObject};
pub use document::{Document, DocumentId, ShapeList};
pub use error::AdapterError;
pub use record::{Attributes, ConnectionId, RecordData, ShapeId, ShapeType};
pub use shapes::{
    BaseAttributes, CircleAttrs, PathAttrs, PathCommand, RectAttrs, ShapeBody, ShapeKind, ShapeRecord, TextAttrs,
};
pub use store::{ShapeStore, SnapshotObserver};
pub use throttle::Throttle;
pub use tools::{Brush, BrushSettings, CompositeOp, Cursor, Interactivity, Tool, ToolConfig, ToolState};
