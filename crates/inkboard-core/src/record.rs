//! Shape Records: the unit of replicated and persisted drawing state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdapterError;

/// Open attribute mapping of a stored record
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Shape identifier - opaque string, UUID v4 when we mint it.
///
/// Stable for the shape's lifetime and the only key correlating a canvas
/// object with its stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Numeric id of a peer's connection to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Owner of shapes drawn without a live room connection
    pub const OFFLINE: ConnectionId = ConnectionId(0);
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape type tag - immutable after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeType {
    Path,
    Rectangle,
    Circle,
    Text,
    EraserPath,
}

impl ShapeType {
    pub const ALL: [ShapeType; 5] = [
        ShapeType::Path,
        ShapeType::Rectangle,
        ShapeType::Circle,
        ShapeType::Text,
        ShapeType::EraserPath,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShapeType::Path => "path",
            ShapeType::Rectangle => "rectangle",
            ShapeType::Circle => "circle",
            ShapeType::Text => "text",
            ShapeType::EraserPath => "eraserPath",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AdapterError::UnknownType(s.to_string()))
    }
}

/// A Shape Record as it is stored in the room document: plain data only.
///
/// Nothing here is validated; [`crate::shapes::ShapeRecord`] is the typed,
/// validated view of the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    pub id: String,
    #[serde(rename = "type")]
    pub shape_type: String,
    #[serde(default)]
    pub owner_connection_id: u64,
    #[serde(default)]
    pub attributes: Attributes,
}
