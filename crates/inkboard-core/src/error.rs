use thiserror::Error;

use crate::record::ShapeType;

/// Failure to convert between a canvas object and a Shape Record
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("canvas object has no id assigned")]
    MissingId,

    #[error("record has an empty id")]
    EmptyId,

    #[error("unknown shape type `{0}`")]
    UnknownType(String),

    #[error("invalid attribute `{key}`: {reason}")]
    InvalidAttribute {
        key: &'static str,
        reason: &'static str,
    },

    #[error("malformed {shape_type} attributes: {source}")]
    Malformed {
        shape_type: ShapeType,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode attributes: {0}")]
    Encode(#[from] serde_json::Error),
}
