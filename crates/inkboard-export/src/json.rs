//! JSON snapshot export: the board's shape records in paint order.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use inkboard_core::RecordData;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BoardExport<'a> {
    room_id: &'a str,
    name: &'a str,
    shapes: &'a [RecordData],
}

/// Pretty-printed snapshot document
pub fn export_json(room_id: &str, name: &str, shapes: &[RecordData]) -> Result<String> {
    let export = BoardExport { room_id, name, shapes };
    Ok(serde_json::to_string_pretty(&export)?)
}

pub fn save_json(room_id: &str, name: &str, shapes: &[RecordData], path: &Path) -> Result<()> {
    let json = export_json(room_id, name, shapes)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::Attributes;
    use serde_json::{json, Value};

    #[test]
    fn snapshot_keeps_order_and_extras() {
        let mut attributes = Attributes::new();
        attributes.insert("radius".into(), json!(5.0));
        attributes.insert("shadow".into(), json!({ "blur": 3 }));
        let shapes = vec![
            RecordData {
                id: "b".into(),
                shape_type: "circle".into(),
                owner_connection_id: 1,
                attributes,
            },
            RecordData {
                id: "a".into(),
                shape_type: "circle".into(),
                owner_connection_id: 1,
                attributes: Attributes::new(),
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        save_json("room-1", "Sketches", &shapes, &path).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["roomId"], "room-1");
        assert_eq!(value["shapes"][0]["id"], "b");
        assert_eq!(value["shapes"][1]["id"], "a");
        assert_eq!(value["shapes"][0]["attributes"]["shadow"]["blur"], 3);
    }
}
