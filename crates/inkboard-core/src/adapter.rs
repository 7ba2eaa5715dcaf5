//! Object Serialization Adapter: canvas objects to Shape Records and back.

use tracing::warn;

use crate::canvas::CanvasObject;
use crate::error::AdapterError;
use crate::record::{Attributes, RecordData, ShapeType};
use crate::shapes::{whole_numbers, ShapeRecord};
use crate::tools::{CompositeOp, ToolConfig};

/// Serialize a canvas object into its stored record.
///
/// The object must already carry its id; callers mint one with
/// [`crate::ShapeId::new`] before committing a fresh object.
pub fn serialize(object: &CanvasObject) -> Result<RecordData, AdapterError> {
    to_record(object)?.to_data()
}

/// Typed view of the record an object serializes to
pub fn to_record(object: &CanvasObject) -> Result<ShapeRecord, AdapterError> {
    let id = object.id.clone().ok_or(AdapterError::MissingId)?;
    Ok(ShapeRecord {
        id,
        owner: object.owner,
        body: object.body.clone(),
    })
}

/// Build a canvas object from a typed record under the active tool policy
pub fn from_record(record: ShapeRecord, config: &ToolConfig) -> CanvasObject {
    let composite = match record.shape_type() {
        ShapeType::EraserPath => CompositeOp::DestinationOut,
        _ => CompositeOp::SourceOver,
    };
    CanvasObject {
        id: Some(record.id),
        owner: record.owner,
        body: record.body,
        interactivity: config.interactivity(),
        composite,
        editing: false,
    }
}

pub fn deserialize_record(data: &RecordData, config: &ToolConfig) -> Result<CanvasObject, AdapterError> {
    Ok(from_record(ShapeRecord::from_data(data)?, config))
}

/// Rebuild renderable objects from an ordered batch of records.
///
/// Output order is paint order. A record that fails to parse is logged
/// and skipped; it never aborts the batch.
pub fn deserialize(records: &[RecordData], config: &ToolConfig) -> Vec<CanvasObject> {
    records
        .iter()
        .filter_map(|data| match deserialize_record(data, config) {
            Ok(object) => Some(object),
            Err(e) => {
                warn!(id = %data.id, shape_type = %data.shape_type, error = %e, "skipping malformed shape record");
                None
            }
        })
        .collect()
}

/// Position, scale and rotation only, for throttled transform mirroring
pub fn transform_patch(object: &CanvasObject) -> Attributes {
    let p = object.body.placement();
    let mut patch = Attributes::new();
    for (key, value) in [
        ("left", p.left),
        ("top", p.top),
        ("scaleX", p.scale_x),
        ("scaleY", p.scale_y),
        ("angle", p.angle),
    ] {
        patch.insert(key.to_string(), whole_numbers(value.into()));
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ShapeId;
    use crate::shapes::{PathAttrs, PathCommand, ShapeBody, ShapeKind};
    use crate::tools::{Tool, ToolState};
    use inkboard_geometry::{Placement, Point};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn config(tool: Tool) -> ToolConfig {
        ToolState::new(tool, Default::default()).config()
    }

    /// Attribute as a peer writes it: whole numbers as JSON integers
    fn as_written(value: &Value) -> Value {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 => json!(f as i64),
                _ => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(as_written).collect()),
            Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), as_written(v))).collect()),
            _ => value.clone(),
        }
    }

    fn record(id: &str, shape_type: &str, attributes: Value) -> RecordData {
        RecordData {
            id: id.to_string(),
            shape_type: shape_type.to_string(),
            owner_connection_id: 3,
            attributes: match attributes {
                Value::Object(map) => map,
                _ => Attributes::new(),
            },
        }
    }

    #[test]
    fn serialize_requires_id() {
        let kind = ShapeKind::Path(PathAttrs {
            path: PathCommand::from_points(&[Point::new(0.0, 0.0)]),
            stroke: "#000000".into(),
            stroke_width: 5.0,
        });
        let object = CanvasObject::new(ShapeBody::new(Placement::default(), kind));
        assert!(matches!(serialize(&object), Err(AdapterError::MissingId)));
        let data = serialize(&object.with_id(ShapeId::from("p1"))).unwrap();
        assert_eq!(data.id, "p1");
        assert_eq!(data.shape_type, "path");
    }

    #[test]
    fn eraser_records_erase_after_reload() {
        let records = vec![
            record("e", "eraserPath", json!({ "path": [["M", 0, 0], ["L", 5, 5]], "strokeWidth": 20 })),
            record("p", "path", json!({ "path": [["M", 0, 0], ["L", 5, 5]] })),
        ];
        let objects = deserialize(&records, &config(Tool::Pen));
        assert_eq!(objects[0].composite, CompositeOp::DestinationOut);
        assert_eq!(objects[1].composite, CompositeOp::SourceOver);
    }

    #[test]
    fn interactivity_follows_active_tool() {
        let records = vec![record("r", "rectangle", json!({ "width": 1, "height": 1 }))];
        assert!(deserialize(&records, &config(Tool::Select))[0].interactivity.selectable);
        assert!(!deserialize(&records, &config(Tool::Text))[0].interactivity.evented);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let records = vec![
            record("a", "circle", json!({ "radius": 5 })),
            record("b", "hexagon", json!({})),
            record("", "circle", json!({ "radius": 5 })),
            record("c", "circle", json!({ "radius": "big" })),
            record("d", "text", json!({ "text": "hi" })),
        ];
        let ids: Vec<_> = deserialize(&records, &config(Tool::Pen))
            .into_iter()
            .filter_map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![ShapeId::from("a"), ShapeId::from("d")]);
    }

    #[test]
    fn transform_patch_has_only_transform_keys() {
        let records = vec![record("r", "rectangle", json!({ "left": 4, "width": 1, "height": 1, "fill": "red" }))];
        let object = &deserialize(&records, &config(Tool::Select))[0];
        let patch = transform_patch(object);
        let mut keys: Vec<_> = patch.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["angle", "left", "scaleX", "scaleY", "top"]);
        assert_eq!(patch["left"], json!(4));
    }

    #[test]
    fn integer_attributes_round_trip_as_integers() {
        let attributes = json!({ "left": 4, "top": -7, "width": 10, "height": 2.5, "strokeWidth": 3 });
        let data = record("r", "rectangle", attributes);
        let out = serialize(&deserialize(std::slice::from_ref(&data), &config(Tool::Select))[0]).unwrap();
        for (key, value) in &data.attributes {
            assert_eq!(out.attributes.get(key), Some(value), "key {key}");
        }
        assert!(out.attributes["left"].is_i64());
        assert!(out.attributes["height"].is_f64());
    }

    fn arb_record() -> impl Strategy<Value = RecordData> {
        let coord = -1000.0f64..1000.0;
        let base = (coord.clone(), coord.clone(), 0.1f64..5.0, -180.0f64..180.0, 0.0f64..=1.0);
        let extra = proptest::option::of("[a-z]{1,8}");
        let kind = prop_oneof![
            proptest::collection::vec((coord.clone(), coord.clone()), 1..6).prop_map(|pts| {
                let path: Vec<Value> = pts.iter().map(|(x, y)| json!(["L", x, y])).collect();
                ("path", json!({ "path": path, "stroke": "#123456", "strokeWidth": 3 }))
            }),
            proptest::collection::vec((coord.clone(), coord.clone()), 1..6).prop_map(|pts| {
                let path: Vec<Value> = pts.iter().map(|(x, y)| json!(["M", x, y])).collect();
                ("eraserPath", json!({ "path": path, "strokeWidth": 20 }))
            }),
            (0.0f64..500.0, 0.0f64..500.0).prop_map(|(w, h)| {
                ("rectangle", json!({ "width": w, "height": h, "fill": "#ff0000" }))
            }),
            (0.0f64..500.0).prop_map(|r| ("circle", json!({ "radius": r, "originX": "center", "originY": "center" }))),
            ("[ -~]{0,20}", 1.0f64..96.0).prop_map(|(text, size)| {
                ("text", json!({ "text": text, "fontSize": size, "fontFamily": "serif" }))
            }),
        ];
        ("[a-z0-9-]{1,36}", base, kind, extra).prop_map(|(id, (left, top, scale, angle, opacity), (ty, attrs), extra)| {
            let mut map = match attrs {
                Value::Object(map) => map,
                _ => Attributes::new(),
            };
            map.insert("left".into(), json!(left));
            map.insert("top".into(), json!(top));
            map.insert("scaleX".into(), json!(scale));
            map.insert("angle".into(), json!(angle));
            map.insert("opacity".into(), json!(opacity));
            if let Some(value) = extra {
                map.insert("x-custom".into(), json!({ "note": value }));
            }
            RecordData {
                id,
                shape_type: ty.to_string(),
                owner_connection_id: 9,
                attributes: map,
            }
        })
    }

    proptest! {
        #[test]
        fn round_trip_preserves_present_keys(data in arb_record()) {
            let objects = deserialize(std::slice::from_ref(&data), &config(Tool::Select));
            prop_assert_eq!(objects.len(), 1);
            let out = serialize(&objects[0]).unwrap();
            prop_assert_eq!(&out.id, &data.id);
            prop_assert_eq!(&out.shape_type, &data.shape_type);
            prop_assert_eq!(out.owner_connection_id, data.owner_connection_id);
            for (key, value) in &data.attributes {
                prop_assert_eq!(out.attributes.get(key), Some(&as_written(value)), "key {} changed", key);
            }
        }

        #[test]
        fn paint_order_matches_append_order(
            n in prop_oneof![Just(0usize), Just(1usize), Just(50usize)],
            seed in proptest::collection::vec(arb_record(), 50),
        ) {
            let batch: Vec<RecordData> = seed
                .into_iter()
                .take(n)
                .enumerate()
                .map(|(i, mut r)| { r.id = format!("shape-{i}"); r })
                .collect();
            let objects = deserialize(&batch, &config(Tool::Pen));
            let order: Vec<String> = objects.iter().filter_map(|o| o.id.as_ref().map(|id| id.to_string())).collect();
            let expected: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(order, expected);
        }
    }
}
