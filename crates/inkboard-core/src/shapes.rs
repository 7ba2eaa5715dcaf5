//! Typed attribute schema for Shape Records.
//!
//! Every shape type declares the attribute keys it understands. Known keys
//! are parsed and validated into typed structs; keys outside the schema are
//! never mixed into those structs but kept verbatim in [`ShapeBody::extra`]
//! so they survive a round-trip through the canvas unchanged.

use std::fmt;

use inkboard_geometry::{Bounds, Placement, Point};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::AdapterError;
use crate::record::{Attributes, ConnectionId, RecordData, ShapeId, ShapeType};

/// Keys shared by every shape type
pub const BASE_KEYS: &[&str] = &[
    "left", "top", "scaleX", "scaleY", "angle", "originX", "originY", "opacity",
];
const PATH_KEYS: &[&str] = &["path", "stroke", "strokeWidth"];
const RECT_KEYS: &[&str] = &["width", "height", "fill", "stroke", "strokeWidth"];
const CIRCLE_KEYS: &[&str] = &["radius", "fill", "stroke", "strokeWidth"];
const TEXT_KEYS: &[&str] = &["text", "fontSize", "fontFamily", "fill"];

/// Approximate glyph advance as a fraction of the font size
const GLYPH_WIDTH: f64 = 0.6;
/// Line height as a multiple of the font size
const LINE_HEIGHT: f64 = 1.16;

fn opaque() -> f64 {
    1.0
}
fn black() -> String {
    "#000000".to_string()
}
fn transparent() -> String {
    "transparent".to_string()
}
fn default_stroke_width() -> f64 {
    2.0
}
fn default_font_size() -> f64 {
    20.0
}
fn default_font_family() -> String {
    "sans-serif".to_string()
}

/// One segment of path geometry, stored as `["M", x, y]`, `["L", x, y]` or
/// `["Q", cx, cy, x, y]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { ctrl: Point, to: Point },
}

impl PathCommand {
    /// Smooth path through sampled pointer positions.
    ///
    /// Interior samples become quadratic control points with the curve
    /// passing through the midpoints between them. A single sample becomes
    /// a zero-length segment so the dot still renders.
    pub fn from_points(points: &[Point]) -> Vec<PathCommand> {
        let Some((&first, rest)) = points.split_first() else {
            return Vec::new();
        };
        let mut commands = vec![PathCommand::MoveTo(first)];
        match rest {
            [] => commands.push(PathCommand::LineTo(first)),
            [.., last] => {
                for pair in points[1..].windows(2) {
                    commands.push(PathCommand::QuadTo {
                        ctrl: pair[0],
                        to: pair[0].midpoint(pair[1]),
                    });
                }
                commands.push(PathCommand::LineTo(*last));
            }
        }
        commands
    }

    fn points(&self) -> std::iter::Chain<std::iter::Once<Point>, std::option::IntoIter<Point>> {
        let (a, b) = match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => (p, None),
            PathCommand::QuadTo { ctrl, to } => (ctrl, Some(to)),
        };
        std::iter::once(a).chain(b)
    }
}

impl Serialize for PathCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (letter, coords): (&str, Vec<f64>) = match *self {
            PathCommand::MoveTo(p) => ("M", vec![p.x, p.y]),
            PathCommand::LineTo(p) => ("L", vec![p.x, p.y]),
            PathCommand::QuadTo { ctrl, to } => ("Q", vec![ctrl.x, ctrl.y, to.x, to.y]),
        };
        let mut seq = serializer.serialize_seq(Some(coords.len() + 1))?;
        seq.serialize_element(letter)?;
        for c in coords {
            seq.serialize_element(&c)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for PathCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CommandVisitor;

        impl<'de> Visitor<'de> for CommandVisitor {
            type Value = PathCommand;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a path command like [\"M\", x, y]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PathCommand, A::Error> {
                let letter: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let mut coords = Vec::with_capacity(4);
                while let Some(c) = seq.next_element::<f64>()? {
                    coords.push(c);
                }
                match (letter.as_str(), coords.as_slice()) {
                    ("M", &[x, y]) => Ok(PathCommand::MoveTo(Point::new(x, y))),
                    ("L", &[x, y]) => Ok(PathCommand::LineTo(Point::new(x, y))),
                    ("Q", &[cx, cy, x, y]) => Ok(PathCommand::QuadTo {
                        ctrl: Point::new(cx, cy),
                        to: Point::new(x, y),
                    }),
                    ("M" | "L" | "Q", _) => Err(de::Error::invalid_length(coords.len() + 1, &self)),
                    (other, _) => Err(de::Error::unknown_variant(other, &["M", "L", "Q"])),
                }
            }
        }

        deserializer.deserialize_seq(CommandVisitor)
    }
}

/// Attributes every shape carries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseAttributes {
    #[serde(flatten)]
    pub placement: Placement,
    #[serde(default = "opaque")]
    pub opacity: f64,
}

impl BaseAttributes {
    pub fn new(placement: Placement) -> Self {
        Self { placement, opacity: 1.0 }
    }

    fn validate(&self) -> Result<(), AdapterError> {
        let p = &self.placement;
        for (key, v) in [
            ("left", p.left),
            ("top", p.top),
            ("scaleX", p.scale_x),
            ("scaleY", p.scale_y),
            ("angle", p.angle),
        ] {
            if !v.is_finite() {
                return Err(AdapterError::InvalidAttribute { key, reason: "must be finite" });
            }
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(AdapterError::InvalidAttribute {
                key: "opacity",
                reason: "must be between 0 and 1",
            });
        }
        Ok(())
    }
}

/// Freehand stroke geometry, shared by pen paths and eraser paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathAttrs {
    pub path: Vec<PathCommand>,
    #[serde(default = "black")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectAttrs {
    pub width: f64,
    pub height: f64,
    #[serde(default = "transparent")]
    pub fill: String,
    #[serde(default = "black")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleAttrs {
    pub radius: f64,
    #[serde(default = "transparent")]
    pub fill: String,
    #[serde(default = "black")]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAttrs {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "black")]
    pub fill: String,
}

/// Type-specific attributes, one variant per shape type
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Path(PathAttrs),
    EraserPath(PathAttrs),
    Rectangle(RectAttrs),
    Circle(CircleAttrs),
    Text(TextAttrs),
}

fn non_negative(key: &'static str, v: f64) -> Result<(), AdapterError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(AdapterError::InvalidAttribute { key, reason: "must be a non-negative number" })
    }
}

fn parse_attrs<T: serde::de::DeserializeOwned>(
    shape_type: ShapeType,
    attributes: &Attributes,
) -> Result<T, AdapterError> {
    serde_json::from_value(Value::Object(attributes.clone()))
        .map_err(|source| AdapterError::Malformed { shape_type, source })
}

/// Largest magnitude at which every f64 integer is exact
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Whole f64 numbers as JSON integers, recursively
pub(crate) fn whole_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(whole_numbers).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, whole_numbers(v))).collect()),
        other => other,
    }
}

fn into_object(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

impl ShapeKind {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeKind::Path(_) => ShapeType::Path,
            ShapeKind::EraserPath(_) => ShapeType::EraserPath,
            ShapeKind::Rectangle(_) => ShapeType::Rectangle,
            ShapeKind::Circle(_) => ShapeType::Circle,
            ShapeKind::Text(_) => ShapeType::Text,
        }
    }

    /// Attribute keys the schema declares for a shape type, base keys excluded
    pub fn keys_for(shape_type: ShapeType) -> &'static [&'static str] {
        match shape_type {
            ShapeType::Path | ShapeType::EraserPath => PATH_KEYS,
            ShapeType::Rectangle => RECT_KEYS,
            ShapeType::Circle => CIRCLE_KEYS,
            ShapeType::Text => TEXT_KEYS,
        }
    }

    /// Parse and validate the type-specific attributes
    pub fn from_attributes(shape_type: ShapeType, attributes: &Attributes) -> Result<Self, AdapterError> {
        let kind = match shape_type {
            ShapeType::Path => ShapeKind::Path(parse_attrs(shape_type, attributes)?),
            ShapeType::EraserPath => ShapeKind::EraserPath(parse_attrs(shape_type, attributes)?),
            ShapeType::Rectangle => ShapeKind::Rectangle(parse_attrs(shape_type, attributes)?),
            ShapeType::Circle => ShapeKind::Circle(parse_attrs(shape_type, attributes)?),
            ShapeType::Text => ShapeKind::Text(parse_attrs(shape_type, attributes)?),
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn to_attributes(&self) -> Result<Attributes, AdapterError> {
        let value = match self {
            ShapeKind::Path(a) | ShapeKind::EraserPath(a) => serde_json::to_value(a)?,
            ShapeKind::Rectangle(a) => serde_json::to_value(a)?,
            ShapeKind::Circle(a) => serde_json::to_value(a)?,
            ShapeKind::Text(a) => serde_json::to_value(a)?,
        };
        Ok(into_object(value))
    }

    fn validate(&self) -> Result<(), AdapterError> {
        match self {
            ShapeKind::Path(a) | ShapeKind::EraserPath(a) => {
                if a.path.is_empty() {
                    return Err(AdapterError::InvalidAttribute { key: "path", reason: "must not be empty" });
                }
                non_negative("strokeWidth", a.stroke_width)
            }
            ShapeKind::Rectangle(a) => {
                non_negative("width", a.width)?;
                non_negative("height", a.height)?;
                non_negative("strokeWidth", a.stroke_width)
            }
            ShapeKind::Circle(a) => {
                non_negative("radius", a.radius)?;
                non_negative("strokeWidth", a.stroke_width)
            }
            ShapeKind::Text(a) => {
                if a.font_size.is_finite() && a.font_size > 0.0 {
                    Ok(())
                } else {
                    Err(AdapterError::InvalidAttribute { key: "fontSize", reason: "must be positive" })
                }
            }
        }
    }

    /// Unplaced bounding box of the geometry, relative to its own top-left
    pub fn local_size(&self) -> (f64, f64) {
        match self {
            ShapeKind::Path(a) | ShapeKind::EraserPath(a) => path_extent(&a.path)
                .map(|b| (b.width(), b.height()))
                .unwrap_or((0.0, 0.0)),
            ShapeKind::Rectangle(a) => (a.width, a.height),
            ShapeKind::Circle(a) => (a.radius * 2.0, a.radius * 2.0),
            ShapeKind::Text(a) => text_size(a),
        }
    }

    fn stroke_width(&self) -> f64 {
        match self {
            ShapeKind::Path(a) | ShapeKind::EraserPath(a) => a.stroke_width,
            ShapeKind::Rectangle(a) => a.stroke_width,
            ShapeKind::Circle(a) => a.stroke_width,
            ShapeKind::Text(_) => 0.0,
        }
    }
}

/// Extent of path geometry in its own coordinates
pub fn path_extent(path: &[PathCommand]) -> Option<Bounds> {
    Bounds::from_points(path.iter().flat_map(|c| c.points()))
}

fn text_size(a: &TextAttrs) -> (f64, f64) {
    let lines = a.text.split('\n');
    let (count, longest) = lines.fold((0usize, 0usize), |(n, w), line| (n + 1, w.max(line.chars().count())));
    // An empty text still occupies one caret-wide line
    let width = (longest.max(1) as f64) * a.font_size * GLYPH_WIDTH;
    (width, count as f64 * a.font_size * LINE_HEIGHT)
}

/// Everything a shape is, apart from its identity
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeBody {
    pub base: BaseAttributes,
    pub kind: ShapeKind,
    /// Keys outside the schema, carried verbatim
    pub extra: Attributes,
}

impl ShapeBody {
    pub fn new(placement: Placement, kind: ShapeKind) -> Self {
        Self {
            base: BaseAttributes::new(placement),
            kind,
            extra: Attributes::new(),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        self.kind.shape_type()
    }

    pub fn placement(&self) -> &Placement {
        &self.base.placement
    }

    pub fn placement_mut(&mut self) -> &mut Placement {
        &mut self.base.placement
    }

    /// Split an attribute map into the typed schema and the extras
    pub fn from_attributes(shape_type: ShapeType, attributes: &Attributes) -> Result<Self, AdapterError> {
        let base: BaseAttributes = parse_attrs(shape_type, attributes)?;
        base.validate()?;
        let kind = ShapeKind::from_attributes(shape_type, attributes)?;
        let known = ShapeKind::keys_for(shape_type);
        let extra = attributes
            .iter()
            .filter(|(k, _)| !BASE_KEYS.contains(&k.as_str()) && !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { base, kind, extra })
    }

    /// Flatten back into one attribute map; schema keys win over extras.
    ///
    /// Whole numbers are written as JSON integers, the way every other
    /// peer writes them, so `10` stays `10` instead of coming back `10.0`.
    pub fn to_attributes(&self) -> Result<Attributes, AdapterError> {
        let mut schema = into_object(serde_json::to_value(self.base)?);
        schema.extend(self.kind.to_attributes()?);
        let mut attributes = self.extra.clone();
        attributes.extend(schema.into_iter().map(|(key, value)| (key, whole_numbers(value))));
        Ok(attributes)
    }

    /// Axis-aligned bounds on the canvas, stroke included
    pub fn bounds(&self) -> Bounds {
        let (w, h) = self.kind.local_size();
        self.base
            .placement
            .bounds(w, h)
            .inflate(self.kind.stroke_width() / 2.0)
    }
}

/// Typed, validated Shape Record
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub id: ShapeId,
    pub owner: ConnectionId,
    pub body: ShapeBody,
}

impl ShapeRecord {
    pub fn shape_type(&self) -> ShapeType {
        self.body.shape_type()
    }

    pub fn from_data(data: &RecordData) -> Result<Self, AdapterError> {
        if data.id.is_empty() {
            return Err(AdapterError::EmptyId);
        }
        let shape_type: ShapeType = data.shape_type.parse()?;
        Ok(Self {
            id: ShapeId::from(data.id.as_str()),
            owner: ConnectionId(data.owner_connection_id),
            body: ShapeBody::from_attributes(shape_type, &data.attributes)?,
        })
    }

    pub fn to_data(&self) -> Result<RecordData, AdapterError> {
        Ok(RecordData {
            id: self.id.to_string(),
            shape_type: self.shape_type().as_str().to_string(),
            owner_connection_id: self.owner.0,
            attributes: self.body.to_attributes()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        into_object(value)
    }

    #[test]
    fn path_commands_serialize_as_arrays() {
        let path = vec![
            PathCommand::MoveTo(Point::new(1.0, 2.0)),
            PathCommand::QuadTo { ctrl: Point::new(3.0, 4.0), to: Point::new(5.0, 6.0) },
            PathCommand::LineTo(Point::new(7.0, 8.0)),
        ];
        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value, json!([["M", 1.0, 2.0], ["Q", 3.0, 4.0, 5.0, 6.0], ["L", 7.0, 8.0]]));
        let back: Vec<PathCommand> = serde_json::from_value(value).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn path_command_rejects_bad_arity() {
        assert!(serde_json::from_value::<PathCommand>(json!(["M", 1.0])).is_err());
        assert!(serde_json::from_value::<PathCommand>(json!(["Z"])).is_err());
    }

    #[test]
    fn from_points_smooths_interior_samples() {
        let pts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)];
        let path = PathCommand::from_points(&pts);
        assert_eq!(
            path,
            vec![
                PathCommand::MoveTo(Point::new(0.0, 0.0)),
                PathCommand::QuadTo { ctrl: Point::new(10.0, 0.0), to: Point::new(10.0, 5.0) },
                PathCommand::LineTo(Point::new(10.0, 10.0)),
            ]
        );
        assert_eq!(PathCommand::from_points(&[Point::new(1.0, 1.0)]).len(), 2);
        assert!(PathCommand::from_points(&[]).is_empty());
    }

    #[test]
    fn rectangle_schema_and_extras() {
        let a = attrs(json!({
            "left": 10, "top": 10, "width": 100, "height": 50,
            "fill": "#ff0000", "shadow": { "blur": 3 }
        }));
        let body = ShapeBody::from_attributes(ShapeType::Rectangle, &a).unwrap();
        match &body.kind {
            ShapeKind::Rectangle(r) => {
                assert_eq!(r.width, 100.0);
                assert_eq!(r.fill, "#ff0000");
                assert_eq!(r.stroke, "#000000");
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(body.extra.len(), 1);
        assert_eq!(body.extra["shadow"], json!({ "blur": 3 }));

        let out = body.to_attributes().unwrap();
        assert_eq!(out["shadow"], json!({ "blur": 3 }));
        assert_eq!(out["width"], 100.0);
        assert_eq!(out["scaleX"], 1.0);
    }

    #[test]
    fn whole_numbers_keep_their_integer_kind() {
        let a = attrs(json!({
            "left": 10, "top": 2.5, "width": 100, "height": 50.0, "angle": -90,
            "shadow": { "blur": 3.0 }
        }));
        let out = ShapeBody::from_attributes(ShapeType::Rectangle, &a).unwrap().to_attributes().unwrap();
        assert_eq!(out["left"], json!(10));
        assert!(out["left"].is_i64());
        assert_eq!(out["top"], json!(2.5));
        assert_eq!(out["height"], json!(50));
        assert_eq!(out["angle"], json!(-90));
        assert_eq!(out["scaleX"], json!(1));
        // Extras are carried untouched
        assert_eq!(out["shadow"], json!({ "blur": 3.0 }));

        let path = attrs(json!({ "path": [["M", 0, 0], ["L", 5.5, 5]] }));
        let out = ShapeBody::from_attributes(ShapeType::Path, &path).unwrap().to_attributes().unwrap();
        assert_eq!(out["path"], json!([["M", 0, 0], ["L", 5.5, 5]]));
    }

    #[test]
    fn missing_geometry_is_malformed() {
        let a = attrs(json!({ "left": 0 }));
        assert!(matches!(
            ShapeBody::from_attributes(ShapeType::Circle, &a),
            Err(AdapterError::Malformed { shape_type: ShapeType::Circle, .. })
        ));
    }

    #[test]
    fn negative_size_is_rejected() {
        let a = attrs(json!({ "width": -1, "height": 5 }));
        assert!(matches!(
            ShapeBody::from_attributes(ShapeType::Rectangle, &a),
            Err(AdapterError::InvalidAttribute { key: "width", .. })
        ));
    }

    #[test]
    fn empty_path_is_rejected() {
        let a = attrs(json!({ "path": [] }));
        assert!(matches!(
            ShapeBody::from_attributes(ShapeType::EraserPath, &a),
            Err(AdapterError::InvalidAttribute { key: "path", .. })
        ));
    }

    #[test]
    fn record_rejects_empty_id_and_unknown_type() {
        let mut data = RecordData {
            id: String::new(),
            shape_type: "circle".into(),
            owner_connection_id: 1,
            attributes: attrs(json!({ "radius": 4 })),
        };
        assert!(matches!(ShapeRecord::from_data(&data), Err(AdapterError::EmptyId)));
        data.id = "x".into();
        data.shape_type = "hexagon".into();
        assert!(matches!(ShapeRecord::from_data(&data), Err(AdapterError::UnknownType(_))));
    }

    #[test]
    fn text_bounds_grow_with_content() {
        let short = ShapeKind::Text(TextAttrs {
            text: "ab".into(),
            font_size: 10.0,
            font_family: default_font_family(),
            fill: black(),
        });
        let long = ShapeKind::Text(TextAttrs {
            text: "abcd\nxy".into(),
            font_size: 10.0,
            font_family: default_font_family(),
            fill: black(),
        });
        let (w1, h1) = short.local_size();
        let (w2, h2) = long.local_size();
        assert!(w2 > w1);
        assert!(h2 > h1);
    }
}
