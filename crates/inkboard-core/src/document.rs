//! Automerge-backed shape document - the replica of a room's shapes.
//!
//! Layout: `ROOT.id` holds the document id, `ROOT.shapes` is a List of
//! Maps, one per Shape Record (`id`, `type`, `ownerConnectionId`,
//! `attributes`). List order is paint order. Attribute values are plain
//! JSON mirrored into nested automerge maps and lists.

use std::collections::HashSet;

use anyhow::{anyhow, bail, Context, Result};
use automerge::transaction::{Transactable, Transaction};
use automerge::{Automerge, ChangeHash, ObjId, ObjType, ReadDoc, ScalarValue, ROOT};
use serde_json::{Number, Value};
use tracing::warn;
use uuid::Uuid;

use crate::record::{Attributes, ConnectionId, RecordData, ShapeId};
use crate::store::ShapeStore;

/// Unique identifier for a document (for sharing/sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The automerge document holding one room's shapes
pub struct Document {
    doc: Automerge,
    id: DocumentId,
    /// Whether there are unsaved changes
    dirty: bool,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Result<Self> {
        let id = DocumentId::new();
        let mut doc = Automerge::new();

        let mut tx = doc.transaction();
        tx.put(ROOT, "id", id.0.to_string())?;
        tx.put_object(ROOT, "shapes", ObjType::List)?;
        tx.commit();

        Ok(Self { doc, id, dirty: false })
    }

    /// Wrap an existing automerge document, e.g. a fork of a room's canonical copy
    pub fn from_automerge(doc: Automerge) -> Self {
        let id = read_id(&doc);
        Self { doc, id, dirty: false }
    }

    /// Get the underlying automerge document (for sync)
    pub fn automerge(&self) -> &Automerge {
        &self.doc
    }

    /// Independent replica with its own actor id
    pub fn fork(&self) -> Automerge {
        self.doc.fork()
    }

    pub fn heads(&self) -> Vec<ChangeHash> {
        self.doc.get_heads()
    }

    /// Changes made after `heads`, encoded for [`Document::apply_changes`]
    pub fn changes_since(&self, heads: &[ChangeHash]) -> Vec<u8> {
        self.doc.save_after(heads)
    }

    /// Apply changes from a peer's [`Document::changes_since`].
    ///
    /// Changes whose dependencies have not arrived yet are queued by
    /// automerge and count once they apply. True when the heads moved.
    pub fn apply_changes(&mut self, bytes: &[u8]) -> Result<bool> {
        let before = self.doc.get_heads();
        self.doc
            .load_incremental(bytes)
            .context("failed to apply incremental changes")?;
        Ok(self.note_heads(&before))
    }

    /// Merge remote changes; true when anything new arrived
    pub fn merge(&mut self, other: &mut Automerge) -> Result<bool> {
        let before = self.doc.get_heads();
        self.doc.merge(other)?;
        Ok(self.note_heads(&before))
    }

    fn note_heads(&mut self, before: &[ChangeHash]) -> bool {
        let changed = self.doc.get_heads() != before;
        if changed {
            self.dirty = true;
        }
        changed
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Every Shape Record, in paint order
    pub fn records(&self) -> Result<Vec<RecordData>> {
        match shapes_list(&self.doc)? {
            Some(shapes) => read_records(&self.doc, &shapes),
            None => Ok(Vec::new()),
        }
    }

    /// Run `f` in one transaction over the shape list.
    ///
    /// Commits when `f` succeeds and actually changed something, rolls
    /// back when it fails. Duplicate ids left behind by merges are
    /// deleted first, inside the same transaction.
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut ShapeList<'_>) -> Result<R>) -> Result<R> {
        let mut tx = self.doc.transaction();
        let shapes = match tx.get(ROOT, "shapes")? {
            Some((automerge::Value::Object(ObjType::List), id)) => id,
            _ => tx.put_object(ROOT, "shapes", ObjType::List)?,
        };
        let mut list = ShapeList { tx, shapes };
        match list.prune_duplicates().and_then(|_| f(&mut list)) {
            Ok(value) => {
                let ShapeList { tx, .. } = list;
                if tx.pending_ops() > 0 {
                    tx.commit();
                    self.dirty = true;
                } else {
                    tx.rollback();
                }
                Ok(value)
            }
            Err(e) => {
                list.tx.rollback();
                Err(e)
            }
        }
    }
}

impl ShapeStore for Document {
    fn connection_id(&self) -> ConnectionId {
        ConnectionId::OFFLINE
    }

    fn records(&self) -> Result<Vec<RecordData>> {
        Document::records(self)
    }

    fn mutate<R>(&mut self, f: impl FnOnce(&mut ShapeList<'_>) -> Result<R>) -> Result<R> {
        Document::mutate(self, f)
    }
}

fn read_id(doc: &Automerge) -> DocumentId {
    let parsed = match doc.get(ROOT, "id") {
        Ok(Some((automerge::Value::Scalar(s), _))) => match s.as_ref() {
            ScalarValue::Str(s) => Uuid::parse_str(s).ok(),
            _ => None,
        },
        _ => None,
    };
    parsed.map(DocumentId).unwrap_or_default()
}

fn shapes_list<R: ReadDoc>(doc: &R) -> Result<Option<ObjId>> {
    Ok(match doc.get(ROOT, "shapes")? {
        Some((automerge::Value::Object(ObjType::List), id)) => Some(id),
        _ => None,
    })
}

/// Handle on the shape list inside an open transaction
pub struct ShapeList<'a> {
    tx: Transaction<'a>,
    shapes: ObjId,
}

impl ShapeList<'_> {
    pub fn len(&self) -> usize {
        self.tx.length(&self.shapes)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Option<RecordData>> {
        match self.tx.get(&self.shapes, index)? {
            Some((_, obj)) => read_record(&self.tx, &obj).map(Some),
            None => Ok(None),
        }
    }

    pub fn records(&self) -> Result<Vec<RecordData>> {
        read_records(&self.tx, &self.shapes)
    }

    pub fn position(&self, id: &ShapeId) -> Result<Option<usize>> {
        for index in 0..self.len() {
            if let Some((_, obj)) = self.tx.get(&self.shapes, index)? {
                if read_string(&self.tx, &obj, "id")?.as_deref() == Some(id.as_str()) {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    pub fn find(&self, id: &ShapeId) -> Result<Option<(usize, RecordData)>> {
        match self.position(id)? {
            Some(index) => Ok(self.get(index)?.map(|r| (index, r))),
            None => Ok(None),
        }
    }

    /// Append on top of the paint order
    pub fn push(&mut self, record: &RecordData) -> Result<()> {
        let end = self.len();
        self.insert(end, record)
    }

    /// Insert at `index` (clamped to the end); ids stay unique
    pub fn insert(&mut self, index: usize, record: &RecordData) -> Result<()> {
        if record.id.is_empty() {
            bail!("refusing to store a shape without an id");
        }
        if self.position(&ShapeId::from(record.id.as_str()))?.is_some() {
            bail!("shape {} already exists", record.id);
        }
        let index = index.min(self.len());
        let obj = self.tx.insert_object(&self.shapes, index, ObjType::Map)?;
        self.tx.put(&obj, "id", record.id.as_str())?;
        self.tx.put(&obj, "type", record.shape_type.as_str())?;
        self.tx.put(&obj, "ownerConnectionId", record.owner_connection_id)?;
        let attributes = self.tx.put_object(&obj, "attributes", ObjType::Map)?;
        for (key, value) in &record.attributes {
            put_json(&mut self.tx, &attributes, key, value)?;
        }
        Ok(())
    }

    /// Remove the record at `index`
    pub fn delete(&mut self, index: usize) -> Result<()> {
        self.tx.delete(&self.shapes, index)?;
        Ok(())
    }

    /// Remove a record by id, returning where it was and what it held
    pub fn remove(&mut self, id: &ShapeId) -> Result<Option<(usize, RecordData)>> {
        let found = self.find(id)?;
        if let Some((index, _)) = &found {
            self.delete(*index)?;
        }
        Ok(found)
    }

    /// Merge `patch` into a record's attributes; false when the id is absent
    pub fn update_attributes(&mut self, id: &ShapeId, patch: &Attributes) -> Result<bool> {
        let Some(attributes) = self.attributes_obj(id)? else {
            return Ok(false);
        };
        let current = read_map(&self.tx, &attributes)?;
        for (key, value) in patch {
            if current.get(key) != Some(value) {
                put_json(&mut self.tx, &attributes, key, value)?;
            }
        }
        Ok(true)
    }

    /// Make a stored record's attributes equal `record`'s; false when absent.
    ///
    /// Keys missing from `record` are deleted. The type is immutable.
    pub fn replace(&mut self, record: &RecordData) -> Result<bool> {
        let id = ShapeId::from(record.id.as_str());
        let Some(index) = self.position(&id)? else {
            return Ok(false);
        };
        let (_, obj) = self
            .tx
            .get(&self.shapes, index)?
            .ok_or_else(|| anyhow!("shape {} vanished mid-transaction", record.id))?;
        if read_string(&self.tx, &obj, "type")?.as_deref() != Some(record.shape_type.as_str()) {
            bail!("shape {} cannot change type to {}", record.id, record.shape_type);
        }
        let Some(attributes) = self.attributes_obj(&id)? else {
            return Ok(false);
        };
        let current = read_map(&self.tx, &attributes)?;
        for key in current.keys() {
            if !record.attributes.contains_key(key) {
                self.tx.delete(&attributes, key.as_str())?;
            }
        }
        for (key, value) in &record.attributes {
            if current.get(key) != Some(value) {
                put_json(&mut self.tx, &attributes, key, value)?;
            }
        }
        Ok(true)
    }

    /// Delete every copy of an id after its first.
    ///
    /// Two peers restoring the same deleted shape both insert it. All
    /// replicas order those inserts the same way, so keeping the first
    /// copy converges.
    fn prune_duplicates(&mut self) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for index in 0..self.len() {
            if let Some((_, obj)) = self.tx.get(&self.shapes, index)? {
                if let Some(id) = read_string(&self.tx, &obj, "id")? {
                    if !seen.insert(id) {
                        duplicates.push(index);
                    }
                }
            }
        }
        for index in duplicates.iter().rev() {
            self.delete(*index)?;
        }
        if !duplicates.is_empty() {
            warn!(count = duplicates.len(), "deleted duplicate shape ids");
        }
        Ok(duplicates.len())
    }

    fn attributes_obj(&mut self, id: &ShapeId) -> Result<Option<ObjId>> {
        let Some(index) = self.position(id)? else {
            return Ok(None);
        };
        let Some((_, obj)) = self.tx.get(&self.shapes, index)? else {
            return Ok(None);
        };
        Ok(match self.tx.get(&obj, "attributes")? {
            Some((automerge::Value::Object(ObjType::Map), attrs)) => Some(attrs),
            _ => Some(self.tx.put_object(&obj, "attributes", ObjType::Map)?),
        })
    }
}

// --- JSON <-> automerge helpers ---

/// Records in list order; later copies of a duplicated id are skipped
fn read_records<R: ReadDoc>(doc: &R, shapes: &ObjId) -> Result<Vec<RecordData>> {
    let mut records = Vec::with_capacity(doc.length(shapes));
    let mut seen = HashSet::new();
    for index in 0..doc.length(shapes) {
        if let Some((_, obj)) = doc.get(shapes, index)? {
            let record = read_record(doc, &obj)?;
            if seen.insert(record.id.clone()) {
                records.push(record);
            }
        }
    }
    Ok(records)
}

fn read_record<R: ReadDoc>(doc: &R, obj: &ObjId) -> Result<RecordData> {
    let owner = match doc.get(obj, "ownerConnectionId")? {
        Some((automerge::Value::Scalar(s), _)) => match s.as_ref() {
            ScalarValue::Uint(n) => *n,
            other => other.to_i64().and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
        },
        _ => 0,
    };
    let attributes = match doc.get(obj, "attributes")? {
        Some((automerge::Value::Object(ObjType::Map), attrs)) => read_map(doc, &attrs)?,
        _ => Attributes::new(),
    };
    Ok(RecordData {
        id: read_string(doc, obj, "id")?.unwrap_or_default(),
        shape_type: read_string(doc, obj, "type")?.unwrap_or_default(),
        owner_connection_id: owner,
        attributes,
    })
}

fn read_string<R: ReadDoc>(doc: &R, obj: &ObjId, key: &str) -> Result<Option<String>> {
    Ok(match doc.get(obj, key)? {
        Some((automerge::Value::Scalar(s), _)) => match s.as_ref() {
            ScalarValue::Str(s) => Some(s.to_string()),
            _ => None,
        },
        Some((automerge::Value::Object(ObjType::Text), text)) => Some(doc.text(&text)?),
        _ => None,
    })
}

fn read_map<R: ReadDoc>(doc: &R, obj: &ObjId) -> Result<Attributes> {
    let mut map = Attributes::new();
    for key in doc.keys(obj) {
        if let Some((value, child)) = doc.get(obj, key.as_str())? {
            map.insert(key, read_value(doc, value, &child)?);
        }
    }
    Ok(map)
}

fn read_list<R: ReadDoc>(doc: &R, obj: &ObjId) -> Result<Vec<Value>> {
    let mut items = Vec::with_capacity(doc.length(obj));
    for index in 0..doc.length(obj) {
        if let Some((value, child)) = doc.get(obj, index)? {
            items.push(read_value(doc, value, &child)?);
        }
    }
    Ok(items)
}

fn read_value<R: ReadDoc>(doc: &R, value: automerge::Value<'_>, obj: &ObjId) -> Result<Value> {
    Ok(match value {
        automerge::Value::Scalar(s) => scalar_to_json(&s),
        automerge::Value::Object(ObjType::List) => Value::Array(read_list(doc, obj)?),
        automerge::Value::Object(ObjType::Text) => Value::String(doc.text(obj)?),
        automerge::Value::Object(_) => Value::Object(read_map(doc, obj)?),
    })
}

fn scalar_to_json(s: &ScalarValue) -> Value {
    match s {
        ScalarValue::Str(s) => Value::String(s.to_string()),
        ScalarValue::Int(n) => Value::from(*n),
        ScalarValue::Uint(n) => Value::from(*n),
        ScalarValue::F64(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        ScalarValue::Boolean(b) => Value::Bool(*b),
        ScalarValue::Null => Value::Null,
        other => other.to_i64().map_or(Value::Null, Value::from),
    }
}

fn to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Bool(b) => ScalarValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                ScalarValue::Uint(u)
            } else {
                n.as_f64().map_or(ScalarValue::Null, ScalarValue::F64)
            }
        }
        Value::String(s) => ScalarValue::from(s.as_str()),
        _ => ScalarValue::Null,
    }
}

fn put_json(tx: &mut Transaction<'_>, obj: &ObjId, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let child = tx.put_object(obj, key, ObjType::Map)?;
            for (k, v) in map {
                put_json(tx, &child, k, v)?;
            }
        }
        Value::Array(items) => {
            let child = tx.put_object(obj, key, ObjType::List)?;
            for (index, item) in items.iter().enumerate() {
                insert_json(tx, &child, index, item)?;
            }
        }
        scalar => tx.put(obj, key, to_scalar(scalar))?,
    }
    Ok(())
}

fn insert_json(tx: &mut Transaction<'_>, list: &ObjId, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let child = tx.insert_object(list, index, ObjType::Map)?;
            for (k, v) in map {
                put_json(tx, &child, k, v)?;
            }
        }
        Value::Array(items) => {
            let child = tx.insert_object(list, index, ObjType::List)?;
            for (i, item) in items.iter().enumerate() {
                insert_json(tx, &child, i, item)?;
            }
        }
        scalar => tx.insert(list, index, to_scalar(scalar))?,
    }
    Ok(())
}
