//! Local undo/redo command log.
//!
//! The log is the only undo authority. Each entry describes one completed
//! local edit; undoing applies its inverse through the shape store and
//! moves the entry (refreshed with the state it just replaced) to the redo
//! stack. History is per session and never replicated.

use anyhow::Result;
use inkboard_core::{RecordData, ShapeId, ShapeList, ShapeStore};
use tracing::{debug, warn};

/// One reversible edit
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// A shape was appended at `index`
    Add { index: usize, record: RecordData },
    /// Shapes were removed; positions are ascending and refer to the list
    /// before removal
    Delete { previous: Vec<(usize, RecordData)> },
    /// Shapes were changed; `before` holds their prior full state
    Modify { before: Vec<RecordData> },
}

impl UndoAction {
    pub fn label(&self) -> &'static str {
        match self {
            UndoAction::Add { .. } => "add",
            UndoAction::Delete { .. } => "delete",
            UndoAction::Modify { .. } => "modify",
        }
    }
}

/// Undo and redo stacks with bounded history
#[derive(Debug)]
pub struct UndoLog {
    undo_stack: Vec<UndoAction>,
    redo_stack: Vec<UndoAction>,
    max_history: usize,
}

impl UndoLog {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_history,
        }
    }

    /// Record a completed edit; any new edit clears the redo stack
    pub fn push(&mut self, action: UndoAction) {
        self.undo_stack.push(action);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_history {
            let excess = self.undo_stack.len() - self.max_history;
            self.undo_stack.drain(..excess);
        }
    }

    /// Drop the newest entry if it is the add of `id`
    pub fn discard_add(&mut self, id: &ShapeId) -> bool {
        let is_add = matches!(
            self.undo_stack.last(),
            Some(UndoAction::Add { record, .. }) if record.id == id.as_str()
        );
        if is_add {
            self.undo_stack.pop();
        }
        is_add
    }

    /// Replace the record held by the newest entry if it is the add of the
    /// same shape, so creating and first editing a shape undo as one step
    pub fn amend_add(&mut self, record: RecordData) -> bool {
        match self.undo_stack.last_mut() {
            Some(UndoAction::Add { record: added, .. }) if added.id == record.id => {
                *added = record;
                true
            }
            _ => false,
        }
    }

    /// Undo the newest edit. Returns false when there was nothing to undo
    /// or every shape it touched is gone.
    ///
    /// A failed store write leaves the entry on the undo stack.
    pub fn undo<S: ShapeStore>(&mut self, store: &mut S) -> Result<bool> {
        let Some(action) = self.undo_stack.pop() else {
            return Ok(false);
        };
        debug!(action = action.label(), "undo");
        match store.mutate(|shapes| revert(shapes, action.clone())) {
            Ok(Some(redo)) => {
                self.redo_stack.push(redo);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.undo_stack.push(action);
                Err(e)
            }
        }
    }

    /// Re-apply the newest undone edit; a failed write keeps it redoable
    pub fn redo<S: ShapeStore>(&mut self, store: &mut S) -> Result<bool> {
        let Some(action) = self.redo_stack.pop() else {
            return Ok(false);
        };
        debug!(action = action.label(), "redo");
        match store.mutate(|shapes| reapply(shapes, action.clone())) {
            Ok(Some(undo)) => {
                self.undo_stack.push(undo);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.redo_stack.push(action);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Apply the inverse of `action`; returns the entry for the other stack
fn revert(shapes: &mut ShapeList<'_>, action: UndoAction) -> Result<Option<UndoAction>> {
    match action {
        UndoAction::Add { record, .. } => {
            let id = ShapeId::from(record.id.as_str());
            match shapes.remove(&id)? {
                Some((index, current)) => Ok(Some(UndoAction::Add { index, record: current })),
                None => {
                    warn!(id = %id, "cannot undo add: shape no longer exists");
                    Ok(None)
                }
            }
        }
        UndoAction::Delete { previous } => {
            let restored = restore(shapes, previous)?;
            Ok((!restored.is_empty()).then_some(UndoAction::Delete { previous: restored }))
        }
        UndoAction::Modify { before } => swap(shapes, before),
    }
}

/// Apply `action` forward again; returns the entry for the undo stack
fn reapply(shapes: &mut ShapeList<'_>, action: UndoAction) -> Result<Option<UndoAction>> {
    match action {
        UndoAction::Add { index, record } => {
            let id = ShapeId::from(record.id.as_str());
            if shapes.position(&id)?.is_some() {
                warn!(id = %id, "cannot redo add: shape already exists");
                return Ok(None);
            }
            let index = index.min(shapes.len());
            shapes.insert(index, &record)?;
            Ok(Some(UndoAction::Add { index, record }))
        }
        UndoAction::Delete { previous } => {
            let ids: Vec<ShapeId> = previous
                .iter()
                .map(|(_, r)| ShapeId::from(r.id.as_str()))
                .collect();
            let removed = remove_all(shapes, &ids)?;
            Ok((!removed.is_empty()).then_some(UndoAction::Delete { previous: removed }))
        }
        UndoAction::Modify { before } => swap(shapes, before),
    }
}

/// Remove every listed shape that exists.
///
/// Returned positions are ascending and index the list as it was before
/// the first removal, so inserting them in order restores it exactly.
pub fn remove_all(shapes: &mut ShapeList<'_>, ids: &[ShapeId]) -> Result<Vec<(usize, RecordData)>> {
    let mut positions = Vec::with_capacity(ids.len());
    for id in ids {
        match shapes.position(id)? {
            Some(index) => positions.push(index),
            None => warn!(id = %id, "cannot delete: shape does not exist"),
        }
    }
    positions.sort_unstable();
    positions.dedup();

    let mut removed = Vec::with_capacity(positions.len());
    for &index in positions.iter().rev() {
        if let Some(record) = shapes.get(index)? {
            shapes.delete(index)?;
            removed.push((index, record));
        }
    }
    removed.reverse();
    Ok(removed)
}

fn restore(shapes: &mut ShapeList<'_>, previous: Vec<(usize, RecordData)>) -> Result<Vec<(usize, RecordData)>> {
    let mut restored = Vec::with_capacity(previous.len());
    for (index, record) in previous {
        if shapes.position(&ShapeId::from(record.id.as_str()))?.is_some() {
            warn!(id = %record.id, "cannot restore: shape already exists");
            continue;
        }
        let index = index.min(shapes.len());
        shapes.insert(index, &record)?;
        restored.push((index, record));
    }
    Ok(restored)
}

/// Put `states` back and return what they replaced
fn swap(shapes: &mut ShapeList<'_>, states: Vec<RecordData>) -> Result<Option<UndoAction>> {
    let mut replaced = Vec::with_capacity(states.len());
    for state in states {
        let id = ShapeId::from(state.id.as_str());
        let Some((_, current)) = shapes.find(&id)? else {
            warn!(id = %id, "cannot restore state: shape no longer exists");
            continue;
        };
        if shapes.replace(&state)? {
            replaced.push(current);
        }
    }
    Ok((!replaced.is_empty()).then_some(UndoAction::Modify { before: replaced }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use inkboard_core::{Attributes, ConnectionId, Document};
    use inkboard_sync::RoomHub;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(id: &str, width: f64) -> RecordData {
        let mut attributes = Attributes::new();
        attributes.insert("width".into(), json!(width));
        attributes.insert("height".into(), json!(1.0));
        RecordData {
            id: id.to_string(),
            shape_type: "rectangle".into(),
            owner_connection_id: 0,
            attributes,
        }
    }

    fn ids(doc: &Document) -> Vec<String> {
        doc.records().unwrap().into_iter().map(|r| r.id).collect()
    }

    fn store_ids(store: &impl ShapeStore) -> Vec<String> {
        store.records().unwrap().into_iter().map(|r| r.id).collect()
    }

    fn add(doc: &mut Document, log: &mut UndoLog, id: &str) {
        let r = record(id, 1.0);
        let index = doc
            .mutate(|s| {
                let index = s.len();
                s.push(&r)?;
                Ok(index)
            })
            .unwrap();
        log.push(UndoAction::Add { index, record: r });
    }

    #[test]
    fn undo_redo_add() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");
        add(&mut doc, &mut log, "b");

        assert!(log.undo(&mut doc).unwrap());
        assert_eq!(ids(&doc), ["a"]);
        assert!(log.redo(&mut doc).unwrap());
        assert_eq!(ids(&doc), ["a", "b"]);
        assert!(!log.redo(&mut doc).unwrap());
    }

    #[test]
    fn delete_restores_original_positions() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        for id in ["a", "b", "c", "d"] {
            add(&mut doc, &mut log, id);
        }
        let targets = [ShapeId::from("d"), ShapeId::from("b")];
        let previous = doc.mutate(|s| remove_all(s, &targets)).unwrap();
        assert_eq!(previous.iter().map(|(i, _)| *i).collect::<Vec<_>>(), [1, 3]);
        log.push(UndoAction::Delete { previous });
        assert_eq!(ids(&doc), ["a", "c"]);

        log.undo(&mut doc).unwrap();
        assert_eq!(ids(&doc), ["a", "b", "c", "d"]);
        log.redo(&mut doc).unwrap();
        assert_eq!(ids(&doc), ["a", "c"]);
    }

    #[test]
    fn modify_swaps_state() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");
        let before = doc.records().unwrap();
        doc.mutate(|s| s.replace(&record("a", 50.0))).unwrap();
        log.push(UndoAction::Modify { before });

        log.undo(&mut doc).unwrap();
        assert_eq!(doc.records().unwrap()[0].attributes["width"], 1.0);
        log.redo(&mut doc).unwrap();
        assert_eq!(doc.records().unwrap()[0].attributes["width"], 50.0);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");
        log.undo(&mut doc).unwrap();
        assert!(log.can_redo());
        add(&mut doc, &mut log, "b");
        assert!(!log.can_redo());
    }

    #[test]
    fn history_is_bounded() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::new(3);
        for i in 0..5 {
            add(&mut doc, &mut log, &format!("s{i}"));
        }
        assert_eq!(log.undo_count(), 3);
        while log.undo(&mut doc).unwrap() {}
        assert_eq!(ids(&doc), ["s0", "s1"]);
    }

    #[test]
    fn undo_of_vanished_shape_is_discarded() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");
        // Another peer deletes it
        doc.mutate(|s| s.remove(&ShapeId::from("a"))).unwrap();
        assert!(!log.undo(&mut doc).unwrap());
        assert!(!log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn discard_add_only_pops_matching_top() {
        let mut log = UndoLog::default();
        log.push(UndoAction::Add { index: 0, record: record("a", 1.0) });
        assert!(!log.discard_add(&ShapeId::from("b")));
        assert!(log.discard_add(&ShapeId::from("a")));
        assert!(!log.can_undo());
    }

    #[test]
    fn amend_add_rewrites_matching_top() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");
        doc.mutate(|s| s.replace(&record("a", 9.0))).unwrap();
        assert!(!log.amend_add(record("b", 2.0)));
        assert!(log.amend_add(record("a", 9.0)));
        assert_eq!(log.undo_count(), 1);

        log.undo(&mut doc).unwrap();
        assert!(ids(&doc).is_empty());
        log.redo(&mut doc).unwrap();
        assert_eq!(doc.records().unwrap()[0].attributes["width"], 9.0);
    }

    /// Store that rejects every write, like a room whose lock is poisoned
    struct FailingStore;

    impl ShapeStore for FailingStore {
        fn connection_id(&self) -> ConnectionId {
            ConnectionId::OFFLINE
        }

        fn records(&self) -> Result<Vec<RecordData>> {
            Ok(Vec::new())
        }

        fn mutate<R>(&mut self, _f: impl FnOnce(&mut ShapeList<'_>) -> Result<R>) -> Result<R> {
            bail!("store unavailable")
        }
    }

    #[test]
    fn failed_write_keeps_the_entry() {
        let mut doc = Document::new().unwrap();
        let mut log = UndoLog::default();
        add(&mut doc, &mut log, "a");

        assert!(log.undo(&mut FailingStore).is_err());
        assert_eq!(log.undo_count(), 1);
        assert!(!log.can_redo());

        // Store is back: the same entry undoes and then fails to redo
        assert!(log.undo(&mut doc).unwrap());
        assert!(log.redo(&mut FailingStore).is_err());
        assert_eq!(log.redo_count(), 1);
        assert!(log.redo(&mut doc).unwrap());
        assert_eq!(ids(&doc), ["a"]);
    }

    #[test]
    fn two_peers_undoing_one_delete_restore_a_single_shape() {
        let hub = RoomHub::new();
        let mut a = hub.acquire_room("r", None).unwrap();
        let mut b = hub.acquire_room("r", None).unwrap();
        a.mutate(|s| s.push(&record("x", 1.0))).unwrap();
        b.poll_remote().unwrap();

        // Both delete x before seeing each other's delete
        let target = [ShapeId::from("x")];
        let mut log_a = UndoLog::default();
        let mut log_b = UndoLog::default();
        let previous = a.mutate(|s| remove_all(s, &target)).unwrap();
        log_a.push(UndoAction::Delete { previous });
        let previous = b.mutate(|s| remove_all(s, &target)).unwrap();
        log_b.push(UndoAction::Delete { previous });

        // ...and both undo it
        assert!(log_a.undo(&mut a).unwrap());
        assert!(log_b.undo(&mut b).unwrap());
        a.poll_remote().unwrap();
        b.poll_remote().unwrap();
        assert_eq!(store_ids(&a), ["x"]);
        assert_eq!(store_ids(&b), ["x"]);
        assert_eq!(hub.snapshot("r").unwrap().unwrap().len(), 1);

        // One later delete removes every copy for everyone
        a.mutate(|s| remove_all(s, &target)).unwrap();
        b.poll_remote().unwrap();
        assert!(store_ids(&a).is_empty());
        assert!(store_ids(&b).is_empty());
        assert!(hub.snapshot("r").unwrap().unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add,
        Delete(usize),
        Modify(usize, f64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => Just(Op::Add),
            1 => any::<usize>().prop_map(Op::Delete),
            1 => (any::<usize>(), 1.0f64..100.0).prop_map(|(i, w)| Op::Modify(i, w)),
        ]
    }

    proptest! {
        #[test]
        fn undo_all_then_redo_all_round_trips(ops in proptest::collection::vec(arb_op(), 1..20)) {
            let mut doc = Document::new().unwrap();
            let mut log = UndoLog::default();
            for (n, op) in ops.iter().enumerate() {
                let existing = ids(&doc);
                match op {
                    Op::Add => add(&mut doc, &mut log, &format!("s{n}")),
                    Op::Delete(i) if !existing.is_empty() => {
                        let target = [ShapeId::from(existing[i % existing.len()].as_str())];
                        let previous = doc.mutate(|s| remove_all(s, &target)).unwrap();
                        log.push(UndoAction::Delete { previous });
                    }
                    Op::Modify(i, w) if !existing.is_empty() => {
                        let id = &existing[i % existing.len()];
                        let before: Vec<RecordData> =
                            doc.records().unwrap().into_iter().filter(|r| &r.id == id).collect();
                        doc.mutate(|s| s.replace(&record(id, *w))).unwrap();
                        log.push(UndoAction::Modify { before });
                    }
                    _ => {}
                }
            }
            let finished = doc.records().unwrap();

            while log.undo(&mut doc).unwrap() {}
            prop_assert!(doc.records().unwrap().is_empty());
            while log.redo(&mut doc).unwrap() {}
            prop_assert_eq!(doc.records().unwrap(), finished);
        }
    }
}
