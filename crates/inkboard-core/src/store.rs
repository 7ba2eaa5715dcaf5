//! The interface the edit pipeline consumes from a shared document store.

use anyhow::Result;

use crate::document::ShapeList;
use crate::record::{ConnectionId, RecordData};

/// A room's replicated, ordered shape container.
///
/// All mutation goes through [`ShapeStore::mutate`]; the closure runs
/// inside one atomic transaction that is committed when it returns `Ok`
/// and rolled back when it returns `Err`. Implementations own conflict
/// resolution; callers never reconcile concurrent edits themselves.
pub trait ShapeStore {
    /// Connection id stamped on shapes this peer creates
    fn connection_id(&self) -> ConnectionId;

    /// Current snapshot, in paint order
    fn records(&self) -> Result<Vec<RecordData>>;

    fn mutate<R>(&mut self, f: impl FnOnce(&mut ShapeList<'_>) -> Result<R>) -> Result<R>;

    /// Pull in changes made by other peers; true when the snapshot changed
    fn poll_remote(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// Receiver of full store snapshots
pub trait SnapshotObserver {
    fn apply_snapshot(&mut self, records: &[RecordData]);
}
