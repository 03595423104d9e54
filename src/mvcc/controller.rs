use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use roaring::RoaringBitmap;
use chrono::{DateTime, Utc};
use crate::storage::segment::Segment;

/// A segment as seen by one snapshot: the immutable segment plus its deletions at that time.
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub segment: Arc<Segment>,
    pub deleted: Arc<RoaringBitmap>,
}

impl SegmentView {
    pub fn new(segment: Arc<Segment>) -> Self {
        SegmentView {
            segment,
            deleted: Arc::new(RoaringBitmap::new()),
        }
    }

    pub fn live_count(&self) -> u64 {
        self.segment.doc_count() as u64 - self.deleted.len()
    }

    pub fn is_live(&self, doc: u32) -> bool {
        doc < self.segment.doc_count() && !self.deleted.contains(doc)
    }
}

/// Snapshot of index at a point in time
///
/// Readers hold an `Arc<Snapshot>` for the duration of a query; segments merged away
/// after the snapshot was taken stay alive until the last reader drops it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub generation: u64,
    pub segments: Vec<SegmentView>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count()).sum()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            version: 0,
            generation: 0,
            segments: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Multi-Version Concurrency Control
///
/// Publication swaps the current snapshot pointer; readers never block writers.
pub struct MVCCController {
    current: RwLock<Arc<Snapshot>>,
    next_version: AtomicU64,
}

impl MVCCController {
    pub fn new() -> Self {
        MVCCController {
            current: RwLock::new(Arc::new(Snapshot::default())),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn publish(&self, generation: u64, segments: Vec<SegmentView>) -> Arc<Snapshot> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(Snapshot {
            version,
            generation,
            segments,
            timestamp: Utc::now(),
        });
        *self.current.write() = snapshot.clone();
        snapshot
    }
}

impl Default for MVCCController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Document;

    #[test]
    fn old_snapshots_survive_publication() {
        let mvcc = MVCCController::new();
        let segment = Arc::new(Segment::build(vec![Document::new("a", "cmis:document", "a")]));

        let first = mvcc.publish(1, vec![SegmentView::new(segment)]);
        let reader = mvcc.current_snapshot();
        let second = mvcc.publish(2, Vec::new());

        assert!(second.version > first.version);
        assert_eq!(reader.doc_count(), 1);
        assert_eq!(mvcc.current_snapshot().doc_count(), 0);
    }
}
