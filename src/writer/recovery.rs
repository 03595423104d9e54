use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use parking_lot::Mutex;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::transaction::IndexTransaction;
use crate::core::types::ContentId;
use crate::storage::marker::ReindexMarker;
use crate::writer::index_writer::IndexManager;

/// Phase of a (re)index run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    Marking,
    Traversing,
    Flushing,
    ClearingMark,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub visited: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub flushes: usize,
}

/// Rebuilds the index from the content source.
///
/// A marker file exists for exactly as long as a reindex is in progress. Finding it at
/// startup means the previous run never finished, and the index is rebuilt from scratch.
pub struct RecoveryManager {
    index: Arc<IndexManager>,
    marker: ReindexMarker,
    flush_threshold: usize,
    state: Mutex<RecoveryState>,
}

impl RecoveryManager {
    pub fn new(index: Arc<IndexManager>, marker_path: PathBuf, flush_threshold: usize) -> Self {
        RecoveryManager {
            index,
            marker: ReindexMarker::new(marker_path),
            flush_threshold: flush_threshold.max(1),
            state: Mutex::new(RecoveryState::Idle),
        }
    }

    /// Uses the marker path and flush threshold of the index's config.
    pub fn for_index(index: Arc<IndexManager>) -> Self {
        let marker = index.config().marker_path();
        let threshold = index.config().reindex_flush_threshold;
        RecoveryManager::new(index, marker, threshold)
    }

    pub fn state(&self) -> RecoveryState {
        *self.state.lock()
    }

    pub fn marker(&self) -> &ReindexMarker {
        &self.marker
    }

    /// An interrupted reindex or an index that was never built.
    pub fn needs_reindex(&self) -> bool {
        self.marker.exists() || self.index.generation() == 0
    }

    /// Startup entry point: reindexes when needed.
    pub fn recover(&self) -> Result<Option<RecoveryReport>> {
        if !self.needs_reindex() {
            log::debug!("index is consistent, no recovery needed");
            return Ok(None);
        }
        if self.marker.exists() {
            log::warn!("found {}, previous reindex was interrupted", self.marker.path().display());
        }
        self.reindex().map(Some)
    }

    /// Runs `recover` on its own thread.
    pub fn spawn(self: Arc<Self>) -> Result<JoinHandle<Result<Option<RecoveryReport>>>> {
        let handle = std::thread::Builder::new()
            .name("cmis-reindex".to_string())
            .spawn(move || self.recover())?;
        Ok(handle)
    }

    /// Full reindex. On failure the marker stays in place for the next startup.
    pub fn reindex(&self) -> Result<RecoveryReport> {
        let result = self.run();
        self.set_state(RecoveryState::Idle);
        match result {
            Ok(report) => {
                log::info!(
                    "reindex finished: {} nodes, +{} ~{} -{} in {} flushes",
                    report.visited, report.added, report.updated, report.removed, report.flushes
                );
                Ok(report)
            }
            Err(e) => {
                log::warn!("reindex failed, marker kept: {}", e);
                Err(match e.kind {
                    ErrorKind::Recovery => e,
                    _ => Error::recovery(e.to_string()),
                })
            }
        }
    }

    fn run(&self) -> Result<RecoveryReport> {
        self.set_state(RecoveryState::Marking);
        self.marker.create()?;

        self.set_state(RecoveryState::Traversing);
        let content = self.index.content().clone();
        let before = self.index.searcher();
        let mut report = RecoveryReport::default();
        let mut visited: HashSet<ContentId> = HashSet::new();
        let mut tx = IndexTransaction::new();

        for root in content.roots()? {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !visited.insert(id.clone()) {
                    continue;
                }
                report.visited += 1;

                let mut children = content.children(&id)?;
                children.reverse();
                stack.extend(children);

                if before.contains(&id) {
                    tx.update(id);
                } else {
                    tx.add(id);
                }
                if tx.len() >= self.flush_threshold {
                    self.flush(&mut tx, &mut report)?;
                }
            }
            if !tx.is_empty() {
                self.flush(&mut tx, &mut report)?;
            }
        }

        // Entries for nodes the traversal never reached
        let stale: Vec<ContentId> = before.ids().filter(|id| !visited.contains(*id)).cloned().collect();
        for id in stale {
            tx.remove(id);
            if tx.len() >= self.flush_threshold {
                self.flush(&mut tx, &mut report)?;
            }
        }
        if !tx.is_empty() {
            self.flush(&mut tx, &mut report)?;
        }

        self.set_state(RecoveryState::ClearingMark);
        self.marker.clear()?;
        Ok(report)
    }

    fn flush(&self, tx: &mut IndexTransaction, report: &mut RecoveryReport) -> Result<()> {
        self.set_state(RecoveryState::Flushing);
        let saved = self.index.save(tx)?;
        report.added += saved.added;
        report.updated += saved.updated;
        report.removed += saved.removed;
        report.flushes += 1;
        tx.clear();
        self.set_state(RecoveryState::Traversing);
        Ok(())
    }

    fn set_state(&self, state: RecoveryState) {
        *self.state.lock() = state;
    }
}
