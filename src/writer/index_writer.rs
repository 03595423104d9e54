use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use chrono::Utc;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use crate::content::ContentSource;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::transaction::{IndexTransaction, TransactionReport};
use crate::core::types::{ContentId, Document};
use crate::index::fields::ID_FIELD;
use crate::index::searcher::Searcher;
use crate::mvcc::controller::{MVCCController, SegmentView, Snapshot};
use crate::query::types::IndexStatistics;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::manifest::{Manifest, SegmentEntry};
use crate::storage::merge_policy::{AggregateCandidate, MergePolicy};
use crate::storage::segment::{Segment, SegmentId};

/// Single writer over the segment index.
///
/// Every `save` becomes at most one new segment plus deletion marks on existing ones,
/// committed by replacing the manifest and published as a new snapshot. Readers hold
/// their snapshot's segments alive through `Arc`s, so neither saves nor merges ever
/// disturb a query in flight.
pub struct IndexManager {
    config: Config,
    storage: Arc<StorageLayout>,
    content: Arc<dyn ContentSource>,
    mvcc: Arc<MVCCController>,
    lock: Arc<Mutex<()>>, // Single writer lock
    merging: Arc<AtomicBool>,
    merge_policy: Arc<dyn MergePolicy>,
    merge_thread: Mutex<Option<JoinHandle<()>>>,
    file_lock: Arc<FileLock>,
}

impl IndexManager {
    /// Opens (or creates) the index under `config.storage_path`.
    pub fn open(config: Config, content: Arc<dyn ContentSource>) -> Result<Self> {
        let storage = Arc::new(StorageLayout::new(config.storage_path.clone())?);
        let file_lock = FileLock::acquire(&storage)?;

        let manifest = Manifest::load(&storage)?.unwrap_or_default();
        let mut views = Vec::with_capacity(manifest.segments.len());
        for entry in &manifest.segments {
            let segment = Segment::load(&storage, &entry.id)?;
            views.push(SegmentView {
                segment: Arc::new(segment),
                deleted: Arc::new(entry.deleted.iter().copied().collect()),
            });
        }

        // Files of saves or merges that never reached the manifest
        let listed: HashSet<SegmentId> = manifest.segments.iter().map(|e| e.id).collect();
        for id in storage.list_segment_files()? {
            if !listed.contains(&id) {
                log::info!("removing orphaned segment {}", id.0);
                fs::remove_file(storage.segment_path(&id))?;
            }
        }

        let mvcc = Arc::new(MVCCController::new());
        let snapshot = mvcc.publish(manifest.generation, views);
        log::info!(
            "opened index at {:?}: generation {}, {} segments, {} documents",
            storage.base_dir, snapshot.generation, snapshot.segments.len(), snapshot.doc_count()
        );

        Ok(IndexManager {
            merge_policy: config.merge_policy.build(),
            config,
            storage,
            content,
            mvcc,
            lock: Arc::new(Mutex::new(())),
            merging: Arc::new(AtomicBool::new(false)),
            merge_thread: Mutex::new(None),
            file_lock: Arc::new(file_lock),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    /// Reader over the latest published snapshot.
    pub fn searcher(&self) -> Searcher {
        Searcher::new(self.mvcc.current_snapshot())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.mvcc.current_snapshot()
    }

    /// Number of committed saves and merges; zero for an index never written.
    pub fn generation(&self) -> u64 {
        self.mvcc.current_snapshot().generation
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.searcher().contains(id)
    }

    pub fn indexed_ids(&self) -> Vec<ContentId> {
        self.searcher().ids().cloned().collect()
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.searcher().statistics()
    }

    pub fn is_merging(&self) -> bool {
        self.merging.load(Ordering::Acquire)
    }

    /// Applies a transaction atomically: afterwards the index reflects all of it, or,
    /// on error, none of it.
    pub fn save(&self, tx: &IndexTransaction) -> Result<TransactionReport> {
        tx.validate()?;

        let report = {
            let _guard = self.lock.lock();
            self.apply(tx).map_err(|e| match e.kind {
                ErrorKind::IndexTransaction => e,
                _ => Error::transaction(format!("transaction rolled back: {}", e)),
            })?
        };

        log::debug!(
            "saved generation {}: +{} ~{} -{}",
            report.generation, report.added, report.updated, report.removed
        );

        if self.config.auto_merge && !tx.is_empty() {
            self.maybe_merge();
        }
        Ok(report)
    }

    fn apply(&self, tx: &IndexTransaction) -> Result<TransactionReport> {
        let snapshot = self.mvcc.current_snapshot();
        let mut report = TransactionReport {
            added: tx.added.len(),
            updated: tx.updated.len(),
            removed: tx.removed.len(),
            generation: snapshot.generation,
        };
        if tx.is_empty() {
            return Ok(report);
        }

        let mut documents: Vec<Document> = Vec::new();
        for id in tx.to_index() {
            match self.content.load(id) {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {
                    return Err(Error::transaction(format!("content {} no longer exists", id)));
                }
                Err(e) => {
                    return Err(Error::transaction(format!("loading content {}: {}", id, e)));
                }
            }
        }

        // Stage deletions for every id whose current entry goes away
        let mut views: Vec<SegmentView> = Vec::with_capacity(snapshot.segments.len() + 1);
        let mut emptied: Vec<SegmentId> = Vec::new();
        for view in &snapshot.segments {
            let mut deleted: Option<RoaringBitmap> = None;
            for id in tx.to_delete() {
                let Some(list) = view.segment.postings(ID_FIELD, id.as_str()) else { continue };
                for doc in list.docs() {
                    if view.is_live(doc) {
                        deleted.get_or_insert_with(|| (*view.deleted).clone()).insert(doc);
                    }
                }
            }
            match deleted {
                Some(bitmap) if bitmap.len() >= u64::from(view.segment.doc_count()) => {
                    emptied.push(view.segment.id);
                }
                Some(bitmap) => views.push(SegmentView {
                    segment: view.segment.clone(),
                    deleted: Arc::new(bitmap),
                }),
                None => views.push(view.clone()),
            }
        }

        let mut staged: Option<SegmentId> = None;
        if !documents.is_empty() {
            let mut segment = Segment::build(documents);
            staged = Some(segment.id);
            if let Err(e) = segment.write(&self.storage) {
                self.discard(staged);
                return Err(e);
            }
            views.push(SegmentView::new(Arc::new(segment)));
        }

        let generation = snapshot.generation + 1;
        if let Err(e) = self.commit(generation, &views) {
            self.discard(staged);
            return Err(e);
        }

        self.mvcc.publish(generation, views);
        self.remove_segment_files(&emptied);
        report.generation = generation;
        Ok(report)
    }

    fn commit(&self, generation: u64, views: &[SegmentView]) -> Result<()> {
        manifest_for(generation, views).save(&self.storage)
    }

    fn discard(&self, staged: Option<SegmentId>) {
        if let Some(id) = staged {
            if let Err(e) = fs::remove_file(self.storage.segment_path(&id)) {
                log::warn!("could not remove staged segment {}: {}", id.0, e);
            }
        }
    }

    fn remove_segment_files(&self, ids: &[SegmentId]) {
        for id in ids {
            if let Err(e) = fs::remove_file(self.storage.segment_path(id)) {
                log::warn!("could not remove segment {}: {}", id.0, e);
            }
        }
    }

    fn merge_task(&self) -> MergeTask {
        MergeTask {
            storage: self.storage.clone(),
            mvcc: self.mvcc.clone(),
            lock: self.lock.clone(),
            merging: self.merging.clone(),
            policy: self.merge_policy.clone(),
            _file_lock: self.file_lock.clone(),
        }
    }

    /// Asks the merge policy for candidates and merges them, on a background thread
    /// when configured so.
    pub fn maybe_merge(&self) {
        let task = self.merge_task();
        if self.config.background_merge {
            let mut slot = self.merge_thread.lock();
            if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
                return;
            }
            if let Some(finished) = slot.take() {
                let _ = finished.join();
            }
            let spawned = std::thread::Builder::new()
                .name("cmis-merge".to_string())
                .spawn(move || {
                    if let Err(e) = task.run() {
                        log::warn!("background merge failed: {}", e);
                    }
                });
            match spawned {
                Ok(handle) => *slot = Some(handle),
                Err(e) => log::warn!("could not start background merge: {}", e),
            }
        } else if let Err(e) = task.run() {
            log::warn!("merge failed: {}", e);
        }
    }

    /// Runs one merge round on the calling thread. Returns the merged segment, if any.
    pub fn merge_now(&self) -> Result<Option<SegmentId>> {
        self.merge_task().run()
    }

    /// Blocks until a background merge, if one is running, has finished.
    pub fn wait_for_merge(&self) {
        let handle = self.merge_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("background merge thread panicked");
            }
        }
    }
}

impl Drop for IndexManager {
    fn drop(&mut self) {
        self.wait_for_merge();
    }
}

fn manifest_for(generation: u64, views: &[SegmentView]) -> Manifest {
    Manifest {
        generation,
        segments: views.iter()
            .map(|v| SegmentEntry {
                id: v.segment.id,
                deleted: v.deleted.iter().collect(),
            })
            .collect(),
        timestamp: Utc::now(),
    }
}

/// Everything a merge needs, detached from the manager so it can run on its own thread.
struct MergeTask {
    storage: Arc<StorageLayout>,
    mvcc: Arc<MVCCController>,
    lock: Arc<Mutex<()>>,
    merging: Arc<AtomicBool>,
    policy: Arc<dyn MergePolicy>,
    // The directory stays locked until the merge lets go.
    _file_lock: Arc<FileLock>,
}

impl MergeTask {
    fn run(&self) -> Result<Option<SegmentId>> {
        if self.merging.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let result = self.merge();
        self.merging.store(false, Ordering::Release);
        result
    }

    fn merge(&self) -> Result<Option<SegmentId>> {
        let snapshot = self.mvcc.current_snapshot();
        let candidates: Vec<AggregateCandidate> = snapshot.segments.iter()
            .map(|v| AggregateCandidate {
                id: v.segment.id,
                document_count: v.live_count(),
                directory_size: v.segment.metadata.size_bytes,
                last_modified: v.segment.metadata.last_modified,
            })
            .collect();

        let selected: HashSet<SegmentId> = self.policy
            .select_merge_candidates(&candidates, 0, 0)
            .into_iter()
            .map(|c| c.id)
            .collect();
        if selected.len() < 2 {
            return Ok(None);
        }

        // Copy live documents, remembering where each one lands
        let sources: Vec<&SegmentView> = snapshot.segments.iter()
            .filter(|v| selected.contains(&v.segment.id))
            .collect();
        let mut documents = Vec::new();
        let mut moved: HashMap<(SegmentId, u32), u32> = HashMap::new();
        for view in &sources {
            for (local, doc) in view.segment.documents.iter().enumerate() {
                let local = local as u32;
                if view.is_live(local) {
                    moved.insert((view.segment.id, local), documents.len() as u32);
                    documents.push(doc.clone());
                }
            }
        }

        let mut merged = Segment::build(documents);
        let merged_id = merged.id;
        merged.write(&self.storage)?;
        log::info!(
            "merged {} segments into {} ({} documents)",
            sources.len(), merged_id.0, merged.doc_count()
        );

        let guard = self.lock.lock();
        let current = self.mvcc.current_snapshot();

        let mut merged_deleted = RoaringBitmap::new();
        for source in &sources {
            let Some(now) = current.segments.iter().find(|v| v.segment.id == source.segment.id) else {
                // A save emptied a source segment while the merge ran
                drop(guard);
                let _ = fs::remove_file(self.storage.segment_path(&merged_id));
                log::debug!("merge abandoned: segment {} is gone", source.segment.id.0);
                return Ok(None);
            };
            for local in now.deleted.iter() {
                if let Some(target) = moved.get(&(source.segment.id, local)) {
                    merged_deleted.insert(*target);
                }
            }
        }

        // The merged segment takes the place of the first source.
        let mut merged = Some(SegmentView {
            segment: Arc::new(merged),
            deleted: Arc::new(merged_deleted),
        });
        let mut views: Vec<SegmentView> = Vec::with_capacity(current.segments.len());
        for view in &current.segments {
            if selected.contains(&view.segment.id) {
                views.extend(merged.take());
            } else {
                views.push(view.clone());
            }
        }

        let generation = current.generation + 1;
        if let Err(e) = manifest_for(generation, &views).save(&self.storage) {
            let _ = fs::remove_file(self.storage.segment_path(&merged_id));
            return Err(e);
        }
        self.mvcc.publish(generation, views);
        drop(guard);

        for id in &selected {
            if let Err(e) = fs::remove_file(self.storage.segment_path(id)) {
                log::warn!("could not remove merged segment {}: {}", id.0, e);
            }
        }
        Ok(Some(merged_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::memory::MemoryContentSource;
    use crate::storage::merge_policy::MergePolicyConfig;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            background_merge: false,
            auto_merge: false,
            ..Config::default().with_storage_path(dir)
        }
    }

    fn source() -> Arc<MemoryContentSource> {
        Arc::new(MemoryContentSource::with_documents([
            Document::new("a", "cmis:folder", "a"),
            Document::new("b", "cmis:document", "b").with_parent("a"),
            Document::new("c", "cmis:document", "c").with_parent("a"),
        ]))
    }

    #[test]
    fn save_adds_updates_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let content = source();
        let index = IndexManager::open(config(dir.path()), content.clone()).unwrap();

        let report = index.save(&IndexTransaction::new().with_added(["a", "b", "c"])).unwrap();
        assert_eq!(report.added, 3);
        assert_eq!(report.generation, 1);

        content.insert(Document::new("b", "cmis:document", "renamed").with_parent("a"));
        index.save(&IndexTransaction::new().with_updated(["b"]).with_removed(["c"])).unwrap();

        let searcher = index.searcher();
        assert_eq!(searcher.doc_count(), 2);
        let b = searcher.find(&"b".into()).unwrap();
        assert_eq!(searcher.document(b).unwrap().name, "renamed");
        assert!(!index.contains(&"c".into()));
    }

    #[test]
    fn failed_transactions_leave_the_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let index = IndexManager::open(config(dir.path()), source()).unwrap();
        index.save(&IndexTransaction::new().with_added(["a"])).unwrap();

        let err = index.save(&IndexTransaction::new().with_added(["b", "missing"]).with_removed(["a"])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexTransaction);
        assert_eq!(index.generation(), 1);
        assert!(index.contains(&"a".into()));
        assert!(!index.contains(&"b".into()));
        assert_eq!(index.storage.list_segment_files().unwrap().len(), 1);
    }

    #[test]
    fn reopening_restores_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = IndexManager::open(config(dir.path()), source()).unwrap();
            index.save(&IndexTransaction::new().with_added(["a", "b", "c"])).unwrap();
            index.save(&IndexTransaction::new().with_removed(["b"])).unwrap();
        }
        let index = IndexManager::open(config(dir.path()), source()).unwrap();
        assert_eq!(index.generation(), 2);
        let mut ids = index.indexed_ids();
        ids.sort();
        assert_eq!(ids, vec![ContentId::from("a"), ContentId::from("c")]);
    }

    #[test]
    fn second_writer_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _first = IndexManager::open(config(dir.path()), source()).unwrap();
        assert!(IndexManager::open(config(dir.path()), source()).is_err());
    }

    #[test]
    fn merge_keeps_live_documents_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.merge_policy = MergePolicyConfig::DocumentCount { min: 0, max: 100 };
        let index = IndexManager::open(cfg, source()).unwrap();

        index.save(&IndexTransaction::new().with_added(["a"])).unwrap();
        index.save(&IndexTransaction::new().with_added(["b", "c"])).unwrap();
        index.save(&IndexTransaction::new().with_removed(["b"])).unwrap();
        let reader = index.searcher();

        let merged = index.merge_now().unwrap();
        assert!(merged.is_some());
        assert_eq!(index.snapshot().segments.len(), 1);
        assert_eq!(index.searcher().doc_count(), 2);
        assert_eq!(index.storage.list_segment_files().unwrap(), vec![merged.unwrap()]);

        // Readers opened before the merge still see their segments.
        assert!(reader.contains(&"c".into()));
        assert_eq!(reader.snapshot().segments.len(), 2);
    }

    #[test]
    fn dropping_the_manager_waits_for_background_merges() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            background_merge: true,
            auto_merge: true,
            merge_policy: MergePolicyConfig::DocumentCount { min: 0, max: 100 },
            ..Config::default().with_storage_path(dir.path())
        };
        {
            let index = IndexManager::open(cfg.clone(), source()).unwrap();
            index.save(&IndexTransaction::new().with_added(["a"])).unwrap();
            index.save(&IndexTransaction::new().with_added(["b"])).unwrap();
            index.save(&IndexTransaction::new().with_added(["c"])).unwrap();
        }

        // The lock is free again and every segment the manifest names is on disk.
        let index = IndexManager::open(cfg, source()).unwrap();
        let mut ids = index.indexed_ids();
        ids.sort();
        assert_eq!(ids, vec![ContentId::from("a"), ContentId::from("b"), ContentId::from("c")]);
        let mut listed: Vec<SegmentId> = index.snapshot().segments.iter().map(|v| v.segment.id).collect();
        let mut on_disk = index.storage.list_segment_files().unwrap();
        listed.sort();
        on_disk.sort();
        assert_eq!(on_disk, listed);
    }
}
