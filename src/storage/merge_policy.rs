use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::storage::segment::SegmentId;

/// What a merge policy is allowed to know about a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCandidate {
    pub id: SegmentId,
    pub document_count: u64,
    pub directory_size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Policy for deciding which segments to merge next
///
/// With `required_count == 0` and `required_total_size == 0` a policy returns the
/// candidates whose metric lies in its `[min, max)` band. Otherwise it returns every
/// candidate when there are fewer than `required_count`, or the candidates with the
/// smallest metric until both the count and the accumulated directory size are reached.
pub trait MergePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate>;
}

fn within_band<F>(candidates: &[AggregateCandidate], min: u64, max: u64, metric: F) -> Vec<AggregateCandidate>
where
    F: Fn(&AggregateCandidate) -> u64,
{
    candidates.iter()
        .filter(|c| {
            let m = metric(c);
            min <= m && m < max
        })
        .cloned()
        .collect()
}

fn smallest_first<F>(
    candidates: &[AggregateCandidate],
    required_count: usize,
    required_total_size: u64,
    metric: F,
) -> Vec<AggregateCandidate>
where
    F: Fn(&AggregateCandidate) -> u64,
{
    if candidates.len() < required_count {
        return candidates.to_vec();
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|c| metric(c));

    let mut selected = Vec::new();
    let mut total_size = 0u64;
    for candidate in sorted {
        if selected.len() >= required_count && total_size >= required_total_size {
            break;
        }
        total_size += candidate.directory_size;
        selected.push(candidate);
    }
    selected
}

/// Merges segments by number of documents.
#[derive(Debug, Clone)]
pub struct DocumentCountPolicy {
    pub min_documents: u64,
    pub max_documents: u64,
}

impl MergePolicy for DocumentCountPolicy {
    fn name(&self) -> &str {
        "document_count"
    }

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate> {
        let metric = |c: &AggregateCandidate| c.document_count;
        if required_count == 0 && required_total_size == 0 {
            within_band(candidates, self.min_documents, self.max_documents, metric)
        } else {
            smallest_first(candidates, required_count, required_total_size, metric)
        }
    }
}

/// Merges segments by on-disk size.
#[derive(Debug, Clone)]
pub struct DirectorySizePolicy {
    pub min_size: u64,
    pub max_size: u64,
}

impl MergePolicy for DirectorySizePolicy {
    fn name(&self) -> &str {
        "directory_size"
    }

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate> {
        let metric = |c: &AggregateCandidate| c.directory_size;
        if required_count == 0 && required_total_size == 0 {
            within_band(candidates, self.min_size, self.max_size, metric)
        } else {
            smallest_first(candidates, required_count, required_total_size, metric)
        }
    }
}

/// Merges segments that have not been modified for a while.
#[derive(Debug, Clone)]
pub struct IdleTimePolicy {
    pub min_idle_secs: u64,
    pub max_idle_secs: u64,
}

impl IdleTimePolicy {
    const IDLE_BIAS: f64 = 1.3;

    fn idle_secs(candidate: &AggregateCandidate, now: DateTime<Utc>) -> u64 {
        (now - candidate.last_modified).num_seconds().max(0) as u64
    }

    /// Selection as of `now`.
    pub fn select_at(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
        now: DateTime<Utc>,
    ) -> Vec<AggregateCandidate> {
        if required_count == 0 && required_total_size == 0 {
            return within_band(candidates, self.min_idle_secs, self.max_idle_secs, |c| {
                Self::idle_secs(c, now)
            });
        }

        let mut most_idle = candidates.to_vec();
        if required_count > 0 {
            let keep = (required_count as f64 * Self::IDLE_BIAS).ceil() as usize;
            most_idle.sort_by_key(|c| std::cmp::Reverse(Self::idle_secs(c, now)));
            most_idle.truncate(keep);
        }

        smallest_first(&most_idle, required_count, required_total_size, |c| c.document_count)
    }
}

impl MergePolicy for IdleTimePolicy {
    fn name(&self) -> &str {
        "idle_time"
    }

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate> {
        self.select_at(candidates, required_count, required_total_size, Utc::now())
    }
}

/// Caps the number of segments by raising the required count before delegating.
#[derive(Debug, Clone)]
pub struct MaxSegmentCountPolicy {
    pub max_segments: usize,
    pub delegate: Arc<dyn MergePolicy>,
}

impl MergePolicy for MaxSegmentCountPolicy {
    fn name(&self) -> &str {
        "max_segment_count"
    }

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate> {
        let excess = candidates.len().saturating_sub(self.max_segments);
        let mut required = required_count.max(excess);
        if required > 0 {
            required = (required as f64 * 1.3).ceil() as usize;
        }
        self.delegate.select_merge_candidates(candidates, required, required_total_size)
    }
}

/// Reports when the index holds more documents than the ceiling; selection is left to the delegate.
#[derive(Debug, Clone)]
pub struct MaxDocumentCountPolicy {
    pub max_documents: u64,
    pub delegate: Arc<dyn MergePolicy>,
}

impl MergePolicy for MaxDocumentCountPolicy {
    fn name(&self) -> &str {
        "max_document_count"
    }

    fn select_merge_candidates(
        &self,
        candidates: &[AggregateCandidate],
        required_count: usize,
        required_total_size: u64,
    ) -> Vec<AggregateCandidate> {
        let total: u64 = candidates.iter().map(|c| c.document_count).sum();
        if total > self.max_documents {
            log::warn!(
                "index holds {} documents, above the configured ceiling of {}",
                total, self.max_documents
            );
        }
        self.delegate.select_merge_candidates(candidates, required_count, required_total_size)
    }
}

/// Serializable description of a policy composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MergePolicyConfig {
    DocumentCount { min: u64, max: u64 },
    DirectorySize { min: u64, max: u64 },
    IdleTime { min_secs: u64, max_secs: u64 },
    MaxSegmentCount { max_segments: usize, delegate: Box<MergePolicyConfig> },
    MaxDocumentCount { max_documents: u64, delegate: Box<MergePolicyConfig> },
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        MergePolicyConfig::MaxSegmentCount {
            max_segments: 10,
            delegate: Box::new(MergePolicyConfig::MaxDocumentCount {
                max_documents: 10_000_000,
                delegate: Box::new(MergePolicyConfig::DocumentCount { min: 1, max: 1000 }),
            }),
        }
    }
}

impl MergePolicyConfig {
    pub fn build(&self) -> Arc<dyn MergePolicy> {
        match self {
            MergePolicyConfig::DocumentCount { min, max } => Arc::new(DocumentCountPolicy {
                min_documents: *min,
                max_documents: *max,
            }),
            MergePolicyConfig::DirectorySize { min, max } => Arc::new(DirectorySizePolicy {
                min_size: *min,
                max_size: *max,
            }),
            MergePolicyConfig::IdleTime { min_secs, max_secs } => Arc::new(IdleTimePolicy {
                min_idle_secs: *min_secs,
                max_idle_secs: *max_secs,
            }),
            MergePolicyConfig::MaxSegmentCount { max_segments, delegate } => Arc::new(MaxSegmentCountPolicy {
                max_segments: *max_segments,
                delegate: delegate.build(),
            }),
            MergePolicyConfig::MaxDocumentCount { max_documents, delegate } => Arc::new(MaxDocumentCountPolicy {
                max_documents: *max_documents,
                delegate: delegate.build(),
            }),
        }
    }
}
