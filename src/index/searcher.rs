use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::core::types::{ContentId, Document};
use crate::index::fields::{ID_FIELD, TYPE_FIELD};
use crate::index::native::{HitSet, NativeQuery};
use crate::index::posting::{Posting, PostingList};
use crate::mvcc::controller::Snapshot;
use crate::query::context::QueryExecutionExceptions;
use crate::query::types::IndexStatistics;

/// Read access to one immutable snapshot.
///
/// Documents are addressed by a snapshot-wide number: the segment's base plus the
/// segment-local document number. Only live (not deleted) addresses are ever returned.
#[derive(Debug, Clone)]
pub struct Searcher {
    snapshot: Arc<Snapshot>,
    bases: Vec<u32>,
    live: RoaringBitmap,
}

impl Searcher {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        let mut bases = Vec::with_capacity(snapshot.segments.len());
        let mut live = RoaringBitmap::new();
        let mut base = 0u32;

        for view in &snapshot.segments {
            bases.push(base);
            let count = view.segment.doc_count();
            live.insert_range(base..base + count);
            for deleted in view.deleted.iter() {
                live.remove(base + deleted);
            }
            base += count;
        }

        Searcher { snapshot, bases, live }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn live_docs(&self) -> &RoaringBitmap {
        &self.live
    }

    pub fn doc_count(&self) -> u64 {
        self.live.len()
    }

    fn locate(&self, addr: u32) -> Option<(usize, u32)> {
        let idx = self.bases.partition_point(|base| *base <= addr).checked_sub(1)?;
        let local = addr - self.bases[idx];
        if local < self.snapshot.segments[idx].segment.doc_count() {
            Some((idx, local))
        } else {
            None
        }
    }

    pub fn document(&self, addr: u32) -> Option<&Document> {
        if !self.live.contains(addr) {
            return None;
        }
        let (idx, local) = self.locate(addr)?;
        self.snapshot.segments[idx].segment.documents.get(local as usize)
    }

    /// Address of the live document with this id.
    pub fn find(&self, id: &ContentId) -> Option<u32> {
        self.term_docs(ID_FIELD, id.as_str()).min()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.find(id).is_some()
    }

    /// Every live document id, in address order.
    pub fn ids(&self) -> impl Iterator<Item = &ContentId> + '_ {
        self.live.iter().filter_map(move |addr| self.document(addr).map(|d| &d.id))
    }

    fn each_posting_list<'s>(&'s self, field: &str, term: &str) -> impl Iterator<Item = (u32, &'s PostingList)> + 's {
        let field = field.to_string();
        let term = term.to_string();
        self.snapshot.segments.iter().zip(self.bases.iter()).filter_map(move |(view, base)| {
            view.segment.postings(&field, &term).map(|list| (*base, list))
        })
    }

    pub fn term_docs(&self, field: &str, term: &str) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for (base, list) in self.each_posting_list(field, term) {
            docs.extend(list.docs().map(|d| base + d));
        }
        docs &= &self.live;
        docs
    }

    pub fn terms_docs(&self, field: &str, terms: &[String]) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for term in terms {
            docs |= self.term_docs(field, term);
        }
        docs
    }

    /// Union of the documents of every term in `[lower, upper]` accepted by `accept`.
    pub fn matching_terms_docs<F>(
        &self,
        field: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
        accept: F,
    ) -> RoaringBitmap
    where
        F: Fn(&str) -> bool,
    {
        let mut docs = RoaringBitmap::new();
        if is_empty_range(lower, upper) {
            return docs;
        }
        for (view, base) in self.snapshot.segments.iter().zip(self.bases.iter()) {
            let Some(terms) = view.segment.terms(field) else { continue };
            for (term, list) in terms.range::<str, _>((lower, upper)) {
                if accept(term) {
                    docs.extend(list.docs().map(|d| base + d));
                }
            }
        }
        docs &= &self.live;
        docs
    }

    /// Distinct terms of a field across all segments, in order.
    pub fn field_terms(&self, field: &str, lower: Bound<&str>, upper: Bound<&str>) -> Vec<String> {
        let mut out: BTreeSet<&str> = BTreeSet::new();
        if is_empty_range(lower, upper) {
            return Vec::new();
        }
        for view in &self.snapshot.segments {
            if let Some(terms) = view.segment.terms(field) {
                for (term, _) in terms.range::<str, _>((lower, upper)) {
                    out.insert(term.as_str());
                }
            }
        }
        out.into_iter().map(str::to_string).collect()
    }

    /// Live postings of a term as (address, posting).
    pub fn term_postings(&self, field: &str, term: &str) -> Vec<(u32, &Posting)> {
        let mut out = Vec::new();
        for (base, list) in self.each_posting_list(field, term) {
            for posting in &list.postings {
                let addr = base + posting.doc;
                if self.live.contains(addr) {
                    out.push((addr, posting));
                }
            }
        }
        out
    }

    pub fn posting(&self, field: &str, term: &str, addr: u32) -> Option<&Posting> {
        let (idx, local) = self.locate(addr)?;
        self.snapshot.segments[idx].segment.postings(field, term)?.get(local)
    }

    pub fn doc_freq(&self, field: &str, term: &str) -> u64 {
        self.term_docs(field, term).len()
    }

    pub fn search(&self, query: &NativeQuery, exceptions: &QueryExecutionExceptions) -> Result<HitSet> {
        query.evaluate(self, &self.live, exceptions)
    }

    pub fn statistics(&self) -> IndexStatistics {
        let mut stats = IndexStatistics {
            total_docs: self.doc_count(),
            segment_count: self.snapshot.segments.len(),
            ..IndexStatistics::default()
        };
        for type_name in self.field_terms(TYPE_FIELD, Bound::Unbounded, Bound::Unbounded) {
            let count = self.doc_freq(TYPE_FIELD, &type_name);
            if count > 0 {
                stats.docs_per_type.insert(type_name, count);
            }
        }
        stats
    }
}

/// `BTreeMap::range` panics on inverted or empty-exclusive ranges.
fn is_empty_range(lower: Bound<&str>, upper: Bound<&str>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u)) => l >= u,
        (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}
