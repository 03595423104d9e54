//! Parent/child evaluation over the `_parent` back-reference.
//!
//! The index stores no paths or depths. Children are found with one disjunction of
//! `parent = id` terms; descendants by repeating that one generation at a time.

use roaring::RoaringBitmap;
use crate::core::types::ContentId;
use crate::index::fields::PARENT_FIELD;
use crate::index::searcher::Searcher;

/// Live documents whose parent is one of `parents`.
pub fn children_of(searcher: &Searcher, parents: &RoaringBitmap) -> RoaringBitmap {
    let ids: Vec<String> = parents.iter()
        .filter_map(|addr| searcher.document(addr))
        .map(|doc| doc.id.as_str().to_string())
        .collect();
    if ids.is_empty() {
        return RoaringBitmap::new();
    }
    searcher.terms_docs(PARENT_FIELD, &ids)
}

/// Lazy walk over the descendants of a set of parents.
///
/// Nothing is enumerated until the iterator is polled. Each time the current generation
/// runs dry the next one is computed from it, and the walk ends on the first empty
/// generation. The optional filter only hides documents from the output; traversal still
/// goes through them.
pub struct DescendantTraversal<'a> {
    searcher: &'a Searcher,
    generation: RoaringBitmap,
    pending: std::vec::IntoIter<u32>,
    visited: RoaringBitmap,
    filter: Option<RoaringBitmap>,
    depth: usize,
}

impl<'a> DescendantTraversal<'a> {
    /// Descendants of every document in `parents` (the parents themselves excluded
    /// unless they descend from one another).
    pub fn from_parents(searcher: &'a Searcher, parents: RoaringBitmap) -> Self {
        DescendantTraversal {
            searcher,
            generation: parents,
            pending: Vec::new().into_iter(),
            visited: RoaringBitmap::new(),
            filter: None,
            depth: 0,
        }
    }

    /// Descendants of the single document `anchor`. The anchor only needs to be known
    /// by id, so the first generation is a plain `parent = anchor` lookup.
    pub fn from_anchor(searcher: &'a Searcher, anchor: ContentId) -> Self {
        let first = searcher.term_docs(PARENT_FIELD, anchor.as_str());
        let mut traversal = DescendantTraversal::from_parents(searcher, RoaringBitmap::new());
        traversal.depth = 1;
        traversal.visited = first.clone();
        traversal.pending = first.iter().collect::<Vec<_>>().into_iter();
        traversal.generation = first;
        traversal
    }

    pub fn with_filter(mut self, filter: RoaringBitmap) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Generations expanded so far.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn expand(&mut self) -> bool {
        if self.generation.is_empty() {
            return false;
        }
        let mut next = children_of(self.searcher, &self.generation);
        // Cyclic parent links would otherwise never terminate.
        next -= &self.visited;
        self.visited |= &next;
        self.depth += 1;
        self.pending = next.iter().collect::<Vec<_>>().into_iter();
        self.generation = next;
        !self.generation.is_empty()
    }
}

impl Iterator for DescendantTraversal<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            for addr in self.pending.by_ref() {
                match &self.filter {
                    Some(filter) if !filter.contains(addr) => continue,
                    _ => return Some(addr),
                }
            }
            if !self.expand() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Document;
    use crate::index::searcher::tests::searcher_over;

    fn abc() -> Searcher {
        searcher_over(vec![vec![
            Document::new("A", "cmis:folder", "A"),
            Document::new("B", "cmis:folder", "B").with_parent("A"),
            Document::new("C", "cmis:document", "C").with_parent("B"),
        ]])
    }

    fn ids(searcher: &Searcher, docs: impl IntoIterator<Item = u32>) -> Vec<String> {
        let mut out: Vec<String> = docs.into_iter()
            .filter_map(|addr| searcher.document(addr))
            .map(|d| d.id.as_str().to_string())
            .collect();
        out.sort();
        out
    }

    #[test]
    fn children_and_descendants_of_a_root() {
        let searcher = abc();
        let a: RoaringBitmap = searcher.find(&"A".into()).into_iter().collect();

        assert_eq!(ids(&searcher, &children_of(&searcher, &a)), vec!["B"]);
        assert_eq!(ids(&searcher, DescendantTraversal::from_parents(&searcher, a)), vec!["B", "C"]);
        assert_eq!(ids(&searcher, DescendantTraversal::from_anchor(&searcher, "A".into())), vec!["B", "C"]);
    }

    #[test]
    fn filter_does_not_prune_traversal() {
        let searcher = abc();
        let c: RoaringBitmap = searcher.find(&"C".into()).into_iter().collect();
        let found = DescendantTraversal::from_anchor(&searcher, "A".into()).with_filter(c);
        assert_eq!(ids(&searcher, found), vec!["C"]);
    }

    #[test]
    fn traversal_is_lazy() {
        let searcher = abc();
        let mut traversal = DescendantTraversal::from_anchor(&searcher, "A".into());
        assert_eq!(traversal.depth(), 1);
        traversal.next();
        assert_eq!(traversal.depth(), 1);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut docs = vec![Document::new("n0", "cmis:folder", "n0")];
        for i in 1..10_000 {
            docs.push(Document::new(format!("n{}", i).as_str(), "cmis:folder", "n").with_parent(format!("n{}", i - 1).as_str()));
        }
        let searcher = searcher_over(vec![docs]);
        assert_eq!(DescendantTraversal::from_anchor(&searcher, "n0".into()).count(), 9_999);
    }

    #[test]
    fn cycles_terminate() {
        let searcher = searcher_over(vec![vec![
            Document::new("p", "cmis:folder", "p").with_parent("q"),
            Document::new("q", "cmis:folder", "q").with_parent("p"),
        ]]);
        assert_eq!(ids(&searcher, DescendantTraversal::from_anchor(&searcher, "p".into())), vec!["p", "q"]);
    }
}
