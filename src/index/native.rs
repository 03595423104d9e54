use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;
use regex::Regex;
use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::core::types::{ContentId, Value};
use crate::index::case_insensitive::CaseInsensitiveQuery;
use crate::index::fields::{encode_value, tokenize, NAME_FIELD, PARENT_FIELD, ROOT_PARENT};
use crate::index::matcher::DocumentMatcher;
use crate::index::searcher::Searcher;
use crate::query::context::QueryExecutionExceptions;
use crate::query::fulltext::FullTextExpression;
use crate::search::structural::{children_of, DescendantTraversal};

/// Matching documents with their scores. Documents without an explicit score score 1.0.
#[derive(Debug, Clone, Default)]
pub struct HitSet {
    pub docs: RoaringBitmap,
    pub scores: HashMap<u32, f32>,
}

impl HitSet {
    pub fn constant(docs: RoaringBitmap) -> Self {
        HitSet { docs, scores: HashMap::new() }
    }

    pub fn score(&self, addr: u32) -> f32 {
        self.scores.get(&addr).copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> u64 {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in both sets; scores add up.
    fn intersect(self, other: HitSet) -> HitSet {
        let docs = &self.docs & &other.docs;
        let scores = docs.iter().map(|d| (d, self.score(d) + other.score(d))).collect();
        HitSet { docs, scores }
    }

    /// Documents in either set; documents in both add up their scores.
    fn union(self, other: HitSet) -> HitSet {
        let docs = &self.docs | &other.docs;
        let scores = docs.iter()
            .map(|d| {
                let score = match (self.docs.contains(d), other.docs.contains(d)) {
                    (true, true) => self.score(d) + other.score(d),
                    (true, false) => self.score(d),
                    _ => other.score(d),
                };
                (d, score)
            })
            .collect();
        HitSet { docs, scores }
    }

    fn subtract(mut self, docs: &RoaringBitmap) -> HitSet {
        self.docs -= docs;
        self.scores.retain(|d, _| !docs.contains(*d));
        self
    }

    fn restrict(mut self, keep: &RoaringBitmap) -> HitSet {
        self.docs &= keep;
        self.scores.retain(|d, _| keep.contains(*d));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    pub must: Vec<NativeQuery>,
    pub should: Vec<NativeQuery>,
    pub must_not: Vec<NativeQuery>,
    /// Like `must`, without contributing to the score.
    pub filter: Vec<NativeQuery>,
}

/// Backend query evaluated against one snapshot.
#[derive(Debug, Clone)]
pub enum NativeQuery {
    MatchAll,
    MatchNone,
    Term { field: String, term: String },
    Terms { field: String, terms: Vec<String> },
    /// Terms of one value kind (`prefix`) between two encoded bounds.
    Range { field: String, prefix: String, lower: Bound<String>, upper: Bound<String> },
    /// Terms of one value kind whose decoded value matches `pattern`.
    Regex { field: String, prefix: String, pattern: Regex },
    CaseInsensitive(CaseInsensitiveQuery),
    FullText { field: String, expression: FullTextExpression },
    Bool(BoolQuery),
    /// Documents at an absolute name path; `/` is the set of parentless documents.
    Path(Vec<String>),
    Children(Box<NativeQuery>),
    Descendants(Box<NativeQuery>),
    DescendantsOfAnchor(ContentId),
    Matcher(Arc<dyn DocumentMatcher>),
}

impl NativeQuery {
    pub fn term(field: &str, term: &str) -> Self {
        NativeQuery::Term { field: field.to_string(), term: term.to_string() }
    }

    pub fn path(path: &str) -> Self {
        NativeQuery::Path(
            path.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect(),
        )
    }

    fn is_matcher(&self) -> bool {
        matches!(self, NativeQuery::Matcher(_))
    }

    /// Hits of this query restricted to `scope`.
    pub fn evaluate(
        &self,
        searcher: &Searcher,
        scope: &RoaringBitmap,
        exceptions: &QueryExecutionExceptions,
    ) -> Result<HitSet> {
        let hits = match self {
            NativeQuery::MatchAll => HitSet::constant(scope.clone()),
            NativeQuery::MatchNone => HitSet::default(),
            NativeQuery::Term { field, term } => {
                HitSet::constant(searcher.term_docs(field, term) & scope)
            }
            NativeQuery::Terms { field, terms } => {
                HitSet::constant(searcher.terms_docs(field, terms) & scope)
            }
            NativeQuery::Range { field, prefix, lower, upper } => {
                let next_prefix = prefix_successor(prefix);
                let lower = match lower {
                    Bound::Unbounded => Bound::Included(prefix.as_str()),
                    Bound::Included(v) => Bound::Included(v.as_str()),
                    Bound::Excluded(v) => Bound::Excluded(v.as_str()),
                };
                let upper = match upper {
                    Bound::Unbounded => Bound::Excluded(next_prefix.as_str()),
                    Bound::Included(v) => Bound::Included(v.as_str()),
                    Bound::Excluded(v) => Bound::Excluded(v.as_str()),
                };
                HitSet::constant(searcher.matching_terms_docs(field, lower, upper, |_| true) & scope)
            }
            NativeQuery::Regex { field, prefix, pattern } => {
                let next_prefix = prefix_successor(prefix);
                let docs = searcher.matching_terms_docs(
                    field,
                    Bound::Included(prefix.as_str()),
                    Bound::Excluded(next_prefix.as_str()),
                    |term| pattern.is_match(&term[prefix.len()..]),
                );
                HitSet::constant(docs & scope)
            }
            NativeQuery::CaseInsensitive(query) => HitSet::constant(query.evaluate(searcher) & scope),
            NativeQuery::FullText { field, expression } => full_text(searcher, field, expression, scope),
            NativeQuery::Bool(query) => query.evaluate(searcher, scope, exceptions)?,
            NativeQuery::Path(components) => HitSet::constant(resolve_path(searcher, components) & scope),
            NativeQuery::Children(parents) => {
                let parents = parents.evaluate(searcher, searcher.live_docs(), exceptions)?;
                HitSet::constant(children_of(searcher, &parents.docs) & scope)
            }
            NativeQuery::Descendants(parents) => {
                let parents = parents.evaluate(searcher, searcher.live_docs(), exceptions)?;
                let traversal = DescendantTraversal::from_parents(searcher, parents.docs)
                    .with_filter(scope.clone());
                HitSet::constant(traversal.collect())
            }
            NativeQuery::DescendantsOfAnchor(anchor) => {
                let traversal = DescendantTraversal::from_anchor(searcher, anchor.clone())
                    .with_filter(scope.clone());
                HitSet::constant(traversal.collect())
            }
            NativeQuery::Matcher(matcher) => {
                let mut docs = RoaringBitmap::new();
                for addr in scope.iter() {
                    match matcher.matches(searcher, addr) {
                        Ok(true) => {
                            docs.insert(addr);
                        }
                        Ok(false) => {}
                        Err(e) if !e.is_fatal() => exceptions.record(e),
                        Err(e) => return Err(e),
                    }
                }
                HitSet::constant(docs)
            }
        };
        Ok(hits)
    }
}

impl BoolQuery {
    pub fn evaluate(
        &self,
        searcher: &Searcher,
        scope: &RoaringBitmap,
        exceptions: &QueryExecutionExceptions,
    ) -> Result<HitSet> {
        let required = !self.must.is_empty() || !self.filter.is_empty();

        let mut hits = if required {
            let mut current = HitSet::constant(scope.clone());
            let mut scored = false;

            // Index-backed clauses first so matchers only see the narrowed candidates.
            for clause in self.filter.iter().filter(|q| !q.is_matcher()) {
                let docs = clause.evaluate(searcher, &current.docs, exceptions)?.docs;
                current = current.restrict(&docs);
            }
            for clause in self.must.iter().filter(|q| !q.is_matcher()) {
                let clause_hits = clause.evaluate(searcher, &current.docs, exceptions)?;
                current = if scored {
                    current.intersect(clause_hits)
                } else {
                    scored = true;
                    clause_hits
                };
            }
            for clause in self.filter.iter().chain(self.must.iter()).filter(|q| q.is_matcher()) {
                let docs = clause.evaluate(searcher, &current.docs, exceptions)?.docs;
                current = current.restrict(&docs);
            }

            for clause in &self.should {
                let optional = clause.evaluate(searcher, &current.docs, exceptions)?;
                for addr in optional.docs.iter() {
                    let score = current.score(addr) + optional.score(addr);
                    current.scores.insert(addr, score);
                }
            }
            current
        } else if !self.should.is_empty() {
            let mut union = HitSet::default();
            for clause in &self.should {
                union = union.union(clause.evaluate(searcher, scope, exceptions)?);
            }
            union
        } else {
            HitSet::constant(scope.clone())
        };

        for clause in &self.must_not {
            let excluded = clause.evaluate(searcher, &hits.docs, exceptions)?;
            hits = hits.subtract(&excluded.docs);
        }

        Ok(hits)
    }
}

/// Smallest string greater than every string starting with `prefix`.
pub(crate) fn prefix_successor(prefix: &str) -> String {
    let mut out = prefix.to_string();
    match out.pop() {
        Some(last) => {
            let next = char::from_u32(last as u32 + 1).unwrap_or(char::MAX);
            out.push(next);
            out
        }
        None => String::from(char::MAX),
    }
}

fn resolve_path(searcher: &Searcher, components: &[String]) -> RoaringBitmap {
    let mut current = searcher.term_docs(PARENT_FIELD, ROOT_PARENT);
    for name in components {
        if current.is_empty() {
            break;
        }
        let named = searcher.term_docs(NAME_FIELD, &encode_value(&Value::String(name.clone())));
        current = children_of(searcher, &current) & named;
    }
    current
}

fn full_text(
    searcher: &Searcher,
    field: &str,
    expression: &FullTextExpression,
    scope: &RoaringBitmap,
) -> HitSet {
    match expression {
        FullTextExpression::Word(text) | FullTextExpression::Phrase(text) => {
            phrase(searcher, field, &tokenize(text), scope)
        }
        FullTextExpression::Not(inner) => {
            let excluded = full_text(searcher, field, inner, scope);
            HitSet::constant(scope - &excluded.docs)
        }
        FullTextExpression::And(parts) => {
            let mut positive: Option<HitSet> = None;
            let mut excluded = RoaringBitmap::new();
            for part in parts {
                match part {
                    FullTextExpression::Not(inner) => {
                        excluded |= full_text(searcher, field, inner, scope).docs;
                    }
                    other => {
                        let within = positive.as_ref().map(|p| p.docs.clone()).unwrap_or_else(|| scope.clone());
                        let hits = full_text(searcher, field, other, &within);
                        positive = Some(match positive {
                            Some(acc) => acc.intersect(hits),
                            None => hits,
                        });
                    }
                }
            }
            positive.unwrap_or_else(|| HitSet::constant(scope.clone())).subtract(&excluded)
        }
        FullTextExpression::Or(parts) => {
            let mut union = HitSet::default();
            for part in parts {
                union = union.union(full_text(searcher, field, part, scope));
            }
            union
        }
    }
}

fn idf(searcher: &Searcher, field: &str, token: &str) -> f32 {
    let df = searcher.doc_freq(field, token).max(1) as f32;
    (1.0 + searcher.doc_count() as f32 / df).ln()
}

/// tf·idf hits of a token sequence; a single token is a plain term.
fn phrase(searcher: &Searcher, field: &str, tokens: &[String], scope: &RoaringBitmap) -> HitSet {
    let Some(first) = tokens.first() else {
        return HitSet::default();
    };

    let weight: f32 = tokens.iter().map(|t| idf(searcher, field, t)).sum();
    let mut hits = HitSet::default();

    for (addr, posting) in searcher.term_postings(field, first) {
        if !scope.contains(addr) {
            continue;
        }

        let freq = if tokens.len() == 1 {
            posting.term_freq
        } else {
            let rest: Option<Vec<_>> = tokens[1..].iter()
                .map(|t| searcher.posting(field, t, addr))
                .collect();
            let Some(rest) = rest else { continue };
            posting.positions.iter()
                .filter(|start| {
                    rest.iter().enumerate().all(|(i, p)| {
                        p.positions.binary_search(&(**start + i as u32 + 1)).is_ok()
                    })
                })
                .count() as u32
        };

        if freq > 0 {
            hits.docs.insert(addr);
            hits.scores.insert(addr, (freq as f32).sqrt() * weight);
        }
    }
    hits
}
