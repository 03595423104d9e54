use std::ops::Bound;
use regex::Regex;
use roaring::RoaringBitmap;
use crate::index::fields::STRING_PREFIX;
use crate::index::native::prefix_successor;
use crate::index::searcher::Searcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFold {
    Upper,
    Lower,
}

impl CaseFold {
    pub fn apply(&self, value: &str) -> String {
        match self {
            CaseFold::Upper => value.to_uppercase(),
            CaseFold::Lower => value.to_lowercase(),
        }
    }
}

/// Condition on the case-folded value.
#[derive(Debug, Clone)]
pub enum CaseMatch {
    Range { lower: Bound<String>, upper: Bound<String> },
    NotEqual(String),
    Pattern(Regex),
}

/// `UPPER(field) op value` / `LOWER(field) op value` over the string terms of a field.
///
/// Every term of the field is folded and tested; the bounds live in the query value
/// itself so concurrent evaluations share nothing.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveQuery {
    pub field: String,
    pub fold: CaseFold,
    pub condition: CaseMatch,
}

impl CaseInsensitiveQuery {
    pub fn new(field: &str, fold: CaseFold, condition: CaseMatch) -> Self {
        CaseInsensitiveQuery {
            field: field.to_string(),
            fold,
            condition,
        }
    }

    /// Whether an (unfolded) stored value satisfies the query.
    pub fn matches(&self, value: &str) -> bool {
        let folded = self.fold.apply(value);
        match &self.condition {
            CaseMatch::Range { lower, upper } => {
                let above = match lower {
                    Bound::Included(l) => folded.as_str() >= l.as_str(),
                    Bound::Excluded(l) => folded.as_str() > l.as_str(),
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => folded.as_str() <= u.as_str(),
                    Bound::Excluded(u) => folded.as_str() < u.as_str(),
                    Bound::Unbounded => true,
                };
                above && below
            }
            CaseMatch::NotEqual(v) => folded != *v,
            CaseMatch::Pattern(pattern) => pattern.is_match(&folded),
        }
    }

    pub fn evaluate(&self, searcher: &Searcher) -> RoaringBitmap {
        let upper = prefix_successor(STRING_PREFIX);
        searcher.matching_terms_docs(
            &self.field,
            Bound::Included(STRING_PREFIX),
            Bound::Excluded(upper.as_str()),
            |term| self.matches(&term[STRING_PREFIX.len()..]),
        )
    }
}
