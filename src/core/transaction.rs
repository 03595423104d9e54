use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::ContentId;

/// A batch of index changes applied all-or-nothing by the index manager.
///
/// The three sets must be disjoint: an identifier is either new, replaced or deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTransaction {
    pub added: BTreeSet<ContentId>,
    pub updated: BTreeSet<ContentId>,
    pub removed: BTreeSet<ContentId>,
}

impl IndexTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: impl Into<ContentId>) -> &mut Self {
        self.added.insert(id.into());
        self
    }

    pub fn update(&mut self, id: impl Into<ContentId>) -> &mut Self {
        self.updated.insert(id.into());
        self
    }

    pub fn remove(&mut self, id: impl Into<ContentId>) -> &mut Self {
        self.removed.insert(id.into());
        self
    }

    pub fn with_added<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ContentId>,
    {
        self.added.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_updated<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ContentId>,
    {
        self.updated.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_removed<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ContentId>,
    {
        self.removed.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Number of buffered changes across all three sets.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.updated.clear();
        self.removed.clear();
    }

    /// Identifiers whose documents must be (re)indexed.
    pub fn to_index(&self) -> impl Iterator<Item = &ContentId> {
        self.added.iter().chain(self.updated.iter())
    }

    /// Identifiers whose current index entries must be dropped.
    pub fn to_delete(&self) -> impl Iterator<Item = &ContentId> {
        self.removed.iter().chain(self.updated.iter()).chain(self.added.iter())
    }

    pub fn validate(&self) -> Result<()> {
        let overlap = self.added.intersection(&self.updated)
            .chain(self.added.intersection(&self.removed))
            .chain(self.updated.intersection(&self.removed))
            .next();

        match overlap {
            Some(id) => Err(Error::transaction(format!(
                "content {} appears in more than one change set", id
            ))),
            None => Ok(()),
        }
    }
}

/// Outcome of a successful `save`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub generation: u64,
}

impl TransactionReport {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.removed
    }
}
