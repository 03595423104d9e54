//! Access to the content repository the index is built from.

pub mod memory;

use crate::core::error::Result;
use crate::core::types::{ContentId, Document};

/// Node enumeration and document loading for (re)indexing.
pub trait ContentSource: Send + Sync {
    /// Nodes without a parent, in traversal order.
    fn roots(&self) -> Result<Vec<ContentId>>;

    fn children(&self, id: &ContentId) -> Result<Vec<ContentId>>;

    /// The indexable form of a node, or `None` if it no longer exists.
    fn load(&self, id: &ContentId) -> Result<Option<Document>>;

    fn exists(&self, id: &ContentId) -> Result<bool> {
        Ok(self.load(id)?.is_some())
    }
}
