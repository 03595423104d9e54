use std::collections::{BTreeMap, BTreeSet};
use parking_lot::RwLock;
use crate::content::ContentSource;
use crate::core::error::Result;
use crate::core::types::{ContentId, Document};

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<ContentId, Document>,
    children: BTreeMap<ContentId, BTreeSet<ContentId>>,
    roots: BTreeSet<ContentId>,
}

impl Tree {
    fn unlink(&mut self, doc: &Document) {
        match &doc.parent_id {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.remove(&doc.id);
                }
            }
            None => {
                self.roots.remove(&doc.id);
            }
        }
    }
}

/// In-memory content repository.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    tree: RwLock<Tree>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        MemoryContentSource::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let source = MemoryContentSource::new();
        for doc in docs {
            source.insert(doc);
        }
        source
    }

    /// Inserts or replaces a node.
    pub fn insert(&self, doc: Document) {
        let mut tree = self.tree.write();
        if let Some(previous) = tree.nodes.remove(&doc.id) {
            tree.unlink(&previous);
        }
        match &doc.parent_id {
            Some(parent) => {
                tree.children.entry(parent.clone()).or_default().insert(doc.id.clone());
            }
            None => {
                tree.roots.insert(doc.id.clone());
            }
        }
        tree.nodes.insert(doc.id.clone(), doc);
    }

    /// Removes a node; its children stay, detached from any reachable root.
    pub fn remove(&self, id: &ContentId) -> Option<Document> {
        let mut tree = self.tree.write();
        let doc = tree.nodes.remove(id)?;
        tree.unlink(&doc);
        Some(doc)
    }

    pub fn get(&self, id: &ContentId) -> Option<Document> {
        self.tree.read().nodes.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tree.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentSource for MemoryContentSource {
    fn roots(&self) -> Result<Vec<ContentId>> {
        Ok(self.tree.read().roots.iter().cloned().collect())
    }

    fn children(&self, id: &ContentId) -> Result<Vec<ContentId>> {
        let tree = self.tree.read();
        Ok(tree.children.get(id)
            .map(|ids| ids.iter().filter(|c| tree.nodes.contains_key(*c)).cloned().collect())
            .unwrap_or_default())
    }

    fn load(&self, id: &ContentId) -> Result<Option<Document>> {
        Ok(self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_follows_inserts_and_moves() {
        let source = MemoryContentSource::with_documents([
            Document::new("a", "cmis:folder", "a"),
            Document::new("b", "cmis:folder", "b").with_parent("a"),
            Document::new("c", "cmis:document", "c").with_parent("b"),
        ]);
        assert_eq!(source.roots().unwrap(), vec![ContentId::from("a")]);
        assert_eq!(source.children(&"a".into()).unwrap(), vec![ContentId::from("b")]);

        source.insert(Document::new("c", "cmis:document", "c").with_parent("a"));
        assert_eq!(source.children(&"a".into()).unwrap().len(), 2);
        assert!(source.children(&"b".into()).unwrap().is_empty());

        source.remove(&"b".into());
        assert!(!source.exists(&"b".into()).unwrap());
        assert_eq!(source.len(), 2);
    }
}
