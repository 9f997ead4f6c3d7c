use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    document::{Document, IndexConfig},
    error::{Error, Result},
    index::Index,
    query::Query,
};

/// A document index held entirely in memory.
///
/// # Examples
///
/// ```
/// use bitscout::{Document, Index, MemoryIndex};
///
/// let index = MemoryIndex::new();
/// index.add_document(Document::new("1", "hello", "a.txt").with_meta("fileExtension", "txt")).unwrap();
///
/// assert_eq!(index.search("fileExtension=txt").len(), 1);
/// assert_eq!(index.search("HELLO").len(), 1);
/// assert!(index.search("").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<String, Document>>,
    config: RwLock<IndexConfig>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_document(&self, id: &str) -> Option<Document> {
        self.read_documents().get(id).cloned()
    }

    /// Swap the whole document set for `(key, document)` entries,
    /// discarding what was there.
    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Document)>,
    {
        let map: HashMap<String, Document> = entries.into_iter().collect();
        let count = map.len();
        *self.write_documents() = map;
        tracing::debug!(count, "replaced in-memory documents");
    }

    fn read_documents(&self) -> RwLockReadGuard<'_, HashMap<String, Document>> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_documents(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<String, Document>> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn search_conditions(&self, query: &Query) -> Vec<Document> {
        let documents = self.read_documents();
        let mut results = Vec::new();
        for doc in documents.values() {
            match query.evaluate(doc) {
                Ok(true) => results.push(doc.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        id = %doc.id,
                        error = %e,
                        "skipping document during query evaluation"
                    );
                }
            }
        }
        tracing::debug!(
            query = %query.raw,
            results = results.len(),
            "condition search"
        );
        results
    }

    fn search_substring(&self, query: &str) -> Vec<Document> {
        let needle = query.to_lowercase();
        let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);

        let results: Vec<Document> = self
            .read_documents()
            .values()
            .filter(|doc| {
                hit(&doc.text)
                    || doc.meta.iter().any(|(k, v)| hit(k) || hit(v))
                    || hit(&doc.source)
            })
            .cloned()
            .collect();
        tracing::debug!(query, results = results.len(), "substring search");
        results
    }
}

impl Index for MemoryIndex {
    fn configure(&self, config: IndexConfig) -> Result<()> {
        let settings = config.len();
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!(settings, "index configured");
        Ok(())
    }

    fn show_config(&self) -> IndexConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn add_document(&self, document: Document) -> Result<()> {
        tracing::debug!(id = %document.id, "adding document");
        self.write_documents().insert(document.id.clone(), document);
        Ok(())
    }

    fn add_documents(&self, documents: Vec<Document>) -> Result<()> {
        let count = documents.len();
        let mut map = self.write_documents();
        for doc in documents {
            map.insert(doc.id.clone(), doc);
        }
        tracing::info!(count, "added documents");
        Ok(())
    }

    fn search(&self, query: &str) -> Vec<Document> {
        if query.is_empty() {
            return Vec::new();
        }
        match Query::parse(query) {
            Ok(parsed) if !parsed.conditions.is_empty() => {
                self.search_conditions(&parsed)
            }
            _ => self.search_substring(query),
        }
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        if self.write_documents().remove(id).is_none() {
            return Err(Error::document_not_found(id));
        }
        tracing::debug!(id, "deleted document");
        Ok(())
    }

    fn delete_documents(&self, ids: &[String]) -> Result<()> {
        let mut map = self.write_documents();
        for id in ids {
            if map.remove(id).is_none() {
                return Err(Error::document_not_found(id));
            }
        }
        tracing::info!(count = ids.len(), "deleted documents");
        Ok(())
    }

    fn update_document(&self, id: &str, document: Document) -> Result<()> {
        let mut map = self.write_documents();
        let Some(slot) = map.get_mut(id) else {
            return Err(Error::document_not_found(id));
        };
        *slot = document;
        tracing::debug!(id, "updated document");
        Ok(())
    }

    fn update_documents(&self, documents: Vec<Document>) -> Result<()> {
        let count = documents.len();
        let mut map = self.write_documents();
        for doc in documents {
            let Some(slot) = map.get_mut(&doc.id) else {
                return Err(Error::document_not_found(&doc.id));
            };
            *slot = doc;
        }
        tracing::info!(count, "updated documents");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        tracing::debug!("memory index closed");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        tracing::debug!("flush is a no-op for the memory index");
        Ok(())
    }

    fn optimize(&self) -> Result<()> {
        tracing::debug!("optimize is a no-op for the memory index");
        Ok(())
    }

    fn count(&self) -> usize {
        self.read_documents().len()
    }

    fn size(&self) -> usize {
        self.read_documents()
            .values()
            .map(Document::size_estimate)
            .sum()
    }
}
