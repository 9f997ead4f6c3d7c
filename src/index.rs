use crate::{
    document::{Document, IndexConfig},
    error::Result,
};

/// The command surface shared by [`MemoryIndex`](crate::MemoryIndex) and
/// [`WriteBehindIndex`](crate::WriteBehindIndex).
///
/// All methods take `&self`; implementations synchronize internally so an
/// index can be shared across threads behind an `Arc`.
pub trait Index: Send + Sync {
    /// Replace the whole configuration.
    fn configure(&self, config: IndexConfig) -> Result<()>;

    /// An owned copy of the current configuration.
    fn show_config(&self) -> IndexConfig;

    /// Insert or replace a document by its ID.
    fn add_document(&self, document: Document) -> Result<()>;

    fn add_documents(&self, documents: Vec<Document>) -> Result<()>;

    /// Documents matching `query`, in no particular order.
    ///
    /// A query that parses to at least one condition is a filter (see
    /// [`crate::query`]); anything else is a case-insensitive substring
    /// search over text, metadata and source. The empty query matches
    /// nothing.
    fn search(&self, query: &str) -> Vec<Document>;

    /// Fails with [`Error::NotFound`](crate::Error::NotFound) if `id` is
    /// absent.
    fn delete_document(&self, id: &str) -> Result<()>;

    /// Stops at the first absent ID. Deletions before it stay applied.
    fn delete_documents(&self, ids: &[String]) -> Result<()>;

    /// Store `document` under `id`, which must already exist. The payload's
    /// own ID is not consulted.
    fn update_document(&self, id: &str, document: Document) -> Result<()>;

    /// Update each document under its own ID. Stops at the first absent
    /// ID, keeping earlier updates.
    fn update_documents(&self, documents: Vec<Document>) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn optimize(&self) -> Result<()>;

    fn count(&self) -> usize;

    /// Approximate size of all stored documents in bytes.
    fn size(&self) -> usize;
}
