//! bitscout - an in-memory document index with a small attribute query
//! language and a write-behind mirror in an embedded key-value store.
//!
//! Documents live in a [`MemoryIndex`] that serves every read. A
//! [`WriteBehindIndex`] wraps it and replays each mutation into a
//! [redb](https://github.com/cberner/redb) file on a background thread, so
//! callers never wait on disk. On open, the in-memory state is rebuilt from
//! that file.
//!
//! Queries are `and`-joined conditions such as
//! `fileExtension=md and fileSize>1000` (see [`query`]). Text that does not
//! parse as a query falls back to a case-insensitive substring search.
//!
//! # Quick start
//!
//! ```
//! # let tmp = tempfile::tempdir().unwrap();
//! use bitscout::{Document, Index, WriteBehindIndex, WriteBehindOptions};
//!
//! let path = tmp.path().join("index.redb");
//! let index = WriteBehindIndex::open(&path, WriteBehindOptions::default()).unwrap();
//!
//! index
//!     .add_document(
//!         Document::new("1", "hello world", "notes/hello.md")
//!             .with_meta("fileExtension", "md"),
//!     )
//!     .unwrap();
//!
//! let hits = index.search("fileExtension=md");
//! assert_eq!(hits.len(), 1);
//! index.close().unwrap();
//!
//! // The document was mirrored to disk and comes back on reopen.
//! let index = WriteBehindIndex::open(&path, WriteBehindOptions::default()).unwrap();
//! assert_eq!(index.count(), 1);
//! ```

pub mod data_dir;
pub mod doc_id;
pub mod document;
pub mod error;
pub mod index;
pub mod loader;
pub mod memory_index;
pub mod query;
pub mod store;
pub mod write_behind;

pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use document::{Document, IndexConfig};
pub use error::{Error, Result};
pub use index::Index;
pub use loader::{DocumentLoader, FilesystemLoader};
pub use memory_index::MemoryIndex;
pub use query::{Operator, Query, QueryCondition};
pub use store::{Store, StoreStats};
pub use write_behind::{WorkerPause, WriteBehindIndex, WriteBehindOptions};
