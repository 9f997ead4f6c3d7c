use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    document::{Document, IndexConfig},
    error::{Error, Result},
};

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
const CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("config");

/// Key of the single entry in the config table.
pub const CONFIG_KEY: &str = "index_config";

/// Summary of what the store currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub document_count: u64,
    pub has_config: bool,
}

/// Durable mirror of an index, backed by a single redb file.
///
/// Documents are stored as JSON keyed by their ID; the configuration map is
/// stored as JSON under [`CONFIG_KEY`]. Every write method commits exactly
/// one transaction.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open or create a store at `path`, creating parent directories and
    /// both tables as needed.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use bitscout::Store;
    ///
    /// let store = Store::open(&tmp.path().join("data/index.redb")).unwrap();
    /// assert!(store.is_empty().unwrap());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let existed = path.exists();

        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(CONFIG)?;
        txn.commit()?;

        if existed {
            tracing::info!(path = %path.display(), "opened existing store");
        } else {
            tracing::info!(path = %path.display(), "created new store");
        }
        Ok(Self { db })
    }

    // -- Documents --

    /// Write each `(key, document)` pair in one transaction. Nothing is
    /// committed if any document fails to serialize.
    pub fn put_documents<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a Document)>,
    {
        let txn = self.db.begin_write()?;
        let mut written = 0;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for (key, doc) in entries {
                let bytes = serde_json::to_vec(doc)?;
                table.insert(key, bytes.as_slice())?;
                written += 1;
            }
        }
        txn.commit()?;
        Ok(written)
    }

    /// Remove documents in one transaction. Absent keys are ignored.
    pub fn remove_documents<'a, I>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let txn = self.db.begin_write()?;
        let mut removed = 0;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for id in ids {
                if table.remove(id)?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit()?;
        Ok(removed)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        table
            .get(id)?
            .map(|guard| decode(id, guard.value()))
            .transpose()
    }

    /// Read every stored `(key, document)` pair. A record that fails to
    /// decode is an error naming its key.
    pub fn load_documents(&self) -> Result<Vec<(String, Document)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (k, v) = entry?;
            let key = k.value();
            result.push((key.to_string(), decode(key, v.value())?));
        }
        Ok(result)
    }

    // -- Config --

    pub fn put_config(&self, config: &IndexConfig) -> Result<()> {
        let bytes = serde_json::to_vec(config)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CONFIG)?;
            table.insert(CONFIG_KEY, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<Option<IndexConfig>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CONFIG)?;
        table
            .get(CONFIG_KEY)?
            .map(|guard| decode(CONFIG_KEY, guard.value()))
            .transpose()
    }

    // -- Introspection --

    pub fn is_empty(&self) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.is_empty()?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        let documents = txn.open_table(DOCUMENTS)?;
        let config = txn.open_table(CONFIG)?;
        Ok(StoreStats {
            document_count: documents.len()?,
            has_config: config.get(CONFIG_KEY)?.is_some(),
        })
    }

    /// Force everything committed so far onto stable storage.
    pub fn sync(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    key: &str,
    bytes: &[u8],
) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| Error::Decode {
        key: key.to_string(),
        source,
    })
}
