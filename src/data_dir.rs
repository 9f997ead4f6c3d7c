use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable that overrides the default location.
pub const DATA_DIR_ENV: &str = "BITSCOUT_DATA_DIR";

const APP_NAME: &str = "bitscout";
const INDEX_FILE: &str = "index.redb";

/// Directory holding the index file.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Pick the data directory and make sure it exists.
    ///
    /// `explicit` wins, then a non-empty [`DATA_DIR_ENV`], then
    /// `$XDG_DATA_HOME/bitscout`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match non_empty(std::env::var_os(DATA_DIR_ENV)) {
                Some(dir) => PathBuf::from(dir),
                None => xdg_data_home()?,
            },
        };

        std::fs::create_dir_all(&root).map_err(|source| Error::DataDir {
            path: root.clone(),
            source,
        })?;
        tracing::debug!(root = %root.display(), "using data directory");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the redb file holding documents and index configuration.
    pub fn index_db(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix(APP_NAME)
        .get_data_home()
        .ok_or_else(|| {
            Error::Config(format!(
                "no home directory found; pass --data-dir or set {DATA_DIR_ENV}"
            ))
        })
}
