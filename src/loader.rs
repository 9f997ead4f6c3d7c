use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{doc_id::DocumentId, document::Document, error::Result};

const MEAN_FILESIZE: f64 = 1024.0 * 1024.0;
const MAX_FILESIZE: f64 = 100.0 * 1024.0 * 1024.0;
/// 2022-01-01T00:00:00Z.
const MEAN_TIME: f64 = 1_640_995_200.0;
/// One year in seconds.
const MAX_TIME: f64 = 31_536_000.0;

/// Namespace mixed into every filesystem document ID.
const ID_NAMESPACE: &str = "fs";

/// Something that can produce a batch of documents to index.
pub trait DocumentLoader {
    fn load(&self) -> Result<Vec<Document>>;
}

/// Loads every readable UTF-8 file under a root directory.
///
/// Hidden files and directories (names starting with `.`) are skipped.
/// When an extension filter is set, only matching files are loaded.
#[derive(Debug, Clone)]
pub struct FilesystemLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FilesystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
        }
    }

    /// Restrict loading to the given extensions (without the leading dot,
    /// compared case-insensitively). An empty list accepts every file.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions.contains(&ext.to_ascii_lowercase())
            })
    }

    fn walk_dir(
        &self,
        root: &Path,
        current: &Path,
        results: &mut Vec<Document>,
    ) -> Result<()> {
        for entry in std::fs::read_dir(current)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with('.') {
                continue;
            }

            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                self.walk_dir(root, &path, results)?;
            } else if file_type.is_symlink() {
                let Ok(resolved) = path.canonicalize() else {
                    tracing::debug!(path = %path.display(), "skipping broken symlink");
                    continue;
                };
                // Directory links are not followed, which rules out cycles.
                if resolved.is_file()
                    && self.accepts(&resolved)
                    && let Some(doc) = make_document(root, &path, &resolved)?
                {
                    results.push(doc);
                }
            } else if file_type.is_file() && self.accepts(&path) {
                let absolute = path.canonicalize()?;
                if let Some(doc) = make_document(root, &path, &absolute)? {
                    results.push(doc);
                }
            }
        }
        Ok(())
    }
}

impl DocumentLoader for FilesystemLoader {
    fn load(&self) -> Result<Vec<Document>> {
        let root = self.root.canonicalize()?;
        tracing::info!(root = %root.display(), "loading documents from filesystem");

        let mut documents = Vec::new();
        self.walk_dir(&root, &root, &mut documents)?;
        documents.sort_by(|a, b| meta_path(a).cmp(meta_path(b)));

        tracing::info!(count = documents.len(), "filesystem load complete");
        Ok(documents)
    }
}

fn meta_path(doc: &Document) -> &str {
    doc.meta.get("path").map(String::as_str).unwrap_or_default()
}

/// Build a document for one file, or `None` if its contents are not UTF-8.
fn make_document(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> Result<Option<Document>> {
    let bytes = std::fs::read(absolute_path)?;
    let Ok(text) = String::from_utf8(bytes) else {
        tracing::warn!(path = %absolute_path.display(), "skipping non-UTF-8 file");
        return Ok(None);
    };

    let relative = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_string_lossy()
        .replace('\\', "/");

    let mtime = std::fs::metadata(absolute_path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let size = text.len() as u64;

    let filename = original_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = original_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let meta = HashMap::from([
        ("filename".to_string(), filename),
        ("path".to_string(), relative.clone()),
        ("fileExtension".to_string(), extension),
        ("fileSize".to_string(), size.to_string()),
        ("lastModified".to_string(), mtime.to_string()),
    ]);

    let id = DocumentId::new(ID_NAMESPACE, &relative).hex();
    tracing::debug!(%id, path = %relative, "loaded file");

    Ok(Some(Document {
        id,
        text,
        source: absolute_path.to_string_lossy().into_owned(),
        vector: feature_vector(size, mtime),
        meta,
    }))
}

/// Normalize file size and modification time around fixed baselines.
fn feature_vector(size: u64, mtime: u64) -> Vec<f64> {
    vec![
        (size as f64 - MEAN_FILESIZE) / MAX_FILESIZE,
        (mtime as f64 - MEAN_TIME) / MAX_TIME,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(meta_path).collect()
    }

    #[test]
    fn loads_every_file_without_filter() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "Hello").unwrap();
        std::fs::write(tmp.path().join("data.csv"), "a,b").unwrap();

        let docs = FilesystemLoader::new(tmp.path()).load().unwrap();
        assert_eq!(paths(&docs), vec!["data.csv", "note.md", "readme.txt"]);
    }

    #[test]
    fn extension_filter() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("readme.TXT"), "Hello").unwrap();
        std::fs::write(tmp.path().join("data.csv"), "a,b").unwrap();

        let docs = FilesystemLoader::new(tmp.path())
            .with_extensions([".md", "txt"])
            .load()
            .unwrap();
        assert_eq!(paths(&docs), vec!["note.md", "readme.TXT"]);
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let hidden = tmp.path().join(".git");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("config.md"), "git config").unwrap();
        std::fs::write(tmp.path().join(".secret.md"), "secret").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "notes").unwrap();

        let docs = FilesystemLoader::new(tmp.path()).load().unwrap();
        assert_eq!(paths(&docs), vec!["notes.md"]);
    }

    #[test]
    fn recurses_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.md"), "deep").unwrap();
        std::fs::write(tmp.path().join("top.md"), "top").unwrap();

        let docs = FilesystemLoader::new(tmp.path()).load().unwrap();
        assert_eq!(paths(&docs), vec!["subdir/deep.md", "top.md"]);
    }

    #[test]
    fn skips_non_utf8_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(tmp.path().join("ok.txt"), "fine").unwrap();

        let docs = FilesystemLoader::new(tmp.path()).load().unwrap();
        assert_eq!(paths(&docs), vec!["ok.txt"]);
    }

    #[test]
    fn document_fields() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.md"), "hello world").unwrap();

        let docs = FilesystemLoader::new(tmp.path()).load().unwrap();
        let doc = &docs[0];

        assert_eq!(doc.text, "hello world");
        assert_eq!(doc.id.len(), 16);
        assert_eq!(
            Path::new(&doc.source),
            tmp.path().join("hello.md").canonicalize().unwrap()
        );
        assert_eq!(doc.meta["filename"], "hello.md");
        assert_eq!(doc.meta["fileExtension"], "md");
        assert_eq!(doc.meta["fileSize"], "11");
        assert!(doc.meta["lastModified"].parse::<u64>().unwrap() > 0);
        assert_eq!(doc.vector.len(), 2);
    }

    #[test]
    fn ids_are_stable_across_loads() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.md"), "one").unwrap();

        let first = FilesystemLoader::new(tmp.path()).load().unwrap();
        std::fs::write(tmp.path().join("a.md"), "two").unwrap();
        let second = FilesystemLoader::new(tmp.path()).load().unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].text, "two");
    }

    #[test]
    fn feature_vector_is_centered() {
        let v = feature_vector(1024 * 1024, 1_640_995_200);
        assert_eq!(v, vec![0.0, 0.0]);

        let v = feature_vector(0, 1_640_995_200 + 31_536_000);
        assert!((v[0] + 0.01).abs() < 1e-12);
        assert_eq!(v[1], 1.0);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = FilesystemLoader::new(tmp.path().join("nope")).load();
        assert!(result.is_err());
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(FilesystemLoader::new(tmp.path()).load().unwrap().is_empty());
    }
}
