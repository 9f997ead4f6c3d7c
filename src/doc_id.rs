use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable document identifier derived from (root label, relative path).
///
/// Re-ingesting the same file under the same root yields the same ID, so
/// the new document replaces the old one instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    pub numeric: u64,
}

impl DocumentId {
    pub fn new(root: &str, relative_path: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        root.hash(&mut hasher);
        relative_path.hash(&mut hasher);
        Self {
            numeric: hasher.finish(),
        }
    }

    /// The full 16-character hex form, used as [`Document::id`].
    ///
    /// [`Document::id`]: crate::Document::id
    pub fn hex(&self) -> String {
        format!("{:016x}", self.numeric)
    }

    /// A shortened hex prefix for human display, clamped to 6..=16 chars.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.hex();
        hex.truncate(len.clamp(6, 16));
        hex
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short(6))
    }
}
