//! In-memory file reader.

use std::collections::HashMap;
use std::sync::Arc;

use blake3::Hasher;
use parking_lot::RwLock;

use crate::dictionary;
use crate::error::{ReadError, Result};
use crate::FileReader;

/// Thread-safe in-memory file map. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryFileReader {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage (or overwrite) the contents of a path.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.data.write().insert(path.into(), bytes.into());
    }

    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.data.write().remove(path)
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.data.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Stored paths under `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        out.sort();
        out
    }

    fn not_found(path: &str) -> ReadError {
        ReadError::NotFound {
            path: path.to_string(),
        }
    }
}

impl FileReader for MemoryFileReader {
    fn file_signature(&self, path: &str) -> Result<String> {
        let data = self.data.read();
        if let Some(bytes) = data.get(path) {
            let mut h = Hasher::new();
            h.update(path.as_bytes());
            h.update(bytes);
            return Ok(h.finalize().to_hex().to_string());
        }
        // A folder is every stored path below it.
        let folder = format!("{}/", path.trim_end_matches('/'));
        let mut children: Vec<(&String, &Vec<u8>)> =
            data.iter().filter(|(k, _)| k.starts_with(&folder)).collect();
        if children.is_empty() {
            return Err(Self::not_found(path));
        }
        children.sort();
        let mut h = Hasher::new();
        for (k, v) in children {
            h.update(k.as_bytes());
            h.update(v);
        }
        Ok(h.finalize().to_hex().to_string())
    }

    fn dictionary_signature(&self, path: &str, tags: Option<&[String]>) -> Result<String> {
        let tags = match tags {
            Some(t) if !t.is_empty() => t,
            _ => return self.file_signature(path),
        };
        let bytes = self.contents(path).ok_or_else(|| Self::not_found(path))?;
        let text = String::from_utf8_lossy(&bytes);
        let lines = dictionary::parse(path, &text)?;
        let selected = dictionary::select(&lines, tags);
        Ok(dictionary::selection_signature(path, &selected, |part| {
            self.file_signature(part).ok()
        }))
    }

    fn exists(&self, path: &str) -> bool {
        let data = self.data.read();
        if data.contains_key(path) {
            return true;
        }
        let folder = format!("{}/", path.trim_end_matches('/'));
        data.keys().any(|k| k.starts_with(&folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_follows_contents() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", "chr1\t1\n");
        let s1 = reader.file_signature("a.gor").unwrap();
        assert_eq!(s1, reader.file_signature("a.gor").unwrap());

        reader.insert("a.gor", "chr1\t2\n");
        assert_ne!(s1, reader.file_signature("a.gor").unwrap());
    }

    #[test]
    fn test_missing_path() {
        let reader = MemoryFileReader::new();
        let err = reader.file_signature("missing.gor").unwrap_err();
        assert_eq!(err.path(), "missing.gor");
        assert!(!reader.exists("missing.gor"));
    }

    #[test]
    fn test_folder_paths() {
        let reader = MemoryFileReader::new();
        reader.insert("out.gord/p1.gorz", "1");
        assert!(reader.exists("out.gord"));
        assert!(reader.exists("out.gord/"));
        let s1 = reader.file_signature("out.gord").unwrap();
        reader.insert("out.gord/p2.gorz", "2");
        assert_ne!(s1, reader.file_signature("out.gord/").unwrap());
        assert_eq!(reader.list("out.gord/").len(), 2);
    }

    #[test]
    fn test_clones_share_contents() {
        let reader = MemoryFileReader::new();
        let other = reader.clone();
        other.insert("x.tsv", "a\tb\n");
        assert!(reader.exists("x.tsv"));
        assert_eq!(reader.len(), 1);
    }
}
