//! Local filesystem reader.

use std::fs;
use std::path::{Path, PathBuf};

use blake3::Hasher;

use crate::dictionary;
use crate::error::{ReadError, Result};
use crate::FileReader;

/// Reads signatures from the local filesystem. Relative paths are resolved
/// against `root`.
#[derive(Debug, Clone)]
pub struct FsFileReader {
    root: PathBuf,
}

impl FsFileReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.resolve(path)).map_err(|e| ReadError::io(path, e))
    }
}

impl Default for FsFileReader {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Pseudo-etag: hash(size || mtime || path), recursing into directories so a
/// dictionary folder changes signature when any of its parts does.
fn hash_entry(h: &mut Hasher, p: &Path, display: &str) -> Result<()> {
    let meta = fs::metadata(p).map_err(|e| ReadError::io(display, e))?;
    if meta.is_dir() {
        let mut children: Vec<PathBuf> = fs::read_dir(p)
            .map_err(|e| ReadError::io(display, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()
            .map_err(|e| ReadError::io(display, e))?;
        children.sort();
        for child in children {
            let name = child.to_string_lossy().into_owned();
            hash_entry(h, &child, &name)?;
        }
        return Ok(());
    }
    h.update(&meta.len().to_le_bytes());
    if let Ok(m) = meta.modified() {
        if let Ok(d) = m.duration_since(std::time::SystemTime::UNIX_EPOCH) {
            h.update(&d.as_secs().to_le_bytes());
            h.update(&d.subsec_nanos().to_le_bytes());
        }
    }
    if let Some(s) = p.to_str() {
        h.update(s.as_bytes());
    }
    Ok(())
}

impl FileReader for FsFileReader {
    fn file_signature(&self, path: &str) -> Result<String> {
        let mut h = Hasher::new();
        hash_entry(&mut h, &self.resolve(path), path)?;
        Ok(h.finalize().to_hex().to_string())
    }

    fn dictionary_signature(&self, path: &str, tags: Option<&[String]>) -> Result<String> {
        let tags = match tags {
            Some(t) if !t.is_empty() => t,
            _ => return self.file_signature(path),
        };
        let text = self.read_to_string(path)?;
        let lines = dictionary::parse(path, &text)?;
        let selected = dictionary::select(&lines, tags);
        tracing::trace!(
            dictionary = path,
            tags = tags.len(),
            selected = selected.len(),
            "dictionary signature"
        );
        Ok(dictionary::selection_signature(path, &selected, |part| {
            self.file_signature(part).ok()
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}
