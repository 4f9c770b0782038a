//! Dictionary files: tab-separated listings of partition files.
//!
//! Each non-comment line is `file [TAB alias [TAB ... [TAB tags]]]`, where
//! `tags` is a comma-separated list. A line is selected by a tag when the tag
//! equals its alias or one of its tags.

use blake3::Hasher;

use crate::error::{ReadError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryLine {
    pub file: String,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub raw: String,
}

impl DictionaryLine {
    pub fn matches(&self, tag: &str) -> bool {
        self.alias.as_deref() == Some(tag) || self.tags.iter().any(|t| t == tag)
    }
}

pub fn parse(path: &str, text: &str) -> Result<Vec<DictionaryLine>> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = trimmed.split('\t').collect();
        let file = cols[0].trim();
        if file.is_empty() {
            return Err(ReadError::Dictionary {
                path: path.to_string(),
                message: format!("line {} has no file column", lineno + 1),
            });
        }
        let alias = cols
            .get(1)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(String::from);
        let tags = if cols.len() > 2 {
            cols[cols.len() - 1]
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        } else {
            Vec::new()
        };
        out.push(DictionaryLine {
            file: file.to_string(),
            alias,
            tags,
            raw: trimmed.to_string(),
        });
    }
    Ok(out)
}

/// Lines selected by any of `tags`, in file order.
pub fn select<'a>(lines: &'a [DictionaryLine], tags: &[String]) -> Vec<&'a DictionaryLine> {
    lines
        .iter()
        .filter(|l| tags.iter().any(|t| l.matches(t)))
        .collect()
}

/// Part paths are relative to the directory holding the dictionary.
pub fn resolve_part(dictionary_path: &str, file: &str) -> String {
    if file.starts_with('/') || file.contains("://") {
        return file.to_string();
    }
    match dictionary_path.rfind('/') {
        Some(i) => format!("{}/{}", &dictionary_path[..i], file),
        None => file.to_string(),
    }
}

/// Fingerprint of the selected lines. `part_signature` supplies the content
/// signature of each referenced part when it can be read.
pub fn selection_signature<F>(
    path: &str,
    selected: &[&DictionaryLine],
    mut part_signature: F,
) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut h = Hasher::new();
    for line in selected {
        h.update(line.raw.as_bytes());
        h.update(b"\n");
        if let Some(sig) = part_signature(&resolve_part(path, &line.file)) {
            h.update(sig.as_bytes());
        }
    }
    h.finalize().to_hex().to_string()
}
