//! Content signatures for files and query fragments.
//!
//! Two append-only memo tables live here for the duration of a session: one
//! per file reference, one per (used files + signature key). A query's
//! signature is `fingerprint(query + file_set_signature)`, so identical text
//! over unchanged inputs always lands on the same cache file.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use gorplan_core::hash::{fingerprint, fingerprint_parts};
use gorplan_core::query::{contains_write, is_dictionary_query, is_template_file, signature_timeres};
use gorplan_core::Result;
use parking_lot::RwLock;

use crate::session::PlanContext;

/// Prefix of a dictionary-with-tags file reference.
pub const DICTIONARY_REFERENCE_PREFIX: &str = "#gordict#";
pub const DICTIONARY_TAGS_MARKER: &str = "#gortags#";

/// Split `#gordict#<file>[#gortags#a,b,...]` into the dictionary path and its
/// tags.
pub fn parse_dictionary_reference(path: &str) -> Option<(&str, Option<Vec<String>>)> {
    let rest = path.strip_prefix(DICTIONARY_REFERENCE_PREFIX)?;
    Some(match rest.split_once(DICTIONARY_TAGS_MARKER) {
        Some((file, tags)) => (
            file,
            Some(
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        ),
        None => (rest, None),
    })
}

/// Extra signature input for queries with a `signature -timeres` stage: the
/// current time bucket, so the result is recomputed once per bucket.
pub fn signature_key(query: &str) -> String {
    match signature_timeres(query) {
        Some(timeres) if timeres > 0 => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            (now / timeres).to_string()
        }
        _ => String::new(),
    }
}

/// File name up to its first `.`.
fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

#[derive(Default)]
pub struct SignatureCache {
    files: RwLock<HashMap<String, String>>,
    file_sets: RwLock<HashMap<String, String>>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature of one file reference, memoized per path.
    pub fn file_signature(&self, ctx: &PlanContext, path: &str) -> Result<String> {
        if let Some(sig) = self.files.read().get(path) {
            return Ok(sig.clone());
        }
        let sig = compute_file_signature(ctx, path)?;
        Ok(self
            .files
            .write()
            .entry(path.to_string())
            .or_insert(sig)
            .clone())
    }

    /// Combined signature of the files a query reads.
    pub fn file_set_signature(
        &self,
        ctx: &PlanContext,
        query: &str,
        used_files: &[String],
    ) -> Result<String> {
        let file_list_key = used_files.join(" ");
        if is_dictionary_query(query) {
            return Ok(fingerprint(&file_list_key));
        }

        let key = signature_key(query);
        let forced = used_files.iter().any(|f| is_template_file(f))
            || (ctx.config.force_run_side_effects && contains_write(query));
        if forced {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            tracing::debug!(query, "forcing a cache miss");
            return Ok(fingerprint(&format!("{nanos}{file_list_key}{key}")));
        }

        let memo_key = format!("{file_list_key}{key}");
        if let Some(sig) = self.file_sets.read().get(&memo_key) {
            return Ok(sig.clone());
        }
        let sigs = used_files
            .iter()
            .map(|f| self.file_signature(ctx, f))
            .collect::<Result<Vec<_>>>()?;
        let sig = fingerprint_parts([sigs.join(" ").as_str(), key.as_str()]);
        Ok(self
            .file_sets
            .write()
            .entry(memo_key)
            .or_insert(sig)
            .clone())
    }

    /// `fingerprint(query + file_set_signature(query, used_files))`.
    pub fn query_signature(
        &self,
        ctx: &PlanContext,
        query: &str,
        used_files: &[String],
    ) -> Result<String> {
        let files = self.file_set_signature(ctx, query, used_files)?;
        Ok(fingerprint_parts([query, files.as_str()]))
    }

    pub fn file_entries(&self) -> usize {
        self.files.read().len()
    }

    pub fn file_set_entries(&self) -> usize {
        self.file_sets.read().len()
    }
}

fn compute_file_signature(ctx: &PlanContext, path: &str) -> Result<String> {
    let cfg = &ctx.config;
    if let Some((dictionary, tags)) = parse_dictionary_reference(path) {
        let tags = tags.filter(|t| match cfg.dictionary_tag_limit {
            Some(limit) => t.len() <= limit,
            None => true,
        });
        tracing::trace!(dictionary, tagged = tags.is_some(), "dictionary signature");
        return Ok(ctx.reader.dictionary_signature(dictionary, tags.as_deref())?);
    }

    if cfg.md5_cache_names {
        let stem = file_stem(path);
        if stem.ends_with("_md5") {
            return Ok(stem.to_string());
        }
    }
    if cfg.cache_dir_shortcut && cfg.is_in_cache_dir(path) {
        return Ok("0".to_string());
    }
    Ok(ctx.reader.file_signature(path)?)
}
