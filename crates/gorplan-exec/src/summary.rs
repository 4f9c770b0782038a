//! What a run hands back, with a stable digest for provenance.

use std::collections::BTreeMap;

use gorplan_core::hash::{hash_serde, Hash256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The final query with every placeholder replaced by its file.
    pub command: String,
    /// Real input files read along the way, sorted.
    pub used_files: Vec<String>,
    /// Placeholder to produced file, for every placeholder resolved.
    pub created_files: BTreeMap<String, String>,
    pub rounds: usize,
    pub executed: usize,
    pub cached: usize,
    pub version: String,
}

impl RunSummary {
    /// Digest over the final command and the produced files. Two runs over
    /// unchanged inputs agree on it whether they executed or hit the cache.
    pub fn digest(&self) -> gorplan_core::Result<Hash256> {
        hash_serde(&(&self.command, &self.created_files))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
