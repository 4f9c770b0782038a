//! Placeholder registry ("virtual files").
//!
//! Every `[name]` token a query can reference gets one entry here. Entries
//! are created on first reference, resolved once when the producing command
//! finishes, and never removed for the lifetime of a session.

use std::collections::{BTreeMap, HashMap};

use gorplan_core::query::{canonical_placeholder, placeholder_tokens, replace_placeholders};
use gorplan_core::{Error, Result, Task, TaskMap, TERMINAL_MARKER};
use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderEntry {
    /// Canonical `[name]` form.
    pub name: String,
    /// Concrete output path once produced.
    pub file_name: Option<String>,
    /// Declared by the user's script.
    pub is_original: bool,
    /// Qualified reference into another project (`grid:foo`), not a URL.
    pub is_external: bool,
}

impl PlaceholderEntry {
    fn new(name: String) -> Self {
        let is_external = is_external_reference(&name);
        Self {
            name,
            file_name: None,
            is_original: false,
            is_external,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.file_name.is_some()
    }
}

/// `prefix:rest` with an identifier prefix, where `rest` is not `//...`.
pub fn is_external_reference(name: &str) -> bool {
    let inner = name
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    let Some((prefix, rest)) = inner.split_once(':') else {
        return false;
    };
    let mut chars = prefix.chars();
    let starts_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !rest.starts_with("//")
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, PlaceholderEntry>,
    aliases: HashMap<String, String>,
}

impl Inner {
    fn key(&self, name: &str) -> Option<String> {
        let canonical = canonical_placeholder(name)?;
        Some(self.aliases.get(&canonical).cloned().unwrap_or(canonical))
    }
}

/// Thread-safe registry. Mutation is serialized; lookups run concurrently.
#[derive(Default)]
pub struct PlaceholderRegistry {
    inner: RwLock<Inner>,
}

impl PlaceholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `name`, creating it on first use.
    pub fn declare(&self, name: &str) -> Result<PlaceholderEntry> {
        let mut inner = self.inner.write();
        let key = inner
            .key(name)
            .ok_or_else(|| Error::parsing(name, "empty placeholder name"))?;
        Ok(inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| PlaceholderEntry::new(key))
            .clone())
    }

    /// Declare the placeholder `task` produces.
    ///
    /// A task writing to `[name]` produces that placeholder, and its own name
    /// becomes an alias of it. The final task produces none and may not
    /// write to a placeholder.
    pub fn declare_task(&self, task: &Task) -> Result<()> {
        let Some(output) = &task.output else {
            if task.name != TERMINAL_MARKER {
                self.declare(&task.name)?;
            }
            return Ok(());
        };
        if task.is_final {
            return Err(Error::parsing(
                output.as_str(),
                "final query cannot write to a placeholder",
            ));
        }
        let target = self.declare(output)?.name;
        if let Some(own) = canonical_placeholder(&task.name) {
            if own != target && task.name != TERMINAL_MARKER {
                let mut inner = self.inner.write();
                if let Some(stale) = inner.entries.get(&own) {
                    if stale.is_resolved() {
                        return Err(Error::parsing(
                            task.name.as_str(),
                            "placeholder already produced under its own name",
                        ));
                    }
                }
                inner.entries.remove(&own);
                inner.aliases.insert(own, target);
            }
        }
        Ok(())
    }

    /// Declare every task's output and every placeholder token the tasks
    /// reference.
    pub fn register_tasks(&self, tasks: &TaskMap) -> Result<()> {
        for task in tasks.values() {
            self.declare_task(task)?;
            for token in placeholder_tokens(&task.query) {
                self.declare(&token)?;
            }
        }
        Ok(())
    }

    /// Record the produced file for `name`. The first resolution wins.
    pub fn resolve(&self, name: &str, file_name: &str) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(Error::parsing(name, "empty file name for placeholder"));
        }
        let mut inner = self.inner.write();
        let key = inner
            .key(name)
            .ok_or_else(|| Error::parsing(name, "empty placeholder name"))?;
        let entry = inner
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::parsing(name, "cannot resolve undeclared placeholder"))?;
        match &entry.file_name {
            None => {
                tracing::trace!(placeholder = %key, file = file_name, "resolved");
                entry.file_name = Some(file_name.to_string());
            }
            Some(existing) if existing == file_name => {}
            Some(existing) => {
                tracing::warn!(
                    placeholder = %key,
                    existing = %existing,
                    ignored = file_name,
                    "placeholder already resolved, keeping first file"
                );
            }
        }
        Ok(())
    }

    /// Replace every resolved placeholder token outside quotes with its file.
    /// Unknown tokens are left in place and logged.
    pub fn substitute(&self, query: &str) -> String {
        let inner = self.inner.read();
        replace_placeholders(query, |token| {
            let key = inner.key(token)?;
            match inner.entries.get(&key) {
                Some(entry) => entry.file_name.clone(),
                None => {
                    tracing::warn!(token, "reference to unknown placeholder");
                    None
                }
            }
        })
    }

    /// True iff every name has a resolved entry.
    pub fn dependencies_ready<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = self.inner.read();
        names.into_iter().all(|n| {
            inner
                .key(n.as_ref())
                .and_then(|k| inner.entries.get(&k))
                .map(|e| e.is_resolved())
                .unwrap_or(false)
        })
    }

    /// Original placeholders that were never produced, sorted by name.
    pub fn unresolved_originals(&self) -> Vec<PlaceholderEntry> {
        let inner = self.inner.read();
        let mut out: Vec<_> = inner
            .entries
            .values()
            .filter(|e| e.is_original && !e.is_resolved())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Merge macro-provided aliases (`alias -> target`).
    pub fn register_aliases(&self, aliases: &HashMap<String, String>) -> Result<()> {
        let mut inner = self.inner.write();
        for (alias, target) in aliases {
            let a = canonical_placeholder(alias)
                .ok_or_else(|| Error::parsing(alias.as_str(), "empty alias name"))?;
            let t = canonical_placeholder(target)
                .ok_or_else(|| Error::parsing(target.as_str(), "empty alias target"))?;
            inner.aliases.insert(a, t);
        }
        Ok(())
    }

    pub fn mark_all_original(&self) {
        for entry in self.inner.write().entries.values_mut() {
            entry.is_original = true;
        }
    }

    pub fn get(&self, name: &str) -> Option<PlaceholderEntry> {
        let inner = self.inner.read();
        inner.key(name).and_then(|k| inner.entries.get(&k).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// External references, sorted by name.
    pub fn external_entries(&self) -> Vec<PlaceholderEntry> {
        let inner = self.inner.read();
        let mut out: Vec<_> = inner.entries.values().filter(|e| e.is_external).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Resolved placeholders and their files.
    pub fn created_files(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .entries
            .values()
            .filter_map(|e| e.file_name.clone().map(|f| (e.name.clone(), f)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
