//! Planning units and the explicit result shapes exchanged with macros and
//! fan-out resolvers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::query::{canonical_placeholder, placeholder_tokens, split_placeholder_write};

/// `create_name` of the command entry that is the overall query result.
pub const TERMINAL_MARKER: &str = "[]";

/// Tasks keyed by name. Ordered so that rounds are reproducible.
pub type TaskMap = BTreeMap<String, Task>;

/// One pipeline fragment being planned (an execution block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique key; also the placeholder this task satisfies.
    pub name: String,
    pub query: String,
    /// Canonical placeholder names the query still references.
    pub dependencies: BTreeSet<String>,
    /// Set once for parallel-capable top-level tasks, reused across rounds.
    pub signature: Option<String>,
    /// Explicit output location from a trailing `write`.
    pub cache_path: Option<String>,
    /// The detected `write` target is a per-fork template.
    pub has_fork_write: bool,
    /// Holds the user's final query; only such a task may become terminal.
    pub is_final: bool,
    /// Top-level task this one was derived from.
    pub batch_group_name: String,
    /// Placeholder named by a trailing `write [name]`. The stage is removed
    /// from `query` and the task produces this placeholder.
    #[serde(default)]
    pub output: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        let name = name.into();
        let (query, output) = split_placeholder_write(&query.into());
        Self {
            dependencies: dependencies_of(&query),
            batch_group_name: name.clone(),
            name,
            query,
            signature: None,
            cache_path: None,
            has_fork_write: false,
            is_final: false,
            output,
        }
    }

    /// The block holding the query the user actually asked for.
    pub fn final_query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            is_final: true,
            ..Self::new(name, query)
        }
    }

    /// A task derived from `parent` by expansion or fan-out.
    pub fn derived(name: impl Into<String>, query: impl Into<String>, parent: &str) -> Self {
        Self {
            batch_group_name: parent.to_string(),
            ..Self::new(name, query)
        }
    }

    /// Placeholder whose entry this task resolves.
    pub fn produces(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.name)
    }

    /// Replace the query text and recompute dependencies.
    pub fn set_query(&mut self, query: impl Into<String>) {
        let (query, output) = split_placeholder_write(&query.into());
        self.query = query;
        if output.is_some() {
            self.output = output;
        }
        self.dependencies = dependencies_of(&self.query);
    }
}

/// Canonical placeholder names referenced by `query`.
pub fn dependencies_of(query: &str) -> BTreeSet<String> {
    placeholder_tokens(query)
        .iter()
        .filter_map(|t| canonical_placeholder(t))
        .collect()
}

/// One command produced by fan-out resolution of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub query: String,
    /// Destination placeholder, or [`TERMINAL_MARKER`].
    pub create_name: String,
    pub cache_file: Option<String>,
    /// Originating task, for lineage.
    pub batch_group_name: String,
}

impl CommandEntry {
    pub fn new(
        query: impl Into<String>,
        create_name: impl Into<String>,
        cache_file: Option<String>,
        batch_group_name: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            create_name: create_name.into(),
            cache_file,
            batch_group_name: batch_group_name.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.create_name == TERMINAL_MARKER
    }
}

/// What a macro hands back: the tasks replacing the expanded one and any
/// aliases to merge into the session's alias table.
#[derive(Debug, Clone, Default)]
pub struct ExpansionResult {
    pub tasks: TaskMap,
    pub aliases: HashMap<String, String>,
}

impl ExpansionResult {
    pub fn single(task: Task) -> Self {
        let mut tasks = TaskMap::new();
        tasks.insert(task.name.clone(), task);
        Self {
            tasks,
            aliases: HashMap::new(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.insert(task.name.clone(), task);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }
}

/// What a fan-out resolver hands back for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutResult {
    pub entries: Vec<CommandEntry>,
    /// Retire the originating task however many entries were produced.
    pub remove_from_create: bool,
}
