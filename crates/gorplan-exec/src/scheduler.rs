//! Dependency levels over the commands one round queued.
//!
//! A command is ready once every placeholder its query references resolves
//! in the registry. Commands of a level are independent of each other and
//! may run concurrently; running a level can make the next one ready.

use std::collections::BTreeSet;

use gorplan_core::task::dependencies_of;
use gorplan_planner::{BatchCommand, PlaceholderRegistry};

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<(BatchCommand, BTreeSet<String>)>,
}

impl CommandQueue {
    pub fn new(commands: Vec<BatchCommand>) -> Self {
        Self {
            pending: commands
                .into_iter()
                .map(|c| {
                    let deps = dependencies_of(&c.query);
                    (c, deps)
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every queued command whose placeholders resolve.
    pub fn next_level(&mut self, registry: &PlaceholderRegistry) -> Vec<BatchCommand> {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, deps)| registry.dependencies_ready(deps));
        self.pending = waiting;
        ready.into_iter().map(|(c, _)| c).collect()
    }

    /// `create_name`s of the commands still waiting.
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.iter().map(|(c, _)| c.create_name.clone()).collect()
    }
}
