//! The caller-owned container for one planning round.

use gorplan_core::query::{is_dictionary_query, is_nor_query};
use gorplan_core::{PlannerConfig, Task, TaskMap};

/// A command queued for execution before the next round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommand {
    pub signature: String,
    pub query: String,
    pub batch_group_name: String,
    /// Placeholder the command's output resolves.
    pub create_name: String,
    pub cache_file: String,
}

/// Result file extension for a query's output.
pub fn cache_extension(query: &str) -> &'static str {
    if is_dictionary_query(query) {
        ".gord"
    } else if is_nor_query(query) {
        ".tsv"
    } else {
        ".gorz"
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionBatch {
    blocks: Vec<Task>,
    commands: Vec<BatchCommand>,
    cache_folder: String,
}

impl ExecutionBatch {
    pub fn new(blocks: Vec<Task>, config: &PlannerConfig) -> Self {
        Self {
            blocks,
            commands: Vec::new(),
            cache_folder: config.cache_folder(),
        }
    }

    /// A batch over a snapshot of the persistent task set.
    pub fn from_tasks(tasks: &TaskMap, config: &PlannerConfig) -> Self {
        Self::new(tasks.values().cloned().collect(), config)
    }

    pub fn blocks(&self) -> &[Task] {
        &self.blocks
    }

    /// Blocks after substitution and signature tagging.
    pub(crate) fn replace_blocks(&mut self, blocks: Vec<Task>) {
        self.blocks = blocks;
    }

    /// Queue a command. Without an explicit `cache_file` the output goes to
    /// `<cache_dir>/<signature><ext>`.
    pub fn create_new_command(
        &mut self,
        signature: &str,
        query: &str,
        batch_group_name: &str,
        create_name: &str,
        cache_file: Option<&str>,
    ) -> &BatchCommand {
        let cache_file = match cache_file {
            Some(f) => f.to_string(),
            None => format!("{}{}{}", self.cache_folder, signature, cache_extension(query)),
        };
        self.commands.push(BatchCommand {
            signature: signature.to_string(),
            query: query.to_string(),
            batch_group_name: batch_group_name.to_string(),
            create_name: create_name.to_string(),
            cache_file,
        });
        &self.commands[self.commands.len() - 1]
    }

    pub fn commands(&self) -> &[BatchCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BatchCommand> {
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_cache_paths() {
        let cfg = PlannerConfig {
            cache_dir: "cache/".into(),
            ..Default::default()
        };
        let mut batch = ExecutionBatch::new(Vec::new(), &cfg);
        let c = batch.create_new_command("abc", "gor a.gor", "[a]", "[a]", None);
        assert_eq!(c.cache_file, "cache/abc.gorz");
        let c = batch.create_new_command("def", "nor a.tsv", "[b]", "[b]", None);
        assert_eq!(c.cache_file, "cache/def.tsv");
        let c = batch.create_new_command("ghi", "gordictpart [p1] chr1", "[c]", "[c]", None);
        assert_eq!(c.cache_file, "cache/ghi.gord");
        let c = batch.create_new_command("jkl", "gor a.gor", "[d]", "[d]", Some("out/d.gorz"));
        assert_eq!(c.cache_file, "out/d.gorz");
        assert_eq!(batch.commands().len(), 4);
        assert_eq!(batch.take_commands().len(), 4);
        assert!(batch.commands().is_empty());
    }
}
