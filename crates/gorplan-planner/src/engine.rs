//! One planning round.
//!
//! Every top-level block of the batch is planned independently on the rayon
//! pool: substitute known placeholders, tag parallel queries with a
//! signature, expand macros, split the expansion into ready and deferred
//! tasks, and resolve the ready ones through the fan-out resolver. Each
//! worker returns a [`BlockOutcome`]; the outcomes are folded into the
//! session and the batch in one step afterwards, so the only state touched
//! concurrently is the registry and the signature memo tables.

use std::collections::HashMap;
use std::sync::Arc;

use gorplan_core::hash::fingerprint_parts;
use gorplan_core::query::{
    canonical_placeholder, first_verb, is_dictionary_folder_query, is_gord, mark_as_folder,
    strip_trailing_slash, used_files, write_target, WriteTarget,
};
use gorplan_core::{Error, PlannerConfig, Result, Task, TaskMap, TERMINAL_MARKER};
use rayon::prelude::*;

use crate::batch::ExecutionBatch;
use crate::fanout::{FanOutRequest, FanOutResolver, SplitResolver};
use crate::macros::{expand_to_fixed_point, MacroRegistry};
use crate::registry::is_external_reference;
use crate::session::{PlanContext, PlanningSession};

/// What a round hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutput {
    /// The overall command; replaced when a terminal entry was produced.
    pub command: String,
    /// Non-placeholder files read by active tasks (suggest-name mode only),
    /// sorted and deduplicated.
    pub used_files: Vec<String>,
}

#[derive(Debug)]
struct NewCommand {
    signature: String,
    query: String,
    batch_group_name: String,
    create_name: String,
    cache_file: Option<String>,
    /// Entry query as the resolver produced it, before any path rewrite.
    source_query: String,
}

#[derive(Debug)]
struct BlockOutcome {
    block: Task,
    retire: bool,
    deferred: TaskMap,
    aliases: HashMap<String, String>,
    commands: Vec<NewCommand>,
    terminal: Option<String>,
    used_files: Vec<String>,
}

impl BlockOutcome {
    fn new(block: Task) -> Self {
        Self {
            block,
            retire: false,
            deferred: TaskMap::new(),
            aliases: HashMap::new(),
            commands: Vec::new(),
            terminal: None,
            used_files: Vec::new(),
        }
    }
}

/// Look for an explicit trailing `write` and work out the cache location.
///
/// Returns `(cache_path, has_fork_write)`. A `write` without a target gets
/// `<cache_dir>/<signature>.gord` appended to the query when the task has a
/// signature.
pub fn explicit_write(config: &PlannerConfig, task: &mut Task) -> Option<(Option<String>, bool)> {
    match write_target(&task.query)? {
        WriteTarget::Fork => Some((None, true)),
        WriteTarget::Template { folder } => Some((Some(folder), true)),
        WriteTarget::Path(path) => Some((Some(path), false)),
        WriteTarget::Missing => {
            let signature = task.signature.clone()?;
            let path = config.relativize(&format!("{}{}.gord", config.cache_folder(), signature));
            let query = format!("{} {}", task.query, path);
            task.set_query(query);
            Some((Some(path), false))
        }
    }
}

/// Replace `old` (with or without trailing slashes) by `new` everywhere in
/// `query`.
fn replace_path(query: &str, old: &str, new: &str) -> String {
    let needle = strip_trailing_slash(old);
    if needle.is_empty() {
        return query.to_string();
    }
    let mut out = String::with_capacity(query.len() + new.len());
    let mut rest = query;
    while let Some(i) = rest.find(needle) {
        out.push_str(&rest[..i]);
        out.push_str(new);
        rest = rest[i + needle.len()..].trim_start_matches('/');
    }
    out.push_str(rest);
    out
}

pub struct Planner {
    macros: MacroRegistry,
    resolver: Arc<dyn FanOutResolver>,
}

impl Planner {
    pub fn new(macros: MacroRegistry, resolver: Arc<dyn FanOutResolver>) -> Self {
        Self { macros, resolver }
    }

    /// Planner with the reference `-split` resolver.
    pub fn with_macros(macros: MacroRegistry) -> Self {
        Self::new(macros, Arc::new(SplitResolver))
    }

    /// Plan one round over `batch`.
    ///
    /// Deferred tasks are added to `session.tasks`, retired top-level tasks
    /// removed from it, and follow-on commands queued on `batch`.
    pub fn plan_round(
        &self,
        ctx: &PlanContext,
        session: &mut PlanningSession,
        suggest_name: bool,
        batch: &mut ExecutionBatch,
        validate: bool,
        current_command: &str,
    ) -> Result<RoundOutput> {
        for block in batch.blocks() {
            session.registry.declare_task(block)?;
        }

        let shared: &PlanningSession = &*session;
        let outcomes = batch
            .blocks()
            .par_iter()
            .map(|block| self.plan_block(ctx, shared, block.clone(), suggest_name, validate))
            .collect::<Result<Vec<_>>>()?;

        self.merge(ctx, session, batch, outcomes, current_command)
    }

    fn plan_block(
        &self,
        ctx: &PlanContext,
        session: &PlanningSession,
        mut block: Task,
        suggest_name: bool,
        validate: bool,
    ) -> Result<BlockOutcome> {
        let substituted = session.registry.substitute(&block.query);
        block.set_query(substituted);

        if validate
            && block.signature.is_none()
            && block.dependencies.is_empty()
            && ctx.config.is_parallel_verb(&first_verb(&block.query))
        {
            let used = used_files(&block.query);
            block.signature = Some(session.signatures.query_signature(ctx, &block.query, &used)?);
            if let Some((cache_path, fork)) = explicit_write(&ctx.config, &mut block) {
                block.cache_path = cache_path;
                block.has_fork_write = fork;
            }
        }

        let mut outcome = BlockOutcome::new(block.clone());

        let mut input = TaskMap::new();
        input.insert(block.name.clone(), block.clone());
        let expansion = expand_to_fixed_point(&self.macros, input, ctx, session, validate)?;
        outcome.aliases = expansion.aliases;

        let mut active = TaskMap::new();
        for (name, task) in expansion.tasks.iter() {
            for dep in &task.dependencies {
                let known = session.registry.contains(dep)
                    || expansion.tasks.contains_key(dep)
                    || outcome
                        .aliases
                        .keys()
                        .any(|k| canonical_placeholder(k).as_deref() == Some(dep.as_str()))
                    || session.tasks.contains_key(dep)
                    || is_external_reference(dep);
                if !known {
                    return Err(Error::parsing(dep.as_str(), "reference to undeclared placeholder"));
                }
            }
            let produced = name != TERMINAL_MARKER
                && session
                    .registry
                    .get(task.produces())
                    .map(|e| e.is_resolved())
                    .unwrap_or(false);
            if produced {
                tracing::trace!(task = %name, "already produced, dropping");
                if *name == block.name {
                    outcome.retire = true;
                }
                continue;
            }
            if session.registry.dependencies_ready(&task.dependencies) {
                active.insert(name.clone(), task.clone());
            } else {
                tracing::trace!(task = %name, "dependencies pending, deferring");
                outcome.deferred.insert(name.clone(), task.clone());
            }
        }

        session.registry.register_tasks(&active)?;

        for (name, mut task) in active {
            let substituted = session.registry.substitute(&task.query);
            if substituted != task.query {
                task.set_query(substituted);
            }
            let (cache_path, has_fork) = match task.cache_path.clone() {
                Some(p) => (Some(p), task.has_fork_write),
                None => explicit_write(&ctx.config, &mut task)
                    .unwrap_or((None, task.has_fork_write)),
            };
            let used = used_files(&task.query);

            let request = FanOutRequest {
                task_name: name.clone(),
                output: task.output.clone(),
                query: task.query.clone(),
                cache_path,
                has_fork_write: has_fork,
                is_final: task.is_final,
            };
            let result = self.resolver.expand(&request, ctx)?;
            if result.remove_from_create {
                outcome.retire = true;
            }

            for entry in result.entries {
                if entry.is_terminal() {
                    if !task.is_final {
                        return Err(Error::Invariant(format!(
                            "terminal entry produced by non-final task '{name}'"
                        )));
                    }
                    if outcome.terminal.is_some() {
                        return Err(Error::Invariant(format!(
                            "more than one terminal entry produced by '{}'",
                            block.name
                        )));
                    }
                    outcome.terminal = Some(entry.query);
                    outcome.retire = true;
                    continue;
                }

                let is_folder = is_dictionary_folder_query(&entry.query);
                let signature = match (&block.signature, is_folder) {
                    (Some(sig), true) => sig.clone(),
                    _ => {
                        let files = if validate {
                            session.signatures.file_set_signature(ctx, &task.query, &used)?
                        } else {
                            String::new()
                        };
                        fingerprint_parts([entry.query.as_str(), files.as_str()])
                    }
                };

                let command = match entry.cache_file.as_deref() {
                    Some(cf) if !is_folder && !has_fork && is_gord(cf) => {
                        let target = format!("{}{}.gorz", mark_as_folder(cf), signature);
                        NewCommand {
                            query: replace_path(&entry.query, cf, &target),
                            cache_file: Some(target),
                            signature,
                            batch_group_name: entry.batch_group_name,
                            create_name: entry.create_name,
                            source_query: entry.query,
                        }
                    }
                    _ => NewCommand {
                        query: entry.query.clone(),
                        cache_file: entry.cache_file,
                        signature,
                        batch_group_name: entry.batch_group_name,
                        create_name: entry.create_name,
                        source_query: entry.query,
                    },
                };
                outcome.commands.push(command);
            }

            if suggest_name {
                outcome
                    .used_files
                    .extend(used.into_iter().filter(|f| !f.starts_with('[')));
            }
        }

        Ok(outcome)
    }

    fn merge(
        &self,
        ctx: &PlanContext,
        session: &mut PlanningSession,
        batch: &mut ExecutionBatch,
        outcomes: Vec<BlockOutcome>,
        current_command: &str,
    ) -> Result<RoundOutput> {
        let mut command = current_command.to_string();
        let mut terminal_from: Option<String> = None;
        let mut used = Vec::new();
        let mut blocks = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let group = outcome.block.name.clone();
            if outcome.retire {
                session.tasks.remove(&group);
            }
            session.tasks.extend(outcome.deferred);
            session.registry.register_aliases(&outcome.aliases)?;

            for c in outcome.commands {
                batch.create_new_command(
                    &c.signature,
                    &c.query,
                    &c.batch_group_name,
                    &c.create_name,
                    c.cache_file.as_deref(),
                );
                ctx.events
                    .command_created(&c.create_name, &group, &c.signature, &c.source_query);
            }

            if let Some(terminal) = outcome.terminal {
                if let Some(first) = &terminal_from {
                    return Err(Error::Invariant(format!(
                        "terminal entries from both '{first}' and '{group}' in one round"
                    )));
                }
                terminal_from = Some(group.clone());
                command = terminal;
            }

            used.extend(outcome.used_files);
            blocks.push(outcome.block);
        }

        used.sort();
        used.dedup();
        tracing::debug!(
            blocks = blocks.len(),
            commands = batch.commands().len(),
            pending = session.tasks.len(),
            terminal = terminal_from.is_some(),
            "planning round complete"
        );
        batch.replace_blocks(blocks);

        Ok(RoundOutput {
            command,
            used_files: used,
        })
    }
}
