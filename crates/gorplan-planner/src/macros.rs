//! Macro registry and the fixed-point expansion loop.

use std::collections::HashMap;
use std::sync::Arc;

use gorplan_core::query::{first_stage, words};
use gorplan_core::{Error, ExpansionResult, Result, Task, TaskMap};

use crate::session::{PlanContext, PlanningSession};

/// A rewrite rule keyed by the leading verb of a task's first stage.
///
/// The returned tasks replace the expanded one. To keep the user's answer
/// terminal-eligible, derive its replacement from `task` so `is_final`
/// carries over.
pub trait Macro: Send + Sync {
    fn expand(
        &self,
        task_name: &str,
        task: &Task,
        ctx: &PlanContext,
        session: &PlanningSession,
        dry_run: bool,
        args: &[String],
    ) -> Result<ExpansionResult>;
}

#[derive(Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, Arc<dyn Macro>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, verb: &str, m: Arc<dyn Macro>) {
        self.macros.insert(verb.to_ascii_lowercase(), m);
    }

    pub fn lookup(&self, verb: &str) -> Option<Arc<dyn Macro>> {
        self.macros.get(&verb.to_ascii_lowercase()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Output of [`expand_to_fixed_point`].
#[derive(Debug, Default)]
pub struct Expansion {
    pub tasks: TaskMap,
    pub aliases: HashMap<String, String>,
    /// Passes that fired at least one macro.
    pub passes: usize,
}

/// Rewrite tasks until no task's leading verb is a registered macro.
///
/// Each pass visits every task once; a pass in which no macro fires ends the
/// loop. More than `config.max_expansion_rounds` firing passes is an error.
pub fn expand_to_fixed_point(
    macros: &MacroRegistry,
    tasks: TaskMap,
    ctx: &PlanContext,
    session: &PlanningSession,
    validate: bool,
) -> Result<Expansion> {
    let origin = tasks.keys().next().cloned().unwrap_or_default();
    let cap = ctx.config.max_expansion_rounds;
    let mut active = tasks;
    let mut aliases = HashMap::new();

    for pass in 0..=cap {
        let mut next = TaskMap::new();
        let mut fired = false;
        for (name, task) in active {
            let stage_words = words(&first_stage(&task.query));
            let found = stage_words.first().and_then(|verb| macros.lookup(verb));
            let Some(m) = found else {
                next.insert(name, task);
                continue;
            };
            fired = true;
            tracing::trace!(task = %name, verb = %stage_words[0], pass, "expanding macro");
            let result = m.expand(&name, &task, ctx, session, !validate, &stage_words[1..])?;
            next.extend(result.tasks);
            aliases.extend(result.aliases);
        }
        active = next;
        if !fired {
            return Ok(Expansion {
                tasks: active,
                aliases,
                passes: pass,
            });
        }
    }

    Err(Error::ExpansionLimit {
        task: origin,
        rounds: cap,
    })
}
