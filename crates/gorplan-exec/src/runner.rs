//! Runner: drive planning rounds to completion and execute what they queue.
//!
//! Per round:
//! - snapshot the persistent task set into an `ExecutionBatch` and plan it;
//! - declare the placeholders the new commands create;
//! - run the commands in dependency levels, each level in parallel on the
//!   rayon pool; existing outputs are reused instead of recomputed;
//! - resolve each command's placeholder to its cache file.
//!
//! The loop ends when no task is left. A round that neither queues a command
//! nor retires a task, or a level with nothing ready, is reported as a stall.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;

use gorplan_core::query::contains_write;
use gorplan_core::{Error, TaskMap, VERSION};
use gorplan_planner::{
    parse_script, BatchCommand, ExecutionBatch, PlanContext, Planner, PlanningSession,
};

use crate::scheduler::CommandQueue;
use crate::summary::RunSummary;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Plan(#[from] Error),
    #[error("command '{command}' failed: {message}")]
    Executor { command: String, message: String },
    #[error("no progress possible; waiting on {0:?}")]
    Stalled(Vec<String>),
    #[error("gave up after {0} planning rounds")]
    RoundLimit(usize),
}

/// Runs one fully substituted command and writes its result to
/// `output_path`.
pub trait Executor: Send + Sync {
    fn execute(&self, query: &str, output_path: &str) -> Result<(), String>;
}

enum CommandOutcome {
    Executed,
    Cached,
}

pub struct ScriptRunner {
    planner: Planner,
    ctx: PlanContext,
    executor: Arc<dyn Executor>,
    validate: bool,
    collect_used_files: bool,
}

impl ScriptRunner {
    pub fn new(planner: Planner, ctx: PlanContext, executor: Arc<dyn Executor>) -> Self {
        Self {
            planner,
            ctx,
            executor,
            validate: true,
            collect_used_files: true,
        }
    }

    /// Without validation no input file is read; signatures then depend on
    /// query text alone.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_used_files(mut self, collect: bool) -> Self {
        self.collect_used_files = collect;
        self
    }

    pub fn context(&self) -> &PlanContext {
        &self.ctx
    }

    /// Parse `text` and run it in a fresh session.
    pub fn run_script(&self, text: &str) -> Result<RunSummary, ExecError> {
        self.run(parse_script(text)?)
    }

    /// Run `tasks` in a fresh session.
    pub fn run(&self, tasks: TaskMap) -> Result<RunSummary, ExecError> {
        let mut session = PlanningSession::start(tasks)?;
        self.run_session(&mut session)
    }

    /// Run whatever is left in `session` to completion.
    pub fn run_session(&self, session: &mut PlanningSession) -> Result<RunSummary, ExecError> {
        let max_rounds = self.ctx.config.max_rounds;
        let mut summary = RunSummary {
            version: VERSION.to_string(),
            ..Default::default()
        };

        while !session.is_done() {
            if summary.rounds == max_rounds {
                return Err(ExecError::RoundLimit(max_rounds));
            }
            summary.rounds += 1;

            let before = session.tasks.keys().cloned().collect::<Vec<_>>();
            let mut batch = ExecutionBatch::from_tasks(&session.tasks, &self.ctx.config);
            let output = self.planner.plan_round(
                &self.ctx,
                session,
                self.collect_used_files,
                &mut batch,
                self.validate,
                &summary.command,
            )?;
            let terminal = output.command != summary.command;
            summary.command = output.command;
            summary.used_files.extend(output.used_files);

            let commands = batch.take_commands();
            let retired = session.tasks.keys().ne(before.iter());
            if commands.is_empty() && !terminal && !retired {
                return Err(ExecError::Stalled(before));
            }
            tracing::debug!(
                round = summary.rounds,
                commands = commands.len(),
                pending = session.tasks.len(),
                "executing round"
            );

            for command in &commands {
                session.registry.declare(&command.create_name)?;
            }
            let (executed, cached) = self.execute_levels(session, commands)?;
            summary.executed += executed;
            summary.cached += cached;
        }

        for entry in session.registry.unresolved_originals() {
            tracing::warn!(placeholder = %entry.name, "created placeholder was never produced");
        }

        summary.command = session.registry.substitute(&summary.command);
        summary.used_files.sort();
        summary.used_files.dedup();
        summary.created_files = session.registry.created_files();
        tracing::debug!(
            rounds = summary.rounds,
            executed = summary.executed,
            cached = summary.cached,
            "run complete"
        );
        Ok(summary)
    }

    fn execute_levels(
        &self,
        session: &PlanningSession,
        commands: Vec<BatchCommand>,
    ) -> Result<(usize, usize), ExecError> {
        let mut queue = CommandQueue::new(commands);
        let (mut executed, mut cached) = (0, 0);

        while !queue.is_empty() {
            let level = queue.next_level(&session.registry);
            if level.is_empty() {
                return Err(ExecError::Stalled(queue.pending_names()));
            }

            let outcomes = level
                .par_iter()
                .map(|c| self.run_command(session, c))
                .collect::<Result<Vec<_>, ExecError>>()?;

            for (command, outcome) in level.iter().zip(outcomes) {
                match outcome {
                    CommandOutcome::Executed => executed += 1,
                    CommandOutcome::Cached => cached += 1,
                }
                session
                    .registry
                    .resolve(&command.create_name, &command.cache_file)?;
            }
        }
        Ok((executed, cached))
    }

    fn run_command(
        &self,
        session: &PlanningSession,
        command: &BatchCommand,
    ) -> Result<CommandOutcome, ExecError> {
        let query = session.registry.substitute(&command.query);
        let events = &self.ctx.events;

        let forced = self.ctx.config.force_run_side_effects && contains_write(&query);
        if !forced && self.ctx.reader.exists(&command.cache_file) {
            events.command_cached(&command.create_name, &command.cache_file);
            return Ok(CommandOutcome::Cached);
        }

        events.command_started(&command.create_name, &command.cache_file, &query);
        let start = Instant::now();
        self.executor
            .execute(&query, &command.cache_file)
            .map_err(|message| ExecError::Executor {
                command: command.create_name.clone(),
                message,
            })?;
        events.command_ended(&command.create_name, &command.cache_file, start.elapsed());
        Ok(CommandOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use gorplan_core::PlannerConfig;
    use gorplan_io::MemoryFileReader;
    use gorplan_planner::{MacroRegistry, RecordingEventLogger};

    use super::*;

    /// Writes the query it was given as the command's output.
    struct Echo(MemoryFileReader);

    impl Executor for Echo {
        fn execute(&self, query: &str, output_path: &str) -> Result<(), String> {
            self.0.insert(output_path, query.as_bytes().to_vec());
            Ok(())
        }
    }

    struct Failing;

    impl Executor for Failing {
        fn execute(&self, _query: &str, _output_path: &str) -> Result<(), String> {
            Err("disk full".into())
        }
    }

    fn runner(
        reader: &MemoryFileReader,
        executor: Arc<dyn Executor>,
    ) -> (ScriptRunner, Arc<RecordingEventLogger>) {
        let events = Arc::new(RecordingEventLogger::new());
        let config = PlannerConfig {
            split_regions: vec!["chr1".into(), "chr2".into()],
            ..Default::default()
        };
        let ctx = PlanContext::new(config, Arc::new(reader.clone())).with_events(events.clone());
        let planner = Planner::with_macros(MacroRegistry::new());
        (ScriptRunner::new(planner, ctx, executor), events)
    }

    #[test]
    fn test_dependent_script_runs_in_two_rounds() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", b"chr1\t1\n".to_vec());
        let (runner, events) = runner(&reader, Arc::new(Echo(reader.clone())));

        let summary = runner
            .run_script("create a = gor a.gor | top 1; gor [a] | top 5")
            .unwrap();
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.cached, 0);
        let produced = &summary.created_files["[a]"];
        assert!(produced.starts_with("result_cache/"));
        assert_eq!(summary.command, format!("gor {produced} | top 5"));
        assert!(summary.used_files.contains(&"a.gor".to_string()));
        assert_eq!(reader.contents(produced).unwrap(), b"gor a.gor | top 1".to_vec());
        assert_eq!(events.count_started(), 1);
    }

    #[test]
    fn test_split_partitions_run_before_their_gather() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", b"chr1\t1\n".to_vec());
        let (runner, _) = runner(&reader, Arc::new(Echo(reader.clone())));

        let summary = runner
            .run_script("create x = pgor a.gor -split 2 | top 1; gor [x]")
            .unwrap();
        assert_eq!(summary.executed, 3);
        let gather = &summary.created_files["[x]"];
        let text = String::from_utf8(reader.contents(gather).unwrap()).unwrap();
        assert!(text.starts_with("gordictpart "));
        assert!(text.contains(&summary.created_files["[x__part1]"]));
        assert!(text.contains(&summary.created_files["[x__part2]"]));
        assert!(!text.contains('['));
    }

    #[test]
    fn test_write_to_placeholder_feeds_the_final_query() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", b"chr1\t1\n".to_vec());
        let (runner, _) = runner(&reader, Arc::new(Echo(reader.clone())));

        let summary = runner
            .run_script("create T1 = pgor a.gor -split 2 | write [x]; gor [x] | top 5")
            .unwrap();
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.executed, 3);
        let gather = &summary.created_files["[x]"];
        assert!(gather.ends_with(".gord"));
        assert!(!summary.created_files.contains_key("[T1]"));
        assert_eq!(summary.command, format!("gor {gather} | top 5"));
    }

    #[test]
    fn test_executor_failure_names_the_command() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", b"chr1\t1\n".to_vec());
        let (runner, _) = runner(&reader, Arc::new(Failing));

        let err = runner
            .run_script("create a = gor a.gor; gor [a]")
            .unwrap_err();
        match err {
            ExecError::Executor { command, message } => {
                assert_eq!(command, "[a]");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_round_limit() {
        let reader = MemoryFileReader::new();
        reader.insert("a.gor", b"chr1\t1\n".to_vec());
        let events = Arc::new(RecordingEventLogger::new());
        let config = PlannerConfig {
            max_rounds: 1,
            ..Default::default()
        };
        let ctx = PlanContext::new(config, Arc::new(reader.clone())).with_events(events);
        let runner = ScriptRunner::new(
            Planner::with_macros(MacroRegistry::new()),
            ctx,
            Arc::new(Echo(reader.clone())),
        );
        let err = runner
            .run_script("create a = gor a.gor; gor [a]")
            .unwrap_err();
        assert!(matches!(err, ExecError::RoundLimit(1)));
    }

    #[test]
    fn test_parse_errors_surface_as_plan_errors() {
        let reader = MemoryFileReader::new();
        let (runner, _) = runner(&reader, Arc::new(Echo(reader.clone())));
        let err = runner.run_script("gor [nope]").unwrap_err();
        assert!(matches!(err, ExecError::Plan(ref e) if e.is_parsing()));
    }
}
