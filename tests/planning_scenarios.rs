//! Planner-level scenarios: rounds are driven by hand, commands are
//! "executed" by resolving their placeholders directly.

use std::sync::Arc;

use gorplan_core::query::used_files;
use gorplan_core::{PlannerConfig, Task, TaskMap, TERMINAL_MARKER};
use gorplan_io::MemoryFileReader;
use gorplan_planner::macros::expand_to_fixed_point;
use gorplan_planner::{
    BatchCommand, ExecutionBatch, MacroRegistry, PlanContext, Planner, PlanningSession,
    RecordingEventLogger, RoundOutput,
};

fn context(reader: &MemoryFileReader) -> PlanContext {
    let config = PlannerConfig {
        split_regions: vec!["chr1".into(), "chr2".into(), "chr3".into()],
        ..Default::default()
    };
    PlanContext::new(config, Arc::new(reader.clone()))
        .with_events(Arc::new(RecordingEventLogger::new()))
}

fn reader() -> MemoryFileReader {
    let reader = MemoryFileReader::new();
    reader.insert("x.gor", b"chrom\tpos\nchr1\t1\n".to_vec());
    reader.insert("a.gor", b"chrom\tpos\nchr2\t7\n".to_vec());
    reader
}

fn task_map(list: Vec<Task>) -> TaskMap {
    list.into_iter().map(|t| (t.name.clone(), t)).collect()
}

fn plan(
    planner: &Planner,
    ctx: &PlanContext,
    session: &mut PlanningSession,
    current: &str,
) -> gorplan_core::Result<(RoundOutput, Vec<BatchCommand>)> {
    let mut batch = ExecutionBatch::from_tasks(&session.tasks, &ctx.config);
    let out = planner.plan_round(ctx, session, false, &mut batch, true, current)?;
    Ok((out, batch.take_commands()))
}

fn pretend_executed(session: &PlanningSession, commands: &[BatchCommand]) {
    for c in commands {
        session.registry.declare(&c.create_name).unwrap();
        session.registry.resolve(&c.create_name, &c.cache_file).unwrap();
    }
}

#[test]
fn test_scenario_plain_query_is_one_terminal_round() {
    let reader = reader();
    let ctx = context(&reader);
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![Task::final_query(
        TERMINAL_MARKER,
        "gor x.gor | top 1",
    )]))
    .unwrap();

    let (out, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(out.command, "gor x.gor | top 1");
    assert!(commands.is_empty());
    assert!(session.is_done());
}

#[test]
fn test_scenario_split_then_dependent_query() {
    let reader = reader();
    let ctx = context(&reader);
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![
        Task::new("[x]", "pgor a.gor -split 2"),
        Task::final_query(TERMINAL_MARKER, "gor [x] | top 5"),
    ]))
    .unwrap();

    // Round 1: two partitions and a gather named [x]; the final query waits.
    let (out, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(out.command, "");
    assert_eq!(commands.len(), 3);
    let names: Vec<&str> = commands.iter().map(|c| c.create_name.as_str()).collect();
    assert_eq!(names, vec!["[x__part1]", "[x__part2]", "[x]"]);
    assert!(commands[2].query.starts_with("gordictpart [x__part1] chr1,chr2 [x__part2] chr3"));
    assert!(commands.iter().all(|c| c.batch_group_name == "[x]"));
    assert!(session.tasks.contains_key(TERMINAL_MARKER));
    assert!(!session.tasks.contains_key("[x]"));

    pretend_executed(&session, &commands);
    let gather_file = commands[2].cache_file.clone();
    assert!(gather_file.ends_with(".gord"));

    // Round 2: [x] resolved, the final query substitutes it and terminates.
    let (out, commands) = plan(&planner, &ctx, &mut session, &out.command).unwrap();
    assert!(commands.is_empty());
    assert_eq!(out.command, format!("gor {gather_file} | top 5"));
    assert!(session.is_done());
}

#[test]
fn test_scenario_split_written_to_a_placeholder() {
    let reader = reader();
    let config = PlannerConfig {
        split_regions: vec!["chr1".into(), "chr2".into()],
        ..Default::default()
    };
    let ctx = PlanContext::new(config, Arc::new(reader.clone()));
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![
        Task::new("[T1]", "pgor a.gor -split 2 | write [x]"),
        Task::final_query(TERMINAL_MARKER, "gor [x] | top 5"),
    ]))
    .unwrap();

    // Round 1: T1 fans out into two partitions and a gather that produces [x].
    let (out, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(out.command, "");
    let names: Vec<&str> = commands.iter().map(|c| c.create_name.as_str()).collect();
    assert_eq!(names, vec!["[x__part1]", "[x__part2]", "[x]"]);
    assert!(commands.iter().all(|c| c.batch_group_name == "[T1]"));
    assert!(commands.iter().all(|c| !c.query.contains("write")));
    assert_eq!(commands[2].query, "gordictpart [x__part1] chr1 [x__part2] chr2");
    assert!(!session.tasks.contains_key("[T1]"));
    assert!(session.tasks.contains_key(TERMINAL_MARKER));

    // Round 2: the final query becomes active once [x] is resolved.
    pretend_executed(&session, &commands);
    let gather_file = commands[2].cache_file.clone();
    let (out, commands) = plan(&planner, &ctx, &mut session, &out.command).unwrap();
    assert!(commands.is_empty());
    assert_eq!(out.command, format!("gor {gather_file} | top 5"));
    assert!(session.is_done());
}

#[test]
fn test_scenario_identical_tasks_share_a_signature() {
    let reader = reader();
    let ctx = context(&reader);
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![
        Task::new("[t1]", "gor a.gor | top 1"),
        Task::new("[t2]", "gor a.gor | top 1"),
    ]))
    .unwrap();

    let (_, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].signature, commands[1].signature);
    assert_eq!(commands[0].cache_file, commands[1].cache_file);
    assert_ne!(commands[0].create_name, commands[1].create_name);
}

#[test]
fn test_scenario_undeclared_placeholder() {
    let reader = reader();
    let ctx = context(&reader);
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![Task::final_query(
        TERMINAL_MARKER,
        "gor [undeclared] | top 1",
    )]))
    .unwrap();

    let err = plan(&planner, &ctx, &mut session, "").unwrap_err();
    assert!(err.is_parsing());
    assert!(err.to_string().contains("undeclared"));
}

#[test]
fn test_substitution_is_idempotent() {
    let session = PlanningSession::new();
    session.registry.declare("[a]").unwrap();
    session.registry.resolve("[a]", "cache/a.gorz").unwrap();

    for q in [
        "gor x.gor | top 1",
        "gor x.gor | where name = '[a]'",
        "nor -h cache/a.gorz",
    ] {
        assert_eq!(session.registry.substitute(q), q);
    }
    let once = session.registry.substitute("gor [a] | join [a]");
    assert_eq!(once, "gor cache/a.gorz | join cache/a.gorz");
    assert_eq!(session.registry.substitute(&once), once);
}

#[test]
fn test_resolution_is_monotonic() {
    let session = PlanningSession::new();
    session.registry.declare("[a]").unwrap();
    assert!(!session.registry.dependencies_ready(["[a]"]));

    session.registry.resolve("[a]", "first.gorz").unwrap();
    session.registry.resolve("[a]", "second.gorz").unwrap();
    assert!(session.registry.dependencies_ready(["[a]"]));
    assert_eq!(
        session.registry.get("[a]").and_then(|e| e.file_name).as_deref(),
        Some("first.gorz")
    );
}

#[test]
fn test_expansion_without_macros_is_identity() {
    let reader = reader();
    let ctx = context(&reader);
    let session = PlanningSession::new();
    let tasks = task_map(vec![
        Task::new("[a]", "gor a.gor"),
        Task::final_query(TERMINAL_MARKER, "gor [a] | top 2"),
    ]);

    let expansion =
        expand_to_fixed_point(&MacroRegistry::new(), tasks.clone(), &ctx, &session, true).unwrap();
    assert_eq!(expansion.tasks, tasks);
    assert_eq!(expansion.passes, 0);
    assert!(expansion.aliases.is_empty());
}

#[test]
fn test_query_signature_is_deterministic() {
    let reader = reader();
    let ctx = context(&reader);
    let session = PlanningSession::new();
    let q = "gor x.gor | join a.gor";
    let files = used_files(q);

    let s1 = session.signatures.query_signature(&ctx, q, &files).unwrap();
    let s2 = session.signatures.query_signature(&ctx, q, &files).unwrap();
    assert_eq!(s1, s2);

    let other = session
        .signatures
        .query_signature(&ctx, "gor x.gor | join a.gor | top 1", &files)
        .unwrap();
    assert_ne!(s1, other);

    // Same text, new content: a fresh session sees a different signature.
    reader.insert("a.gor", b"chrom\tpos\nchr2\t8\n".to_vec());
    let fresh = PlanningSession::new();
    let s3 = fresh.signatures.query_signature(&ctx, q, &files).unwrap();
    assert_ne!(s1, s3);
}

#[test]
fn test_dependent_task_never_active_before_resolution() {
    let reader = reader();
    let ctx = context(&reader);
    let planner = Planner::with_macros(MacroRegistry::new());
    let mut session = PlanningSession::start(task_map(vec![
        Task::new("[a]", "gor a.gor"),
        Task::new("[b]", "gor [a] | top 1"),
        Task::final_query(TERMINAL_MARKER, "gor [b]"),
    ]))
    .unwrap();

    let (_, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].create_name, "[a]");

    // Nothing executed: planning again must not activate [b].
    let (_, again) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert!(again.iter().all(|c| c.create_name != "[b]"));

    pretend_executed(&session, &commands);
    let (_, commands) = plan(&planner, &ctx, &mut session, "").unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].create_name, "[b]");
    assert!(commands[0].query.starts_with("gor result_cache/"));
}
