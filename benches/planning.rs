use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use gorplan_core::{PlannerConfig, Task, TaskMap, TERMINAL_MARKER};
use gorplan_io::MemoryFileReader;
use gorplan_planner::{
    ExecutionBatch, MacroRegistry, PlanContext, Planner, PlanningSession,
};

fn make_tasks(n: usize) -> TaskMap {
    let mut tasks = TaskMap::new();
    for i in 0..n {
        let name = format!("[t{i}]");
        tasks.insert(
            name.clone(),
            Task::new(name, format!("pgor in{}.gor -split 8 | group chrom -count", i % 16)),
        );
    }
    let joined = (0..n).map(|i| format!("[t{i}]")).collect::<Vec<_>>().join(" ");
    tasks.insert(
        TERMINAL_MARKER.to_string(),
        Task::final_query(TERMINAL_MARKER, format!("gor {joined}")),
    );
    tasks
}

fn bench_first_round(c: &mut Criterion) {
    let reader = MemoryFileReader::new();
    for i in 0..16 {
        reader.insert(format!("in{i}.gor"), format!("chrom\tpos\nchr1\t{i}\n").into_bytes());
    }
    let ctx = PlanContext::new(PlannerConfig::default(), Arc::new(reader));
    let planner = Planner::with_macros(MacroRegistry::new());
    let tasks = make_tasks(64);

    c.bench_function("plan_round_64_split_tasks", |b| {
        b.iter(|| {
            let mut session = PlanningSession::start(tasks.clone()).unwrap();
            let mut batch = ExecutionBatch::from_tasks(&session.tasks, &ctx.config);
            planner
                .plan_round(&ctx, &mut session, false, &mut batch, true, "")
                .unwrap();
            assert_eq!(batch.commands().len(), 64 * 9);
        })
    });
}

criterion_group!(benches, bench_first_round);
criterion_main!(benches);
