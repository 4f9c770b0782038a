#![forbid(unsafe_code)]
//! gorplan-exec: the caller side of the planner's round loop.
//!
//! [`ScriptRunner`] plans a round, runs the round's commands level by level
//! through an [`Executor`], resolves each command's placeholder to its cache
//! file and plans again until no task is left. Outputs that already exist are
//! reused instead of recomputed.

pub mod runner;
pub mod scheduler;
pub mod summary;

pub use runner::{ExecError, Executor, ScriptRunner};
pub use summary::RunSummary;
