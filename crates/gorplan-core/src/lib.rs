#![forbid(unsafe_code)]
//! gorplan-core: shared vocabulary for the planning layer.
//!
//! - `task`: execution blocks, command entries and the tagged results that
//!   macros and fan-out resolvers hand back to the planner.
//! - `query`: quote-aware helpers over pipe-query text (stages, verbs,
//!   `write` targets, used files, placeholder tokens).
//! - `config`: planner configuration (serde + env overrides).
//! - `hash`: content fingerprints.
//!
//! No IO and no threading here; those live in `gorplan-io` and
//! `gorplan-planner`.

pub mod config;
pub mod error;
pub mod hash;
pub mod prelude;
pub mod query;
pub mod task;

pub use config::PlannerConfig;
pub use error::{Error, Result};
pub use task::{CommandEntry, ExpansionResult, FanOutResult, Task, TaskMap, TERMINAL_MARKER};

/// Crate version, recorded in run summaries for provenance.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
