//! Convenient re-exports for downstream crates.

pub use crate::config::PlannerConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::{fingerprint, fingerprint_parts, Hash256};
pub use crate::query::WriteTarget;
pub use crate::task::{
    CommandEntry, ExpansionResult, FanOutResult, Task, TaskMap, TERMINAL_MARKER,
};
