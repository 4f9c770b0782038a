//! Per-execution planning state and the collaborators a round consults.

use std::sync::Arc;

use gorplan_core::{PlannerConfig, Result, TaskMap};
use gorplan_io::FileReader;

use crate::events::{EventLogger, TracingEventLogger};
use crate::registry::PlaceholderRegistry;
use crate::signature::SignatureCache;

/// Read-only collaborators shared by every round of a session.
#[derive(Clone)]
pub struct PlanContext {
    pub config: PlannerConfig,
    pub reader: Arc<dyn FileReader>,
    pub events: Arc<dyn EventLogger>,
}

impl PlanContext {
    pub fn new(config: PlannerConfig, reader: Arc<dyn FileReader>) -> Self {
        Self {
            config,
            reader,
            events: Arc::new(TracingEventLogger),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventLogger>) -> Self {
        self.events = events;
        self
    }
}

/// State owned by one top-level query execution: the placeholder registry,
/// the signature memo tables and the persistent task set. Discard it when
/// the query completes.
#[derive(Default)]
pub struct PlanningSession {
    pub registry: PlaceholderRegistry,
    pub signatures: SignatureCache,
    /// Tasks still to be planned in a later round.
    pub tasks: TaskMap,
}

impl PlanningSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the task set with the user's script and declare its task names
    /// as original placeholders. Tokens the queries merely reference are left
    /// undeclared so that typos surface as parsing errors.
    pub fn start(tasks: TaskMap) -> Result<Self> {
        let session = Self {
            tasks,
            ..Self::default()
        };
        for task in session.tasks.values() {
            session.registry.declare_task(task)?;
        }
        session.registry.mark_all_original();
        Ok(session)
    }

    pub fn is_done(&self) -> bool {
        self.tasks.is_empty()
    }
}
