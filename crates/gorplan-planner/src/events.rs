//! Command lifecycle events.

use std::time::Duration;

use parking_lot::Mutex;

/// Sink for command lineage and lifecycle events.
pub trait EventLogger: Send + Sync {
    /// A planning round queued a new command.
    fn command_created(
        &self,
        create_name: &str,
        batch_group_name: &str,
        signature: &str,
        query: &str,
    );

    fn command_started(&self, create_name: &str, cache_file: &str, query: &str);

    fn command_ended(&self, create_name: &str, cache_file: &str, elapsed: Duration);

    /// The command's output already existed and was reused.
    fn command_cached(&self, create_name: &str, cache_file: &str);
}

/// Logs every event through `tracing` at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn command_created(
        &self,
        create_name: &str,
        batch_group_name: &str,
        signature: &str,
        query: &str,
    ) {
        tracing::info!(create_name, batch_group_name, signature, query, "command created");
    }

    fn command_started(&self, create_name: &str, cache_file: &str, query: &str) {
        tracing::info!(create_name, cache_file, query, "command started");
    }

    fn command_ended(&self, create_name: &str, cache_file: &str, elapsed: Duration) {
        tracing::info!(
            create_name,
            cache_file,
            elapsed_ms = elapsed.as_millis() as u64,
            "command ended"
        );
    }

    fn command_cached(&self, create_name: &str, cache_file: &str) {
        tracing::info!(create_name, cache_file, "command cached");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    Created {
        create_name: String,
        batch_group_name: String,
        signature: String,
        query: String,
    },
    Started {
        create_name: String,
        cache_file: String,
    },
    Ended {
        create_name: String,
        cache_file: String,
    },
    Cached {
        create_name: String,
        cache_file: String,
    },
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingEventLogger {
    events: Mutex<Vec<CommandEvent>>,
}

impl RecordingEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CommandEvent> {
        self.events.lock().clone()
    }

    pub fn created(&self) -> Vec<CommandEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, CommandEvent::Created { .. }))
            .cloned()
            .collect()
    }

    pub fn count_cached(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, CommandEvent::Cached { .. }))
            .count()
    }

    pub fn count_started(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, CommandEvent::Started { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventLogger for RecordingEventLogger {
    fn command_created(
        &self,
        create_name: &str,
        batch_group_name: &str,
        signature: &str,
        query: &str,
    ) {
        self.events.lock().push(CommandEvent::Created {
            create_name: create_name.to_string(),
            batch_group_name: batch_group_name.to_string(),
            signature: signature.to_string(),
            query: query.to_string(),
        });
    }

    fn command_started(&self, create_name: &str, cache_file: &str, _query: &str) {
        self.events.lock().push(CommandEvent::Started {
            create_name: create_name.to_string(),
            cache_file: cache_file.to_string(),
        });
    }

    fn command_ended(&self, create_name: &str, cache_file: &str, _elapsed: Duration) {
        self.events.lock().push(CommandEvent::Ended {
            create_name: create_name.to_string(),
            cache_file: cache_file.to_string(),
        });
    }

    fn command_cached(&self, create_name: &str, cache_file: &str) {
        self.events.lock().push(CommandEvent::Cached {
            create_name: create_name.to_string(),
            cache_file: cache_file.to_string(),
        });
    }
}
