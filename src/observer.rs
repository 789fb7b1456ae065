//! Observability hook attached to a `Sql` instance.

use crate::models::{CommandKind, ConnectionId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one command sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    RowsAffected(u64),
    RowsFetched(usize),
    Failed(String),
}

/// Emitted after every command a connection sends, transaction control included.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    pub connection_id: ConnectionId,
    pub kind: CommandKind,
    /// Command text as sent, parameters not inlined
    pub sql: String,
    pub elapsed: Duration,
    pub outcome: CommandOutcome,
}

/// Informational message from the library or the server.
#[derive(Debug, Clone)]
pub struct InfoMessage {
    pub connection_id: Option<ConnectionId>,
    pub message: String,
}

impl InfoMessage {
    pub fn new(connection_id: Option<ConnectionId>, message: impl Into<String>) -> Self {
        Self {
            connection_id,
            message: message.into(),
        }
    }
}

/// Receives command completions and info messages. Both hooks default to no-ops.
pub trait Observer: Send + Sync {
    fn on_command_complete(&self, _completion: &CommandCompletion) {}

    fn on_info_message(&self, _message: &InfoMessage) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_command_complete(&self, completion: &CommandCompletion) {
        let elapsed_ms = completion.elapsed.as_millis() as u64;
        match &completion.outcome {
            CommandOutcome::RowsAffected(rows) => debug!(
                connection_id = %completion.connection_id,
                sql = %completion.sql,
                rows_affected = rows,
                elapsed_ms,
                "Command completed"
            ),
            CommandOutcome::RowsFetched(rows) => debug!(
                connection_id = %completion.connection_id,
                sql = %completion.sql,
                rows_fetched = rows,
                elapsed_ms,
                "Query completed"
            ),
            CommandOutcome::Failed(error) => warn!(
                connection_id = %completion.connection_id,
                sql = %completion.sql,
                error = %error,
                elapsed_ms,
                "Command failed"
            ),
        }
    }

    fn on_info_message(&self, message: &InfoMessage) {
        match &message.connection_id {
            Some(id) => info!(connection_id = %id, "{}", message.message),
            None => info!("{}", message.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        messages: Mutex<Vec<String>>,
    }

    impl Observer for Recording {
        fn on_info_message(&self, message: &InfoMessage) {
            self.messages.lock().push(message.message.clone());
        }
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let observer = NoopObserver;
        observer.on_info_message(&InfoMessage::new(None, "ignored"));
        observer.on_command_complete(&CommandCompletion {
            connection_id: ConnectionId::new(),
            kind: CommandKind::Text,
            sql: "SELECT 1".to_string(),
            elapsed: Duration::from_millis(1),
            outcome: CommandOutcome::RowsFetched(1),
        });
    }

    #[test]
    fn test_custom_observer_receives_messages() {
        let observer = Recording::default();
        observer.on_info_message(&InfoMessage::new(Some(ConnectionId::new()), "hello"));
        // Only the overridden hook records
        observer.on_command_complete(&CommandCompletion {
            connection_id: ConnectionId::new(),
            kind: CommandKind::Text,
            sql: "DELETE FROM t".to_string(),
            elapsed: Duration::ZERO,
            outcome: CommandOutcome::RowsAffected(3),
        });
        assert_eq!(*observer.messages.lock(), vec!["hello".to_string()]);
    }
}
