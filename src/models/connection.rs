//! Connection-related data models.
//!
//! This module defines the database backends, the connection state machine values,
//! and the events and statistics a connection handle publishes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// State of a connection handle as observed by this crate.
///
/// A handle starts out `Closed` (never opened). `Closed` and `Broken` reached
/// after that are terminal: the handle never leaves them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Closed,
    Open,
    Connecting,
    Executing,
    Fetching,
    Broken,
}

impl ConnectionState {
    /// Check if this state ends the life of a connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Broken)
    }

    /// Check if a statement is currently running on the connection.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Executing | Self::Fetching)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Connecting => "connecting",
            Self::Executing => "executing",
            Self::Fetching => "fetching",
            Self::Broken => "broken",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// A state transition published to connection subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub connection_id: ConnectionId,
    pub original: ConnectionState,
    pub current: ConnectionState,
}

/// Counters gathered while statistics collection is enabled on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatistics {
    /// Statements sent to the server, including transaction control
    pub executions: u64,
    pub rows_affected: u64,
    pub rows_fetched: u64,
    /// Cumulative time spent waiting on statements
    pub execution_time: Duration,
    /// Time taken by the last successful open, recorded even while collection is off
    pub connection_time: Duration,
}
