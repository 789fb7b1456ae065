//! Data models for sqlmagic.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod statement;
pub mod transaction;

// Re-export commonly used types
pub use connection::{
    ConnectionId, ConnectionState, ConnectionStatistics, DatabaseType, StateChange,
};
pub use statement::{CommandKind, Parameter, QueryParam, Statement};
pub use transaction::{IsolationLevel, TransactionId, TransactionState};
