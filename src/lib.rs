//! sqlmagic library
//!
//! A managed wrapper around `sqlx` connections for SQLite, PostgreSQL and MySQL.
//! A `Sql` instance creates connections and transactions, tracks them until they
//! close or end, and cleans up whatever is left when it is disposed.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod observer;
pub mod sql;

pub use config::{Config, SqlOptions};
pub use db::{Connection, Row, StateListener, SubscriptionId, Transaction};
pub use error::{SqlError, SqlResult};
pub use models::{
    CommandKind, ConnectionId, ConnectionState, ConnectionStatistics, DatabaseType,
    IsolationLevel, QueryParam, StateChange, Statement, TransactionId, TransactionState,
};
pub use observer::{CommandCompletion, CommandOutcome, InfoMessage, Observer, TracingObserver};
pub use sql::Sql;
