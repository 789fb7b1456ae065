//! Database abstraction layer.
//!
//! This module provides the managed handles and their plumbing:
//! - Connection handles with state tracking
//! - Transaction handles bound to one connection
//! - Thread-safe registries of live handles
//! - The driver runtime behind the blocking and async APIs
//! - Parameter binding, row conversion and backend dispatch

#[macro_use]
pub mod macros;
pub mod connection;
pub mod params;
pub mod registry;
pub mod runtime;
pub mod transaction;
pub mod types;

pub use connection::{Connection, StateListener, SubscriptionId, WeakConnection};
pub use registry::{ConnectionRegistry, Registry, TrackedConnection, TransactionRegistry};
pub use transaction::Transaction;
pub use types::{Row, RowToJson};
