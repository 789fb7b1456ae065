//! Transaction handle bound to one managed connection.
//!
//! A transaction is begun with explicit control statements on its connection and
//! ended by `COMMIT` or `ROLLBACK`. The handle does not close the connection; the
//! transaction factory of `Sql` does that when the transaction ends.

use crate::db::connection::Connection;
use crate::db::types::Row;
use crate::error::{SqlError, SqlResult};
use crate::models::{DatabaseType, IsolationLevel, Statement, TransactionId, TransactionState};
use crate::observer::InfoMessage;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Statements that start a transaction with the requested isolation level.
pub(crate) fn begin_statements(db_type: DatabaseType, level: IsolationLevel) -> Vec<String> {
    match db_type {
        DatabaseType::PostgreSQL => vec![format!("BEGIN ISOLATION LEVEL {}", level.as_sql())],
        DatabaseType::MySQL => {
            let start = match level {
                IsolationLevel::Snapshot => "START TRANSACTION WITH CONSISTENT SNAPSHOT",
                _ => "START TRANSACTION",
            };
            vec![
                format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
                start.to_string(),
            ]
        }
        DatabaseType::SQLite => match level {
            IsolationLevel::Serializable => vec!["BEGIN IMMEDIATE".to_string()],
            IsolationLevel::ReadUncommitted => vec![
                "PRAGMA read_uncommitted = 1".to_string(),
                "BEGIN DEFERRED".to_string(),
            ],
            _ => vec!["BEGIN DEFERRED".to_string()],
        },
    }
}

struct TransactionInner {
    id: TransactionId,
    connection: Connection,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    /// Set by the first call that ends the transaction
    ending: AtomicBool,
    started_at: DateTime<Utc>,
}

/// Handle to an active or ended transaction. Cloning is cheap.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Start a transaction on an open connection.
    pub(crate) async fn begin(connection: Connection, level: IsolationLevel) -> SqlResult<Self> {
        let db_type = connection.db_type();
        for sql in begin_statements(db_type, level) {
            connection.execute_raw(&sql).await?;
        }

        if db_type == DatabaseType::SQLite
            && !matches!(
                level,
                IsolationLevel::Serializable | IsolationLevel::ReadUncommitted
            )
        {
            connection.observer().on_info_message(&InfoMessage::new(
                Some(connection.id()),
                format!("SQLite runs {} transactions as SERIALIZABLE", level),
            ));
        }

        let transaction = Self {
            inner: Arc::new(TransactionInner {
                id: TransactionId::new(),
                connection,
                isolation_level: level,
                state: Mutex::new(TransactionState::Active),
                ending: AtomicBool::new(false),
                started_at: Utc::now(),
            }),
        };
        info!(
            transaction_id = %transaction.id(),
            connection_id = %transaction.connection().id(),
            isolation_level = %level,
            "Transaction started"
        );
        Ok(transaction)
    }

    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// The connection the transaction runs on.
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Run a statement inside the transaction and return the number of affected rows.
    pub fn execute(&self, statement: &Statement) -> SqlResult<u64> {
        self.connection()
            .driver()
            .block_on(self.execute_inner(statement))
    }

    pub async fn execute_async(&self, statement: &Statement) -> SqlResult<u64> {
        let this = self.clone();
        let statement = statement.clone();
        self.connection()
            .driver()
            .run(async move { this.execute_inner(&statement).await })
            .await
    }

    /// Run a statement inside the transaction and return its result set.
    pub fn fetch(&self, statement: &Statement) -> SqlResult<Vec<Row>> {
        self.connection()
            .driver()
            .block_on(self.fetch_inner(statement))
    }

    pub async fn fetch_async(&self, statement: &Statement) -> SqlResult<Vec<Row>> {
        let this = self.clone();
        let statement = statement.clone();
        self.connection()
            .driver()
            .run(async move { this.fetch_inner(&statement).await })
            .await
    }

    async fn execute_inner(&self, statement: &Statement) -> SqlResult<u64> {
        self.ensure_usable()?;
        self.connection().execute_inner(statement).await
    }

    async fn fetch_inner(&self, statement: &Statement) -> SqlResult<Vec<Row>> {
        self.ensure_usable()?;
        self.connection().fetch_inner(statement).await
    }

    fn ensure_usable(&self) -> SqlResult<()> {
        let state = self.state();
        if !state.is_active() || self.inner.ending.load(Ordering::Acquire) {
            return Err(SqlError::transaction(
                format!("Transaction is {}", state),
                self.id().to_string(),
            ));
        }
        let connection_state = self.connection().state();
        if connection_state.is_terminal() {
            return Err(SqlError::transaction(
                format!("Transaction connection is {}", connection_state),
                self.id().to_string(),
            ));
        }
        Ok(())
    }

    /// Send `COMMIT` or `ROLLBACK`.
    ///
    /// A failed commit leaves the transaction rolled back. Only the first call may
    /// end the transaction; later calls fail.
    pub(crate) async fn finish(&self, commit: bool) -> SqlResult<()> {
        if self.inner.ending.swap(true, Ordering::AcqRel) {
            return Err(SqlError::transaction(
                format!("Transaction is already {}", self.state()),
                self.id().to_string(),
            ));
        }

        let sql = if commit { "COMMIT" } else { "ROLLBACK" };
        let result = self.connection().execute_raw(sql).await;
        let state = match (&result, commit) {
            (Ok(()), true) => TransactionState::Committed,
            _ => TransactionState::RolledBack,
        };
        *self.inner.state.lock() = state;

        debug!(
            transaction_id = %self.id(),
            state = %state,
            "Transaction ended"
        );
        result
    }

    /// Mark a transaction that will never be ended normally as rolled back.
    pub(crate) fn abandon(&self) {
        self.inner.ending.store(true, Ordering::Release);
        let mut state = self.inner.state.lock();
        if state.is_active() {
            *state = TransactionState::RolledBack;
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("connection_id", &self.connection().id())
            .field("isolation_level", &self.isolation_level())
            .field("state", &self.state())
            .finish()
    }
}
