//! The `Sql` instance: connection and transaction factories with lifecycle tracking.
//!
//! Every connection created by a `Sql` instance is tracked until it reaches a
//! terminal state; every transaction is tracked until it is ended. Disposing the
//! instance closes whatever is still tracked and rejects further use.

use crate::config::{EXECUTION_TIMEOUT_SECS, SqlOptions};
use crate::db::connection::{Connection, ConnectionSettings, StateListener};
use crate::db::registry::{ConnectionRegistry, TrackedConnection, TransactionRegistry};
use crate::db::runtime::{DriverHandle, DriverRuntime, in_async_context};
use crate::db::transaction::Transaction;
use crate::error::{SqlError, SqlResult};
use crate::models::{ConnectionState, IsolationLevel, StateChange};
use crate::observer::{InfoMessage, NoopObserver, Observer};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Build the listener that keeps the connection registry in step with connection states.
fn state_change_handler(
    registry: Arc<ConnectionRegistry>,
    logging: Arc<AtomicBool>,
) -> StateListener {
    Arc::new(move |change: &StateChange| {
        if logging.load(Ordering::Relaxed) {
            debug!(
                connection_id = %change.connection_id,
                from = %change.original,
                to = %change.current,
                "Connection state changed"
            );
        }

        match change.current {
            ConnectionState::Broken | ConnectionState::Closed => {
                if let Some(tracked) = registry.remove(&change.connection_id) {
                    if let Some(connection) = tracked.handle.upgrade() {
                        connection.unsubscribe(tracked.subscription);
                    }
                    debug!(
                        connection_id = %change.connection_id,
                        state = %change.current,
                        "Connection no longer tracked"
                    );
                }
            }
            _ => {}
        }
    })
}

/// Everything needed to create a tracked connection away from the `Sql` instance.
#[derive(Clone)]
struct ConnectionFactory {
    settings: ConnectionSettings,
    statistics: bool,
    registry: Arc<ConnectionRegistry>,
    listener: StateListener,
    observer: Arc<dyn Observer>,
    driver: DriverHandle,
}

impl ConnectionFactory {
    async fn create(self, open: bool) -> SqlResult<Connection> {
        let connection = Connection::new(self.settings, self.driver, self.observer);
        if open {
            connection.open_inner().await?;
        }

        let subscription = connection.subscribe(self.listener);
        let tracked = TrackedConnection {
            handle: connection.downgrade(),
            subscription,
        };
        if self.registry.add(connection.id(), tracked).is_err() {
            connection.unsubscribe(subscription);
            if let Err(e) = connection.close_inner().await {
                warn!(connection_id = %connection.id(), error = %e, "Failed to close untracked connection");
            }
            return Err(SqlError::disposed("create a connection"));
        }
        connection.set_statistics_enabled(self.statistics);

        debug!(
            connection_id = %connection.id(),
            db_type = %connection.db_type(),
            open,
            "Connection created"
        );
        Ok(connection)
    }
}

#[derive(Clone)]
struct TransactionFactory {
    connections: ConnectionFactory,
    registry: Arc<TransactionRegistry>,
}

impl TransactionFactory {
    async fn begin(self, level: IsolationLevel) -> SqlResult<Transaction> {
        let connection = self.connections.create(true).await?;
        let transaction = match Transaction::begin(connection.clone(), level).await {
            Ok(transaction) => transaction,
            Err(e) => {
                if let Err(close_err) = connection.close_inner().await {
                    warn!(connection_id = %connection.id(), error = %close_err, "Failed to close connection after failed begin");
                }
                // Disposal closes the connection under a begin that is still running
                if self.registry.is_disposed() {
                    return Err(SqlError::disposed("begin a transaction"));
                }
                return Err(e);
            }
        };

        if self.registry.add(transaction.id(), transaction.clone()).is_err() {
            transaction.abandon();
            if let Err(e) = connection.close_inner().await {
                warn!(connection_id = %connection.id(), error = %e, "Failed to close untracked connection");
            }
            return Err(SqlError::disposed("begin a transaction"));
        }
        Ok(transaction)
    }
}

/// Commit or roll back, then close the transaction's connection and untrack it.
///
/// The connection is closed even when ending fails; the first error is returned.
async fn end_transaction(
    registry: Arc<TransactionRegistry>,
    transaction: Transaction,
    commit: bool,
) -> SqlResult<()> {
    let result = transaction.finish(commit).await;
    let closed = transaction.connection().close_inner().await;
    registry.remove(&transaction.id());

    info!(
        transaction_id = %transaction.id(),
        state = %transaction.state(),
        "Transaction ended"
    );
    result.and(closed)
}

/// Close connections concurrently. Failures are logged and reported, never raised.
async fn close_all(connections: Vec<Connection>, observer: Arc<dyn Observer>) {
    let mut closes = JoinSet::new();
    for connection in connections {
        closes.spawn(async move { (connection.id(), connection.close_inner().await) });
    }

    while let Some(joined) = closes.join_next().await {
        let (id, error) = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((id, Err(e))) => (Some(id), e.to_string()),
            Err(e) => (None, e.to_string()),
        };
        warn!(connection_id = ?id, error = %error, "Failed to close connection during disposal");
        observer.on_info_message(&InfoMessage::new(
            id,
            format!("Failed to close connection during disposal: {}", error),
        ));
    }
}

/// Retire connections in place without waiting on the driver.
fn release_all(connections: Vec<Connection>) {
    for connection in connections {
        connection.release();
    }
}

/// Managed entry point: creates tracked connections and transactions.
///
/// # Example
///
/// ```no_run
/// use sqlmagic::{IsolationLevel, Sql, Statement};
///
/// # fn main() -> sqlmagic::SqlResult<()> {
/// let sql = Sql::connect("sqlite:app.db?mode=rwc")?;
/// let tx = sql.begin_transaction(IsolationLevel::default())?;
/// tx.execute(&Statement::text("CREATE TABLE IF NOT EXISTS notes (body TEXT)"))?;
/// sql.commit_transaction(&tx)?;
/// sql.dispose();
/// # Ok(())
/// # }
/// ```
///
/// The blocking methods must not be called from inside an async runtime; use the
/// `_async` variants there.
pub struct Sql {
    options: RwLock<SqlOptions>,
    connections: Arc<ConnectionRegistry>,
    transactions: Arc<TransactionRegistry>,
    logging: Arc<AtomicBool>,
    disposed: AtomicBool,
    observer: Arc<dyn Observer>,
    listener: StateListener,
    runtime: DriverRuntime,
}

impl Sql {
    pub fn new(options: SqlOptions) -> SqlResult<Self> {
        Self::with_observer(options, Arc::new(NoopObserver))
    }

    /// Create an instance from a connection URL with default options.
    pub fn connect(connection_string: &str) -> SqlResult<Self> {
        Self::new(SqlOptions::parse(connection_string)?)
    }

    pub fn with_observer(options: SqlOptions, observer: Arc<dyn Observer>) -> SqlResult<Self> {
        options.validate()?;
        let runtime = DriverRuntime::new()?;
        let connections = Arc::new(ConnectionRegistry::new());
        let logging = Arc::new(AtomicBool::new(options.logging));
        let listener = state_change_handler(connections.clone(), logging.clone());

        debug!(
            db_type = %options.db_type,
            connection = %options.masked_connection_string(),
            "Sql instance created"
        );
        Ok(Self {
            options: RwLock::new(options),
            connections,
            transactions: Arc::new(TransactionRegistry::new()),
            logging,
            disposed: AtomicBool::new(false),
            observer,
            listener,
            runtime,
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self, operation: &str) -> SqlResult<()> {
        if self.is_disposed() {
            return Err(SqlError::disposed(operation));
        }
        Ok(())
    }

    fn connection_factory(&self, operation: &str) -> SqlResult<ConnectionFactory> {
        self.ensure_live(operation)?;
        let options = self.options.read();
        Ok(ConnectionFactory {
            settings: ConnectionSettings {
                connection_string: options.connection_string.clone(),
                db_type: options.db_type,
                connect_timeout: options.connect_timeout(),
                execution_timeout: options.execution_timeout(),
            },
            statistics: options.statistics,
            registry: self.connections.clone(),
            listener: self.listener.clone(),
            observer: self.observer.clone(),
            driver: self.runtime.handle(),
        })
    }

    fn transaction_factory(&self) -> SqlResult<TransactionFactory> {
        Ok(TransactionFactory {
            connections: self.connection_factory("begin a transaction")?,
            registry: self.transactions.clone(),
        })
    }

    // =========================================================================
    // Connection factory
    // =========================================================================

    /// Create a tracked connection, opening it when `open` is true.
    pub fn create_connection(&self, open: bool) -> SqlResult<Connection> {
        let factory = self.connection_factory("create a connection")?;
        self.runtime.handle().block_on(factory.create(open))
    }

    pub async fn create_connection_async(&self, open: bool) -> SqlResult<Connection> {
        let factory = self.connection_factory("create a connection")?;
        self.runtime.handle().run(factory.create(open)).await
    }

    /// Like `create_connection`, but a connection that cannot be established yields `Ok(None)`.
    ///
    /// Only establishment failures are absorbed; using a disposed instance is still an error.
    pub fn try_create_connection(&self, open: bool) -> SqlResult<Option<Connection>> {
        absorb_establishment_failure(self.create_connection(open))
    }

    pub async fn try_create_connection_async(&self, open: bool) -> SqlResult<Option<Connection>> {
        absorb_establishment_failure(self.create_connection_async(open).await)
    }

    // =========================================================================
    // Transaction factory
    // =========================================================================

    /// Begin a transaction on a new dedicated connection.
    pub fn begin_transaction(&self, level: IsolationLevel) -> SqlResult<Transaction> {
        let factory = self.transaction_factory()?;
        self.runtime.handle().block_on(factory.begin(level))
    }

    pub async fn begin_transaction_async(&self, level: IsolationLevel) -> SqlResult<Transaction> {
        let factory = self.transaction_factory()?;
        self.runtime.handle().run(factory.begin(level)).await
    }

    /// Commit (`commit = true`) or roll back the transaction, then close its connection.
    pub fn end_transaction(&self, transaction: &Transaction, commit: bool) -> SqlResult<()> {
        self.ensure_live("end a transaction")?;
        self.runtime.handle().block_on(end_transaction(
            self.transactions.clone(),
            transaction.clone(),
            commit,
        ))
    }

    pub async fn end_transaction_async(
        &self,
        transaction: &Transaction,
        commit: bool,
    ) -> SqlResult<()> {
        self.ensure_live("end a transaction")?;
        self.runtime
            .handle()
            .run(end_transaction(
                self.transactions.clone(),
                transaction.clone(),
                commit,
            ))
            .await
    }

    /// Same as `end_transaction(transaction, true)`.
    pub fn commit_transaction(&self, transaction: &Transaction) -> SqlResult<()> {
        self.end_transaction(transaction, true)
    }

    pub async fn commit_transaction_async(&self, transaction: &Transaction) -> SqlResult<()> {
        self.end_transaction_async(transaction, true).await
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// The configured connection string with the password masked.
    pub fn connection_string(&self) -> String {
        self.options.read().masked_connection_string()
    }

    /// Replace the connection string. Options carried by the URL replace the current ones.
    ///
    /// Affects connections created afterwards only.
    pub fn set_connection_string(&self, connection_string: &str) -> SqlResult<()> {
        self.ensure_live("change the connection string")?;
        let options = SqlOptions::parse(connection_string)?;
        self.logging.store(options.logging, Ordering::Relaxed);
        *self.options.write() = options;
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        self.options.read().execution_timeout()
    }

    pub fn set_execution_timeout(&self, timeout: Duration) -> SqlResult<()> {
        self.ensure_live("change the execution timeout")?;
        if timeout.as_secs() == 0 {
            return Err(SqlError::invalid_input(
                "Execution timeout must be at least one second",
            ));
        }
        self.options.write().execution_timeout_secs = timeout.as_secs();
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        self.options.read().connect_timeout()
    }

    pub fn set_connection_timeout(&self, timeout: Duration) -> SqlResult<()> {
        self.ensure_live("change the connection timeout")?;
        if timeout.as_secs() == 0 {
            return Err(SqlError::invalid_input(
                "Connection timeout must be at least one second",
            ));
        }
        self.options.write().connect_timeout_secs = timeout.as_secs();
        Ok(())
    }

    /// Whether every connection state transition is logged.
    pub fn logging(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    pub fn set_logging(&self, logging: bool) -> SqlResult<()> {
        self.ensure_live("change logging")?;
        self.logging.store(logging, Ordering::Relaxed);
        self.options.write().logging = logging;
        Ok(())
    }

    /// Connections currently tracked by this instance.
    pub fn tracked_connections(&self) -> Vec<Connection> {
        self.connections
            .snapshot()
            .into_iter()
            .filter_map(|(_, tracked)| tracked.handle.upgrade())
            .collect()
    }

    /// Transactions begun by this instance and not yet ended.
    pub fn tracked_transactions(&self) -> Vec<Transaction> {
        self.transactions
            .snapshot()
            .into_iter()
            .map(|(_, transaction)| transaction)
            .collect()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close everything still tracked and reject further use.
    ///
    /// Calling it again does nothing. Cleanup failures are logged, never raised.
    ///
    /// Called from inside an async context it cannot block, so driver links are
    /// released in place as on drop; prefer `dispose_async` there.
    pub fn dispose(&self) {
        if let Some(live) = self.begin_dispose() {
            if in_async_context() {
                release_all(live);
            } else {
                self.runtime
                    .handle()
                    .block_on(close_all(live, self.observer.clone()));
            }
            self.finish_dispose();
        }
    }

    pub async fn dispose_async(&self) {
        if let Some(live) = self.begin_dispose() {
            let observer = self.observer.clone();
            let closed = self
                .runtime
                .handle()
                .run(async move {
                    close_all(live, observer).await;
                    Ok(())
                })
                .await;
            if let Err(e) = closed {
                warn!(error = %e, "Disposal did not complete");
            }
            self.finish_dispose();
        }
    }

    /// Mark the instance disposed and drain both registries.
    ///
    /// Returns the connections that still need closing, or `None` if already disposed.
    fn begin_dispose(&self) -> Option<Vec<Connection>> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }

        for (id, transaction) in self.transactions.dispose() {
            if transaction.is_active() {
                warn!(transaction_id = %id, "Rolling back dangling transaction");
            }
            transaction.abandon();
        }

        let mut live = Vec::new();
        for (_, tracked) in self.connections.dispose() {
            if let Some(connection) = tracked.handle.upgrade() {
                connection.unsubscribe(tracked.subscription);
                if !connection.is_retired() {
                    live.push(connection);
                }
            }
        }
        Some(live)
    }

    fn finish_dispose(&self) {
        self.logging.store(false, Ordering::Relaxed);
        {
            let mut options = self.options.write();
            options.logging = false;
            options.execution_timeout_secs = EXECUTION_TIMEOUT_SECS;
        }
        info!("Sql instance disposed");
    }
}

fn absorb_establishment_failure(
    result: SqlResult<Connection>,
) -> SqlResult<Option<Connection>> {
    match result {
        Ok(connection) => Ok(Some(connection)),
        Err(e) if e.is_establishment_failure() => {
            debug!(error = %e, "Connection could not be established");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl Drop for Sql {
    fn drop(&mut self) {
        if let Some(live) = self.begin_dispose() {
            release_all(live);
            self.finish_dispose();
        }
    }
}

impl std::fmt::Debug for Sql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sql")
            .field("options", &*self.options.read())
            .field("tracked_connections", &self.connections.len())
            .field("tracked_transactions", &self.transactions.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
