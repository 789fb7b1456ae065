//! sqlmagic - Main entry point.
//!
//! Runs the given SQL statements inside one managed transaction and prints the rows
//! of row-returning statements as JSON lines.

use clap::Parser;
use sqlmagic::config::Config;
use sqlmagic::{Sql, Statement, TracingObserver};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let options = config.sql_options()?;
    info!(
        db_type = %options.db_type,
        connection = %options.masked_connection_string(),
        isolation_level = %config.isolation_level,
        "Starting sqlmagic v{}",
        env!("CARGO_PKG_VERSION")
    );

    let sql = Sql::with_observer(options, Arc::new(TracingObserver))?;
    let result = run(&sql, &config).await;
    sql.dispose_async().await;

    if let Err(e) = &result {
        error!(error = %e, "Run failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }
    result.map_err(Into::into)
}

async fn run(sql: &Sql, config: &Config) -> sqlmagic::SqlResult<()> {
    let transaction = sql.begin_transaction_async(config.isolation_level).await?;
    let db_type = transaction.connection().db_type();

    for text in &config.statements {
        let statement = Statement::text(text.as_str());
        let outcome = if statement.returns_rows(db_type) {
            transaction.fetch_async(&statement).await.map(|rows| {
                for row in &rows {
                    println!("{}", serde_json::Value::Object(row.clone()));
                }
                info!(rows = rows.len(), "Statement returned rows");
            })
        } else {
            transaction.execute_async(&statement).await.map(|affected| {
                info!(rows_affected = affected, "Statement executed");
            })
        };

        if let Err(e) = outcome {
            if let Err(rollback_err) = sql.end_transaction_async(&transaction, false).await {
                error!(error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
    }

    let connection = transaction.connection();
    if connection.statistics_enabled() {
        let stats = connection.statistics();
        debug!(
            executions = stats.executions,
            rows_affected = stats.rows_affected,
            rows_fetched = stats.rows_fetched,
            execution_ms = stats.execution_time.as_millis() as u64,
            connect_ms = stats.connection_time.as_millis() as u64,
            "Connection statistics"
        );
    }

    let commit = !config.rollback;
    sql.end_transaction_async(&transaction, commit).await?;
    info!(
        transaction_id = %transaction.id(),
        state = %transaction.state(),
        "Done"
    );
    Ok(())
}
