//! Integration tests for disposal of a Sql instance.

use parking_lot::Mutex;
use sqlmagic::{
    ConnectionState, IsolationLevel, Sql, StateChange, Statement, TransactionState,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite:{}?mode=rwc", dir.path().join("dispose.db").display())
}

#[test]
fn test_dispose_empties_registries() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let open = sql.create_connection(true).unwrap();
    let unopened = sql.create_connection(false).unwrap();
    let tx = sql.begin_transaction(IsolationLevel::default()).unwrap();

    sql.dispose();

    assert!(sql.tracked_connections().is_empty());
    assert!(sql.tracked_transactions().is_empty());
    assert_eq!(open.state(), ConnectionState::Closed);
    assert_eq!(unopened.state(), ConnectionState::Closed);
    assert_eq!(tx.state(), TransactionState::RolledBack);
}

#[test]
fn test_operations_fail_after_dispose() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let tx = sql.begin_transaction(IsolationLevel::default()).unwrap();
    sql.dispose();

    assert!(sql.create_connection(true).unwrap_err().is_disposed());
    assert!(sql.create_connection(false).unwrap_err().is_disposed());
    assert!(sql.try_create_connection(true).unwrap_err().is_disposed());
    assert!(
        sql.begin_transaction(IsolationLevel::Serializable)
            .unwrap_err()
            .is_disposed()
    );
    assert!(sql.end_transaction(&tx, true).unwrap_err().is_disposed());
    assert!(sql.commit_transaction(&tx).unwrap_err().is_disposed());
    assert!(sql.set_logging(true).unwrap_err().is_disposed());
}

#[test]
fn test_dispose_twice_closes_once() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let connection = sql.create_connection(true).unwrap();

    let closes = Arc::new(Mutex::new(0));
    let sink = closes.clone();
    connection.subscribe(Arc::new(move |change: &StateChange| {
        if change.current == ConnectionState::Closed {
            *sink.lock() += 1;
        }
    }));

    sql.dispose();
    sql.dispose();
    drop(sql);

    assert_eq!(*closes.lock(), 1);
}

#[test]
fn test_dispose_skips_connections_already_closed() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let closed = sql.create_connection(true).unwrap();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = transitions.clone();
    closed.subscribe(Arc::new(move |change: &StateChange| {
        sink.lock().push(change.current);
    }));
    closed.close().unwrap();

    sql.dispose();
    assert_eq!(*transitions.lock(), vec![ConnectionState::Closed]);
}

#[test]
fn test_dispose_rolls_back_dangling_transaction() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let setup = sql.create_connection(true).unwrap();
    setup
        .execute(&Statement::text("CREATE TABLE notes (body TEXT)"))
        .unwrap();
    setup.close().unwrap();

    let tx = sql.begin_transaction(IsolationLevel::default()).unwrap();
    tx.execute(&Statement::text("INSERT INTO notes (body) VALUES ('dangling')"))
        .unwrap();
    sql.dispose();
    assert_eq!(tx.state(), TransactionState::RolledBack);

    let fresh = Sql::connect(&sqlite_url(&dir)).unwrap();
    let connection = fresh.create_connection(true).unwrap();
    let rows = connection
        .fetch(&Statement::text("SELECT COUNT(*) AS n FROM notes"))
        .unwrap();
    assert_eq!(rows[0]["n"], 0);
}

#[test]
fn test_dispose_resets_settings() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    sql.set_logging(true).unwrap();
    sql.set_execution_timeout(Duration::from_secs(12)).unwrap();

    sql.dispose();

    assert!(!sql.logging());
    assert_eq!(sql.execution_timeout(), Duration::from_secs(300));
}

#[test]
fn test_drop_without_dispose_releases_connections() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let connection = sql.create_connection(true).unwrap();
    let tx = sql.begin_transaction(IsolationLevel::default()).unwrap();

    drop(sql);

    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert!(connection.is_retired());
}

#[tokio::test]
async fn test_dispose_async() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    let connection = sql.create_connection_async(true).await.unwrap();
    let tx = sql
        .begin_transaction_async(IsolationLevel::ReadCommitted)
        .await
        .unwrap();

    sql.dispose_async().await;
    sql.dispose_async().await;

    assert!(sql.is_disposed());
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(tx.connection().state(), ConnectionState::Closed);
    assert!(
        sql.create_connection_async(true)
            .await
            .unwrap_err()
            .is_disposed()
    );
}

#[tokio::test]
async fn test_blocking_dispose_inside_async_context() {
    let dir = TempDir::new().unwrap();
    let sql = Sql::connect(&sqlite_url(&dir)).unwrap();
    sql.set_logging(true).unwrap();
    let connection = sql.create_connection_async(true).await.unwrap();
    let tx = sql
        .begin_transaction_async(IsolationLevel::ReadCommitted)
        .await
        .unwrap();

    sql.dispose();

    assert!(sql.is_disposed());
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert_eq!(tx.connection().state(), ConnectionState::Closed);
    assert!(sql.tracked_connections().is_empty());
    assert!(!sql.logging());
}

#[test]
fn test_factories_racing_dispose() {
    let dir = TempDir::new().unwrap();
    let sql = Arc::new(Sql::connect(&sqlite_url(&dir)).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let sql = sql.clone();
            std::thread::spawn(move || {
                let mut created = Vec::new();
                for _ in 0..500 {
                    let result = if worker % 2 == 0 {
                        sql.create_connection(true)
                    } else {
                        sql.begin_transaction(IsolationLevel::ReadCommitted)
                            .map(|tx| tx.connection().clone())
                    };
                    match result {
                        Ok(connection) => created.push(connection),
                        Err(e) => {
                            assert!(e.is_disposed(), "unexpected error: {e}");
                            break;
                        }
                    }
                }
                created
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(50));
    sql.dispose();

    for worker in workers {
        for connection in worker.join().unwrap() {
            assert_eq!(connection.state(), ConnectionState::Closed);
        }
    }
    assert!(sql.tracked_connections().is_empty());
    assert!(sql.tracked_transactions().is_empty());
}
