//! Backend dispatch macro.

/// Match a `DbConnection` and run the same body against each backend.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(&mut conn, {
///     MySql(c) => run_mysql(c).await,
///     Postgres(c) => run_postgres(c).await,
///     SQLite(c) => run_sqlite(c).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
