//! Parameter binding for statements.
//!
//! Parameters are bound positionally, in the order they were added to the statement.
//! Their names never reach the server.

use crate::models::{Parameter, QueryParam};
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

/// Arguments type of a prepared query on backend `DB`.
pub(crate) type Arguments<'q, DB> = <DB as Database>::Arguments<'q>;

/// Prepare `sql` with every statement parameter bound in order.
pub(crate) fn bind_all<'q, DB>(
    sql: &'q str,
    params: &'q [Parameter],
) -> Query<'q, DB, Arguments<'q, DB>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match &param.value {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        })
}
