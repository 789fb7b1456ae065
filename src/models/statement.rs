//! Statement data models.
//!
//! A [`Statement`] is an immutable value describing what to send to the server:
//! SQL text, how to interpret it, and an ordered list of named parameters.

use crate::error::{SqlError, SqlResult};
use crate::models::DatabaseType;
use serde::{Deserialize, Serialize};
use sqlparser::ast;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for QueryParam {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A named statement parameter.
///
/// Parameters are bound positionally in declaration order; the name labels the
/// value for logging and for readers of the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: QueryParam,
}

/// How the statement text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Plain SQL text
    #[default]
    Text,
    /// Name of a stored procedure to CALL
    StoredProcedure,
    /// Name of a table to read in full
    TableDirect,
}

/// An immutable SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    sql: Option<String>,
    kind: CommandKind,
    parameters: Vec<Parameter>,
}

impl Statement {
    /// The empty statement: no SQL, no parameters, kind `Text`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A plain SQL text statement.
    pub fn text(sql: impl Into<String>) -> Self {
        Self::with_kind(sql, CommandKind::Text)
    }

    /// A stored procedure call by name.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self::with_kind(name, CommandKind::StoredProcedure)
    }

    /// A full read of the named table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::with_kind(name, CommandKind::TableDirect)
    }

    fn with_kind(sql: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            sql: Some(sql.into()),
            kind,
            parameters: Vec::new(),
        }
    }

    /// Append a named parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Check if this is the empty statement.
    pub fn is_empty(&self) -> bool {
        self.sql.is_none() && self.parameters.is_empty() && self.kind == CommandKind::Text
    }

    /// Build the text actually sent to the server for this backend.
    pub fn command_text(&self, db_type: DatabaseType) -> SqlResult<String> {
        let sql = self
            .sql
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SqlError::invalid_input("Statement has no SQL text"))?;

        match self.kind {
            CommandKind::Text => Ok(sql.to_string()),
            CommandKind::TableDirect => {
                Ok(format!("SELECT * FROM {}", quote_identifier(sql, db_type)?))
            }
            CommandKind::StoredProcedure => {
                let placeholders: Vec<String> = (1..=self.parameters.len())
                    .map(|n| match db_type {
                        DatabaseType::PostgreSQL => format!("${}", n),
                        _ => "?".to_string(),
                    })
                    .collect();
                match db_type {
                    DatabaseType::SQLite => Err(SqlError::invalid_input(
                        "SQLite does not support stored procedures",
                    )),
                    _ => Ok(format!(
                        "CALL {}({})",
                        quote_identifier(sql, db_type)?,
                        placeholders.join(", ")
                    )),
                }
            }
        }
    }

    /// Check whether running this statement produces a result set.
    ///
    /// Unparseable text falls back to a leading-keyword check.
    pub fn returns_rows(&self, db_type: DatabaseType) -> bool {
        match self.kind {
            CommandKind::TableDirect => true,
            CommandKind::StoredProcedure => false,
            CommandKind::Text => self
                .sql
                .as_deref()
                .is_some_and(|sql| text_returns_rows(sql, db_type)),
        }
    }
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

fn text_returns_rows(sql: &str, db_type: DatabaseType) -> bool {
    let dialect = get_dialect(db_type);
    match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => statements.last().is_some_and(is_row_returning),
        Err(_) => {
            let keyword = sql
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            matches!(
                keyword.as_str(),
                "SELECT" | "WITH" | "SHOW" | "VALUES" | "EXPLAIN" | "PRAGMA" | "DESCRIBE"
            )
        }
    }
}

fn is_row_returning(stmt: &ast::Statement) -> bool {
    matches!(
        stmt,
        ast::Statement::Query(_)
            | ast::Statement::ShowTables { .. }
            | ast::Statement::ShowColumns { .. }
            | ast::Statement::ShowDatabases { .. }
            | ast::Statement::ShowSchemas { .. }
            | ast::Statement::ShowCreate { .. }
            | ast::Statement::ShowVariable { .. }
            | ast::Statement::ShowVariables { .. }
            | ast::Statement::ShowStatus { .. }
            | ast::Statement::ExplainTable { .. }
            | ast::Statement::Explain { .. }
            | ast::Statement::Pragma { .. }
    )
}

/// Quote a possibly schema-qualified identifier for the backend.
fn quote_identifier(name: &str, db_type: DatabaseType) -> SqlResult<String> {
    let quote = match db_type {
        DatabaseType::MySQL => '`',
        DatabaseType::PostgreSQL | DatabaseType::SQLite => '"',
    };
    let escaped = format!("{quote}{quote}");

    let parts = name
        .split('.')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(SqlError::invalid_input(format!(
                    "Invalid object name: '{}'",
                    name
                )));
            }
            Ok(format!(
                "{quote}{}{quote}",
                part.replace(quote, &escaped)
            ))
        })
        .collect::<SqlResult<Vec<_>>>()?;

    Ok(parts.join("."))
}
