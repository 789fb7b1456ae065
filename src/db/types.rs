//! Conversion of fetched rows into JSON maps.
//!
//! Column types are first classified into a `TypeCategory`; each backend then
//! decodes the value with the Rust types its driver supports for that category.

use crate::models::DatabaseType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};

/// A fetched row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Text,
    Binary,
    Json,
    Uuid,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite stores these with REAL affinity
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if (lower.contains("int") && lower != "interval" && !lower.contains("point"))
        || lower.contains("serial")
        || lower.contains("tiny")
    {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Raw DECIMAL/NUMERIC text, preserving the exact server representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary-format PostgreSQL NUMERIC as decimal text.
///
/// The wire value is a header of four big-endian `u16` words (digit count, weight,
/// sign, display scale) followed by base-10000 digits, most significant first.
fn numeric_to_string(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let word = |i: usize| -> Result<u16, sqlx::error::BoxDynError> {
        bytes
            .get(2 * i..2 * i + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let scale = usize::from(word(3)?);
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<_>, _>>()?;
    // Digit group at index `i` is worth 10000^(weight - i)
    let group = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for index in 1..=weight {
            out.push_str(&format!("{:04}", group(index)));
        }
    }
    if scale > 0 {
        let mut fraction = String::with_capacity(scale + 4);
        let mut index = weight + 1;
        while fraction.len() < scale {
            fraction.push_str(&format!("{:04}", group(index)));
            index += 1;
        }
        fraction.truncate(scale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn binary_value(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn unsupported(type_name: &str) -> JsonValue {
    JsonValue::String(format!("<unsupported: {type_name}>"))
}

/// Trait for converting driver rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

/// Generate a `RowToJson` impl for one backend.
///
/// `ints` lists the integer types to try in order; `decimal` names the
/// exact-decimal wrapper when the backend has one.
macro_rules! impl_row_to_json {
    ($module:ident, $row:ty, $db:expr, ints: [$($int:ty),+] $(, decimal: $decimal:ty)?) => {
        mod $module {
            use super::*;
            use sqlx::Row as _;

            type Db = <$row as sqlx::Row>::Database;

            fn get<'r, T>(row: &'r $row, idx: usize) -> Option<T>
            where
                T: Decode<'r, Db> + Type<Db>,
            {
                row.try_get::<Option<T>, _>(idx).ok().flatten()
            }

            fn decode_text(row: &$row, idx: usize, type_name: &str) -> JsonValue {
                if let Some(v) = get::<String>(row, idx) {
                    if type_name.to_lowercase().contains("json") {
                        if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                            return json;
                        }
                    }
                    return JsonValue::String(v);
                }
                if let Some(v) = get::<i64>(row, idx) {
                    return JsonValue::Number(v.into());
                }
                if let Some(v) = get::<f64>(row, idx) {
                    return float_value(v);
                }
                if let Some(v) = get::<Vec<u8>>(row, idx) {
                    return binary_value(&v);
                }
                unsupported(type_name)
            }

            fn decode_temporal(row: &$row, idx: usize, type_name: &str) -> JsonValue {
                if let Some(v) = get::<DateTime<Utc>>(row, idx) {
                    return JsonValue::String(v.to_rfc3339());
                }
                if let Some(v) = get::<NaiveDateTime>(row, idx) {
                    return JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
                }
                if let Some(v) = get::<NaiveDate>(row, idx) {
                    return JsonValue::String(v.to_string());
                }
                if let Some(v) = get::<NaiveTime>(row, idx) {
                    return JsonValue::String(v.to_string());
                }
                decode_text(row, idx, type_name)
            }

            pub(super) fn decode_column(row: &$row, idx: usize, type_name: &str) -> JsonValue {
                match categorize_type(type_name, $db) {
                    $(
                        TypeCategory::Decimal => get::<$decimal>(row, idx)
                            .map(|d| JsonValue::String(d.0))
                            .unwrap_or_else(|| unsupported(type_name)),
                    )?
                    TypeCategory::Integer => {
                        $(
                            if let Some(v) = get::<$int>(row, idx) {
                                return JsonValue::Number(v.into());
                            }
                        )+
                        decode_text(row, idx, type_name)
                    }
                    TypeCategory::Float => get::<f64>(row, idx)
                        .or_else(|| get::<f32>(row, idx).map(f64::from))
                        .map(float_value)
                        .unwrap_or_else(|| decode_text(row, idx, type_name)),
                    TypeCategory::Boolean => get::<bool>(row, idx)
                        .map(JsonValue::Bool)
                        .unwrap_or_else(|| decode_text(row, idx, type_name)),
                    TypeCategory::Temporal => decode_temporal(row, idx, type_name),
                    TypeCategory::Binary => get::<Vec<u8>>(row, idx)
                        .map(|v| binary_value(&v))
                        .unwrap_or_else(|| unsupported(type_name)),
                    TypeCategory::Json => get::<JsonValue>(row, idx)
                        .unwrap_or_else(|| decode_text(row, idx, type_name)),
                    TypeCategory::Uuid => get::<uuid::Uuid>(row, idx)
                        .map(|u| JsonValue::String(u.to_string()))
                        .unwrap_or_else(|| decode_text(row, idx, type_name)),
                    _ => decode_text(row, idx, type_name),
                }
            }
        }

        impl RowToJson for $row {
            fn to_json_map(&self) -> Row {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let name = col.name().to_string();
                        let raw = match self.try_get_raw(idx) {
                            Ok(raw) if !raw.is_null() => raw,
                            _ => return (name, JsonValue::Null),
                        };
                        // Expression columns may carry no declared type
                        let type_name = if col.type_info().is_null() {
                            raw.type_info().name().to_string()
                        } else {
                            col.type_info().name().to_string()
                        };
                        (name, $module::decode_column(self, idx, &type_name))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(mysql, MySqlRow, DatabaseType::MySQL,
    ints: [i8, i16, i32, i64, u8, u16, u32, u64], decimal: RawDecimal);
impl_row_to_json!(postgres, PgRow, DatabaseType::PostgreSQL,
    ints: [i16, i32, i64], decimal: RawDecimal);
impl_row_to_json!(sqlite, SqliteRow, DatabaseType::SQLite, ints: [i64, i32]);
