//! Column type mappings and row normalization.
//!
//! Columns are described with ODBC SQL type codes, the vocabulary the iSeries client access
//! layer reports. This module classifies backend type names into those codes, decodes
//! `sqlx` rows into JSON cells, and applies the normalization the runner performs before
//! rows reach callers.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. The category picks both the ODBC type code and the value decoder
//!
//! Normalization (`autotrim`, 64-bit integer widening) only looks at the ODBC code, so it
//! works the same for every driver behind the seam.

use crate::models::result::{ColumnInfo, Row};
use serde_json::Value as JsonValue;
use sqlx::any::AnyRow;
use sqlx::{Column, Row as _, TypeInfo};

// =============================================================================
// ODBC SQL type codes
// =============================================================================

pub const SQL_CHAR: i32 = 1;
pub const SQL_NUMERIC: i32 = 2;
pub const SQL_DECIMAL: i32 = 3;
pub const SQL_INTEGER: i32 = 4;
pub const SQL_SMALLINT: i32 = 5;
pub const SQL_FLOAT: i32 = 6;
pub const SQL_REAL: i32 = 7;
pub const SQL_DOUBLE: i32 = 8;
pub const SQL_VARCHAR: i32 = 12;
pub const SQL_TYPE_DATE: i32 = 91;
pub const SQL_TYPE_TIME: i32 = 92;
pub const SQL_TYPE_TIMESTAMP: i32 = 93;
pub const SQL_LONGVARCHAR: i32 = -1;
pub const SQL_BINARY: i32 = -2;
pub const SQL_VARBINARY: i32 = -3;
pub const SQL_LONGVARBINARY: i32 = -4;
pub const SQL_BIGINT: i32 = -5;
pub const SQL_TINYINT: i32 = -6;
pub const SQL_BIT: i32 = -7;
pub const SQL_WCHAR: i32 = -8;
pub const SQL_WVARCHAR: i32 = -9;
pub const SQL_WLONGVARCHAR: i32 = -10;

/// Character column types subject to `autotrim`.
pub const CHARACTER_TYPES: &[i32] = &[
    SQL_CHAR,
    SQL_VARCHAR,
    SQL_LONGVARCHAR,
    SQL_WCHAR,
    SQL_WVARCHAR,
    SQL_WLONGVARCHAR,
];

pub fn is_character(data_type: i32) -> bool {
    CHARACTER_TYPES.contains(&data_type)
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    BigInt,
    Integer,
    SmallInt,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
    Unknown,
}

/// Classify a backend type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bigint" || lower == "int8" || lower == "bigserial" {
        return TypeCategory::BigInt;
    }
    if lower == "smallint" || lower == "int2" || lower.contains("tiny") {
        return TypeCategory::SmallInt;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    if lower.contains("char") || lower.contains("text") || lower.contains("clob") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// ODBC SQL type code for a category.
pub fn sql_type_code(category: TypeCategory) -> i32 {
    match category {
        TypeCategory::BigInt => SQL_BIGINT,
        TypeCategory::Integer => SQL_INTEGER,
        TypeCategory::SmallInt => SQL_SMALLINT,
        TypeCategory::Float => SQL_DOUBLE,
        TypeCategory::Decimal => SQL_DECIMAL,
        TypeCategory::Boolean => SQL_BIT,
        TypeCategory::Binary => SQL_VARBINARY,
        TypeCategory::Date => SQL_TYPE_DATE,
        TypeCategory::Time => SQL_TYPE_TIME,
        TypeCategory::Timestamp => SQL_TYPE_TIMESTAMP,
        TypeCategory::Text | TypeCategory::Unknown => SQL_VARCHAR,
    }
}

// =============================================================================
// Row normalization
// =============================================================================

/// Strip trailing whitespace from every character column.
pub fn trim_row(row: &mut Row, columns: &[ColumnInfo]) {
    for column in columns.iter().filter(|c| is_character(c.data_type)) {
        if let Some(JsonValue::String(s)) = row.get_mut(&column.name) {
            let trimmed = s.trim_end().len();
            s.truncate(trimmed);
        }
    }
}

/// Replace string-backed BIGINT cells with JSON numbers.
pub fn normalize_bigints(row: &mut Row, columns: &[ColumnInfo]) {
    for column in columns.iter().filter(|c| c.data_type == SQL_BIGINT) {
        if let Some(cell) = row.get_mut(&column.name) {
            if let JsonValue::String(s) = cell {
                *cell = parse_number(s.trim());
            }
        }
    }
}

fn parse_number(s: &str) -> JsonValue {
    if let Ok(v) = s.parse::<i64>() {
        return JsonValue::from(v);
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary cell data as base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
    fn get_column_info(&self) -> Vec<ColumnInfo>;
}

impl RowToJson for AnyRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                (col.name().to_string(), decode_column(self, idx, category))
            })
            .collect()
    }

    fn get_column_info(&self) -> Vec<ColumnInfo> {
        self.columns()
            .iter()
            .map(|col| {
                let category = categorize_type(col.type_info().name());
                ColumnInfo::new(col.name(), sql_type_code(category))
            })
            .collect()
    }
}

fn decode_column(row: &AnyRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::BigInt | TypeCategory::Integer | TypeCategory::SmallInt => {
            decode_integer(row, idx).unwrap_or_else(|| decode_fallback(row, idx))
        }
        TypeCategory::Float | TypeCategory::Decimal => {
            decode_float(row, idx).unwrap_or_else(|| decode_fallback(row, idx))
        }
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null),
        TypeCategory::Binary => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null),
        _ => decode_fallback(row, idx),
    }
}

fn decode_integer(row: &AnyRow, idx: usize) -> Option<JsonValue> {
    match row.try_get::<Option<i64>, _>(idx) {
        Ok(Some(v)) => Some(JsonValue::from(v)),
        Ok(None) => Some(JsonValue::Null),
        Err(_) => None,
    }
}

fn decode_float(row: &AnyRow, idx: usize) -> Option<JsonValue> {
    match row.try_get::<Option<f64>, _>(idx) {
        Ok(Some(v)) => Some(
            serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
        ),
        Ok(None) => Some(JsonValue::Null),
        Err(_) => None,
    }
}

/// Decode a cell of unknown or dynamic type by trying each representation in turn.
fn decode_fallback(row: &AnyRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = decode_integer(row, idx) {
        return v;
    }
    if let Some(v) = decode_float(row, idx) {
        return v;
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return decode_binary_value(&v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(idx) {
        return JsonValue::Bool(v);
    }
    JsonValue::Null
}
