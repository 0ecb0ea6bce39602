//! Schema-related data models.
//!
//! This module defines the descriptors produced by catalog introspection.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A table reference, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Parse `schema.table` or a bare `table`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, name)) => Self::new(name).with_schema(schema),
            None => Self::new(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Table,
    View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub table_type: TableType,
    /// Name for a generated model: bare in the default schema, `SCHEMA_TABLE` otherwise.
    pub model_name: String,
    /// Reference usable in SQL: bare in the default schema, `SCHEMA.TABLE` otherwise.
    pub table_selector: String,
}

/// Field type derived from a catalog column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Float,
    DecFloat,
    Char,
    VarChar,
    Clob,
    Graphic,
    VarG,
    DbClob,
    Binary,
    VarBin,
    Blob,
    Date,
    Time,
    Timestamp,
    DataLink,
    RowId,
    Xml,
}

impl ColumnType {
    /// Map a `QSYS2.SYSCOLUMNS.DATA_TYPE` value. Unknown types return `None`.
    pub fn from_catalog(type_name: &str) -> Option<Self> {
        let ty = match type_name.trim() {
            "SMALLINT" => Self::SmallInt,
            "INTEGER" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "DECIMAL" => Self::Decimal,
            "NUMERIC" => Self::Numeric,
            "FLOAT" => Self::Float,
            "DECFLOAT" => Self::DecFloat,
            "CHAR" => Self::Char,
            "VARCHAR" => Self::VarChar,
            "CLOB" => Self::Clob,
            // NCHAR reflects as GRAPHIC
            "GRAPHIC" => Self::Graphic,
            "VARG" => Self::VarG,
            "DBCLOB" => Self::DbClob,
            "BINARY" => Self::Binary,
            "VARBIN" => Self::VarBin,
            "BLOB" => Self::Blob,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTMP" => Self::Timestamp,
            "DATALINK" => Self::DataLink,
            "ROWID" => Self::RowId,
            "XML" => Self::Xml,
            _ => return None,
        };
        Some(ty)
    }

    pub fn has_length(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::VarChar
                | Self::Clob
                | Self::Graphic
                | Self::VarG
                | Self::DbClob
                | Self::Binary
                | Self::VarBin
                | Self::Blob
                | Self::RowId
        )
    }
}

/// Precision of a numeric or temporal column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Precision {
    Digits(i64),
    /// (precision, scale)
    Scaled(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<Precision>,
    pub required: bool,
    pub readonly: bool,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw catalog row the field was built from.
    pub coldef: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from: ColumnRef,
    pub to: ColumnRef,
}

/// Introspection output plus the warnings collected while building it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaResult<T> {
    pub messages: Vec<String>,
    pub items: Vec<T>,
}

impl<T> Default for MetaResult<T> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            items: Vec::new(),
        }
    }
}
