//! Statement and execution result models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row. Column order follows the backend's column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Column name used for synthesized row counts.
pub const ROW_COUNT_COLUMN: &str = "xrowcount";

/// Column descriptor as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// ODBC SQL type code (`SQL_CHAR` = 1, `SQL_BIGINT` = -5, ...).
    pub data_type: i32,
    pub size: Option<u32>,
    pub scale: Option<i32>,
    pub nullable: Option<bool>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: i32) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: None,
            scale: None,
            nullable: None,
        }
    }
}

/// Result of one executed statement.
///
/// `rows` is `None` exactly when the statement produced no result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    pub rows: Option<Vec<Row>>,
    pub columns: Vec<ColumnInfo>,
    /// Rows affected (or fetched) as reported by the backend.
    pub row_count: u64,
    /// Set on results produced by the row-count sentinel instead of the backend.
    #[serde(default)]
    pub synthesized: bool,
}

impl StatementResult {
    /// Result of a statement that returned no result set.
    pub fn no_result(row_count: u64) -> Self {
        Self {
            rows: None,
            columns: Vec::new(),
            row_count,
            synthesized: false,
        }
    }

    /// Zero-round-trip result carrying a previous statement's affected row count.
    pub fn row_count_sentinel(previous: u64) -> Self {
        let mut row = Row::new();
        row.insert(ROW_COUNT_COLUMN.to_string(), JsonValue::from(previous));
        Self {
            rows: Some(vec![row]),
            columns: vec![ColumnInfo::new(ROW_COUNT_COLUMN, crate::db::types::SQL_BIGINT)],
            row_count: previous,
            synthesized: true,
        }
    }

    pub fn has_result_set(&self) -> bool {
        self.rows.is_some()
    }
}

/// Shape of the value a caller wants back from an execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    /// First row of the first result set.
    Row,
    /// First result set.
    #[default]
    Recordset,
    /// Every result set.
    #[value(name = "multirecordset")]
    MultiRecordset,
    /// Last column of the first row of the first result set.
    Scalar,
    /// No value; eligible for compound-command wrapping.
    Command,
}

impl std::fmt::Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Recordset => write!(f, "recordset"),
            Self::MultiRecordset => write!(f, "multirecordset"),
            Self::Scalar => write!(f, "scalar"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Value produced by an execution, shaped by its [`ReturnType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecValue {
    Row(Option<Row>),
    Recordset(Vec<Row>),
    MultiRecordset(Vec<Vec<Row>>),
    Scalar(Option<JsonValue>),
    Command,
}

impl ExecValue {
    /// Shape the surfaced recordsets for a return type.
    pub fn shape(return_type: ReturnType, mut recordsets: Vec<Vec<Row>>) -> Self {
        match return_type {
            ReturnType::Row => Self::Row(
                recordsets
                    .first_mut()
                    .and_then(|rows| (!rows.is_empty()).then(|| rows.swap_remove(0))),
            ),
            ReturnType::Recordset => Self::Recordset(if recordsets.is_empty() {
                Vec::new()
            } else {
                recordsets.swap_remove(0)
            }),
            ReturnType::MultiRecordset => Self::MultiRecordset(recordsets),
            ReturnType::Scalar => Self::Scalar(
                recordsets
                    .first()
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.values().last().cloned()),
            ),
            ReturnType::Command => Self::Command,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Execution output: the shaped value plus backend notices and warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecOutput {
    pub value: ExecValue,
    pub notices: Vec<String>,
    pub warnings: Vec<String>,
}

impl ExecOutput {
    pub fn new(value: ExecValue) -> Self {
        Self {
            value,
            notices: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_scalar_takes_last_column_of_first_row() {
        let sets = vec![vec![row(json!({"ONE": 1, "TWO": 2})), row(json!({"ONE": 3, "TWO": 4}))]];
        assert_eq!(
            ExecValue::shape(ReturnType::Scalar, sets),
            ExecValue::Scalar(Some(json!(2)))
        );
        assert_eq!(
            ExecValue::shape(ReturnType::Scalar, vec![]),
            ExecValue::Scalar(None)
        );
    }

    #[test]
    fn test_row_and_recordset_shapes() {
        let sets = vec![vec![row(json!({"A": 1})), row(json!({"A": 2}))], vec![row(json!({"B": 1}))]];
        assert_eq!(
            ExecValue::shape(ReturnType::Row, sets.clone()),
            ExecValue::Row(Some(row(json!({"A": 1}))))
        );
        assert_eq!(
            ExecValue::shape(ReturnType::Recordset, sets.clone()),
            ExecValue::Recordset(vec![row(json!({"A": 1})), row(json!({"A": 2}))])
        );
        assert_eq!(
            ExecValue::shape(ReturnType::Row, vec![vec![]]),
            ExecValue::Row(None)
        );
        match ExecValue::shape(ReturnType::MultiRecordset, sets) {
            ExecValue::MultiRecordset(all) => assert_eq!(all.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_row_count_sentinel_result() {
        let result = StatementResult::row_count_sentinel(7);
        assert!(result.synthesized);
        assert_eq!(result.rows.unwrap()[0][ROW_COUNT_COLUMN], json!(7));
    }
}
