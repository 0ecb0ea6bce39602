//! Catalog introspection.
//!
//! Reads tables, columns and foreign keys from the DB2 for i catalog views, restricted to the
//! objects selected by the configured `metadata_filter`.

use crate::db::database::Database;
use crate::error::DbResult;
use crate::models::{
    ColumnRef, ColumnType, DeclaredType, ForeignKey, MetaResult, ParamValue, Params, Precision,
    Row, TableField, TableInfo, TableRef, TableType,
};
use crate::sql::encode_literal;
use serde_json::Value as JsonValue;
use tracing::warn;

const SYSTEM_SCHEMAS: &str = "'SYSIBM', 'SYSIBMADM', 'SYSTOOLS'";
const FRAMEWORK_SCHEMA: &str = "JSHARMONY";

/// Catalog reader bound to one [`Database`].
pub struct Meta<'a> {
    db: &'a Database,
}

impl<'a> Meta<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn filter(&self) -> &[String] {
        self.db
            .config()
            .options
            .metadata_filter
            .as_deref()
            .unwrap_or_default()
    }

    fn table_params(&self, table: Option<&TableRef>) -> Params {
        let (schema, name) = match table {
            Some(t) => (
                ParamValue::Text(
                    t.schema
                        .as_deref()
                        .unwrap_or(self.db.default_schema())
                        .to_uppercase(),
                ),
                ParamValue::Text(t.name.to_uppercase()),
            ),
            None => (ParamValue::Null, ParamValue::Null),
        };
        Params::new().with("schema_name", schema).with("table_name", name)
    }

    /// Tables and views, or the one table named by `table`.
    pub async fn tables(&self, table: Option<&TableRef>) -> DbResult<MetaResult<TableInfo>> {
        let filter = self.filter();
        if filter.is_empty() {
            return Ok(MetaResult::default());
        }
        let mut sql = format!(
            "SELECT T.TABLE_SCHEMA \"schema_name\", T.TABLE_NAME \"table_name\", T.LONG_COMMENT \"description\", T.TABLE_TYPE \"table_type\" FROM QSYS2.SYSTABLES T {} WHERE 1=1 ",
            include_join("T.TABLE_SCHEMA", "T.TABLE_NAME", filter)
        );
        let params = match table {
            Some(_) => {
                sql.push_str("AND T.TABLE_NAME=@table_name AND T.TABLE_SCHEMA=@schema_name");
                self.table_params(table)
            }
            None => {
                sql.push_str("AND ");
                sql.push_str(&include_predicate("T.TABLE_SCHEMA", "T.TABLE_NAME", filter));
                Params::new()
            }
        };
        sql.push_str(" ORDER BY T.TABLE_SCHEMA,T.TABLE_NAME");

        let types = if params.is_empty() {
            Vec::new()
        } else {
            vec![DeclaredType::VARCHAR_MAX; 2]
        };
        let rows = self.db.exec_recordset("", &sql, &types, &params).await?;
        let default_schema = self.db.default_schema();
        let mut result = MetaResult::default();
        for row in rows {
            let schema = text(&row, "schema_name").unwrap_or_default();
            let name = text(&row, "table_name").unwrap_or_default();
            if table.is_none() && schema == FRAMEWORK_SCHEMA {
                continue;
            }
            let qualified = !schema.is_empty() && schema != default_schema;
            result.items.push(TableInfo {
                description: text(&row, "description"),
                table_type: if text(&row, "table_type").as_deref() == Some("V") {
                    TableType::View
                } else {
                    TableType::Table
                },
                model_name: if schema == default_schema {
                    name.clone()
                } else {
                    format!("{schema}_{name}")
                },
                table_selector: if qualified {
                    format!("{schema}.{name}")
                } else {
                    name.clone()
                },
                schema,
                name,
            });
        }
        Ok(result)
    }

    /// Column descriptors. Columns of unsupported types are skipped with a warning message.
    pub async fn table_fields(&self, table: Option<&TableRef>) -> DbResult<MetaResult<TableField>> {
        let filter = self.filter();
        if filter.is_empty() {
            return Ok(MetaResult::default());
        }
        let sql = format!(
            "SELECT C.TABLE_SCHEMA \"schema_name\", C.TABLE_NAME \"table_name\", COLUMN_NAME \"column_name\", \
             DATA_TYPE \"type_name\", CHARACTER_MAXIMUM_LENGTH \"max_length\", \
             COALESCE(NUMERIC_PRECISION, DATETIME_PRECISION) \"precision\", NUMERIC_SCALE \"scale\", \
             CASE WHEN HAS_DEFAULT = 'N' AND IS_NULLABLE = 'N' THEN 1 ELSE 0 END \"required\", \
             CASE IS_UPDATABLE WHEN 'N' THEN 1 ELSE 0 END \"readonly\", \
             C.LONG_COMMENT \"description\", \
             CASE IS_IDENTITY WHEN 'YES' THEN 1 ELSE 0 END \"primary_key\" \
             FROM QSYS2.SYSCOLUMNS C {} WHERE {} \
             AND C.TABLE_SCHEMA = COALESCE(@schema_name, C.TABLE_SCHEMA) \
             AND C.TABLE_NAME = COALESCE(@table_name, C.TABLE_NAME) \
             ORDER BY C.TABLE_SCHEMA, C.TABLE_NAME, ORDINAL_POSITION",
            include_join("C.TABLE_SCHEMA", "C.TABLE_NAME", filter),
            include_predicate("C.TABLE_SCHEMA", "C.TABLE_NAME", filter),
        );
        let rows = self
            .db
            .exec_recordset(
                "",
                &sql,
                &[DeclaredType::VARCHAR_MAX, DeclaredType::VARCHAR_MAX],
                &self.table_params(table),
            )
            .await?;

        let mut result = MetaResult::default();
        for row in rows {
            match table_field(&row) {
                Some(field) => result.items.push(field),
                None => {
                    let message = format!(
                        "WARNING - Skipping Column: {}.{}.{}: Data type {} not supported.",
                        text(&row, "schema_name").unwrap_or_default(),
                        text(&row, "table_name").unwrap_or_default(),
                        text(&row, "column_name").unwrap_or_default(),
                        text(&row, "type_name").unwrap_or_default(),
                    );
                    warn!("{message}");
                    result.messages.push(message);
                }
            }
        }
        Ok(result)
    }

    pub async fn foreign_keys(&self, table: Option<&TableRef>) -> DbResult<MetaResult<ForeignKey>> {
        let filter = self.filter();
        if filter.is_empty() {
            return Ok(MetaResult::default());
        }
        let sql = format!(
            "SELECT FKTABLE_SCHEM \"child_schema\", FKTABLE_NAME \"child_table\", FKCOLUMN_NAME \"child_column\", \
             PKTABLE_SCHEM \"parent_schema\", PKTABLE_NAME \"parent_table\", PKCOLUMN_NAME \"parent_column\" \
             FROM SYSIBM.SQLFOREIGNKEYS {} \
             WHERE FKTABLE_SCHEM = COALESCE(@schema_name, FKTABLE_SCHEM) \
             AND FKTABLE_NAME = COALESCE(@table_name, FKTABLE_NAME) \
             AND {} \
             ORDER BY FKTABLE_SCHEM, FKTABLE_NAME, FKCOLUMN_NAME",
            include_join("FKTABLE_SCHEM", "FKTABLE_NAME", filter),
            include_predicate("FKTABLE_SCHEM", "FKTABLE_NAME", filter),
        );
        let rows = self
            .db
            .exec_recordset(
                "",
                &sql,
                &[DeclaredType::VARCHAR_MAX, DeclaredType::VARCHAR_MAX],
                &self.table_params(table),
            )
            .await?;

        let column = |row: &Row, prefix: &str| ColumnRef {
            schema_name: text(row, &format!("{prefix}_schema")).unwrap_or_default(),
            table_name: text(row, &format!("{prefix}_table")).unwrap_or_default(),
            column_name: text(row, &format!("{prefix}_column")).unwrap_or_default(),
        };
        Ok(MetaResult {
            messages: Vec::new(),
            items: rows
                .iter()
                .map(|row| ForeignKey {
                    from: column(row, "child"),
                    to: column(row, "parent"),
                })
                .collect(),
        })
    }
}

/// Join against `QSYS2.TABLES` when every accessible table is selected.
///
/// `QSYS2.TABLES` lists only the tables the current user can access.
pub(crate) fn include_join(schema_column: &str, table_column: &str, filter: &[String]) -> String {
    if filter.iter().any(|f| f == "%.%") {
        format!(
            " INNER JOIN QSYS2.TABLES I ON ({schema_column} = I.TABLE_SCHEMA AND {table_column} = I.TABLE_NAME) "
        )
    } else {
        String::new()
    }
}

/// Predicate selecting the catalog rows matched by `filter`.
pub(crate) fn include_predicate(schema_column: &str, table_column: &str, filter: &[String]) -> String {
    if filter.is_empty() {
        return "(0=1)".to_string();
    }
    if filter.iter().any(|f| f == "%.%") {
        return format!("({schema_column} NOT IN ({SYSTEM_SCHEMAS}))");
    }

    let quote = |s: &str| encode_literal(DeclaredType::VARCHAR_MAX, &ParamValue::Text(s.to_string()));
    let mut schemas = Vec::new();
    let mut clauses = Vec::new();
    for entry in filter {
        let upper = entry.to_uppercase();
        let parts: Vec<&str> = upper.split('.').collect();
        let [schema, table] = parts.as_slice() else {
            warn!(value = %entry, "Invalid metadata_filter value");
            continue;
        };
        let (schema, table) = (*schema, *table);
        if table == "%" {
            schemas.push(quote(schema));
        } else {
            clauses.push(format!(
                "({schema_column} = {} AND {table_column} = {})",
                quote(schema),
                quote(table)
            ));
        }
    }
    if !schemas.is_empty() {
        clauses.push(format!("{schema_column} IN ({})", schemas.join(",")));
    }
    if clauses.is_empty() {
        return "(0=1)".to_string();
    }
    format!("({})", clauses.join(" OR "))
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(row: &Row, key: &str) -> Option<i64> {
    match row.get(key)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(row: &Row, key: &str) -> bool {
    number(row, key).is_some_and(|n| n != 0)
}

/// Build a field descriptor from a `QSYS2.SYSCOLUMNS` row.
fn table_field(row: &Row) -> Option<TableField> {
    let column_type = ColumnType::from_catalog(&text(row, "type_name")?)?;
    let precision = number(row, "precision");
    let precision = match column_type {
        ColumnType::Decimal | ColumnType::Numeric => {
            precision.map(|p| Precision::Scaled(p, number(row, "scale").unwrap_or(0)))
        }
        // double precision reports 52 or 53; both are the default float
        ColumnType::Float => precision
            .filter(|p| *p != 52 && *p != 53)
            .map(Precision::Digits),
        ColumnType::DecFloat | ColumnType::Date | ColumnType::Time | ColumnType::Timestamp => {
            precision.map(Precision::Digits)
        }
        _ => None,
    };
    Some(TableField {
        name: text(row, "column_name").unwrap_or_default(),
        column_type,
        length: if column_type.has_length() {
            number(row, "max_length")
        } else {
            None
        },
        precision,
        required: flag(row, "required"),
        readonly: flag(row, "readonly"),
        primary_key: flag(row, "primary_key"),
        description: text(row, "description"),
        coldef: JsonValue::Object(row.clone()),
    })
}
