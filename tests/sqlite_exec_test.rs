//! End-to-end tests through the `sqlx` backend on SQLite.
//!
//! SQLite has no compound blocks or session tables, so these databases run with
//! `automatic_compound_commands` disabled and without a caller context.

use iseries_sql_engine::config::DbConfig;
use iseries_sql_engine::db::{Database, TaskResults, Transaction, TransactionTask};
use iseries_sql_engine::error::DbResult;
use iseries_sql_engine::models::{
    DeclaredType, FieldDef, FieldType, ModelDef, Params, ROW_COUNT_COLUMN, ReturnType,
};
use iseries_sql_engine::sql::{Composer, InsertQuery};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tempfile::NamedTempFile;

/// Create a pooled SQLite database in a temp file.
fn setup_db() -> (Database, tempfile::TempPath) {
    let path = NamedTempFile::new().unwrap().into_temp_path();
    let mut config = DbConfig::new("sqlite", format!("sqlite:{}?mode=rwc", path.display()));
    config.options.pooled = Some(true);
    config.options.automatic_compound_commands = Some(false);
    (Database::connect(config).unwrap(), path)
}

async fn create_customers(db: &Database) {
    db.exec_command(
        "",
        "CREATE TABLE C (c_id INTEGER PRIMARY KEY AUTOINCREMENT, c_name TEXT)",
        &[],
        &Params::new(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_scalar_select() {
    let (db, _path) = setup_db();
    let value = db
        .exec_scalar("", "SELECT 1 AS ONE", &[], &Params::new())
        .await
        .unwrap();
    assert_eq!(value, Some(json!(1)));
    db.close_all().await;
}

#[tokio::test]
async fn test_multirecordset() {
    let (db, _path) = setup_db();
    let sets = db
        .exec_multirecordset("", "SELECT 1 AS ONE; SELECT 2 AS TWO", &[], &Params::new())
        .await
        .unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0][0]["ONE"], json!(1));
    assert_eq!(sets[1][0]["TWO"], json!(2));
    db.close_all().await;
}

#[tokio::test]
async fn test_paged_select_with_trim() {
    let (db, _path) = setup_db();
    create_customers(&db).await;
    let values: Vec<String> = (0..230).map(|i| format!("('name{i}   ')")).collect();
    db.exec_command(
        "",
        &format!("INSERT INTO C (c_name) VALUES {}", values.join(",")),
        &[],
        &Params::new(),
    )
    .await
    .unwrap();

    let rows = db
        .exec_recordset("", "SELECT c_id, c_name FROM C ORDER BY c_id", &[], &Params::new())
        .await
        .unwrap();

    assert_eq!(rows.len(), 230);
    assert_eq!(rows[0]["c_name"], json!("name0"));
    assert_eq!(rows[229]["c_name"], json!("name229"));
    db.close_all().await;
}

#[tokio::test]
async fn test_insert_without_keys_reports_row_count() {
    let (db, _path) = setup_db();
    create_customers(&db).await;
    let mut model = ModelDef::new("Customer", "C");
    model.fields = vec![FieldDef::new("c_name").with_type(FieldType::VarChar)];
    let insert = Composer::default()
        .insert(
            &model,
            &InsertQuery {
                fields: &model.fields,
                ..Default::default()
            },
        )
        .unwrap();

    let row = db
        .exec_row(
            "",
            &insert.sql,
            &[DeclaredType::VARCHAR_MAX],
            &Params::new().with("c_name", "it's"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row[ROW_COUNT_COLUMN], json!(1));

    let name = db
        .exec_scalar("", "SELECT c_name FROM C", &[], &Params::new())
        .await
        .unwrap();
    assert_eq!(name, Some(json!("it's")));
    db.close_all().await;
}

#[tokio::test]
async fn test_sql_error_carries_statement_index() {
    let (db, _path) = setup_db();
    let err = db
        .exec_multirecordset("", "SELECT 1 AS ONE; SELECT * FROM MISSING", &[], &Params::new())
        .await
        .unwrap_err();
    assert!(!err.is_network());
    assert_eq!(err.statement_index(), Some(1));
    assert!(err.to_string().contains("MISSING"));
    db.close_all().await;
}

struct Insert(&'static str);

#[async_trait]
impl TransactionTask for Insert {
    async fn run(
        &self,
        db: &Database,
        tx: &Transaction<'_>,
        _prior: &TaskResults,
    ) -> DbResult<JsonValue> {
        let sql = format!("INSERT INTO C (c_name) VALUES ('{}')", self.0);
        db.exec_in(Some(tx), "", ReturnType::Command, &sql, &[], &Params::new())
            .await?;
        Ok(json!(self.0))
    }
}

struct Broken;

#[async_trait]
impl TransactionTask for Broken {
    async fn run(
        &self,
        db: &Database,
        tx: &Transaction<'_>,
        _prior: &TaskResults,
    ) -> DbResult<JsonValue> {
        db.exec_in(Some(tx), "", ReturnType::Command, "INSERT INTO NOPE VALUES (1)", &[], &Params::new())
            .await?;
        Ok(JsonValue::Null)
    }
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let (db, _path) = setup_db();
    create_customers(&db).await;

    let committed: [(&str, &dyn TransactionTask); 2] = [("a", &Insert("a")), ("b", &Insert("b"))];
    let results = db.run_transaction(&committed).await.unwrap();
    assert_eq!(results["b"], json!("b"));

    let rolled_back: [(&str, &dyn TransactionTask); 2] = [("c", &Insert("c")), ("broken", &Broken)];
    assert!(db.run_transaction(&rolled_back).await.is_err());

    let count = db
        .exec_scalar("", "SELECT COUNT(*) AS N FROM C", &[], &Params::new())
        .await
        .unwrap();
    assert_eq!(count, Some(json!(2)));
    db.close_all().await;
}
