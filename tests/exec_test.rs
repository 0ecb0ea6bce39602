//! Integration tests for the execution API.
//!
//! Tests verify that:
//! - Results are shaped per return type (scalar, row, recordset, multirecordset)
//! - Commands are wrapped into one compound block unless disabled
//! - Caller context and pre-session SQL are sent once per connection where required
//! - Parameters are bound as DB2 literals before execution
//! - Inserts without key fields surface a synthesized row count

mod common;

use common::{Reply, ScriptedDriver, columns, pooled_config};
use iseries_sql_engine::config::DbConfig;
use iseries_sql_engine::db::Database;
use iseries_sql_engine::db::database::CONTEXT_INIT_SQL;
use iseries_sql_engine::db::types::SQL_INTEGER;
use iseries_sql_engine::models::{
    DeclaredType, ExecValue, FieldDef, FieldType, ModelDef, Params, ROW_COUNT_COLUMN, ReturnType,
};
use iseries_sql_engine::sql::{Composer, InsertQuery};
use serde_json::json;

/// Answers `SELECT <n> AS <NAME> ...` with one row, everything else with one affected row.
fn select_driver() -> ScriptedDriver {
    ScriptedDriver::new(|sql| {
        let words: Vec<&str> = sql.split_whitespace().collect();
        match words.as_slice() {
            ["SELECT", value, "AS", name, ..] => {
                let value: i64 = value.parse().unwrap_or(0);
                let mut row = serde_json::Map::new();
                row.insert(name.to_string(), json!(value));
                Ok(Reply::Rows(columns(&[(*name, SQL_INTEGER)]), vec![row]))
            }
            _ => Ok(Reply::Affected(1)),
        }
    })
}

fn db(driver: &ScriptedDriver, config: DbConfig) -> Database {
    Database::with_driver(config, driver.arc()).unwrap()
}

#[tokio::test]
async fn test_scalar_returns_last_column_of_first_row() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));

    let value = db
        .exec_scalar("", "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1", &[], &Params::new())
        .await
        .unwrap();

    assert_eq!(value, Some(json!(1)));
}

#[tokio::test]
async fn test_multirecordset_returns_each_result_set() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));

    let sets = db
        .exec_multirecordset(
            "",
            "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1; SELECT 2 AS TWO FROM SYSIBM.SYSDUMMY1",
            &[],
            &Params::new(),
        )
        .await
        .unwrap();

    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].len(), 1);
    assert_eq!(sets[0][0]["ONE"], json!(1));
    assert_eq!(sets[1][0]["TWO"], json!(2));
}

#[tokio::test]
async fn test_statements_without_result_sets_are_not_surfaced() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));

    let output = db
        .exec(
            "",
            ReturnType::MultiRecordset,
            "UPDATE T SET A = 1; SELECT 5 AS FIVE FROM SYSIBM.SYSDUMMY1",
            &[],
            &Params::new(),
        )
        .await
        .unwrap();

    match output.value {
        ExecValue::MultiRecordset(sets) => {
            assert_eq!(sets.len(), 1);
            assert_eq!(sets[0][0]["FIVE"], json!(5));
        }
        other => panic!("unexpected value: {other:?}"),
    }
    assert!(output.notices.is_empty());
}

#[tokio::test]
async fn test_row_and_recordset_shapes() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));

    let row = db
        .exec_row("", "SELECT 7 AS SEVEN FROM SYSIBM.SYSDUMMY1", &[], &Params::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["SEVEN"], json!(7));

    let none = db
        .exec_row("", "DELETE FROM T", &[], &Params::new())
        .await
        .unwrap();
    assert_eq!(none, None);

    let recordset = db
        .exec_recordset("", "DELETE FROM T", &[], &Params::new())
        .await
        .unwrap();
    assert!(recordset.is_empty());
}

#[tokio::test]
async fn test_parameters_are_bound_as_literals() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));
    let params = Params::new()
        .with("one", "one")
        .with("two", "2022-01-27 01:02:03");

    db.exec_recordset(
        "",
        "select @one, @two",
        &[DeclaredType::VARCHAR_MAX, DeclaredType::DateTime],
        &params,
    )
    .await
    .unwrap();

    assert_eq!(
        driver.executed(),
        vec!["select 'one', TIMESTAMP('2022-01-27 01:02:03.000')"]
    );
}

#[tokio::test]
async fn test_command_is_wrapped_in_compound_block() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("exec"));

    db.exec_command(
        "",
        "INSERT INTO T VALUES ('a\\;b'); UPDATE T SET A = 2",
        &[],
        &Params::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        driver.executed(),
        vec!["BEGIN INSERT INTO T VALUES ('a;b'); UPDATE T SET A = 2; END"]
    );
}

#[tokio::test]
async fn test_command_split_when_compound_disabled() {
    let driver = select_driver();
    let mut config = pooled_config("exec");
    config.options.automatic_compound_commands = Some(false);
    let db = db(&driver, config);

    db.exec_command(
        "",
        "INSERT INTO T VALUES (1); UPDATE T SET A = 2;",
        &[],
        &Params::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        driver.executed(),
        vec!["INSERT INTO T VALUES (1)", "UPDATE T SET A = 2"]
    );
}

#[tokio::test]
async fn test_context_initializes_session_meta_once_per_connection() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("ctx"));

    for _ in 0..2 {
        db.exec_recordset("S7", "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1", &[], &Params::new())
            .await
            .unwrap();
    }

    let update = "UPDATE SESSION.JSHARMONY_META SET CONTEXT = 'S7'";
    assert_eq!(
        driver.executed(),
        vec![
            CONTEXT_INIT_SQL,
            update,
            "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1",
            update,
            "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1",
        ]
    );
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn test_context_inside_compound_command() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("ctx"));

    db.exec_command("S7", "DELETE FROM T", &[], &Params::new())
        .await
        .unwrap();

    assert_eq!(
        driver.executed(),
        vec![format!(
            "BEGIN {CONTEXT_INIT_SQL}; UPDATE SESSION.JSHARMONY_META SET CONTEXT = 'S7'; DELETE FROM T; END"
        )]
    );
}

#[tokio::test]
async fn test_presql_runs_once_per_connection() {
    let driver = select_driver();
    let mut config = pooled_config("pre");
    config.options.presql = Some("SET PATH = APP; SET SCHEMA = APP".into());
    let db = db(&driver, config);

    for _ in 0..2 {
        db.exec_scalar("", "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1", &[], &Params::new())
            .await
            .unwrap();
    }

    assert_eq!(
        driver.executed(),
        vec![
            "SET PATH = APP",
            "SET SCHEMA = APP",
            "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1",
            "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1",
        ]
    );
}

#[tokio::test]
async fn test_presql_runs_on_every_unpooled_connection() {
    let driver = select_driver();
    let mut config = DbConfig::new("adhoc", "odbc://scripted");
    config.options.presql = Some("SET SCHEMA = APP".into());
    let db = db(&driver, config);

    for _ in 0..2 {
        db.exec_scalar("", "SELECT 1 AS ONE FROM SYSIBM.SYSDUMMY1", &[], &Params::new())
            .await
            .unwrap();
    }

    let on = driver.executed_on();
    assert_eq!(on.len(), 4);
    assert_eq!(on[0], (1, "SET SCHEMA = APP".to_string()));
    assert_eq!(on[2], (2, "SET SCHEMA = APP".to_string()));
}

#[tokio::test]
async fn test_insert_without_keys_returns_synthesized_row_count() {
    let driver = select_driver();
    let db = db(&driver, pooled_config("insert"));
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
            &Params::new().with("c_name", "Ann"),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row[ROW_COUNT_COLUMN], json!(1));
    assert_eq!(driver.executed(), vec!["INSERT INTO C(c_name)  VALUES('Ann')"]);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let mut config = pooled_config("bad");
    config.options.max_size = Some(0);
    let result = Database::with_driver(config, ScriptedDriver::affected().arc());
    assert!(result.is_err());
}
