//! Execution API.
//!
//! [`Database`] ties a configuration to the session executor: it binds parameters, adds the
//! pre-session and context statements, chooses between split and compound execution, and
//! shapes the surfaced recordsets for the requested [`ReturnType`].

use crate::config::DbConfig;
use crate::db::driver::Driver;
use crate::db::meta::Meta;
use crate::db::pool::PoolManager;
use crate::db::runner::StatementRunner;
use crate::db::session::{Session, SessionExecutor, UnitOfWork};
use crate::db::sqlx_driver::SqlxDriver;
use crate::db::transaction::Transaction;
use crate::error::{DbError, DbResult};
use crate::models::{DeclaredType, ExecOutput, ExecValue, Params, ReturnType, Row};
use crate::sql::{apply_sql_params, escape, split_statements};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Creates the session context table. Runs the first time a connection receives a context.
pub const CONTEXT_INIT_SQL: &str = "DECLARE GLOBAL TEMPORARY TABLE SESSION.JSHARMONY_META AS (SELECT 'USystem' CONTEXT FROM SYSIBM.SYSDUMMY1) WITH DATA WITH REPLACE";

/// Outputs of completed transaction tasks, keyed by task name in completion order.
pub type TaskResults = serde_json::Map<String, JsonValue>;

/// A named step of [`Database::run_transaction`].
#[async_trait]
pub trait TransactionTask: Send + Sync {
    /// Run the step inside `tx`. `prior` holds the outputs of the steps that already ran.
    async fn run(
        &self,
        db: &Database,
        tx: &Transaction<'_>,
        prior: &TaskResults,
    ) -> DbResult<JsonValue>;
}

pub struct Database {
    config: DbConfig,
    executor: SessionExecutor,
}

impl Database {
    /// Create a database handle over the `sqlx` backend with its own pool manager.
    pub fn connect(config: DbConfig) -> DbResult<Self> {
        Self::with_driver(config, Arc::new(SqlxDriver::new()))
    }

    pub fn with_driver(config: DbConfig, driver: Arc<dyn Driver>) -> DbResult<Self> {
        Self::with_pools(config, Arc::new(PoolManager::new(driver)))
    }

    /// Create a database handle sharing an existing pool manager.
    pub fn with_pools(config: DbConfig, pools: Arc<PoolManager>) -> DbResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor: SessionExecutor::new(pools),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        self.executor.pools()
    }

    pub fn default_schema(&self) -> &str {
        self.config.options.default_schema_or_default()
    }

    /// Catalog introspection for this database.
    pub fn meta(&self) -> Meta<'_> {
        Meta::new(self)
    }

    /// Execute `sql` and shape the result for `return_type`.
    pub async fn exec(
        &self,
        context: &str,
        return_type: ReturnType,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<ExecOutput> {
        self.exec_in(None, context, return_type, sql, types, params)
            .await
    }

    /// Execute `sql` inside `tx`, or in its own session when `tx` is `None`.
    pub async fn exec_in(
        &self,
        tx: Option<&Transaction<'_>>,
        context: &str,
        return_type: ReturnType,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<ExecOutput> {
        let start = Instant::now();
        let sql = apply_sql_params(sql, types, params)?;
        let work = ExecWork {
            context,
            sql: &sql,
            compound: return_type == ReturnType::Command
                && self.config.options.automatic_compound_commands_or_default(),
            runner: StatementRunner::for_config(&self.config),
        };
        let recordsets = self.executor.run(tx, &self.config, &work).await?;
        debug!(
            connection_id = %self.config.id,
            return_type = %return_type,
            recordsets = recordsets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Exec complete"
        );
        Ok(ExecOutput::new(ExecValue::shape(return_type, recordsets)))
    }

    /// First row of the first recordset.
    pub async fn exec_row(
        &self,
        context: &str,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<Option<Row>> {
        match self
            .exec(context, ReturnType::Row, sql, types, params)
            .await?
            .value
        {
            ExecValue::Row(row) => Ok(row),
            other => Err(unexpected_shape(ReturnType::Row, &other)),
        }
    }

    pub async fn exec_recordset(
        &self,
        context: &str,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<Vec<Row>> {
        match self
            .exec(context, ReturnType::Recordset, sql, types, params)
            .await?
            .value
        {
            ExecValue::Recordset(rows) => Ok(rows),
            other => Err(unexpected_shape(ReturnType::Recordset, &other)),
        }
    }

    pub async fn exec_multirecordset(
        &self,
        context: &str,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<Vec<Vec<Row>>> {
        match self
            .exec(context, ReturnType::MultiRecordset, sql, types, params)
            .await?
            .value
        {
            ExecValue::MultiRecordset(sets) => Ok(sets),
            other => Err(unexpected_shape(ReturnType::MultiRecordset, &other)),
        }
    }

    /// Last column of the first row of the first recordset.
    pub async fn exec_scalar(
        &self,
        context: &str,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<Option<JsonValue>> {
        match self
            .exec(context, ReturnType::Scalar, sql, types, params)
            .await?
            .value
        {
            ExecValue::Scalar(value) => Ok(value),
            other => Err(unexpected_shape(ReturnType::Scalar, &other)),
        }
    }

    pub async fn exec_command(
        &self,
        context: &str,
        sql: &str,
        types: &[DeclaredType],
        params: &Params,
    ) -> DbResult<()> {
        self.exec(context, ReturnType::Command, sql, types, params)
            .await
            .map(|_| ())
    }

    /// Run `tasks` in order inside one transaction.
    ///
    /// The pre-session statements run first. Any failure rolls the transaction back and is
    /// returned; otherwise the transaction commits and every task's output is returned.
    pub async fn run_transaction(
        &self,
        tasks: &[(&str, &dyn TransactionTask)],
    ) -> DbResult<TaskResults> {
        let work = TransactionWork {
            db: self,
            tasks,
            runner: StatementRunner::for_config(&self.config),
        };
        self.executor.run(None, &self.config, &work).await
    }

    /// Close every pool owned by this handle's pool manager.
    pub async fn close_all(&self) {
        let start = Instant::now();
        self.executor.pools().close_all().await;
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "All connection pools closed"
        );
    }
}

fn unexpected_shape(expected: ReturnType, got: &ExecValue) -> DbError {
    DbError::internal(format!("Expected {expected} result, got {got:?}"))
}

/// Statements that publish the caller context to the session.
pub(crate) fn context_statements(session: &mut Session, context: &str) -> Vec<String> {
    if context.is_empty() {
        return Vec::new();
    }
    let update = format!(
        "UPDATE SESSION.JSHARMONY_META SET CONTEXT = '{}'",
        escape(context)
    );
    if session.has_meta() {
        return vec![update];
    }
    session.set_has_meta();
    vec![CONTEXT_INIT_SQL.to_string(), update]
}

/// Wrap statements into one `BEGIN ... END` block.
pub(crate) fn compound_statement(pre: &[String], context: &[String], sql: &str) -> String {
    let sql = sql.replace("\\;", ";");
    let body = pre
        .iter()
        .chain(context)
        .map(String::as_str)
        .chain(std::iter::once(sql.as_str()))
        .collect::<Vec<_>>()
        .join("; ");
    let terminator = if sql.ends_with(';') { "" } else { ";" };
    format!("BEGIN {body}{terminator} END")
}

struct ExecWork<'a> {
    context: &'a str,
    sql: &'a str,
    compound: bool,
    runner: StatementRunner,
}

#[async_trait]
impl UnitOfWork for ExecWork<'_> {
    type Output = Vec<Vec<Row>>;

    async fn run(&self, session: &mut Session, pre: &[String]) -> DbResult<Self::Output> {
        let context = context_statements(session, self.context);
        let statements = if self.compound {
            vec![compound_statement(pre, &context, self.sql)]
        } else {
            pre.iter()
                .cloned()
                .chain(context)
                .chain(split_statements(self.sql))
                .collect()
        };
        let results = self.runner.run_statements(session, &statements).await?;
        Ok(results.into_iter().filter_map(|r| r.rows).collect())
    }
}

struct TransactionWork<'a> {
    db: &'a Database,
    tasks: &'a [(&'a str, &'a dyn TransactionTask)],
    runner: StatementRunner,
}

impl TransactionWork<'_> {
    async fn run_tasks(&self, session: &mut Session, pre: &[String]) -> DbResult<TaskResults> {
        self.runner.run_statements(session, pre).await?;
        let tx = Transaction::new(session);
        debug!(transaction_id = %tx.id(), tasks = self.tasks.len(), "Transaction started");
        let mut results = TaskResults::new();
        for (name, task) in self.tasks {
            let output = task.run(self.db, &tx, &results).await?;
            results.insert(name.to_string(), output);
        }
        Ok(results)
    }
}

#[async_trait]
impl UnitOfWork for TransactionWork<'_> {
    type Output = TaskResults;

    async fn run(&self, session: &mut Session, pre: &[String]) -> DbResult<Self::Output> {
        session.connection().begin().await?;
        match self.run_tasks(session, pre).await {
            Ok(results) => {
                session.connection().commit().await?;
                Ok(results)
            }
            Err(err) => {
                if let Err(rollback_err) = session.connection().rollback().await {
                    debug!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
