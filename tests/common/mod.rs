//! Scripted in-memory driver shared by the integration tests.
//!
//! Every statement is answered by a caller-supplied responder. The driver records what it was
//! asked to do so tests can assert on connects, closes, executed SQL and transaction control.

#![allow(dead_code)]

use async_trait::async_trait;
use iseries_sql_engine::config::DbConfig;
use iseries_sql_engine::db::diagnostics::Diagnostic;
use iseries_sql_engine::db::{Cursor, Driver, DriverConnection, Page};
use iseries_sql_engine::error::{DbError, DbResult};
use iseries_sql_engine::models::{ColumnInfo, Row};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend answer to one statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<ColumnInfo>, Vec<Row>),
    Affected(u64),
    /// The statement opens, but fetching fails.
    FetchError(DbError),
}

pub type Responder = dyn Fn(&str) -> DbResult<Reply> + Send + Sync;

pub struct Inner {
    responder: Box<Responder>,
    connect_errors: Mutex<VecDeque<DbError>>,
    connect_delay: Mutex<Option<Duration>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub cursor_closes: AtomicUsize,
    pub fetches: AtomicUsize,
    /// (connection number, statement)
    pub executed: Mutex<Vec<(usize, String)>>,
    pub control: Mutex<Vec<&'static str>>,
}

#[derive(Clone)]
pub struct ScriptedDriver {
    pub inner: Arc<Inner>,
}

impl ScriptedDriver {
    pub fn new(responder: impl Fn(&str) -> DbResult<Reply> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                responder: Box::new(responder),
                connect_errors: Mutex::new(VecDeque::new()),
                connect_delay: Mutex::new(None),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                cursor_closes: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                executed: Mutex::new(Vec::new()),
                control: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A driver answering every statement with no result set and one affected row.
    pub fn affected() -> Self {
        Self::new(|_| Ok(Reply::Affected(1)))
    }

    pub fn fail_next_connect(&self, err: DbError) {
        self.inner.connect_errors.lock().unwrap().push_back(err);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.inner.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn cursor_closes(&self) -> usize {
        self.inner.cursor_closes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner
            .executed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub fn executed_on(&self) -> Vec<(usize, String)> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub fn control(&self) -> Vec<&'static str> {
        self.inner.control.lock().unwrap().clone()
    }

    pub fn arc(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn connect(&self, _config: &DbConfig) -> DbResult<Box<dyn DriverConnection>> {
        let delay = *self.inner.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.inner.connect_errors.lock().unwrap().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        let number = self.inner.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedConnection {
            inner: Arc::clone(&self.inner),
            number,
        }))
    }
}

struct ScriptedConnection {
    inner: Arc<Inner>,
    number: usize,
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        fetch_size: usize,
    ) -> DbResult<Box<dyn Cursor + 'a>> {
        self.inner
            .executed
            .lock()
            .unwrap()
            .push((self.number, sql.to_string()));
        let reply = (self.inner.responder)(sql)?;
        let (columns, rows, row_count, error) = match reply {
            Reply::Rows(columns, rows) => {
                let count = rows.len() as u64;
                (columns, rows, count, None)
            }
            Reply::Affected(count) => (Vec::new(), Vec::new(), count, None),
            Reply::FetchError(err) => (Vec::new(), Vec::new(), 0, Some(err)),
        };
        Ok(Box::new(ScriptedCursor {
            inner: Arc::clone(&self.inner),
            columns,
            rows: rows.into(),
            row_count,
            fetch_size,
            error,
        }))
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.inner.control.lock().unwrap().push("begin");
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.inner.control.lock().unwrap().push("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.inner.control.lock().unwrap().push("rollback");
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedCursor {
    inner: Arc<Inner>,
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Row>,
    row_count: u64,
    fetch_size: usize,
    error: Option<DbError>,
}

#[async_trait]
impl Cursor for ScriptedCursor {
    async fn fetch(&mut self) -> DbResult<Page> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let take = self.fetch_size.min(self.rows.len());
        let rows: Vec<Row> = self.rows.drain(..take).collect();
        Ok(Page {
            columns: self.columns.clone(),
            rows,
            row_count: self.row_count,
            no_data: self.rows.is_empty(),
        })
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.inner.cursor_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Column descriptors from `(name, ODBC type code)` pairs.
pub fn columns(defs: &[(&str, i32)]) -> Vec<ColumnInfo> {
    defs.iter()
        .map(|(name, code)| ColumnInfo::new(*name, *code))
        .collect()
}

/// Rows from JSON objects.
pub fn rows(values: Vec<JsonValue>) -> Vec<Row> {
    values
        .into_iter()
        .map(|v| match v {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        })
        .collect()
}

/// A transport failure as raised by the backend.
pub fn network_error() -> DbError {
    DbError::backend(
        "[odbc] Error executing the sql statement",
        vec![Diagnostic::new(
            "08S01",
            10054,
            "[IBM][System i Access ODBC Driver]Communication link failure. comm rc=10054 - CWBCO1047",
        )],
    )
}

/// A connect failure that is not transport related.
pub fn login_error() -> DbError {
    DbError::connect_failed(
        "Login failed",
        vec![Diagnostic::new("28000", 8002, "invalid password")],
    )
}

pub fn pooled_config(id: &str) -> DbConfig {
    let mut config = DbConfig::new(id, "odbc://scripted");
    config.options.pooled = Some(true);
    config
}
