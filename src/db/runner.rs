//! Statement runner.
//!
//! Executes a statement list in order on one session. Every statement is drained through a
//! cursor a page at a time, and its rows are normalized before anyone sees them.

use crate::config::DbConfig;
use crate::db::driver::Cursor;
use crate::db::session::Session;
use crate::db::types::{normalize_bigints, trim_row};
use crate::error::DbResult;
use crate::models::{ColumnInfo, Row, StatementResult};
use crate::sql::RETURN_ROW_COUNT;
use std::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct StatementRunner {
    fetch_size: usize,
    autotrim: bool,
}

impl StatementRunner {
    pub fn new(fetch_size: usize, autotrim: bool) -> Self {
        Self {
            fetch_size: fetch_size.max(1),
            autotrim,
        }
    }

    pub fn for_config(config: &DbConfig) -> Self {
        Self::new(
            config.options.fetch_size_or_default(),
            config.options.autotrim_or_default(),
        )
    }

    /// Run `statements` in order, one result per statement.
    ///
    /// A failing statement stops the run; the error carries its index.
    pub async fn run_statements(
        &self,
        session: &mut Session,
        statements: &[String],
    ) -> DbResult<Vec<StatementResult>> {
        let mut results = Vec::with_capacity(statements.len());
        let mut row_count = 0;
        for (index, sql) in statements.iter().enumerate() {
            let result = if is_row_count_sentinel(sql) {
                StatementResult::row_count_sentinel(row_count)
            } else {
                self.run_statement(session, sql)
                    .await
                    .map_err(|err| err.at_statement(index).with_sql(sql.as_str()))?
            };
            row_count = result.row_count;
            results.push(result);
        }
        Ok(results)
    }

    async fn run_statement(&self, session: &mut Session, sql: &str) -> DbResult<StatementResult> {
        debug!(target: "iseries_sql_engine::sql", session_id = session.id(), "{sql}");
        let start = Instant::now();
        let mut cursor = session.connection().query(sql, self.fetch_size).await?;
        trace!(elapsed_ms = start.elapsed().as_millis() as u64, "Query executed");

        let drained = drain(cursor.as_mut()).await;
        let start = Instant::now();
        let closed = cursor.close().await;
        trace!(elapsed_ms = start.elapsed().as_millis() as u64, "Cursor closed");
        let (columns, mut rows, row_count) = drained?;
        if let Err(err) = closed {
            debug!(error = %err, "Error closing cursor");
        }

        if columns.is_empty() && rows.is_empty() {
            return Ok(StatementResult::no_result(row_count));
        }
        for row in rows.iter_mut() {
            if self.autotrim {
                trim_row(row, &columns);
            }
            normalize_bigints(row, &columns);
        }
        Ok(StatementResult {
            rows: Some(rows),
            columns,
            row_count,
            synthesized: false,
        })
    }
}

fn is_row_count_sentinel(sql: &str) -> bool {
    sql.trim() == RETURN_ROW_COUNT
}

async fn drain(cursor: &mut (dyn Cursor + '_)) -> DbResult<(Vec<ColumnInfo>, Vec<Row>, u64)> {
    let start = Instant::now();
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    let mut row_count = 0;
    let mut pages = 0;
    loop {
        let page = cursor.fetch().await?;
        pages += 1;
        if columns.is_empty() {
            columns = page.columns;
        }
        rows.extend(page.rows);
        row_count = page.row_count;
        if page.no_data {
            break;
        }
    }
    trace!(
        pages,
        rows = rows.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Cursor drained"
    );
    Ok((columns, rows, row_count))
}
