//! `sqlx` backend for the driver seam.
//!
//! Connections are `AnyConnection`s opened from URL connection strings, so every backend
//! compiled into `sqlx` can stand in for the iSeries. Statements run through `raw_sql`, rows
//! are streamed and handed out in pages, and column types are reported as ODBC codes.

use crate::config::DbConfig;
use crate::db::driver::{Cursor, Driver, DriverConnection, Page};
use crate::db::types::{RowToJson, categorize_type, sql_type_code};
use crate::error::{DbError, DbResult};
use crate::models::ColumnInfo;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::AnyConnection;
use sqlx::any::{AnyQueryResult, AnyRow};
use sqlx::{Column, Connection, Either, Executor, TypeInfo};
use std::time::Instant;
use tracing::trace;
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct SqlxDriver;

impl SqlxDriver {
    pub fn new() -> Self {
        sqlx::any::install_default_drivers();
        Self
    }

    /// Connection URL with separately supplied credentials applied.
    fn connection_url(config: &DbConfig) -> DbResult<String> {
        if config.user.is_none() && config.password.is_none() {
            return Ok(config.connection_string.clone());
        }
        let mut url = Url::parse(&config.connection_string)
            .map_err(|e| DbError::config(format!("Invalid URL: {e}")))?;
        if let Some(user) = &config.user {
            url.set_username(user)
                .map_err(|_| DbError::config("Connection string cannot carry a user name"))?;
        }
        if let Some(password) = &config.password {
            url.set_password(Some(password))
                .map_err(|_| DbError::config("Connection string cannot carry a password"))?;
        }
        Ok(url.to_string())
    }
}

impl Default for SqlxDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Statement-level failures while connecting are connection failures.
fn connect_error(err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        DbError::Sql {
            message,
            diagnostics,
            ..
        } => DbError::connect_failed(message, diagnostics),
        other => other,
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    async fn connect(&self, config: &DbConfig) -> DbResult<Box<dyn DriverConnection>> {
        let url = Self::connection_url(config)?;
        let start = Instant::now();
        let conn = AnyConnection::connect(&url).await.map_err(connect_error)?;
        trace!(
            connection_id = %config.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Connection opened"
        );
        Ok(Box::new(SqlxConnection { conn }))
    }
}

pub struct SqlxConnection {
    conn: AnyConnection,
}

impl SqlxConnection {
    async fn control(&mut self, sql: &str) -> DbResult<()> {
        self.conn.execute(sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    /// Result columns of a statement, empty when it has none or cannot be described.
    async fn describe_columns(&mut self, sql: &str) -> Vec<ColumnInfo> {
        match (&mut self.conn).describe(sql).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let mut info = ColumnInfo::new(
                        col.name(),
                        sql_type_code(categorize_type(col.type_info().name())),
                    );
                    info.nullable = describe.nullable(i);
                    info
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl DriverConnection for SqlxConnection {
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        fetch_size: usize,
    ) -> DbResult<Box<dyn Cursor + 'a>> {
        let columns = self.describe_columns(sql).await;
        let stream = sqlx::raw_sql(sql).fetch_many(&mut self.conn);
        Ok(Box::new(SqlxCursor {
            stream,
            columns,
            fetch_size: fetch_size.max(1),
            row_count: 0,
            exhausted: false,
        }))
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.control("ROLLBACK").await
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

struct SqlxCursor<'a> {
    stream: BoxStream<'a, Result<Either<AnyQueryResult, AnyRow>, sqlx::Error>>,
    columns: Vec<ColumnInfo>,
    fetch_size: usize,
    row_count: u64,
    exhausted: bool,
}

#[async_trait]
impl Cursor for SqlxCursor<'_> {
    async fn fetch(&mut self) -> DbResult<Page> {
        let mut rows = Vec::new();
        while !self.exhausted && rows.len() < self.fetch_size {
            match self.stream.try_next().await? {
                Some(Either::Left(result)) => self.row_count += result.rows_affected(),
                Some(Either::Right(row)) => {
                    if self.columns.is_empty() {
                        self.columns = row.get_column_info();
                    }
                    rows.push(row.to_json_map());
                }
                None => self.exhausted = true,
            }
        }
        Ok(Page {
            columns: self.columns.clone(),
            rows,
            row_count: self.row_count,
            no_data: self.exhausted,
        })
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        drop(self.stream);
        Ok(())
    }
}
