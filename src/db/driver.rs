//! Driver seam.
//!
//! The engine talks to the database only through these traits: a [`Driver`] opens
//! connections, a [`DriverConnection`] runs statements and transaction control, and a
//! [`Cursor`] hands out a statement's rows one page at a time.

use crate::config::DbConfig;
use crate::error::DbResult;
use crate::models::{ColumnInfo, Row};
use async_trait::async_trait;

/// One page of a statement's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Column descriptors. Empty when the statement produced no result set.
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    /// Rows affected so far, as reported by the backend.
    pub row_count: u64,
    /// Set on the last page.
    pub no_data: bool,
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn connect(&self, config: &DbConfig) -> DbResult<Box<dyn DriverConnection>>;
}

#[async_trait]
pub trait DriverConnection: Send {
    /// Execute a statement and open a cursor over its output.
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        fetch_size: usize,
    ) -> DbResult<Box<dyn Cursor + 'a>>;

    async fn begin(&mut self) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    async fn close(self: Box<Self>) -> DbResult<()>;
}

#[async_trait]
pub trait Cursor: Send {
    async fn fetch(&mut self) -> DbResult<Page>;

    async fn close(self: Box<Self>) -> DbResult<()>;
}
