//! Database layer.
//!
//! This module provides database access functionality:
//! - Driver seam and the `sqlx` backend
//! - Connection pool management with idle reclaim
//! - Session execution with network retry
//! - Statement running and row normalization
//! - Execution API, transactions and catalog introspection

pub mod database;
pub mod diagnostics;
pub mod driver;
pub mod meta;
pub mod pool;
pub mod runner;
pub mod session;
pub mod sqlx_driver;
pub mod transaction;
pub mod types;

pub use database::{Database, TaskResults, TransactionTask};
pub use driver::{Cursor, Driver, DriverConnection, Page};
pub use meta::Meta;
pub use pool::{ConnectionPool, Lease, PoolManager};
pub use runner::StatementRunner;
pub use session::{MAX_NETWORK_RETRIES, Session, SessionExecutor, UnitOfWork};
pub use sqlx_driver::SqlxDriver;
pub use transaction::Transaction;
