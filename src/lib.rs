//! iSeries SQL Engine Library
//!
//! DB2 for i dialect translation and execution: literal encoding, statement splitting,
//! datalock-aware statement composition, pooled sessions with network retry and cursor-based
//! result normalization.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sql;

pub use config::{Config, DbConfig, DbOptions};
pub use db::Database;
pub use error::{DbError, DbResult};
