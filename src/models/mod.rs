//! Data models for the iSeries SQL engine.
//!
//! This module re-exports all model types used throughout the crate.

pub mod model;
pub mod query;
pub mod result;
pub mod schema;

// Re-export commonly used types
pub use model::{
    CatalogEntry, CodeKind, CodeMap, CodeScope, CodeTable, Comparison, ComposerOptions,
    DefaultField, FieldDef, FieldType, LovDef, LovValue, ModelDef, ParamDatalock, SearchNode,
    SortDirection, SortField, TableSource,
};
pub use query::{DateValue, DeclaredType, Length, ParamValue, Params};
pub use result::{
    ColumnInfo, ExecOutput, ExecValue, ROW_COUNT_COLUMN, ReturnType, Row, StatementResult,
};
pub use schema::{
    ColumnRef, ColumnType, ForeignKey, MetaResult, Precision, TableField, TableInfo, TableRef,
    TableType,
};
