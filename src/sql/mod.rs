//! DB2 for i dialect: literal encoding, statement splitting and statement composition.

pub mod clause;
pub mod composer;
pub mod fragment;
pub mod literal;
pub mod lov;
pub mod search;
pub mod split;

pub use composer::{
    Composer, ExtField, FormQuery, FormSelect, InsertQuery, InsertSql, MultiselQuery,
    MultiselUpdate, RETURN_ROW_COUNT, RecordsetQuery, RecordsetSql, UpdateQuery,
};
pub use fragment::{Fragment, Slot};
pub use literal::{apply_sql_params, escape, encode_literal};
pub use search::{SearchTerm, render_search};
pub use split::split_statements;
