//! Search predicates.

use crate::error::{DbError, DbResult};
use crate::models::model::{Comparison, FieldDef, FieldType, ModelDef, SearchNode};
use crate::models::query::{DeclaredType, Length};
use crate::sql::composer::{Composer, field_expression};
use crate::sql::fragment::{Fragment, Slot};

/// A single search predicate and the parameter it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub sql: String,
    /// Declared type for the bound parameter, when the field type dictates one.
    pub declared_type: Option<DeclaredType>,
    /// Search value after wildcard decoration.
    pub value: String,
}

/// Render a search tree. `None` when it contributes nothing.
pub fn render_search(nodes: &[SearchNode]) -> Option<String> {
    let rendered = render_nodes(nodes);
    if rendered.trim().is_empty() {
        None
    } else {
        Some(rendered)
    }
}

fn render_nodes(nodes: &[SearchNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            SearchNode::Term(term) => {
                out.push(' ');
                out.push_str(term);
            }
            SearchNode::Group(children) => {
                let inner = render_nodes(children);
                if !inner.trim().is_empty() {
                    out.push_str(" (");
                    out.push_str(&inner);
                    out.push(')');
                }
            }
        }
    }
    out
}

fn ordering(fsql: &str, comparison: Comparison, param: &str) -> String {
    let op = match comparison {
        Comparison::Ne => "<>",
        Comparison::Gt => ">",
        Comparison::Lt => "<",
        Comparison::Ge => ">=",
        Comparison::Le => "<=",
        _ => "=",
    };
    format!("{fsql} {op} {param}")
}

impl Composer {
    /// Predicate comparing a field against the `@pname` parameter.
    pub fn search_term(
        &self,
        model: &ModelDef,
        field: &FieldDef,
        pname: &str,
        value: &str,
        comparison: Comparison,
    ) -> DbResult<SearchTerm> {
        let mut fsql = field.name.clone();
        if field.lov.as_ref().is_some_and(|lov| !lov.show_code) {
            fsql = self.lov_field_text(model, field)?;
        }
        if let Some(sql_select) = &field.sql_select {
            fsql = sql_select.clone();
        }
        if let Some(template) = field.sql_search.as_ref().or(field.sql_from_db.as_ref()) {
            fsql = field_expression(template, &fsql);
        }

        let param = Self::search_to_db(field, &format!("@{pname}"));
        let mut value = value.to_string();
        let unsupported = || {
            let type_name = field
                .field_type
                .and_then(|t| serde_json::to_value(t).ok())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            DbError::composition(format!("Search type {}/{} not supported.", field.name, type_name))
        };

        let (mut sql, declared_type) = match field.field_type {
            Some(FieldType::Boolean) => {
                let op = if comparison == Comparison::Ne { "<>" } else { "=" };
                (format!("{fsql} {op} {param}"), Some(DeclaredType::Boolean))
            }
            Some(FieldType::BigInt | FieldType::Int | FieldType::SmallInt | FieldType::TinyInt) => {
                (ordering(&fsql, comparison, &param), Some(DeclaredType::BigInt))
            }
            Some(FieldType::Decimal | FieldType::Float | FieldType::Date | FieldType::Time) => {
                (ordering(&fsql, comparison, &param), None)
            }
            Some(FieldType::DateTime) => {
                (ordering(&fsql, comparison, &param), Some(DeclaredType::DateTime))
            }
            Some(FieldType::VarChar | FieldType::Char) => {
                let like = |negate: bool| {
                    format!(
                        "UPPER({fsql}) {}LIKE UPPER({param})",
                        if negate { "NOT " } else { "" }
                    )
                };
                let sql = match comparison {
                    Comparison::Eq => like(false),
                    Comparison::Ne => like(true),
                    Comparison::NotContains => {
                        value = format!("%{value}%");
                        like(true)
                    }
                    Comparison::BeginsWith => {
                        value = format!("{value}%");
                        like(false)
                    }
                    Comparison::EndsWith => {
                        value = format!("%{value}");
                        like(false)
                    }
                    Comparison::SoundsLike if field.sql_search_sound.is_some() => {
                        let template = field.sql_search_sound.as_deref().unwrap_or_default();
                        Fragment::parse(template)
                            .fill_text(Slot::Field, &param)
                            .fill_text(Slot::Soundex, &format!("{param}_soundex"))
                            .to_string()
                    }
                    _ => {
                        value = format!("%{value}%");
                        like(false)
                    }
                };
                let length = Length::Chars(value.chars().count());
                (sql, Some(DeclaredType::VarChar(length)))
            }
            Some(FieldType::Hash) => {
                let length = field.length.map(Length::Chars).unwrap_or(Length::Max);
                let sql = match comparison {
                    Comparison::Eq => format!("{fsql} = {param}"),
                    Comparison::Ne => format!("{fsql} <> {param}"),
                    _ => String::new(),
                };
                (sql, Some(DeclaredType::VarBinary(length)))
            }
            Some(FieldType::Binary) | None => return Err(unsupported()),
        };

        match comparison {
            Comparison::Null if field.field_type.is_some_and(|t| t.is_textual()) => {
                sql = format!("COALESCE({fsql},'')=''");
            }
            Comparison::Null => sql = format!("{fsql} IS NULL"),
            Comparison::NotNull if field.field_type.is_some_and(|t| t.is_textual()) => {
                sql = format!("COALESCE({fsql},'')<>''");
            }
            Comparison::NotNull => sql = format!("{fsql} IS NOT NULL"),
            _ => {}
        }

        if sql.is_empty() {
            return Err(DbError::composition(format!(
                "Search comparison not supported on field {}.",
                field.name
            )));
        }

        Ok(SearchTerm {
            sql,
            declared_type,
            value,
        })
    }
}
