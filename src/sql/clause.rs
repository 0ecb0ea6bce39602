//! Clause-level statement IR.
//!
//! Statements are assembled from a select list, a source, a predicate, an ordering and a
//! window, then rendered to a [`Fragment`]. The predicate keeps the datalock slot as a
//! structural member, so whether a statement can accept datalocks is known before any text
//! exists.

use crate::models::model::SortField;
use crate::sql::fragment::{Fragment, Slot};

/// One conjunct of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Rendered as ` AND <fragment>`.
    And(Fragment),
    /// Rendered as the datalock slot; each datalock adds its own ` AND`.
    Datalocks,
}

/// A conjunction rooted at a base predicate (`1=1` unless the model supplies one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    base: Fragment,
    /// Render the base as `(base)`.
    parenthesize_base: bool,
    terms: Vec<Term>,
}

impl Predicate {
    pub fn new(base: impl Into<Fragment>) -> Self {
        Self {
            base: base.into(),
            parenthesize_base: false,
            terms: Vec::new(),
        }
    }

    /// Base predicate taken from an optional, possibly empty, model predicate.
    pub fn from_model(sql_where: Option<&str>) -> Self {
        match sql_where.filter(|w| !w.is_empty()) {
            Some(w) => Self::new(Fragment::parse(w)),
            None => Self::new("1=1"),
        }
    }

    pub fn parenthesized(mut self) -> Self {
        self.parenthesize_base = true;
        self
    }

    pub fn and(mut self, term: impl Into<Fragment>) -> Self {
        self.terms.push(Term::And(term.into()));
        self
    }

    pub fn and_all<I, T>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Fragment>,
    {
        self.terms
            .extend(terms.into_iter().map(|t| Term::And(t.into())));
        self
    }

    pub fn with_datalock_slot(mut self) -> Self {
        self.terms.push(Term::Datalocks);
        self
    }

    pub fn has_datalock_slot(&self) -> bool {
        self.terms.contains(&Term::Datalocks)
    }

    pub fn render(&self) -> Fragment {
        let mut out = Fragment::new();
        if self.parenthesize_base {
            out.push_str("(").push(self.base.clone()).push_str(")");
        } else {
            out.push(self.base.clone());
        }
        for term in &self.terms {
            match term {
                Term::And(fragment) => {
                    out.push_str(" AND ").push(fragment.clone());
                }
                Term::Datalocks => {
                    out.push_slot(Slot::Datalocks);
                }
            }
        }
        out
    }
}

/// `LIMIT <count> OFFSET <start>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub items: Vec<Fragment>,
    pub from: Fragment,
    pub predicate: Option<Predicate>,
    pub order_by: Option<String>,
    pub window: Option<Window>,
}

impl Select {
    pub fn new<I, T>(items: I, from: impl Into<Fragment>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Fragment>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    pub fn window(mut self, start: u64, count: u64) -> Self {
        self.window = Some(Window { start, count });
        self
    }

    pub fn render(&self) -> Fragment {
        let mut out = Fragment::text("SELECT ");
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_str(",");
            }
            out.push(item.clone());
        }
        out.push_str(" FROM ").push(self.from.clone());
        if let Some(predicate) = &self.predicate {
            out.push_str(" WHERE ").push(predicate.render());
        }
        if let Some(order) = &self.order_by {
            out.push_str(format!(" ORDER BY {order}"));
        }
        if let Some(window) = &self.window {
            out.push_str(format!(" LIMIT {} OFFSET {}", window.count, window.start));
        }
        out
    }
}

/// Comma-joined `expression direction` pairs, `1` when there are none.
pub fn sort_expression(sort: &[SortField]) -> String {
    if sort.is_empty() {
        return "1".to_string();
    }
    sort.iter()
        .map(|s| {
            let expr = match &s.sql {
                Some(sql) => Fragment::parse(sql)
                    .fill_text(Slot::Inner, &s.field)
                    .to_string(),
                None => s.field.clone(),
            };
            format!("{} {}", expr, s.dir)
        })
        .collect::<Vec<_>>()
        .join(",")
}
