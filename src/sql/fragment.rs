//! SQL fragments with typed slots.
//!
//! A [`Fragment`] is statement text interleaved with named slots. Slots are filled
//! structurally, so a datalock can only be injected where a fragment actually exposes a
//! [`Slot::Datalocks`], and a missing slot is detected without searching rendered text.
//!
//! Model-level templates arrive as text with `%%%NAME%%%` markers. They are parsed into
//! fragments at the boundary by [`Fragment::parse`]; unknown markers stay literal text.

use crate::error::{DbError, DbResult};
use std::fmt;

/// A named insertion point inside a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Where ` AND <predicate>` is appended for each datalock.
    Datalocks,
    /// Where a wrapping template receives the statement it wraps.
    Inner,
    Table,
    Fields,
    Values,
    /// LOV truncation predicate.
    Truncate,
    /// Search value in phonetic comparator templates.
    Field,
    Soundex,
}

impl Slot {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Datalocks => "%%%DATALOCKS%%%",
            Self::Inner => "%%%SQL%%%",
            Self::Table => "%%%TABLE%%%",
            Self::Fields => "%%%FIELDS%%%",
            Self::Values => "%%%VALUES%%%",
            Self::Truncate => "%%%TRUNCATE%%%",
            Self::Field => "%%%FIELD%%%",
            Self::Soundex => "%%%SOUNDEX%%%",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "DATALOCKS" => Self::Datalocks,
            "SQL" => Self::Inner,
            "TABLE" => Self::Table,
            "FIELDS" => Self::Fields,
            "VALUES" => Self::Values,
            "TRUNCATE" => Self::Truncate,
            "FIELD" => Self::Field,
            "SOUNDEX" => Self::Soundex,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Slot(Slot),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    parts: Vec<Part>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text with no slots, even if it contains marker-like text.
    pub fn text(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_str(text);
        fragment
    }

    pub fn slot(slot: Slot) -> Self {
        Self {
            parts: vec![Part::Slot(slot)],
        }
    }

    /// Parse template text, turning known `%%%NAME%%%` markers into slots.
    pub fn parse(template: &str) -> Self {
        let mut fragment = Self::new();
        let mut rest = template;
        while let Some(start) = rest.find("%%%") {
            let after = &rest[start + 3..];
            let Some(len) = after.find("%%%") else {
                break;
            };
            match Slot::from_name(&after[..len]) {
                Some(slot) => {
                    fragment.push_str(&rest[..start]);
                    fragment.push_slot(slot);
                    rest = &after[len + 3..];
                }
                None => {
                    fragment.push_str(&rest[..start + 3]);
                    rest = after;
                }
            }
        }
        fragment.push_str(rest);
        fragment
    }

    pub fn push_str(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(Part::Text(last)) => last.push_str(&text),
            _ => self.parts.push(Part::Text(text)),
        }
        self
    }

    pub fn push_slot(&mut self, slot: Slot) -> &mut Self {
        self.parts.push(Part::Slot(slot));
        self
    }

    pub fn push(&mut self, other: Fragment) -> &mut Self {
        for part in other.parts {
            match part {
                Part::Text(text) => {
                    self.push_str(text);
                }
                Part::Slot(slot) => {
                    self.push_slot(slot);
                }
            }
        }
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.parts.iter().any(|p| *p == Part::Slot(slot))
    }

    /// Replace every occurrence of `slot` with `value`.
    pub fn fill(self, slot: Slot, value: &Fragment) -> Self {
        let mut out = Self::new();
        for part in self.parts {
            match part {
                Part::Slot(s) if s == slot => {
                    out.push(value.clone());
                }
                Part::Slot(s) => {
                    out.push_slot(s);
                }
                Part::Text(text) => {
                    out.push_str(text);
                }
            }
        }
        out
    }

    pub fn fill_text(self, slot: Slot, value: &str) -> Self {
        self.fill(slot, &Fragment::text(value))
    }

    /// Wrap this fragment with a model-level template at its inner slot.
    ///
    /// The template may carry its own datalock slot, which then becomes part of the result.
    pub fn wrap(self, template: Option<&str>) -> Self {
        match template {
            Some(template) => Fragment::parse(template).fill(Slot::Inner, &self),
            None => self,
        }
    }

    /// Inject datalock predicates at every datalock slot.
    ///
    /// Fails when predicates are supplied but the fragment exposes no datalock slot.
    pub fn apply_datalocks<S: AsRef<str>>(self, datalocks: &[S]) -> DbResult<Self> {
        self.apply_datalocks_with(datalocks, " AND ")
    }

    pub fn apply_datalocks_with<S: AsRef<str>>(
        self,
        datalocks: &[S],
        conjunction: &str,
    ) -> DbResult<Self> {
        if !datalocks.is_empty() && !self.has_slot(Slot::Datalocks) {
            return Err(DbError::datalock_slot_missing(self.to_string()));
        }
        let predicates: String = datalocks
            .iter()
            .map(|q| format!("{conjunction}{}", q.as_ref()))
            .collect();
        Ok(self.fill_text(Slot::Datalocks, &predicates))
    }

    /// Render to text. Datalock slots must have been resolved with [`apply_datalocks`].
    ///
    /// [`apply_datalocks`]: Fragment::apply_datalocks
    pub fn render(&self) -> DbResult<String> {
        if self.has_slot(Slot::Datalocks) {
            return Err(DbError::internal(format!(
                "Unresolved datalock slot in query: {self}"
            )));
        }
        Ok(self.render_lossy())
    }

    /// Render to text, dropping unfilled slots.
    fn render_lossy(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                Part::Text(text) => text.as_str(),
                Part::Slot(_) => "",
            })
            .collect()
    }

    /// Resolve datalocks and render in one step.
    pub fn finish<S: AsRef<str>>(self, datalocks: &[S]) -> DbResult<String> {
        self.apply_datalocks(datalocks)?.render()
    }
}

/// Template form, with slots shown as their markers.
impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                Part::Text(text) => f.write_str(text)?,
                Part::Slot(slot) => f.write_str(slot.marker())?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Fragment::text(text)
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::text(text)
    }
}

/// Prefix `sql` with a block that signals `JHDLE` unless `predicate` holds for the row
/// produced by `probe`.
pub fn datalock_guard(sql: Fragment, probe: &Fragment, predicate: &str) -> Fragment {
    let mut guarded = Fragment::text("BEGIN IF NOT EXISTS(SELECT * FROM (");
    guarded
        .push(probe.clone())
        .push_str(format!(
            ") DUAL WHERE {predicate}) THEN SIGNAL SQLSTATE VALUE 'JHDLE' SET MESSAGE_TEXT = 'INVALID ACCESS'\\; END IF\\; END; "
        ))
        .push(sql);
    guarded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown_markers() {
        let f = Fragment::parse("SELECT * FROM (%%%SQL%%%) X WHERE 1=1 %%%DATALOCKS%%% %%%OTHER%%%");
        assert!(f.has_slot(Slot::Inner));
        assert!(f.has_slot(Slot::Datalocks));
        assert_eq!(
            f.to_string(),
            "SELECT * FROM (%%%SQL%%%) X WHERE 1=1 %%%DATALOCKS%%% %%%OTHER%%%"
        );
    }

    #[test]
    fn test_text_never_creates_slots() {
        let f = Fragment::text("WHERE 1=1 %%%DATALOCKS%%%");
        assert!(!f.has_slot(Slot::Datalocks));
        assert!(f.apply_datalocks(&["a=1"]).is_err());
    }

    #[test]
    fn test_datalocks_injected_in_order() {
        let f = Fragment::parse("SELECT * FROM T WHERE 1=1 %%%DATALOCKS%%%");
        assert_eq!(
            f.finish(&["a=1", "b=2"]).unwrap(),
            "SELECT * FROM T WHERE 1=1  AND a=1 AND b=2"
        );
    }

    #[test]
    fn test_missing_slot_fails_only_with_datalocks() {
        let f = Fragment::parse("SELECT * FROM T");
        let err = f.clone().finish(&["a=1"]).unwrap_err();
        assert!(matches!(err, DbError::DatalockSlotMissing { .. }));
        assert_eq!(f.finish::<&str>(&[]).unwrap(), "SELECT * FROM T");
    }

    #[test]
    fn test_wrap_moves_inner_into_template() {
        let inner = Fragment::parse("SELECT a FROM T WHERE 1=1 %%%DATALOCKS%%%");
        let wrapped = inner.wrap(Some("SELECT * FROM (%%%SQL%%%) W"));
        assert_eq!(
            wrapped.finish(&["x=1"]).unwrap(),
            "SELECT * FROM (SELECT a FROM T WHERE 1=1  AND x=1) W"
        );
    }

    #[test]
    fn test_datalock_guard_prefix() {
        let probe = Fragment::text("SELECT 5 AS c_id FROM SYSIBM.SYSDUMMY1");
        let guarded = datalock_guard(Fragment::text("DELETE FROM T"), &probe, "c_id=5");
        assert_eq!(
            guarded.render().unwrap(),
            "BEGIN IF NOT EXISTS(SELECT * FROM (SELECT 5 AS c_id FROM SYSIBM.SYSDUMMY1) DUAL WHERE c_id=5) THEN SIGNAL SQLSTATE VALUE 'JHDLE' SET MESSAGE_TEXT = 'INVALID ACCESS'\\; END IF\\; END; DELETE FROM T"
        );
    }
}
