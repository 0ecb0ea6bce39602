//! Composer input models.
//!
//! These structs describe what the model layer hands to the SQL composer: the fields to
//! read or write, the table source, list-of-values definitions, sort and search inputs and
//! the datalock predicates to enforce. Every optional hook is an `Option` whose absence means
//! "use the generated SQL as is".

use crate::models::query::{DeclaredType, Length};
use serde::{Deserialize, Serialize};

/// Logical field type as declared by the model layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Decimal,
    Float,
    VarChar,
    Char,
    DateTime,
    Date,
    Time,
    Hash,
    Binary,
}

impl FieldType {
    /// Text-like types compare against `''` for null searches.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::VarChar | Self::Char | Self::Binary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    /// Declared type used to encode `@name` values for this field.
    #[serde(default)]
    pub declared_type: Option<DeclaredType>,
    #[serde(default)]
    pub length: Option<usize>,
    /// Read expression replacing the bare column reference.
    #[serde(default)]
    pub sql_select: Option<String>,
    /// Static predicate contributed when the field is a search key.
    #[serde(default)]
    pub sql_where: Option<String>,
    /// Insert expression. `Some("")` excludes the field from inserts.
    #[serde(default)]
    pub sql_insert: Option<String>,
    /// Update expression. `Some("")` excludes the field from updates.
    #[serde(default)]
    pub sql_update: Option<String>,
    #[serde(default)]
    pub sql_search: Option<String>,
    /// Phonetic comparator template with `%%%FIELD%%%` and `%%%SOUNDEX%%%` markers.
    #[serde(default)]
    pub sql_search_sound: Option<String>,
    /// Expression templates with a `%%%SQL%%%` marker.
    #[serde(default)]
    pub sql_from_db: Option<String>,
    #[serde(default)]
    pub sql_to_db: Option<String>,
    #[serde(default)]
    pub sqlsearch_to_db: Option<String>,
    #[serde(default)]
    pub lov: Option<LovDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn with_declared_type(mut self, declared_type: DeclaredType) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn with_select(mut self, sql: impl Into<String>) -> Self {
        self.sql_select = Some(sql.into());
        self
    }

    pub fn with_lov(mut self, lov: LovDef) -> Self {
        self.lov = Some(lov);
        self
    }

    /// Declared type for encoding values, falling back to the logical field type.
    pub fn param_type(&self) -> DeclaredType {
        if let Some(declared) = self.declared_type {
            return declared;
        }
        let length = self.length.map(Length::Chars).unwrap_or(Length::Max);
        match self.field_type {
            Some(FieldType::Boolean) => DeclaredType::Boolean,
            Some(FieldType::BigInt) => DeclaredType::BigInt,
            Some(FieldType::Int) => DeclaredType::Int,
            Some(FieldType::SmallInt) => DeclaredType::SmallInt,
            Some(FieldType::TinyInt) => DeclaredType::TinyInt,
            Some(FieldType::Decimal) => DeclaredType::Decimal(18, 4),
            Some(FieldType::Float) => DeclaredType::Float(53),
            Some(FieldType::Char) => DeclaredType::Char(length),
            Some(FieldType::DateTime) => DeclaredType::DateTime,
            Some(FieldType::Date) => DeclaredType::Date,
            Some(FieldType::Time) => DeclaredType::Time,
            Some(FieldType::Hash) | Some(FieldType::Binary) => DeclaredType::VarBinary(length),
            Some(FieldType::VarChar) | None => DeclaredType::VarChar(length),
        }
    }
}

/// One row of the in-memory model catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub layout: String,
    pub table: String,
    pub module: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// Opaque table or view reference.
    Named(String),
    /// Virtual table built from the model catalog.
    ModelCatalog(Vec<CatalogEntry>),
}

impl Default for TableSource {
    fn default() -> Self {
        Self::Named(String::new())
    }
}

/// A model as seen by the composer.
///
/// Every `sql_*` template wraps the generated statement at its `%%%SQL%%%` marker and may
/// carry its own `%%%DATALOCKS%%%` marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub id: String,
    pub table: TableSource,
    /// Static predicate, `1=1` when absent or empty.
    #[serde(default)]
    pub sql_where: Option<String>,
    #[serde(default)]
    pub sql_select: Option<String>,
    #[serde(default)]
    pub sql_rowcount: Option<String>,
    /// Insert template; also understands `%%%TABLE%%%`, `%%%FIELDS%%%` and `%%%VALUES%%%`.
    #[serde(default)]
    pub sql_insert: Option<String>,
    #[serde(default)]
    pub sql_insert_encrypt: Option<String>,
    #[serde(default)]
    pub sql_update: Option<String>,
    #[serde(default)]
    pub sql_delete: Option<String>,
    #[serde(default)]
    pub sql_download_select: Option<String>,
    #[serde(default)]
    pub sql_exec: Option<String>,
    /// Replaces the generated `SELECT key AS "key"` list after an insert.
    #[serde(default)]
    pub sql_get_insert_keys: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table: TableSource::Named(table.into()),
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LovValue {
    #[serde(default)]
    pub parent: Option<String>,
    pub value: String,
    pub text: String,
}

impl LovValue {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            parent: None,
            value: value.into(),
            text: text.into(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Single-column (`code`) or parent/child (`code2`) code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeScope {
    #[default]
    Default,
    Sys,
    App,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTable {
    pub kind: CodeKind,
    #[serde(default)]
    pub scope: CodeScope,
    pub name: String,
}

impl CodeTable {
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            kind: CodeKind::Single,
            scope: CodeScope::Default,
            name: name.into(),
        }
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self {
            kind: CodeKind::Double,
            scope: CodeScope::Default,
            name: name.into(),
        }
    }

    pub fn in_scope(mut self, scope: CodeScope) -> Self {
        self.scope = scope;
        self
    }
}

/// List-of-values definition. The first populated source wins, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LovDef {
    #[serde(default)]
    pub values: Option<Vec<LovValue>>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub sql2: Option<String>,
    #[serde(default)]
    pub sqlmp: Option<String>,
    /// Text lookup expression used in place of a generated subselect.
    #[serde(default)]
    pub sql_select: Option<String>,
    #[serde(default)]
    pub code: Option<CodeTable>,
    /// Field holding the parent value for parent/child lookups.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Search on the stored code instead of the lookup text.
    #[serde(default)]
    pub show_code: bool,
    /// Predicate added at `%%%TRUNCATE%%%` when truncation is requested.
    #[serde(default)]
    pub sql_truncate: Option<String>,
}

impl LovDef {
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..Default::default()
        }
    }

    pub fn from_code(code: CodeTable) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn from_values(values: Vec<LovValue>) -> Self {
        Self {
            values: Some(values),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Column and table naming of code tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeMap {
    pub code_val: String,
    pub code_txt: String,
    pub code_seq: String,
    pub code_end_date: String,
    pub code_parent: String,
    pub code: String,
    pub code2: String,
    pub code_sys: String,
    pub code2_sys: String,
    pub code_app: String,
    pub code2_app: String,
}

impl Default for CodeMap {
    fn default() -> Self {
        Self {
            code_val: "code_val".to_string(),
            code_txt: "code_txt".to_string(),
            code_seq: "code_seq".to_string(),
            code_end_date: "code_end_dt".to_string(),
            code_parent: "code_parent".to_string(),
            code: "code".to_string(),
            code2: "code2".to_string(),
            code_sys: "code_sys".to_string(),
            code2_sys: "code2_sys".to_string(),
            code_app: "code_app".to_string(),
            code2_app: "code2_app".to_string(),
        }
    }
}

impl CodeMap {
    /// Table name prefix for a code table.
    pub fn prefix(&self, code: &CodeTable) -> &str {
        match (code.kind, code.scope) {
            (CodeKind::Single, CodeScope::Default) => &self.code,
            (CodeKind::Double, CodeScope::Default) => &self.code2,
            (CodeKind::Single, CodeScope::Sys) => &self.code_sys,
            (CodeKind::Double, CodeScope::Sys) => &self.code2_sys,
            (CodeKind::Single, CodeScope::App) => &self.code_app,
            (CodeKind::Double, CodeScope::App) => &self.code2_app,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    /// Sort expression with a `%%%SQL%%%` marker for the field.
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub dir: SortDirection,
}

impl SortField {
    pub fn new(field: impl Into<String>, dir: SortDirection) -> Self {
        Self {
            field: field.into(),
            sql: None,
            dir,
        }
    }
}

/// Already-formed search predicates, grouped by the model layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchNode {
    Term(String),
    Group(Vec<SearchNode>),
}

/// Comparison requested for one search term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[default]
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
    SoundsLike,
    Null,
    NotNull,
}

impl std::str::FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" => Self::Eq,
            "<>" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "contains" => Self::Contains,
            "notcontains" => Self::NotContains,
            "beginswith" => Self::BeginsWith,
            "endswith" => Self::EndsWith,
            "soundslike" => Self::SoundsLike,
            "null" => Self::Null,
            "notnull" => Self::NotNull,
            other => return Err(format!("Unknown comparison: {other}")),
        })
    }
}

/// Datalock enforced on a request parameter before the statement runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDatalock {
    pub field: FieldDef,
    pub pname: String,
    pub query: String,
}

/// Field whose default value comes from SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultField {
    pub field: FieldDef,
    pub sql: String,
    #[serde(default)]
    pub datalocks: Vec<String>,
    #[serde(default)]
    pub param_datalocks: Vec<ParamDatalock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerOptions {
    pub code_map: CodeMap,
    /// Skip the model's static predicate on form updates and deletes.
    pub disable_sqlwhere_on_form_update_delete: bool,
}
