//! Statement composition for model operations.
//!
//! Each operation builds its statement through the clause IR, wraps it with the model's
//! override template when one exists, injects datalocks at the exposed slots and finally
//! prefixes parameter datalock guards. A datalock is never dropped: if a statement exposes
//! no slot for it, composition fails.

use crate::error::{DbError, DbResult};
use crate::models::model::{
    CodeMap, ComposerOptions, DefaultField, FieldDef, ModelDef, ParamDatalock, SearchNode,
    SortField, TableSource,
};
use crate::sql::clause::{Predicate, Select, sort_expression};
use crate::sql::fragment::{Fragment, Slot, datalock_guard};
use crate::sql::literal;
use crate::sql::search::render_search;

/// Row-count sentinel statement understood by the statement runner.
pub const RETURN_ROW_COUNT: &str = "return_row_count()";

/// Single-row source used by probes and constant selects.
pub const DUMMY_TABLE: &str = "SYSIBM.SYSDUMMY1";

pub(crate) const NO_DATALOCKS: &[&str] = &[];

/// Paged list query plus its row count query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordsetSql {
    pub sql: String,
    pub rowcount_sql: String,
}

/// Insert statement plus the optional follow-up update for encrypted and hashed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSql {
    pub sql: String,
    pub enc_sql: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordsetQuery<'a> {
    /// Fields bound as search keys (`field=@field` or the field's own predicate).
    pub search_keys: &'a [FieldDef],
    pub fields: &'a [FieldDef],
    pub sort: &'a [SortField],
    pub search: &'a [SearchNode],
    pub datalocks: &'a [String],
    pub row_start: u64,
    pub row_count: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum FormSelect<'a> {
    Single,
    Multiple(&'a [SortField]),
}

#[derive(Debug, Clone, Copy)]
pub struct FormQuery<'a> {
    pub select: FormSelect<'a>,
    pub fields: &'a [FieldDef],
    pub keys: &'a [FieldDef],
    pub datalocks: &'a [String],
}

#[derive(Debug, Clone, Copy)]
pub struct MultiselQuery<'a> {
    pub lov_field: &'a FieldDef,
    pub fields: &'a [FieldDef],
    pub foreign_keys: &'a [FieldDef],
    pub datalocks: &'a [String],
    pub lov_datalocks: &'a [String],
    pub param_datalocks: &'a [ParamDatalock],
}

/// Extra column assignment supplied by the caller as ready SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InsertQuery<'a> {
    pub fields: &'a [FieldDef],
    pub keys: &'a [FieldDef],
    pub ext: &'a [ExtField],
    pub encrypted: &'a [FieldDef],
    pub hashed: &'a [FieldDef],
    pub enc_datalocks: &'a [String],
    pub param_datalocks: &'a [ParamDatalock],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateQuery<'a> {
    pub fields: &'a [FieldDef],
    pub keys: &'a [FieldDef],
    pub ext: &'a [ExtField],
    pub hashed: &'a [FieldDef],
    pub param_datalocks: &'a [ParamDatalock],
    pub datalocks: &'a [String],
}

#[derive(Debug, Clone, Copy)]
pub struct MultiselUpdate<'a> {
    pub lov_field: &'a FieldDef,
    /// Number of selected values, bound as `@multisel0..n`.
    pub selected: usize,
    pub foreign_keys: &'a [FieldDef],
    pub param_datalocks: &'a [ParamDatalock],
    pub datalocks: &'a [String],
    pub lov_datalocks: &'a [String],
}

/// Composes DB2 for i statements from model descriptions.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    options: ComposerOptions,
}

impl Composer {
    pub fn new(options: ComposerOptions) -> Self {
        Self { options }
    }

    pub fn code_map(&self) -> &CodeMap {
        &self.options.code_map
    }

    pub fn escape(&self, value: &str) -> String {
        literal::escape(value)
    }

    // -------------------------------------------------------------------------
    // Building blocks
    // -------------------------------------------------------------------------

    /// Table reference for a model, rendering the model catalog as a derived table.
    pub fn table(&self, model: &ModelDef) -> DbResult<String> {
        match &model.table {
            TableSource::Named(name) => Ok(name.clone()),
            TableSource::ModelCatalog(entries) => {
                if entries.is_empty() {
                    return Err(DbError::composition("Model catalog is empty"));
                }
                let rows: Vec<String> = entries
                    .iter()
                    .map(|m| {
                        format!(
                            "('{}','{}','{}','{}','{}','{}')",
                            self.escape(&m.id),
                            self.escape(&m.title),
                            self.escape(&m.layout),
                            self.escape(&m.table),
                            self.escape(&m.module),
                            self.escape(&m.parents.join(", "))
                        )
                    })
                    .collect();
                Ok(format!(
                    "(VALUES {}) AS MODELS(model_id,model_title,model_layout,model_table,model_module,model_parents)",
                    rows.join(",")
                ))
            }
        }
    }

    /// Read expression for a field: its select override or the bare column.
    pub(crate) fn field_sql(field: &FieldDef) -> String {
        field
            .sql_select
            .clone()
            .unwrap_or_else(|| field.name.clone())
    }

    /// `(<expr>) as "name"`, passing the expression through `sql_from_db` when typed.
    pub(crate) fn from_db(field: &FieldDef, sql: &str) -> String {
        let expr = match (&field.field_type, &field.sql_from_db) {
            (Some(_), Some(template)) => field_expression(template, sql),
            _ => sql.to_string(),
        };
        format!("({}) as \"{}\"", expr, field.name)
    }

    pub(crate) fn to_db(field: &FieldDef, sql: &str) -> String {
        match (&field.field_type, &field.sql_to_db) {
            (Some(_), Some(template)) => field_expression(template, sql),
            _ => sql.to_string(),
        }
    }

    pub(crate) fn search_to_db(field: &FieldDef, sql: &str) -> String {
        match (&field.field_type, &field.sqlsearch_to_db) {
            (Some(_), Some(template)) => field_expression(template, sql),
            _ => sql.to_string(),
        }
    }

    /// `name=<@name encoded for the database>`.
    pub(crate) fn key_predicate(field: &FieldDef) -> String {
        format!(
            "{}={}",
            field.name,
            Self::to_db(field, &format!("@{}", field.name))
        )
    }

    fn select_items(&self, model: &ModelDef, fields: &[FieldDef], with_lov: bool) -> DbResult<Vec<Fragment>> {
        let mut items = Vec::with_capacity(fields.len());
        for field in fields {
            let mut item = Self::from_db(field, &Self::field_sql(field));
            if with_lov && field.lov.is_some() {
                item.push_str(&format!(
                    ",{} AS \"__{}__{}\"",
                    self.lov_field_text(model, field)?,
                    self.code_map().code_txt,
                    field.name
                ));
            }
            items.push(Fragment::text(item));
        }
        Ok(items)
    }

    /// Probe row exposing one request parameter to a datalock predicate.
    fn param_probe(param: &ParamDatalock) -> Fragment {
        Fragment::text(format!(
            "SELECT {} AS {} FROM {}",
            Self::to_db(&param.field, &format!("@{}", param.pname)),
            param.pname,
            DUMMY_TABLE
        ))
    }

    pub(crate) fn guard_params(sql: Fragment, params: &[ParamDatalock]) -> Fragment {
        params.iter().fold(sql, |sql, param| {
            datalock_guard(sql, &Self::param_probe(param), &param.query)
        })
    }

    fn update_delete_where(&self, model: &ModelDef) -> Predicate {
        if self.options.disable_sqlwhere_on_form_update_delete {
            Predicate::new("1=1")
        } else {
            Predicate::from_model(model.sql_where.as_deref())
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Paged list query and the matching row count query.
    pub fn recordset(&self, model: &ModelDef, query: &RecordsetQuery<'_>) -> DbResult<RecordsetSql> {
        let table = self.table(model)?;

        let mut predicate = Predicate::from_model(model.sql_where.as_deref());
        for field in query.search_keys {
            predicate = match &field.sql_where {
                Some(sql_where) => predicate.and(Fragment::parse(sql_where)),
                None => predicate.and(Self::key_predicate(field)),
            };
        }
        predicate = predicate.with_datalock_slot();
        if let Some(search) = render_search(query.search) {
            predicate = predicate.and(format!("({search})"));
        }

        let select = Select::new(self.select_items(model, query.fields, true)?, table.as_str())
            .filter(predicate.clone())
            .order_by(sort_expression(query.sort))
            .window(query.row_start, query.row_count);
        let sql = select
            .render()
            .wrap(model.sql_select.as_deref())
            .finish(query.datalocks)?;

        let rowcount = Select::new(["COUNT(*) AS \"cnt\""], table.as_str()).filter(predicate);
        let rowcount_sql = rowcount
            .render()
            .wrap(model.sql_rowcount.as_deref())
            .finish(query.datalocks)?;

        Ok(RecordsetSql { sql, rowcount_sql })
    }

    /// Single-record (or multi-record, sorted) form query.
    pub fn form(&self, model: &ModelDef, query: &FormQuery<'_>) -> DbResult<String> {
        let predicate = Predicate::from_model(model.sql_where.as_deref())
            .with_datalock_slot()
            .and_all(query.keys.iter().map(Self::key_predicate));
        let mut select = Select::new(self.select_items(model, query.fields, true)?, self.table(model)?)
            .filter(predicate);
        if let FormSelect::Multiple(sort) = query.select {
            select = select.order_by(sort_expression(sort));
        }
        select
            .render()
            .wrap(model.sql_select.as_deref())
            .finish(query.datalocks)
    }

    /// Multi-select form: the model's rows joined against every LOV value.
    pub fn multisel(&self, model: &ModelDef, query: &MultiselQuery<'_>) -> DbResult<String> {
        let map = self.code_map();
        let table = self.table(model)?;
        let alias: String = table
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(50)
            .collect();
        let lov_name = &query.lov_field.name;

        let mut inner = Predicate::new("1=1").with_datalock_slot();
        inner = if query.foreign_keys.is_empty() {
            inner.and("0=1")
        } else {
            inner.and_all(query.foreign_keys.iter().map(Self::key_predicate))
        };
        let lov_sql = self.multisel_lov_sql(query.lov_field, query.lov_datalocks, false)?;

        let mut from = Fragment::text("(");
        from.push(Select::new(["*"], table.as_str()).filter(inner).render())
            .push_str(format!(
                ") {alias} FULL OUTER JOIN ({lov_sql}) multiparent ON multiparent.{} = {alias}.{lov_name}",
                map.code_val
            ));

        let mut items = self.select_items(model, query.fields, false)?;
        items.push(Fragment::text(format!(
            " COALESCE({cv},{lov_name}) \"{cv}\"",
            cv = map.code_val
        )));
        items.push(Fragment::text(format!(
            "COALESCE({ct},{cv},{lov_name}) \"{ct}\"",
            cv = map.code_val,
            ct = map.code_txt
        )));

        let select = Select::new(items, from)
            .filter(Predicate::from_model(model.sql_where.as_deref()).parenthesized())
            .order_by(format!("{},{}", map.code_seq, map.code_txt));
        let sql = select
            .render()
            .wrap(model.sql_select.as_deref())
            .apply_datalocks(query.datalocks)?;
        Self::guard_params(sql, query.param_datalocks).render()
    }

    /// Tab caption query keyed by the parent record.
    pub fn tab_code(
        &self,
        model: &ModelDef,
        fields: &[FieldDef],
        keys: &[FieldDef],
        datalocks: &[String],
    ) -> DbResult<String> {
        let predicate = Predicate::from_model(model.sql_where.as_deref())
            .with_datalock_slot()
            .and_all(keys.iter().map(Self::key_predicate));
        Select::new(self.select_items(model, fields, false)?, self.table(model)?)
            .filter(predicate)
            .render()
            .wrap(model.sql_select.as_deref())
            .finish(datalocks)
    }

    /// Title query supplied by the model.
    pub fn title(&self, sql: &str, datalocks: &[String]) -> DbResult<String> {
        Fragment::parse(sql).finish(datalocks)
    }

    /// Export query.
    pub fn download(
        &self,
        model: &ModelDef,
        fields: &[FieldDef],
        keys: &[FieldDef],
        datalocks: &[String],
    ) -> DbResult<String> {
        let predicate = Predicate::from_model(model.sql_where.as_deref())
            .parenthesized()
            .with_datalock_slot()
            .and_all(keys.iter().map(Self::key_predicate));
        Select::new(self.select_items(model, fields, false)?, self.table(model)?)
            .filter(predicate)
            .render()
            .wrap(model.sql_download_select.as_deref())
            .finish(datalocks)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Insert returning the generated keys.
    ///
    /// Without key fields the affected row count is returned instead, synthesized by the
    /// runner from the insert itself rather than queried again.
    pub fn insert(&self, model: &ModelDef, query: &InsertQuery<'_>) -> DbResult<InsertSql> {
        let table = self.table(model)?;
        let inserted: Vec<&FieldDef> = query
            .fields
            .iter()
            .filter(|f| f.sql_insert.as_deref() != Some(""))
            .collect();
        let sql_fields = inserted
            .iter()
            .map(|f| f.name.clone())
            .chain(query.ext.iter().map(|e| e.name.clone()))
            .collect::<Vec<_>>()
            .join(",");
        let sql_values = inserted
            .iter()
            .map(|f| match &f.sql_insert {
                Some(expr) => expr.clone(),
                None => Self::to_db(f, &format!("@{}", f.name)),
            })
            .chain(query.ext.iter().map(|e| e.value.clone()))
            .collect::<Vec<_>>()
            .join(",");

        let insert = format!("INSERT INTO {table}({sql_fields})  VALUES({sql_values})");
        let statement = if query.keys.is_empty() {
            format!("{insert}; {RETURN_ROW_COUNT}")
        } else {
            let key_select = match &model.sql_get_insert_keys {
                Some(custom) => custom.clone(),
                None => format!(
                    "SELECT {}",
                    query
                        .keys
                        .iter()
                        .map(|k| format!("{} AS \"{}\"", k.name, k.name))
                        .collect::<Vec<_>>()
                        .join(",")
                ),
            };
            format!("{key_select} FROM FINAL TABLE ({insert})")
        };

        let mut sql = Fragment::text(statement);
        if let Some(template) = &model.sql_insert {
            sql = sql
                .wrap(Some(template))
                .fill_text(Slot::Table, &table)
                .fill_text(Slot::Fields, &sql_fields)
                .fill_text(Slot::Values, &sql_values);
        }

        let enc_sql = if query.encrypted.is_empty() && query.hashed.is_empty() {
            None
        } else {
            let assignments = query
                .encrypted
                .iter()
                .chain(query.hashed.iter())
                .map(Self::key_predicate)
                .collect::<Vec<_>>()
                .join(",");
            let predicate = Predicate::new("1=1")
                .with_datalock_slot()
                .and_all(query.keys.iter().map(Self::key_predicate));
            let mut enc = Fragment::text(format!("UPDATE {table} SET {assignments} WHERE "));
            enc.push(predicate.render());
            let enc = enc
                .wrap(model.sql_insert_encrypt.as_deref())
                .apply_datalocks_with(query.enc_datalocks, " and ")?
                .render()?;
            Some(enc)
        };

        let sql = Self::guard_params(sql, query.param_datalocks).finish(NO_DATALOCKS)?;
        Ok(InsertSql { sql, enc_sql })
    }

    /// Form update keyed by the record's key fields.
    pub fn update(&self, model: &ModelDef, query: &UpdateQuery<'_>) -> DbResult<String> {
        let table = self.table(model)?;
        let assignments: Vec<String> = query
            .fields
            .iter()
            .filter(|f| f.sql_update.as_deref() != Some(""))
            .map(|f| match &f.sql_update {
                Some(expr) => format!("{}={}", f.name, expr),
                None => Self::key_predicate(f),
            })
            .chain(query.ext.iter().map(|e| format!("{}={}", e.name, e.value)))
            .chain(query.hashed.iter().map(Self::key_predicate))
            .collect();

        let predicate = self
            .update_delete_where(model)
            .parenthesized()
            .with_datalock_slot()
            .and_all(query.keys.iter().map(Self::key_predicate));
        let mut sql = Fragment::text(format!("UPDATE {} SET {} WHERE ", table, assignments.join(",")));
        sql.push(predicate.render());

        let sql = sql.wrap(model.sql_update.as_deref());
        Self::guard_params(sql, query.param_datalocks).finish(query.datalocks)
    }

    /// Replace a multi-select association set in one block: delete the deselected values,
    /// then insert the newly selected ones.
    pub fn multisel_update(&self, model: &ModelDef, query: &MultiselUpdate<'_>) -> DbResult<String> {
        let map = self.code_map();
        let table = self.table(model)?;
        let lov_field = query.lov_field;
        let selected: Vec<String> = (0..query.selected)
            .map(|i| Self::to_db(lov_field, &format!("@multisel{i}")))
            .collect();
        let key_terms: Vec<String> = query.foreign_keys.iter().map(Self::key_predicate).collect();
        let sql_where = || Predicate::from_model(model.sql_where.as_deref()).parenthesized();

        let mut delete_where = sql_where().and_all(key_terms.iter().cloned());
        if !selected.is_empty() {
            delete_where = delete_where.and(format!("{} NOT IN ({})", lov_field.name, selected.join(",")));
        }
        delete_where = delete_where.with_datalock_slot();

        let mut sql = Fragment::text(format!("BEGIN DELETE FROM {table} WHERE "));
        sql.push(delete_where.render()).push_str(" \\; ");

        if selected.is_empty() {
            sql.push_str(format!("SELECT 1 FROM {DUMMY_TABLE} WHERE 1=0"));
        } else {
            let lov_sql = self.multisel_lov_sql(lov_field, query.lov_datalocks, true)?;
            let key_names: String = query
                .foreign_keys
                .iter()
                .map(|f| format!("{},", f.name))
                .collect();
            let key_values: String = query
                .foreign_keys
                .iter()
                .map(|f| format!("{},", Self::to_db(f, &format!("@{}", f.name))))
                .collect();
            let existing = Select::new([lov_field.name.as_str()], table.as_str())
                .filter(sql_where().and_all(key_terms.iter().cloned()).with_datalock_slot());
            sql.push_str(format!(
                "INSERT INTO {table}({key_names}{}) SELECT {key_values}{cv} FROM ({lov_sql}) MULTIPARENT WHERE {cv} IN ({}) AND {cv} NOT IN (",
                lov_field.name,
                selected.join(","),
                cv = map.code_val
            ))
            .push(existing.render())
            .push_str(")");
        }
        sql.push_str("\\; END");

        let sql = sql.wrap(model.sql_update.as_deref());
        Self::guard_params(sql, query.param_datalocks).finish(query.datalocks)
    }

    /// Model-supplied procedural statement.
    pub fn exec(
        &self,
        model: &ModelDef,
        param_datalocks: &[ParamDatalock],
        datalocks: &[String],
    ) -> DbResult<String> {
        let sql_exec = model
            .sql_exec
            .as_deref()
            .ok_or_else(|| DbError::composition(format!("Model {} has no exec SQL", model.id)))?;
        Self::guard_params(Fragment::parse(sql_exec), param_datalocks).finish(datalocks)
    }

    pub fn delete(&self, model: &ModelDef, keys: &[FieldDef], datalocks: &[String]) -> DbResult<String> {
        let predicate = self
            .update_delete_where(model)
            .parenthesized()
            .with_datalock_slot()
            .and_all(keys.iter().map(Self::key_predicate));
        let mut sql = Fragment::text(format!("DELETE FROM {} WHERE ", self.table(model)?));
        sql.push(predicate.render()).push_str(";");
        sql.wrap(model.sql_delete.as_deref()).finish(datalocks)
    }

    // -------------------------------------------------------------------------
    // Reports, defaults, breadcrumbs
    // -------------------------------------------------------------------------

    pub fn report_data(&self, sql: &str, skip_datalocks: bool, datalocks: &[String]) -> DbResult<String> {
        let datalocks: &[String] = if skip_datalocks { &[] } else { datalocks };
        Fragment::parse(sql).finish(datalocks)
    }

    pub fn report_job(&self, sql: &str, datalocks: &[String]) -> DbResult<String> {
        Fragment::parse(sql).finish(datalocks)
    }

    pub fn report_batch(&self, sql: &str, datalocks: &[String]) -> DbResult<String> {
        Fragment::parse(sql).finish(datalocks)
    }

    /// One-row select of SQL-computed default values. Empty when there are no fields.
    pub fn default_values(&self, fields: &[DefaultField]) -> DbResult<String> {
        if fields.is_empty() {
            return Ok(String::new());
        }
        let mut items = Vec::with_capacity(fields.len());
        let mut guards = Vec::new();
        for default in fields {
            let item = Self::from_db(&default.field, &Fragment::parse(&default.sql).to_string());
            items.push(Fragment::parse(&item).finish(&default.datalocks)?);
            guards.extend(default.param_datalocks.iter().cloned());
        }
        let sql = Select::new(items, DUMMY_TABLE).render();
        Self::guard_params(sql, &guards).finish(NO_DATALOCKS)
    }

    /// Breadcrumb query.
    ///
    /// Queries exposing a datalock slot get datalocks injected. Otherwise (for example a
    /// stored procedure call) each datalock becomes a guard evaluated against the
    /// breadcrumb parameters.
    pub fn breadcrumbs(&self, sql: &str, datalocks: &[String], fields: &[FieldDef]) -> DbResult<String> {
        let sql = Fragment::parse(sql);
        if sql.has_slot(Slot::Datalocks) {
            return sql.finish(datalocks);
        }
        let probe = if fields.is_empty() {
            Fragment::text(format!("SELECT 1 AS \"dummy\" FROM {DUMMY_TABLE}"))
        } else {
            let items: Vec<String> = fields
                .iter()
                .map(|f| format!("{} AS \"{}\"", Self::to_db(f, &format!("@{}", f.name)), f.name))
                .collect();
            Fragment::text(format!("SELECT {} FROM {DUMMY_TABLE}", items.join(",")))
        };
        datalocks
            .iter()
            .fold(sql, |sql, query| datalock_guard(sql, &probe, query))
            .finish(NO_DATALOCKS)
    }
}

/// Substitute `sql` (parenthesized) at a field expression's inner slot.
pub(crate) fn field_expression(template: &str, sql: &str) -> String {
    let inner = if sql.is_empty() {
        String::new()
    } else {
        format!("({sql})")
    };
    Fragment::parse(template)
        .fill_text(Slot::Inner, &inner)
        .to_string()
}
