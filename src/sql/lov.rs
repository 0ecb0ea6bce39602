//! List-of-values statements.

use crate::error::{DbError, DbResult};
use crate::models::model::{CodeKind, CodeTable, FieldDef, LovDef, LovValue, ModelDef, ParamDatalock};
use crate::sql::composer::{Composer, DUMMY_TABLE};
use crate::sql::fragment::{Fragment, Slot};

const NO_TEXT: &str = "SELECT NULLIF(1,1) FROM SYSIBM.SYSDUMMY1";

impl Composer {
    fn code_table_name(&self, lov: &LovDef, code: &CodeTable, with_schema: bool) -> String {
        let schema = match (&lov.schema, with_schema) {
            (Some(schema), true) if !schema.is_empty() => format!("{schema}."),
            _ => String::new(),
        };
        format!("{schema}{}_{}", self.code_map().prefix(code), code.name)
    }

    fn active_codes(&self) -> String {
        let end = &self.code_map().code_end_date;
        format!("({end} IS NULL OR {end}>CURRENT_TIMESTAMP)")
    }

    /// LOV statement for a field.
    ///
    /// `truncate` fills the `%%%TRUNCATE%%%` slot with the LOV's truncation predicate.
    pub fn lov(
        &self,
        lov: &LovDef,
        datalocks: &[String],
        param_datalocks: &[ParamDatalock],
        truncate: bool,
    ) -> DbResult<String> {
        let map = self.code_map();
        let sql = if let Some(sql) = lov.sql.as_ref().or(lov.sql2.as_ref()).or(lov.sqlmp.as_ref()) {
            Fragment::parse(sql)
        } else if let Some(code) = &lov.code {
            let table = self.code_table_name(lov, code, true);
            let columns = match code.kind {
                CodeKind::Single => format!(
                    "{cv} AS \"{cv}\",{ct} AS \"{ct}\"",
                    cv = map.code_val,
                    ct = map.code_txt
                ),
                CodeKind::Double => format!(
                    "{cv}1 AS \"{cp}\",{cv}2 as \"{cv}\",{ct} AS \"{ct}\"",
                    cv = map.code_val,
                    cp = map.code_parent,
                    ct = map.code_txt
                ),
            };
            Fragment::text(format!(
                "SELECT {columns} FROM {table} WHERE {} ORDER BY {},{}",
                self.active_codes(),
                map.code_seq,
                map.code_txt
            ))
        } else {
            Fragment::text(format!(
                "SELECT 1 AS \"{}\",1 AS \"{}\" FROM {DUMMY_TABLE} WHERE 1=0",
                map.code_val, map.code_txt
            ))
        };

        let truncation = match (&lov.sql_truncate, truncate) {
            (Some(t), true) if !t.trim().is_empty() => format!(" AND {t}"),
            _ => String::new(),
        };
        let sql = sql
            .apply_datalocks(datalocks)?
            .fill_text(Slot::Truncate, &truncation);
        Self::guard_params(sql, param_datalocks).render()
    }

    /// Scalar subselect returning the display text of a field's current value.
    ///
    /// Empty when the field has no LOV.
    pub fn lov_field_text(&self, model: &ModelDef, field: &FieldDef) -> DbResult<String> {
        let Some(lov) = &field.lov else {
            return Ok(String::new());
        };
        let map = self.code_map();
        let valsql = Self::field_sql(field);
        let parentsql = lov.parent.as_ref().map(|parent| match model.field(parent) {
            Some(pfield) => Self::field_sql(pfield),
            None => parent.clone(),
        });

        let text = if let Some(values) = &lov.values {
            if values.is_empty() {
                NO_TEXT.to_string()
            } else {
                let table = array_to_table(&lov_rows(values, parentsql.is_some(), map))?;
                let alias = format!("{}_values", field.name);
                let condition = match &parentsql {
                    Some(parentsql) => format!(
                        "{alias}.{cv}1=({parentsql}) AND {alias}.{cv}2=({valsql})",
                        cv = map.code_val
                    ),
                    None => format!("{alias}.{}=({valsql})", map.code_val),
                };
                format!(
                    "(SELECT {ct} AS \"{ct}\" FROM ({table}) {alias} WHERE {condition})",
                    ct = map.code_txt
                )
            }
        } else if let Some(sql_select) = &lov.sql_select {
            Fragment::parse(sql_select).to_string()
        } else if let Some(code) = &lov.code {
            let table = self.code_table_name(lov, code, true);
            let condition = match code.kind {
                CodeKind::Single => format!("{}=({valsql})", map.code_val),
                CodeKind::Double => {
                    let parentsql = parentsql
                        .filter(|p| !p.is_empty())
                        .ok_or_else(|| DbError::composition("Parent field not found in LOV."))?;
                    format!(
                        "{cv}1=({parentsql}) AND {cv}2=({valsql})",
                        cv = map.code_val
                    )
                }
            };
            format!(
                "SELECT {ct} AS \"{ct}\" FROM {table} WHERE {condition}",
                ct = map.code_txt
            )
        } else {
            NO_TEXT.to_string()
        };
        Ok(format!("({text})"))
    }

    /// LOV source joined by multi-select statements.
    ///
    /// `numbered` aliases the sequence column as `SEQ`, as the update form requires.
    pub(crate) fn multisel_lov_sql(
        &self,
        lov_field: &FieldDef,
        lov_datalocks: &[String],
        numbered: bool,
    ) -> DbResult<String> {
        let map = self.code_map();
        let lov = lov_field
            .lov
            .as_ref()
            .ok_or_else(|| DbError::composition("LOV type not supported."))?;
        if let Some(sql) = &lov.sql {
            return Fragment::parse(sql).finish(lov_datalocks);
        }
        match &lov.code {
            Some(code) if code.kind == CodeKind::Single => Ok(format!(
                "SELECT {},{},{}{} FROM {} WHERE {}",
                map.code_val,
                map.code_txt,
                map.code_seq,
                if numbered { " AS SEQ" } else { "" },
                self.code_table_name(lov, code, false),
                self.active_codes()
            )),
            _ => Err(DbError::composition("LOV type not supported.")),
        }
    }
}

fn lov_rows(
    values: &[LovValue],
    with_parent: bool,
    map: &crate::models::model::CodeMap,
) -> Vec<Vec<(String, String)>> {
    values
        .iter()
        .map(|v| {
            if with_parent {
                vec![
                    (format!("{}1", map.code_val), v.parent.clone().unwrap_or_default()),
                    (format!("{}2", map.code_val), v.value.clone()),
                    (map.code_txt.clone(), v.text.clone()),
                ]
            } else {
                vec![
                    (map.code_val.clone(), v.value.clone()),
                    (map.code_txt.clone(), v.text.clone()),
                ]
            }
        })
        .collect()
}

/// Inline table of constant rows, one `SELECT ... FROM SYSIBM.SYSDUMMY1` per row.
pub fn array_to_table(rows: &[Vec<(String, String)>]) -> DbResult<String> {
    if rows.is_empty() {
        return Err(DbError::composition("Array cannot be empty"));
    }
    let mut selects = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.is_empty() {
            return Err(DbError::composition(format!("Array row {} is empty", i + 1)));
        }
        let columns: Vec<String> = row
            .iter()
            .map(|(key, value)| format!("'{}' AS {}", crate::sql::literal::escape(value), key))
            .collect();
        selects.push(format!("SELECT {} FROM {DUMMY_TABLE}", columns.join(",")));
    }
    Ok(selects.join(" UNION ALL "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::model::CodeScope;

    fn row(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_array_to_table() {
        let rows = vec![
            row(&[("code_val", "A"), ("code_txt", "Alpha")]),
            row(&[("code_val", "B"), ("code_txt", "Bob's")]),
        ];
        assert_eq!(
            array_to_table(&rows).unwrap(),
            "SELECT 'A' AS code_val,'Alpha' AS code_txt FROM SYSIBM.SYSDUMMY1 UNION ALL SELECT 'B' AS code_val,'Bob''s' AS code_txt FROM SYSIBM.SYSDUMMY1"
        );
        assert_eq!(
            array_to_table(&[]).unwrap_err().to_string(),
            "Composition error: Array cannot be empty"
        );
        assert!(
            array_to_table(&[row(&[("a", "1")]), vec![]])
                .unwrap_err()
                .to_string()
                .contains("Array row 2 is empty")
        );
    }

    #[test]
    fn test_code_lov_sources() {
        let composer = Composer::default();
        let mut lov = LovDef::from_code(CodeTable::single("state"));
        lov.schema = Some("APP".into());
        assert_eq!(
            composer.lov(&lov, &[], &[], false).unwrap(),
            "SELECT code_val AS \"code_val\",code_txt AS \"code_txt\" FROM APP.code_state WHERE (code_end_dt IS NULL OR code_end_dt>CURRENT_TIMESTAMP) ORDER BY code_seq,code_txt"
        );

        let lov = LovDef::from_code(CodeTable::double("city").in_scope(CodeScope::App));
        assert_eq!(
            composer.lov(&lov, &[], &[], false).unwrap(),
            "SELECT code_val1 AS \"code_parent\",code_val2 as \"code_val\",code_txt AS \"code_txt\" FROM code2_app_city WHERE (code_end_dt IS NULL OR code_end_dt>CURRENT_TIMESTAMP) ORDER BY code_seq,code_txt"
        );

        assert_eq!(
            composer.lov(&LovDef::default(), &[], &[], false).unwrap(),
            "SELECT 1 AS \"code_val\",1 AS \"code_txt\" FROM SYSIBM.SYSDUMMY1 WHERE 1=0"
        );
    }

    #[test]
    fn test_sql_lov_datalocks_and_truncate() {
        let composer = Composer::default();
        let mut lov = LovDef::from_sql("SELECT a FROM T WHERE 1=1 %%%DATALOCKS%%% %%%TRUNCATE%%%");
        lov.sql_truncate = Some("a<10".into());
        let locks = vec!["a>0".to_string()];
        assert_eq!(
            composer.lov(&lov, &locks, &[], true).unwrap(),
            "SELECT a FROM T WHERE 1=1  AND a>0  AND a<10"
        );
        assert_eq!(
            composer.lov(&lov, &locks, &[], false).unwrap(),
            "SELECT a FROM T WHERE 1=1  AND a>0 "
        );

        let plain = LovDef::from_sql("SELECT a FROM T");
        assert!(composer.lov(&plain, &locks, &[], false).is_err());
    }

    #[test]
    fn test_lov_field_text_variants() {
        let composer = Composer::default();
        let mut model = ModelDef::new("Address", "ADDR");
        model.fields.push(FieldDef::new("state").with_select("UPPER(state)"));

        let field = FieldDef::new("city")
            .with_lov(LovDef::from_code(CodeTable::double("city")).with_parent("state"));
        assert_eq!(
            composer.lov_field_text(&model, &field).unwrap(),
            "(SELECT code_txt AS \"code_txt\" FROM code2_city WHERE code_val1=(UPPER(state)) AND code_val2=(city))"
        );

        let orphan = FieldDef::new("city").with_lov(LovDef::from_code(CodeTable::double("city")));
        assert_eq!(
            composer.lov_field_text(&model, &orphan).unwrap_err().to_string(),
            "Composition error: Parent field not found in LOV."
        );

        let listed = FieldDef::new("sts").with_lov(LovDef::from_values(vec![
            LovValue::new("A", "Active"),
        ]));
        assert_eq!(
            composer.lov_field_text(&model, &listed).unwrap(),
            "((SELECT code_txt AS \"code_txt\" FROM (SELECT 'A' AS code_val,'Active' AS code_txt FROM SYSIBM.SYSDUMMY1) sts_values WHERE sts_values.code_val=(sts)))"
        );

        let empty = FieldDef::new("sts").with_lov(LovDef::from_values(vec![]));
        assert_eq!(
            composer.lov_field_text(&model, &empty).unwrap(),
            "(SELECT NULLIF(1,1) FROM SYSIBM.SYSDUMMY1)"
        );
        assert_eq!(composer.lov_field_text(&model, &FieldDef::new("x")).unwrap(), "");
    }

    #[test]
    fn test_multisel_lov_rejects_double_codes() {
        let field = FieldDef::new("city").with_lov(LovDef::from_code(CodeTable::double("city")));
        let err = Composer::default()
            .multisel_lov_sql(&field, &[], false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Composition error: LOV type not supported.");
    }
}
