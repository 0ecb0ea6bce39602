//! Randomized tests for literal encoding and statement splitting.
//!
//! Random, hostile and edge-case values are bound into a two-statement batch. However
//! the values look, binding must never change how many statements the batch splits into.

use iseries_sql_engine::models::{DeclaredType, Length, ParamValue, Params};
use iseries_sql_engine::sql::{apply_sql_params, escape, split_statements};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio_test::assert_ok;

const HOSTILE: &[char] = &[';', '\'', '\\', '-', '/', '*', '@', '\n', '\r', '\t', '\0', 'é', '🚀'];

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random text biased towards characters that matter to the splitter.
fn random_hostile(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            if rng.gen_bool(0.5) {
                HOSTILE[rng.gen_range(0..HOSTILE.len())]
            } else {
                char::from(rng.sample(Alphanumeric))
            }
        })
        .collect()
}

fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        ";".to_string(),
        "\\".to_string(),
        "\\;".to_string(),
        "';--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "/* open".to_string(),
        "-- note\n;".to_string(),
        "a\\".to_string(),
        "@b".to_string(),
        "0".to_string(),
        "1e5".to_string(),
        "0x1F".to_string(),
        "\u{0000}\u{FFFF}".to_string(),
        "🚀;".repeat(100),
        random_string(100),
    ]
}

fn bind_pair(a: &str, b: &str, declared: DeclaredType) -> String {
    let params = Params::new().with("a", a).with("b", b);
    assert_ok!(apply_sql_params(
        "SELECT @a FROM SYSIBM.SYSDUMMY1; SELECT @b FROM SYSIBM.SYSDUMMY1",
        &[declared, declared],
        &params,
    ))
}

#[test]
fn test_edge_case_values_never_split_statements() {
    let cases = edge_case_strings();
    for a in &cases {
        for b in &cases {
            let sql = bind_pair(a, b, DeclaredType::VARCHAR_MAX);
            let statements = split_statements(&sql);
            assert_eq!(statements.len(), 2, "values {a:?} / {b:?} gave {statements:?}");
        }
    }
}

#[test]
fn test_random_values_never_split_statements() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let a = random_hostile(rng.gen_range(0..40));
        let b = random_hostile(rng.gen_range(0..40));
        let declared = if rng.gen_bool(0.5) {
            DeclaredType::VARCHAR_MAX
        } else {
            DeclaredType::Char(Length::Chars(rng.gen_range(1..20)))
        };
        let sql = bind_pair(&a, &b, declared);
        assert_eq!(split_statements(&sql).len(), 2, "values {a:?} / {b:?}");
    }
}

#[test]
fn test_escaped_separator_round_trips_through_split() {
    for _ in 0..200 {
        let value = random_hostile(30);
        let literal = format!("'{}'", escape(&value));
        let statements = split_statements(&format!("SELECT {literal} FROM SYSIBM.SYSDUMMY1"));
        assert_eq!(statements.len(), 1);
        // Unescaping in the splitter restores every separator the value carried.
        assert_eq!(
            statements[0].matches(';').count(),
            literal.matches("\\;").count()
        );
    }
}

#[test]
fn test_split_never_panics_on_random_batches() {
    for len in [0, 1, 2, 10, 100, 1000] {
        for _ in 0..50 {
            let batch = random_hostile(len);
            for stmt in split_statements(&batch) {
                assert!(!stmt.trim().is_empty());
            }
        }
    }
}

#[test]
fn test_random_integers_encode_as_numbers_or_null() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let text = random_hostile(rng.gen_range(0..10));
        let params = Params::new().with("n", ParamValue::Text(text.clone()));
        let sql = assert_ok!(apply_sql_params("SELECT @n", &[DeclaredType::Int], &params));
        let literal = sql.trim_start_matches("SELECT ");
        assert!(
            literal == "NULL" || literal.parse::<i64>().is_ok(),
            "{text:?} encoded as {literal}"
        );
    }
}
