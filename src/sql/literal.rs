//! SQL literal encoding.
//!
//! Values are inlined into statement text rather than bound, so every declared type has
//! its own rendering and escaping rule. Escaping also protects the statement splitter:
//! a `;` inside a value becomes `\;` and never separates statements.

use crate::error::{DbError, DbResult};
use crate::models::query::{DateValue, DeclaredType, ParamValue, Params};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta};

pub const NULL: &str = "NULL";

/// Escape text for use inside a single-quoted literal.
///
/// `"0"`, the empty string and numeric text pass through unchanged. Otherwise `;` is
/// escaped for the splitter, control characters are removed and `'` is doubled.
pub fn escape(value: &str) -> String {
    if value.is_empty() || value == "0" || parse_numeric(value).is_some() {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\;"),
            '\'' => out.push_str("''"),
            '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' => {}
            c => out.push(c),
        }
    }
    out
}

/// Escape any parameter value.
pub fn escape_value(value: &ParamValue) -> String {
    escape(&value_text(value))
}

/// Parse the whole string as a number. Blank text counts as zero.
fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    if unsigned == "Infinity" {
        return Some(if trimmed.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Longest numeric prefix of the text (`"12.5kg"` -> `"12.5"`).
fn numeric_prefix(value: &str) -> Option<&str> {
    let s = value.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            has_digits = has_digits || frac_end > frac_start;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    Some(&s[..end])
}

/// Leading integer of the text (`"42abc"` -> 42).
fn leading_integer(value: &str) -> Option<i64> {
    let s = value.trim_start();
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Parse a boolean spelled the usual ways. Blank or unknown text yields `None`.
pub fn parse_bool(value: &ParamValue) -> Option<bool> {
    match value {
        ParamValue::Null => None,
        ParamValue::Bool(b) => Some(*b),
        other => match value_text(other).to_uppercase().as_str() {
            "TRUE" | "T" | "Y" | "YES" | "ON" | "1" => Some(true),
            "FALSE" | "F" | "N" | "NO" | "OFF" | "0" => Some(false),
            _ => None,
        },
    }
}

/// Plain text form of a value.
fn value_text(value: &ParamValue) -> String {
    match value {
        ParamValue::Null => String::new(),
        ParamValue::Bool(b) => b.to_string(),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::Float(f) => format_float(*f),
        ParamValue::Text(s) => s.clone(),
        ParamValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        ParamValue::Date(d) => d.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Render one value as a SQL literal of the declared type.
pub fn encode_literal(declared: DeclaredType, value: &ParamValue) -> String {
    if value.is_null() {
        return NULL.to_string();
    }
    match declared {
        DeclaredType::VarChar(length) | DeclaredType::Char(length) => {
            let text = value_text(value);
            let text = match length.limit() {
                Some(n) => text.chars().take(n).collect(),
                None => text,
            };
            format!("'{}'", escape(&text))
        }
        DeclaredType::VarBinary(_) => {
            let bytes = match value {
                ParamValue::Bytes(b) => b.clone(),
                other => value_text(other).into_bytes(),
            };
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("BX'{hex}'")
        }
        DeclaredType::BigInt | DeclaredType::Int | DeclaredType::SmallInt | DeclaredType::TinyInt => {
            let parsed = match value {
                ParamValue::Int(i) => Some(*i),
                ParamValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
                ParamValue::Text(s) => leading_integer(s),
                _ => None,
            };
            parsed
                .map(|i| i.to_string())
                .unwrap_or_else(|| NULL.to_string())
        }
        DeclaredType::Boolean => {
            if matches!(value, ParamValue::Text(s) if s.is_empty()) {
                return NULL.to_string();
            }
            if parse_bool(value) == Some(true) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        DeclaredType::Decimal(..) | DeclaredType::Float(_) => match value {
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) if f.is_finite() => format_float(*f),
            ParamValue::Text(s) => numeric_prefix(s)
                .map(escape)
                .unwrap_or_else(|| NULL.to_string()),
            _ => NULL.to_string(),
        },
        DeclaredType::Date | DeclaredType::Time | DeclaredType::DateTime => {
            encode_temporal(declared, value).unwrap_or_else(|| NULL.to_string())
        }
    }
}

fn encode_temporal(declared: DeclaredType, value: &ParamValue) -> Option<String> {
    let mut suffix = String::new();
    let timestamp = match value {
        ParamValue::Date(date) => {
            let (timestamp, date_suffix) = date_with_suffix(date)?;
            suffix = date_suffix;
            timestamp
        }
        ParamValue::Int(ms) => epoch_millis(*ms)?,
        ParamValue::Float(ms) if ms.is_finite() => epoch_millis(ms.trunc() as i64)?,
        ParamValue::Text(s) => parse_local_timestamp(s)?,
        _ => return None,
    };

    Some(match declared {
        DeclaredType::Date => format!("DATE('{}')", timestamp.format("%Y-%m-%d")),
        DeclaredType::Time => format!("TIME('{}{}')", timestamp.format("%H.%M.%S"), suffix),
        _ => format!(
            "TIMESTAMP('{}{}')",
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            suffix
        ),
    })
}

/// Wall time to render plus the microsecond and offset suffix.
///
/// `None` when shifting by the offset leaves the representable range.
fn date_with_suffix(date: &DateValue) -> Option<(NaiveDateTime, String)> {
    let mut timestamp = date.timestamp;
    let mut suffix = String::new();

    if let Some(offset) = date.utc_offset {
        let magnitude = offset.unsigned_abs();
        // Offsets count minutes west of UTC; the rendered zone uses the opposite sign.
        let sign = if offset < 0 { '+' } else { '-' };
        suffix = format!(" {}{:02}:{:02}", sign, (magnitude / 60) % 24, magnitude % 60);
        timestamp = timestamp.checked_sub_signed(TimeDelta::minutes(i64::from(offset)))?;
    }

    if let Some(micros) = date.microseconds {
        let digits = format!("000{}", micros.round() as i64);
        let last3 = &digits[digits.len() - 3..];
        suffix = format!("{}{}", last3.trim_end_matches('0'), suffix);
    }

    Some((timestamp, suffix))
}

fn epoch_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Parse text as a local calendar value.
///
/// Zoned input (`2022-01-27T01:02:03Z`) is converted to local time; unzoned input is taken
/// as already local, so a bare date never shifts to the previous day.
pub fn parse_local_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S%.f",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    None
}

/// Substitute `@name` placeholders with encoded literals.
///
/// `types` is matched to `params` by position; when it is empty the type is inferred from
/// each value. Empty strings encode as NULL. At each `@` the longest matching parameter name
/// wins, and substituted text is never scanned again.
pub fn apply_sql_params(sql: &str, types: &[DeclaredType], params: &Params) -> DbResult<String> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }

    let mut encoded: Vec<(&str, String)> = Vec::with_capacity(params.len());
    for (i, (name, value)) in params.iter().enumerate() {
        let value = match value {
            ParamValue::Text(s) if s.is_empty() => &ParamValue::Null,
            v => v,
        };
        let declared = if types.is_empty() {
            value.infer_type()
        } else {
            *types.get(i).ok_or_else(|| {
                DbError::invalid_input(format!("Missing declared type for parameter @{name}"))
            })?
        };
        encoded.push((name, encode_literal(declared, value)));
    }
    encoded.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        match encoded
            .iter()
            .find(|(name, _)| !name.is_empty() && after.starts_with(name))
        {
            Some((name, literal)) => {
                out.push_str(literal);
                rest = &after[name.len()..];
            }
            None => {
                out.push('@');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}
