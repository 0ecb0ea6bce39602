//! Query parameter models.
//!
//! This module defines the declared types used to pick literal encoding rules and the
//! parameter values callers bind to `@name` placeholders.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared length of a character or binary type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    /// No truncation.
    Max,
    Chars(usize),
}

impl Length {
    /// Length to truncate to, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Max => None,
            Self::Chars(n) => Some(*n),
        }
    }
}

/// Semantic type tag selecting the literal encoding rules for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    VarChar(Length),
    Char(Length),
    VarBinary(Length),
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Boolean,
    Decimal(u32, u32),
    Float(u32),
    Date,
    Time,
    DateTime,
}

impl DeclaredType {
    /// Unbounded VARCHAR, the type used for catalog lookups.
    pub const VARCHAR_MAX: DeclaredType = DeclaredType::VarChar(Length::Max);

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::BigInt | Self::Int | Self::SmallInt | Self::TinyInt
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn len(l: &Length) -> String {
            match l {
                Length::Max => "max".to_string(),
                Length::Chars(n) => n.to_string(),
            }
        }
        match self {
            Self::VarChar(l) => write!(f, "varchar({})", len(l)),
            Self::Char(l) => write!(f, "char({})", len(l)),
            Self::VarBinary(l) => write!(f, "varbinary({})", len(l)),
            Self::BigInt => write!(f, "bigint"),
            Self::Int => write!(f, "int"),
            Self::SmallInt => write!(f, "smallint"),
            Self::TinyInt => write!(f, "tinyint"),
            Self::Boolean => write!(f, "boolean"),
            Self::Decimal(p, s) => write!(f, "decimal({},{})", p, s),
            Self::Float(p) => write!(f, "float({})", p),
            Self::Date => write!(f, "date"),
            Self::Time => write!(f, "time"),
            Self::DateTime => write!(f, "datetime"),
        }
    }
}

impl FromStr for DeclaredType {
    type Err = String;

    /// Parse `varchar`, `varchar(10)`, `char(max)`, `decimal(15,2)`, `datetime`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, args) = match s.find('(') {
            Some(open) => {
                let close = s
                    .rfind(')')
                    .ok_or_else(|| format!("Unbalanced type arguments: {s}"))?;
                (&s[..open], Some(&s[open + 1..close]))
            }
            None => (s.as_str(), None),
        };
        let length = || -> Result<Length, String> {
            match args.map(str::trim) {
                None | Some("max") | Some("-1") => Ok(Length::Max),
                Some(n) => n
                    .parse()
                    .map(Length::Chars)
                    .map_err(|_| format!("Invalid length: {n}")),
            }
        };
        let numbers = || -> Result<Vec<u32>, String> {
            args.map(|a| {
                a.split(',')
                    .map(|n| {
                        n.trim()
                            .parse::<u32>()
                            .map_err(|_| format!("Invalid precision: {n}"))
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
        };

        match name.trim() {
            "varchar" | "nvarchar" => Ok(Self::VarChar(length()?)),
            "char" | "nchar" => Ok(Self::Char(length()?)),
            "varbinary" | "binary" => Ok(Self::VarBinary(length()?)),
            "bigint" => Ok(Self::BigInt),
            "int" | "integer" => Ok(Self::Int),
            "smallint" => Ok(Self::SmallInt),
            "tinyint" => Ok(Self::TinyInt),
            "boolean" | "bool" | "bit" => Ok(Self::Boolean),
            "decimal" | "numeric" => {
                let n = numbers()?;
                Ok(Self::Decimal(
                    n.first().copied().unwrap_or(18),
                    n.get(1).copied().unwrap_or(0),
                ))
            }
            "float" | "double" => Ok(Self::Float(numbers()?.first().copied().unwrap_or(53))),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            other => Err(format!("Unknown declared type: {other}")),
        }
    }
}

/// A timestamp parameter with optional timezone and sub-millisecond detail.
///
/// Without `utc_offset` the timestamp is a local wall-clock value. With it, the timestamp is
/// UTC and the offset (minutes, positive west of UTC) says which zone to render it in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub utc_offset: Option<i32>,
    #[serde(default)]
    pub microseconds: Option<f64>,
}

impl DateValue {
    pub fn local(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            utc_offset: None,
            microseconds: None,
        }
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset = Some(minutes);
        self
    }

    pub fn with_microseconds(mut self, microseconds: f64) -> Self {
        self.microseconds = Some(microseconds);
        self
    }
}

/// A parameter value for `@name` substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Date/time value
    Date(DateValue),
    /// String value
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Date(_) => "date",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Declared type inferred from the value when the caller supplies none.
    pub fn infer_type(&self) -> DeclaredType {
        match self {
            Self::Bool(_) => DeclaredType::Boolean,
            Self::Int(_) => DeclaredType::BigInt,
            Self::Float(_) => DeclaredType::Float(53),
            Self::Date(_) => DeclaredType::DateTime,
            Self::Bytes(_) => DeclaredType::VarBinary(Length::Max),
            Self::Null | Self::Text(_) => DeclaredType::VARCHAR_MAX,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(DateValue::local(value))
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(DateValue::local(value.and_time(chrono::NaiveTime::MIN)))
    }
}

impl From<DateValue> for ParamValue {
    fn from(value: DateValue) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Named parameters in caller order. Declared types are matched to them by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing an earlier value with the same name in place.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
