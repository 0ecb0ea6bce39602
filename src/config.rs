//! Configuration handling for the iSeries SQL engine.
//!
//! Connection settings come either from serde (embedding applications) or from a CLI-style
//! connection argument of the form `id=url?option=value`, where engine options are stripped
//! from the URL query and everything else is left for the driver.

use crate::error::{DbError, DbResult};
use crate::models::{ParamValue, ReturnType};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_IDLE_DISCONNECT_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_INITIAL_SIZE: u32 = 1;
pub const DEFAULT_MAX_SIZE: u32 = 10;
pub const DEFAULT_FETCH_SIZE: usize = 100;
pub const DEFAULT_SCHEMA: &str = "QGPL";

/// Idle period after which an unused pool is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IdleSetting", into = "IdleSetting")]
pub enum IdleDisconnect {
    Millis(u64),
    Disabled,
}

impl IdleDisconnect {
    /// `None` when reclaiming is disabled. A zero period also disables it.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Millis(0) | Self::Disabled => None,
            Self::Millis(ms) => Some(Duration::from_millis(*ms)),
        }
    }
}

impl Default for IdleDisconnect {
    fn default() -> Self {
        Self::Millis(DEFAULT_IDLE_DISCONNECT_MS)
    }
}

/// Wire form: milliseconds, or `false` to disable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum IdleSetting {
    Millis(u64),
    Flag(bool),
}

impl From<IdleSetting> for IdleDisconnect {
    fn from(setting: IdleSetting) -> Self {
        match setting {
            IdleSetting::Millis(ms) => Self::Millis(ms),
            IdleSetting::Flag(true) => Self::default(),
            IdleSetting::Flag(false) => Self::Disabled,
        }
    }
}

impl From<IdleDisconnect> for IdleSetting {
    fn from(idle: IdleDisconnect) -> Self {
        match idle {
            IdleDisconnect::Millis(ms) => Self::Millis(ms),
            IdleDisconnect::Disabled => Self::Flag(false),
        }
    }
}

/// Engine options. Every field is optional; defaults are applied by the `*_or_default` accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbOptions {
    /// Lease connections from a shared pool (default: false)
    pub pooled: Option<bool>,
    /// Run commands as one compound `BEGIN ... END` statement (default: true)
    pub automatic_compound_commands: Option<bool>,
    /// Trim trailing whitespace from character columns (default: true)
    pub autotrim: Option<bool>,
    /// Pool idle reclaim period (default: 30 minutes)
    pub idle_disconnect: Option<IdleDisconnect>,
    /// `schema.table` / `schema.%` patterns visible to metadata queries
    pub metadata_filter: Option<Vec<String>>,
    /// Statements run once on every new connection
    pub presql: Option<String>,
    /// Connections opened when a pool is established (default: 1)
    pub initial_size: Option<u32>,
    /// Maximum connections per pool (default: 10)
    pub max_size: Option<u32>,
    /// Cursor page size (default: 100)
    pub fetch_size: Option<usize>,
    /// Schema that unqualified metadata names resolve against (default: QGPL)
    pub default_schema: Option<String>,
}

impl DbOptions {
    pub fn pooled_or_default(&self) -> bool {
        self.pooled.unwrap_or(false)
    }

    pub fn automatic_compound_commands_or_default(&self) -> bool {
        self.automatic_compound_commands.unwrap_or(true)
    }

    pub fn autotrim_or_default(&self) -> bool {
        self.autotrim.unwrap_or(true)
    }

    pub fn idle_disconnect_or_default(&self) -> IdleDisconnect {
        self.idle_disconnect.unwrap_or_default()
    }

    pub fn initial_size_or_default(&self) -> u32 {
        self.initial_size.unwrap_or(DEFAULT_INITIAL_SIZE)
    }

    pub fn max_size_or_default(&self) -> u32 {
        self.max_size.unwrap_or(DEFAULT_MAX_SIZE)
    }

    pub fn fetch_size_or_default(&self) -> usize {
        self.fetch_size.unwrap_or(DEFAULT_FETCH_SIZE)
    }

    pub fn default_schema_or_default(&self) -> &str {
        self.default_schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// Pre-session statements, empty when none are configured.
    pub fn presql_statements(&self) -> Vec<String> {
        self.presql
            .as_deref()
            .map(crate::sql::split_statements)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.max_size == Some(0) {
            return Err(DbError::config("max_size must be greater than 0"));
        }
        if self.initial_size == Some(0) {
            return Err(DbError::config("initial_size must be greater than 0"));
        }
        if self.fetch_size == Some(0) {
            return Err(DbError::config("fetch_size must be greater than 0"));
        }
        let (initial, max) = (self.initial_size_or_default(), self.max_size_or_default());
        if initial > max {
            return Err(DbError::config(format!(
                "initial_size ({initial}) cannot exceed max_size ({max})"
            )));
        }
        Ok(())
    }
}

/// Connection configuration. Configurations with the same `id` share one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub id: String,
    /// Driver connection string (sensitive, never logged).
    pub connection_string: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub options: DbOptions,
}

impl DbConfig {
    /// Engine option keys recognized in the URL query.
    const OPTION_KEYS: &'static [&'static str] = &[
        "pooled",
        "automatic_compound_commands",
        "autotrim",
        "idle_disconnect",
        "metadata_filter",
        "presql",
        "initial_size",
        "max_size",
        "fetch_size",
        "default_schema",
    ];

    pub fn new(id: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_options(mut self, options: DbOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks that must pass before any connection is attempted.
    pub fn validate(&self) -> DbResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(DbError::config("Missing database connection string"));
        }
        self.options.validate()
    }

    /// Parse a connection argument.
    ///
    /// # Format
    ///
    /// ```text
    /// db2://host/MYLIB?pooled=true                 # id derived from the database name
    /// prod=db2://host/MYLIB?idle_disconnect=false  # named connection
    /// ```
    pub fn parse(s: &str) -> DbResult<Self> {
        let scheme_pos = s.find("://").or_else(|| s.find(':')).unwrap_or(s.len());
        let (explicit_name, url_str) = match s[..scheme_pos].find('=') {
            Some(idx) => (Some(s[..idx].trim()), &s[idx + 1..]),
            None => (None, s),
        };
        if url_str.trim().is_empty() {
            return Err(DbError::config("Missing database connection string"));
        }

        let mut url = Url::parse(url_str).map_err(|e| DbError::config(format!("Invalid URL: {e}")))?;
        let mut opts = Self::extract_options(&mut url, Self::OPTION_KEYS);
        let options = Self::parse_options(&mut opts)?;
        options.validate()?;

        let id = explicit_name
            .filter(|n| !n.is_empty())
            .map(String::from)
            .or_else(|| Self::db_name(&url))
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            id,
            connection_string: url.to_string(),
            user: None,
            password: None,
            options,
        })
    }

    fn parse_options(opts: &mut HashMap<String, String>) -> DbResult<DbOptions> {
        let flag = |v: String| {
            if v.eq_ignore_ascii_case("true") {
                Some(true)
            } else if v.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        };
        let idle_disconnect = match opts.remove("idle_disconnect") {
            None => None,
            Some(v) if v.eq_ignore_ascii_case("false") => Some(IdleDisconnect::Disabled),
            Some(v) => Some(IdleDisconnect::Millis(v.parse().map_err(|_| {
                DbError::config(format!("idle_disconnect must be milliseconds or false, got '{v}'"))
            })?)),
        };
        Ok(DbOptions {
            pooled: opts.remove("pooled").and_then(flag),
            automatic_compound_commands: opts.remove("automatic_compound_commands").and_then(flag),
            autotrim: opts.remove("autotrim").and_then(flag),
            idle_disconnect,
            metadata_filter: opts.remove("metadata_filter").map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            }),
            presql: opts.remove("presql").filter(|v| !v.is_empty()),
            initial_size: opts.remove("initial_size").and_then(|v| v.parse().ok()),
            max_size: opts.remove("max_size").and_then(|v| v.parse().ok()),
            fetch_size: opts.remove("fetch_size").and_then(|v| v.parse().ok()),
            default_schema: opts.remove("default_schema").filter(|v| !v.is_empty()),
        })
    }

    /// Pull engine options out of the query, re-encoding what remains for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    fn db_name(url: &Url) -> Option<String> {
        url.path()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches(".sqlite").trim_end_matches(".db"))
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

/// Command-line configuration for the `iseries-sql` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "iseries-sql",
    about = "Run DB2 for i statements and metadata queries through the iSeries SQL engine",
    version
)]
pub struct Config {
    /// Connection argument: "connection_string" or "id=connection_string".
    /// Engine options (pooled, autotrim, idle_disconnect, ...) go in the query string.
    #[arg(short = 'd', long = "database", value_name = "URL", env = "ISERIES_DATABASE")]
    pub database: String,

    /// Database user, when not part of the connection string
    #[arg(long, env = "ISERIES_USER")]
    pub user: Option<String>,

    /// Database password, when not part of the connection string
    #[arg(long, env = "ISERIES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ISERIES_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "ISERIES_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute a batch and print the shaped result as JSON
    Exec {
        #[arg(long, value_enum, default_value_t = ReturnType::Recordset)]
        return_type: ReturnType,

        /// Audit context stored in the session meta table
        #[arg(long, default_value = "")]
        context: String,

        /// Parameter as name=value; may be repeated
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,

        /// SQL batch; statements are separated by ';'
        #[arg(long)]
        sql: String,
    },
    /// List tables and views
    Tables {
        /// Restrict to schema.table
        table: Option<String>,
    },
    /// List the columns of one table, or of every visible table
    Fields {
        /// Restrict to schema.table
        table: Option<String>,
    },
    /// List foreign keys
    ForeignKeys {
        /// Restrict to schema.table
        table: Option<String>,
    },
}

/// Parse `name=value` into a text parameter. A leading `@` on the name is ignored.
pub fn parse_param(s: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim().trim_start_matches('@');
    if name.is_empty() {
        return Err(format!("Missing parameter name in '{s}'"));
    }
    Ok((name.to_string(), ParamValue::Text(value.to_string())))
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Connection configuration with CLI credentials applied.
    pub fn db_config(&self) -> DbResult<DbConfig> {
        let mut config = DbConfig::parse(&self.database)?;
        config.user = self.user.clone();
        config.password = self.password.clone();
        config.validate()?;
        Ok(config)
    }
}
