//! iSeries SQL - Main entry point.
//!
//! Runs one statement batch or metadata query against a configured database and prints the
//! result as JSON on stdout. Logs go to stderr.

use iseries_sql_engine::config::{Command, Config};
use iseries_sql_engine::db::Database;
use iseries_sql_engine::models::{Params, TableRef};
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(db: &Database, command: Command) -> Result<JsonValue, Box<dyn std::error::Error>> {
    let value = match command {
        Command::Exec {
            return_type,
            context,
            params,
            sql,
        } => {
            let params = params
                .into_iter()
                .fold(Params::new(), |p, (name, value)| p.with(name, value));
            let output = db.exec(&context, return_type, &sql, &[], &params).await?;
            serde_json::to_value(output)?
        }
        Command::Tables { table } => {
            let table = table.as_deref().map(TableRef::parse);
            serde_json::to_value(db.meta().tables(table.as_ref()).await?)?
        }
        Command::Fields { table } => {
            let table = table.as_deref().map(TableRef::parse);
            serde_json::to_value(db.meta().table_fields(table.as_ref()).await?)?
        }
        Command::ForeignKeys { table } => {
            let table = table.as_deref().map(TableRef::parse);
            serde_json::to_value(db.meta().foreign_keys(table.as_ref()).await?)?
        }
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let db_config = config.db_config()?;
    info!(
        id = %db_config.id,
        pooled = db_config.options.pooled_or_default(),
        "Starting iseries-sql v{}",
        env!("CARGO_PKG_VERSION")
    );
    let db = Database::connect(db_config)?;

    let result = tokio::select! {
        result = run(&db, config.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(json!(null))
        }
    };

    db.close_all().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}
