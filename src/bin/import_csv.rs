//! Imports a CSV sheet into `registros` from the command line.
//!
//! Usage: `import_csv <file.csv> <user-uuid> [--dry-run]`
//!
//! Rows go through the same import pipeline as the HTTP routes, so the row
//! limit warning and gestor prediction apply here too. With `--dry-run`
//! nothing is written; the normalized summary and per-row diagnostics are
//! printed as JSON instead.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use controladoria_api::config::Config;
use controladoria_api::db::Database;
use controladoria_api::db_storage::PgRegistroStore;
use controladoria_api::importer::import_rows;
use controladoria_api::normalizer::normalize_at;
use controladoria_api::sheet::read_csv;
use dotenvy::dotenv;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

const USAGE: &str = "usage: import_csv <file.csv> <user-uuid> [--dry-run]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    path: PathBuf,
    user_id: Uuid,
    dry_run: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut dry_run = false;
    let mut positional = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag '{}'\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let [path, user] = positional.as_slice() else {
        anyhow::bail!(USAGE);
    };

    let user_id = Uuid::parse_str(user).with_context(|| format!("invalid user id '{}'", user))?;

    Ok(CliArgs {
        path: PathBuf::from(path),
        user_id,
        dry_run,
    })
}

/// Normalizes the sheet without touching the database.
fn dry_run_report(bytes: &[u8], user_id: Uuid, today: NaiveDate) -> anyhow::Result<serde_json::Value> {
    let rows = read_csv(bytes).map_err(|e| anyhow::anyhow!("{}", e))?;
    let batch = normalize_at(&rows, user_id, today);

    Ok(json!({
        "submitted": batch.submitted,
        "kept": batch.records.len(),
        "dropped": batch.dropped,
        "dates_defaulted": batch.dates_defaulted,
        "diagnostics": batch.diagnostics,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = parse_args(std::env::args().skip(1))?;
    let bytes = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("reading {}", args.path.display()))?;

    if args.dry_run {
        let report = dry_run_report(&bytes, args.user_id, Utc::now().date_naive())?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let rows = read_csv(&bytes).map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!("Read {} row(s) from {}", rows.len(), args.path.display());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let store = PgRegistroStore::new(db.pool.clone());

    let summary = import_rows(&store, &config, None, &rows, args.user_id)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
