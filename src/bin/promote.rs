//! Promote binary - copies one collection from the development store to the
//! release store and prints the replication report as JSON
//!
//! Usage:
//!   cargo run --bin promote -- <collection>
//!   cargo run --bin promote -- <collection> --continue-on-error
//!   cargo run --bin promote -- <collection> --resume-from 1200 --batch-size 500
//!
//! Required environment variables:
//! - MONGO_URI_DEV
//! - MONGO_URI_RELEASE
//! - DB_NAME
//! - ADMIN_USERNAME, ADMIN_PASSWORD (shared config, unused here)
//!
//! Optional:
//! - REPLICATION_BATCH_SIZE (defaults to 100)

use anyhow::{bail, Context, Result};
use document_admin::config::Config;
use document_admin::replication::{promote_collection, FailureMode, ReplicationOptions};
use document_admin::store::MongoStore;
use tracing::info;

struct Args {
    collection: String,
    failure_mode: FailureMode,
    start_offset: u64,
    batch_size: Option<u64>,
}

fn print_usage() {
    eprintln!(
        "Usage: promote <collection> [--continue-on-error] [--resume-from N] [--batch-size N]"
    );
}

fn parse_number(flag: &str, value: Option<String>) -> Result<u64> {
    let value = value.with_context(|| format!("{} requires a value", flag))?;
    value
        .parse()
        .with_context(|| format!("{} expects a number, got '{}'", flag, value))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Args>> {
    let mut collection = None;
    let mut failure_mode = FailureMode::AbortOnFirstError;
    let mut start_offset = 0;
    let mut batch_size = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--continue-on-error" => failure_mode = FailureMode::ContinueOnError,
            "--resume-from" => start_offset = parse_number("--resume-from", args.next())?,
            "--batch-size" => batch_size = Some(parse_number("--batch-size", args.next())?),
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            name => {
                if collection.replace(name.to_string()).is_some() {
                    bail!("Only one collection can be promoted at a time");
                }
            }
        }
    }

    let collection = collection.context("Missing collection name")?;
    Ok(Some(Args {
        collection,
        failure_mode,
        start_offset,
        batch_size,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("document_admin=info".parse()?),
        )
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    let config = Config::from_env()?;
    let dev = MongoStore::connect(&config.mongo_uri_dev, &config.db_name)
        .await
        .context("Failed to connect to development store")?;
    let release = MongoStore::connect(&config.mongo_uri_release, &config.db_name)
        .await
        .context("Failed to connect to release store")?;

    let options = ReplicationOptions {
        batch_size: args.batch_size.unwrap_or(config.replication_batch_size),
        failure_mode: args.failure_mode,
        start_offset: args.start_offset,
        ..ReplicationOptions::default()
    };

    info!("Promoting {} to release", args.collection);
    let report = promote_collection(&dev, &release, &args.collection, &options).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_complete() {
        bail!(
            "{} documents failed; rerun with --resume-from {} to continue",
            report.failed.len(),
            report.next_offset
        );
    }

    Ok(())
}
