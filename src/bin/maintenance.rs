use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use docverify::{
    config::AppConfig,
    db,
    records::{PgRecordStore, RecordStore},
    s3,
    storage::{document_id_from_key, ObjectStorage, S3Storage, STUDENT_PREFIX},
};

const USAGE: &str = "Usage: maintenance find-orphans [--delete]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("find-orphans") => {
            let delete = args.any(|arg| arg == "--delete");
            find_orphans(delete).await?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Stored objects whose document record was never written (or is gone).
async fn find_orphans(delete: bool) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        s3_bucket = %config.s3_bucket,
        "loaded backend configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let records = PgRecordStore::new(pool);

    let s3_client = s3::build_client(&config).await?;
    let storage = S3Storage::new(s3_client, config.s3_bucket.clone());

    let keys = storage
        .list_keys(STUDENT_PREFIX)
        .await
        .context("failed to list stored documents")?;

    let mut orphans = Vec::new();
    for key in keys {
        let Some(document_id) = document_id_from_key(&key) else {
            println!("skipping unrecognised key {key}");
            continue;
        };
        if records.get_document(document_id).await?.is_none() {
            orphans.push(key);
        }
    }

    if orphans.is_empty() {
        println!("No orphaned objects found.");
        return Ok(());
    }

    for key in &orphans {
        println!("orphan: {key}");
    }

    if !delete {
        println!(
            "{} orphaned objects found. Re-run with --delete to remove them.",
            orphans.len()
        );
        return Ok(());
    }

    let mut failures = 0usize;
    for key in &orphans {
        if let Err(err) = storage.delete_object(key).await {
            failures += 1;
            eprintln!("Failed to delete object {key}: {err}");
        }
    }
    println!(
        "Deleted {} of {} orphaned objects.",
        orphans.len() - failures,
        orphans.len()
    );
    Ok(())
}
