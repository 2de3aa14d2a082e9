//! `janitor extract` and `janitor batch`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use janitor_core::fingerprint::fingerprint;
use janitor_core::gate::GateDecision;
use janitor_core::models::ExtractionResult;

use crate::batch::{self, BatchSummary};
use crate::config::Config;
use crate::db;
use crate::progress::{format_number, ProgressMode};
use crate::selector::{ExtractionSelector, FileMeta};
use crate::sqlite_cache::SqliteCache;

/// A selector over the SQLite cache, with the engines enabled in `config`.
pub async fn open_selector(config: &Config) -> Result<(SqlitePool, ExtractionSelector)> {
    let pool = db::connect_migrated(config).await?;
    let cache = Arc::new(SqliteCache::new(pool.clone()));
    let selector = ExtractionSelector::from_config(config, cache)?;
    Ok((pool, selector))
}

#[derive(Debug, Serialize)]
pub struct ExtractOutput {
    pub path: String,
    pub fingerprint: String,
    pub result: ExtractionResult,
    pub gate: GateDecision,
}

pub async fn extract_file(
    selector: &ExtractionSelector,
    path: &Path,
    auto_approve: bool,
) -> Result<ExtractOutput> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let path_str = path.display().to_string();
    let result = selector.extract(&bytes, &FileMeta::for_path(path)).await;
    let gate = batch::review_gate(&path_str, &result, auto_approve);
    Ok(ExtractOutput {
        path: path_str,
        fingerprint: fingerprint(&bytes),
        result,
        gate,
    })
}

pub async fn run_extract(config: &Config, path: &Path, auto_approve: bool) -> Result<()> {
    let (pool, selector) = open_selector(config).await?;
    let output = extract_file(&selector, path, auto_approve).await;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

pub async fn run_batch_command(
    config: &Config,
    root: &Path,
    workers: Option<usize>,
    auto_approve: bool,
    json: bool,
) -> Result<()> {
    let mode = if json {
        ProgressMode::Json
    } else {
        ProgressMode::default_for_tty()
    };
    let reporter = mode.reporter();
    reporter.report(crate::progress::BatchProgressEvent::Scanning {
        root: root.display().to_string(),
    });

    let files = batch::scan_documents(root, &config.batch)?;
    let workers = workers.unwrap_or(config.batch.workers).max(1);

    let (pool, selector) = open_selector(config).await?;
    let summary = batch::run_batch(
        Arc::new(selector),
        root,
        files,
        workers,
        auto_approve,
        reporter.as_ref(),
        |report| match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!(error = %e, "failed to serialize report"),
        },
    )
    .await;
    pool.close().await;

    print_summary(&summary, json);
    Ok(())
}

fn print_summary(summary: &BatchSummary, json: bool) {
    if json {
        let obj = serde_json::json!({ "event": "summary", "summary": summary });
        eprintln!("{}", obj);
        return;
    }
    eprintln!();
    eprintln!(
        "batch  done  {} documents, {} failed",
        format_number(summary.total),
        format_number(summary.failed)
    );
    eprintln!(
        "       {} need review, {} auto-approved, {} from cache",
        format_number(summary.needs_review),
        format_number(summary.auto_approved),
        format_number(summary.cached)
    );
    for (method, n) in &summary.by_method {
        eprintln!("       {:<22} {:>8}", method, format_number(*n));
    }
}
