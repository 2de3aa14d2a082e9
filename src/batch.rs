//! Directory batch processing.
//!
//! [`scan_documents`] walks a directory with include/exclude globs.
//! [`run_batch`] pushes the files through the selector on a bounded pool of
//! tokio tasks, runs the review gate on every document and hands one
//! [`DocumentReport`] per file to the caller as it completes. An unreadable
//! file or a panicking task is reported and counted; the batch goes on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use walkdir::WalkDir;

use janitor_core::fingerprint::fingerprint;
use janitor_core::gate::{gate, GateDecision};
use janitor_core::models::{ExtractionMethod, ExtractionResult};

use crate::config::BatchConfig;
use crate::progress::{BatchProgressEvent, BatchProgressReporter};
use crate::selector::{ExtractionSelector, FileMeta};

/// One line of batch output.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub path: String,
    pub fingerprint: Option<String>,
    pub method: Option<ExtractionMethod>,
    pub quality_score: Option<u8>,
    pub needs_review: bool,
    pub page_count: Option<u32>,
    pub char_count: Option<usize>,
    pub processing_time_ms: Option<u64>,
    pub ocr_reason: Option<String>,
    pub effective_auto_approve: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
}

impl DocumentReport {
    fn extracted(path: String, fp: String, result: &ExtractionResult, decision: GateDecision) -> Self {
        Self {
            path,
            fingerprint: Some(fp),
            method: Some(result.method),
            quality_score: Some(result.quality_score),
            needs_review: result.needs_review,
            page_count: Some(result.page_count),
            char_count: Some(result.char_count),
            processing_time_ms: Some(result.processing_time_ms),
            ocr_reason: result.ocr_reason.clone(),
            effective_auto_approve: decision.effective_auto_approve,
            reason: decision.reason,
            error: result.error.clone(),
        }
    }

    /// A document that never reached the selector always goes to a human.
    fn failed(path: String, error: String) -> Self {
        Self {
            path,
            fingerprint: None,
            method: None,
            quality_score: None,
            needs_review: true,
            page_count: None,
            char_count: None,
            processing_time_ms: None,
            ocr_reason: None,
            effective_auto_approve: false,
            reason: Some("document could not be processed".to_string()),
            error: Some(error),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchSummary {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub needs_review: u64,
    pub auto_approved: u64,
    pub cached: u64,
    pub by_method: BTreeMap<String, u64>,
}

impl BatchSummary {
    fn record(&mut self, report: &DocumentReport) {
        match report.method {
            Some(method) => {
                self.processed += 1;
                if method.is_cached() {
                    self.cached += 1;
                }
                *self.by_method.entry(method.to_string()).or_insert(0) += 1;
            }
            None => self.failed += 1,
        }
        if report.needs_review {
            self.needs_review += 1;
        }
        if report.effective_auto_approve {
            self.auto_approved += 1;
        }
    }
}

/// Runs the review gate and records the decision on the `audit` target.
pub fn review_gate(path: &str, result: &ExtractionResult, requested_auto_approve: bool) -> GateDecision {
    let decision = gate(result, requested_auto_approve);
    info!(
        target: "audit",
        path,
        method = %result.method,
        score = result.quality_score,
        requested_auto_approve,
        effective_auto_approve = decision.effective_auto_approve,
        reason = decision.reason.as_deref().unwrap_or(""),
        "review gate"
    );
    decision
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    })
}

/// Files under `root` matching the batch globs, sorted by path.
pub fn scan_documents(root: &Path, config: &BatchConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Batch root is not a directory: {}", root.display());
    }

    let include = build_globset(&config.include_globs)?;
    let exclude = build_globset(&config.exclude_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if config.ignore_hidden && is_hidden(relative) {
            continue;
        }
        let rel_str = relative.to_string_lossy();
        if exclude.is_match(rel_str.as_ref()) || !include.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

async fn process_file(
    selector: &ExtractionSelector,
    path: PathBuf,
    rel_path: String,
    auto_approve: bool,
) -> DocumentReport {
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) => {
            error!(path = %rel_path, error = %e, "failed to read document");
            return DocumentReport::failed(rel_path, format!("read failed: {}", e));
        }
    };
    let meta = FileMeta::for_path(&path);
    let result = selector.extract(&bytes, &meta).await;
    let decision = review_gate(&rel_path, &result, auto_approve);
    DocumentReport::extracted(rel_path, fingerprint(&bytes), &result, decision)
}

/// Processes `files` with at most `workers` documents in flight.
///
/// `on_report` sees each report in completion order. Paths in reports are
/// relative to `root` when possible.
pub async fn run_batch(
    selector: Arc<ExtractionSelector>,
    root: &Path,
    files: Vec<PathBuf>,
    workers: usize,
    auto_approve: bool,
    reporter: &dyn BatchProgressReporter,
    mut on_report: impl FnMut(&DocumentReport),
) -> BatchSummary {
    let mut summary = BatchSummary {
        total: files.len() as u64,
        ..BatchSummary::default()
    };
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for path in files {
        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let selector = selector.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            // Never closed.
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return DocumentReport::failed(rel_path, e.to_string()),
            };
            // Own task per document: a panic becomes a failed report for this path.
            let name = rel_path.clone();
            let work =
                tokio::spawn(async move { process_file(&selector, path, name, auto_approve).await });
            match work.await {
                Ok(report) => report,
                Err(e) => {
                    error!(path = %rel_path, error = %e, "batch worker panicked");
                    DocumentReport::failed(rel_path, format!("worker panicked: {}", e))
                }
            }
        });
    }

    let mut done = 0u64;
    while let Some(joined) = tasks.join_next().await {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "batch task failed");
                DocumentReport::failed("<unknown>".to_string(), e.to_string())
            }
        };
        done += 1;
        summary.record(&report);
        reporter.report(BatchProgressEvent::Processing {
            n: done,
            total: summary.total,
            path: report.path.clone(),
            method: report
                .method
                .map(|m| m.to_string())
                .unwrap_or_else(|| "failed".to_string()),
        });
        on_report(&report);
    }

    info!(
        total = summary.total,
        processed = summary.processed,
        failed = summary.failed,
        needs_review = summary.needs_review,
        "batch finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{DirectExtractor, EngineError, LocalOcrEngine, LocalOcrOutput};
    use crate::extract::{DirectText, ExtractError};
    use crate::progress::NoProgress;
    use crate::selector::SelectorSettings;
    use async_trait::async_trait;
    use janitor_core::cache::memory::InMemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Treats file bytes as the text layer; files containing "scan" have none.
    struct BytesAsText;

    impl DirectExtractor for BytesAsText {
        fn extract(&self, bytes: &[u8], _: &str) -> Result<DirectText, ExtractError> {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if text.contains("corrupt") {
                panic!("extractor blew up on {}", text);
            }
            if text.contains("scan") {
                return Ok(DirectText { text: String::new(), page_count: 1 });
            }
            Ok(DirectText { text, page_count: 1 })
        }
    }

    struct CountingOcr {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LocalOcrEngine for CountingOcr {
        async fn recognize(&self, _: &[u8], _: &str, _: u32, _: u32) -> Result<LocalOcrOutput, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LocalOcrOutput {
                text: "Recognised statement text ".repeat(20),
                region_confidences: vec![0.9],
            })
        }
    }

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn scan_applies_globs_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.pdf", "x");
        write(tmp.path(), "sub/B.PDF", "x");
        write(tmp.path(), "notes.txt", "x");
        write(tmp.path(), "skip.bin", "x");
        write(tmp.path(), ".hidden/c.pdf", "x");
        write(tmp.path(), "drafts/d.pdf", "x");

        let config = BatchConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..BatchConfig::default()
        };
        let files = scan_documents(tmp.path(), &config).unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["a.pdf", "notes.txt", "sub/B.PDF"]);
    }

    #[test]
    fn scan_rejects_missing_root() {
        assert!(scan_documents(Path::new("/definitely/not/here"), &BatchConfig::default()).is_err());
    }

    #[tokio::test]
    async fn batch_bounds_workers_and_survives_failures() {
        let tmp = TempDir::new().unwrap();
        for i in 0..6 {
            write(tmp.path(), &format!("scan-{}.pdf", i), &format!("scan {}", i));
        }
        let good = "A perfectly readable text layer with plenty of words in it. ".repeat(5);
        write(tmp.path(), "good.txt", &good);

        let ocr = Arc::new(CountingOcr {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let selector = Arc::new(
            ExtractionSelector::new(
                SelectorSettings::default(),
                Arc::new(InMemoryCache::new()),
                Arc::new(BytesAsText),
            )
            .with_local(ocr.clone()),
        );

        let mut files = scan_documents(tmp.path(), &BatchConfig::default()).unwrap();
        files.push(tmp.path().join("vanished.txt"));

        let mut reports = Vec::new();
        let summary = run_batch(selector, tmp.path(), files, 2, true, &NoProgress, |r| {
            reports.push(r.clone())
        })
        .await;

        assert_eq!(summary.total, 8);
        assert_eq!(summary.processed, 7);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.by_method.get("local_ocr"), Some(&6));
        assert_eq!(summary.by_method.get("direct"), Some(&1));
        assert!(ocr.peak.load(Ordering::SeqCst) <= 2);

        let missing = reports.iter().find(|r| r.path == "vanished.txt").unwrap();
        assert!(!missing.effective_auto_approve);
        assert!(missing.error.is_some());

        let direct = reports.iter().find(|r| r.path == "good.txt").unwrap();
        assert!(direct.effective_auto_approve);
        assert_eq!(direct.method, Some(ExtractionMethod::Direct));
    }

    #[tokio::test]
    async fn panicking_document_is_reported_by_path() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "corrupt.txt", "corrupt bytes");
        write(tmp.path(), "ok.txt", &"Readable words in a plain note. ".repeat(5));

        let selector = Arc::new(ExtractionSelector::new(
            SelectorSettings::default(),
            Arc::new(InMemoryCache::new()),
            Arc::new(BytesAsText),
        ));
        let files = scan_documents(tmp.path(), &BatchConfig::default()).unwrap();

        let mut reports = Vec::new();
        let summary = run_batch(selector, tmp.path(), files, 2, true, &NoProgress, |r| {
            reports.push(r.clone())
        })
        .await;

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        let broken = reports.iter().find(|r| r.method.is_none()).unwrap();
        assert_eq!(broken.path, "corrupt.txt");
        assert!(!broken.effective_auto_approve);
        assert!(broken.error.as_deref().unwrap().contains("panicked"));
    }

    #[test]
    fn gate_forces_review_on_low_quality() {
        let result = ExtractionResult {
            text: String::new(),
            method: ExtractionMethod::DirectFallback,
            engine_confidence: 0.0,
            quality_score: 0,
            needs_review: true,
            page_count: 1,
            char_count: 0,
            processing_time_ms: 3,
            ocr_reason: Some("empty text".into()),
            error: None,
        };
        let decision = review_gate("x.pdf", &result, true);
        assert!(!decision.effective_auto_approve);
        assert_eq!(decision.reason.as_deref(), Some("low extraction quality (score=0)"));
    }
}
