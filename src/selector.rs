//! Extraction strategy selection.
//!
//! [`ExtractionSelector::extract`] takes raw bytes and always produces an
//! [`ExtractionResult`]:
//!
//! ```text
//! fingerprint ─▶ cache hit? ──yes──▶ *_cached result (processing_time_ms = 0)
//!                   │ no
//!                   ▼
//!            direct extraction ─▶ PDF or image, OCR needed? ──no──▶ Direct
//!                                      │ yes
//!                                      ▼
//!          remote enabled + important? ──▶ RemoteVision
//!          local enabled (or remote failed)? ──▶ LocalOcr
//!          otherwise / every engine failed   ──▶ DirectFallback
//!                                      │
//!                                      ▼
//!                           score ─▶ gated cache write
//! ```
//!
//! Each engine is tried at most once per document. A failed cache lookup
//! counts as a miss and that extraction is not written back.
//!
//! The cache lookup, engine call and cache write for one fingerprint run
//! under a per-fingerprint lock, so concurrent workers given the same file
//! make a single engine call between them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use janitor_core::cache::ExtractionCache;
use janitor_core::fingerprint::fingerprint;
use janitor_core::importance::{DocumentInfo, ImportancePolicy, KeywordImportance};
use janitor_core::models::{CacheEntry, ExtractionMethod, ExtractionResult};
use janitor_core::ocr_trigger::OcrTrigger;
use janitor_core::quality::{self, Quality};
use janitor_core::text_stats;

use crate::config::Config;
use crate::engines::{
    self, BuiltinExtractor, DirectExtractor, EngineError, LocalOcrEngine, RemoteVisionEngine,
};
use crate::extract;
use crate::locks::KeyedLocks;

/// What the selector knows about a document besides its bytes.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub file_name: String,
    pub content_type: String,
}

impl FileMeta {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    /// Derives the content type from the extension; unknown types are
    /// passed through as `application/octet-stream`.
    pub fn for_path(path: &std::path::Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = extract::content_type_for_path(path).unwrap_or("application/octet-stream");
        Self::new(file_name, content_type)
    }
}

#[derive(Debug, Clone)]
pub struct SelectorSettings {
    pub trigger: OcrTrigger,
    pub max_text_chars: usize,
    pub engine_timeout: Duration,
    pub direct_confidence: f64,
    pub fallback_confidence: f64,
    pub local_dpi: u32,
    pub local_max_pages: u32,
    pub local_min_region_confidence: f64,
    pub remote_max_pages: u32,
    pub remote_confidence: f64,
    pub remote_prompt: String,
}

impl SelectorSettings {
    pub fn from_config(config: &Config) -> Self {
        let ex = &config.extraction;
        let local = &config.engines.local;
        let remote = &config.engines.remote;
        Self {
            trigger: ex.ocr_trigger(),
            max_text_chars: ex.max_text_chars,
            engine_timeout: Duration::from_secs(ex.engine_timeout_secs),
            direct_confidence: ex.direct_confidence,
            fallback_confidence: ex.fallback_confidence,
            local_dpi: local.dpi,
            local_max_pages: local.max_pages,
            local_min_region_confidence: local.min_region_confidence,
            remote_max_pages: remote.max_pages,
            remote_confidence: remote.confidence,
            remote_prompt: remote.prompt.clone(),
        }
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

#[derive(Clone, Copy)]
enum Engine<'a> {
    Local(&'a dyn LocalOcrEngine),
    Remote(&'a dyn RemoteVisionEngine),
}

impl Engine<'_> {
    fn name(&self) -> &'static str {
        match self {
            Engine::Local(_) => "local",
            Engine::Remote(_) => "remote",
        }
    }
}

/// Text produced by a successful engine call.
struct Recognized {
    text: String,
    method: ExtractionMethod,
    confidence: f64,
}

pub struct ExtractionSelector {
    settings: SelectorSettings,
    cache: Arc<dyn ExtractionCache>,
    direct: Arc<dyn DirectExtractor>,
    local: Option<Arc<dyn LocalOcrEngine>>,
    remote: Option<Arc<dyn RemoteVisionEngine>>,
    importance: Arc<dyn ImportancePolicy>,
    locks: KeyedLocks<String>,
}

impl ExtractionSelector {
    /// A selector with no OCR engines and the default keyword importance policy.
    pub fn new(
        settings: SelectorSettings,
        cache: Arc<dyn ExtractionCache>,
        direct: Arc<dyn DirectExtractor>,
    ) -> Self {
        Self {
            settings,
            cache,
            direct,
            local: None,
            remote: None,
            importance: Arc::new(KeywordImportance::default()),
            locks: KeyedLocks::new(),
        }
    }

    /// Wires the built-in extractor and the engines enabled in `config`.
    pub fn from_config(config: &Config, cache: Arc<dyn ExtractionCache>) -> anyhow::Result<Self> {
        let settings = SelectorSettings::from_config(config);
        let timeout = settings.engine_timeout;
        let selector = Self::new(settings, cache, Arc::new(BuiltinExtractor))
            .with_importance(Arc::new(config.importance.clone()));
        let selector = match engines::create_local_engine(&config.engines.local, timeout)? {
            Some(engine) => selector.with_local(engine),
            None => selector,
        };
        let selector = match engines::create_remote_engine(&config.engines.remote, timeout)? {
            Some(engine) => selector.with_remote(engine),
            None => selector,
        };
        Ok(selector)
    }

    pub fn with_local(mut self, engine: Arc<dyn LocalOcrEngine>) -> Self {
        self.local = Some(engine);
        self
    }

    pub fn with_remote(mut self, engine: Arc<dyn RemoteVisionEngine>) -> Self {
        self.remote = Some(engine);
        self
    }

    pub fn with_importance(mut self, policy: Arc<dyn ImportancePolicy>) -> Self {
        self.importance = policy;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ExtractionCache> {
        &self.cache
    }

    /// Extracts text from `bytes`. Never fails: engine and cache errors are
    /// logged and folded into the result.
    pub async fn extract(&self, bytes: &[u8], meta: &FileMeta) -> ExtractionResult {
        let started = Instant::now();
        let fp = fingerprint(bytes);
        let _guard = self.locks.lock(fp.clone()).await;

        let mut lookup_failed = false;
        match self.cache.get(&fp).await {
            Ok(Some(entry)) => {
                debug!(fingerprint = %fp, method = %entry.method, "cache hit");
                return cached_result(entry);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(fingerprint = %fp, error = %e, "cache lookup failed, treating as miss");
                lookup_failed = true;
            }
        }

        let mut result = self.extract_uncached(bytes, meta).await;
        result.processing_time_ms = started.elapsed().as_millis() as u64;

        if lookup_failed {
            debug!(fingerprint = %fp, "cache unavailable, not caching this extraction");
        } else {
            match self.cache.set(&fp, &result).await {
                Ok(true) => debug!(fingerprint = %fp, method = %result.method, "cached extraction"),
                Ok(false) => {}
                Err(e) => warn!(fingerprint = %fp, error = %e, "cache write failed"),
            }
        }

        info!(
            file = %meta.file_name,
            fingerprint = %fp,
            method = %result.method,
            score = result.quality_score,
            needs_review = result.needs_review,
            ms = result.processing_time_ms,
            "extracted"
        );
        result
    }

    async fn extract_uncached(&self, bytes: &[u8], meta: &FileMeta) -> ExtractionResult {
        let (direct_text, page_count, direct_error) =
            match self.direct.extract(bytes, &meta.content_type) {
                Ok(d) => (d.text, d.page_count, None),
                Err(e) => {
                    warn!(file = %meta.file_name, error = %e, "direct extraction failed");
                    (String::new(), 0, Some(e.to_string()))
                }
            };

        // Text and office formats never go to OCR.
        if !is_ocr_candidate(&meta.content_type) {
            let (method, confidence) = match direct_error {
                Some(_) => (ExtractionMethod::DirectFallback, 0.0),
                None => (ExtractionMethod::Direct, self.settings.direct_confidence),
            };
            return self.finish(direct_text, method, confidence, page_count, None, direct_error);
        }

        let Some(reason) = self.settings.trigger.check(&direct_text, page_count) else {
            return self.finish(
                direct_text,
                ExtractionMethod::Direct,
                self.settings.direct_confidence,
                page_count,
                None,
                None,
            );
        };
        debug!(file = %meta.file_name, reason = %reason, "OCR needed");

        let fallback_confidence = if direct_error.is_some() {
            0.0
        } else {
            self.settings.fallback_confidence
        };

        let plan = self.engine_plan(bytes, meta, page_count);
        if plan.is_empty() {
            debug!(file = %meta.file_name, "no OCR engine enabled, keeping direct text");
            return self.finish(
                direct_text,
                ExtractionMethod::DirectFallback,
                fallback_confidence,
                page_count,
                Some(reason),
                direct_error,
            );
        }

        let mut last_error = None;
        for engine in plan {
            match self.run_engine(engine, bytes, meta).await {
                Ok(r) => {
                    return self.finish(r.text, r.method, r.confidence, page_count, Some(reason), None)
                }
                Err(e) => {
                    warn!(file = %meta.file_name, engine = engine.name(), error = %e, "OCR engine failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        warn!(file = %meta.file_name, "every OCR engine failed, falling back to direct text");
        self.finish(
            direct_text,
            ExtractionMethod::DirectFallback,
            fallback_confidence,
            page_count,
            Some(reason),
            last_error,
        )
    }

    /// Engines to try in order, each at most once: remote vision for
    /// important documents, then local OCR.
    fn engine_plan(&self, bytes: &[u8], meta: &FileMeta, page_count: u32) -> Vec<Engine<'_>> {
        let mut plan = Vec::with_capacity(2);
        if let Some(remote) = &self.remote {
            let doc = DocumentInfo {
                file_name: &meta.file_name,
                size_bytes: bytes.len() as u64,
                page_count,
            };
            if self.importance.is_important(&doc) {
                plan.push(Engine::Remote(remote.as_ref()));
            }
        }
        if let Some(local) = &self.local {
            plan.push(Engine::Local(local.as_ref()));
        }
        plan
    }

    async fn run_engine(
        &self,
        engine: Engine<'_>,
        bytes: &[u8],
        meta: &FileMeta,
    ) -> Result<Recognized, EngineError> {
        let s = &self.settings;
        match engine {
            Engine::Remote(remote) => {
                let pages = extract::page_images(bytes, &meta.content_type, s.remote_max_pages)?;
                if pages.is_empty() {
                    return Err(EngineError::Unavailable(
                        "no page images to send to the vision engine".to_string(),
                    ));
                }
                let out = self
                    .bounded(remote.recognize(&pages, &s.remote_prompt))
                    .await?;
                debug!(file = %meta.file_name, pages = pages.len(), tokens = out.tokens_used, "vision call");
                Ok(Recognized {
                    text: out.text,
                    method: ExtractionMethod::RemoteVision,
                    confidence: s.remote_confidence,
                })
            }
            Engine::Local(local) => {
                let out = self
                    .bounded(local.recognize(bytes, &meta.content_type, s.local_dpi, s.local_max_pages))
                    .await?;
                Ok(Recognized {
                    confidence: mean_confidence(&out.region_confidences, s.local_min_region_confidence),
                    text: out.text,
                    method: ExtractionMethod::LocalOcr,
                })
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let limit = self.settings.engine_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(EngineError::Timeout {
                secs: limit.as_secs(),
            }))
    }

    fn finish(
        &self,
        text: String,
        method: ExtractionMethod,
        engine_confidence: f64,
        page_count: u32,
        ocr_reason: Option<String>,
        error: Option<String>,
    ) -> ExtractionResult {
        let text = truncate_chars(text, self.settings.max_text_chars);
        let Quality {
            score,
            needs_review,
        } = quality::score(&text, engine_confidence);
        ExtractionResult {
            char_count: text_stats::char_count(&text),
            text,
            method,
            engine_confidence,
            quality_score: score,
            needs_review,
            page_count,
            processing_time_ms: 0,
            ocr_reason,
            error,
        }
    }
}

/// PDFs and raster images may carry text only an OCR engine can read.
fn is_ocr_candidate(content_type: &str) -> bool {
    content_type == extract::MIME_PDF || extract::is_image(content_type)
}

fn cached_result(entry: CacheEntry) -> ExtractionResult {
    let quality = Quality::from_score(entry.quality_score);
    ExtractionResult {
        char_count: text_stats::char_count(&entry.text),
        text: entry.text,
        method: entry.method.cached(),
        engine_confidence: entry.engine_confidence,
        quality_score: quality.score,
        needs_review: quality.needs_review,
        page_count: entry.page_count,
        processing_time_ms: 0,
        ocr_reason: None,
        error: None,
    }
}

/// Mean of the region confidences at or above `min`; 0.0 when none qualify.
fn mean_confidence(regions: &[f64], min: f64) -> f64 {
    let kept: Vec<f64> = regions.iter().copied().filter(|c| *c >= min).collect();
    if kept.is_empty() {
        return 0.0;
    }
    kept.iter().sum::<f64>() / kept.len() as f64
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if max_chars == 0 {
        return text;
    }
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}
