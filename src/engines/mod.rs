//! External extraction engines.
//!
//! The selector only sees these traits:
//! - [`DirectExtractor`]: the cheap baseline text layer, see [`crate::extract`].
//! - [`LocalOcrEngine`]: an OCR service on the local network, billed by nothing but time.
//! - [`RemoteVisionEngine`]: a vision-capable chat model, billed per call.
//!
//! Concrete engines are built from config with [`create_local_engine`] and
//! [`create_remote_engine`]; a disabled engine is `None`. No engine retries:
//! one attempt per document, and every failure is an [`EngineError`] the
//! selector folds into a fallback result.

mod local_http;
mod openai_vision;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{LocalEngineConfig, RemoteEngineConfig};
use crate::extract::{self, DirectText, ExtractError, PageImage};

pub use local_http::HttpOcrEngine;
pub use openai_vision::OpenAiVisionEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("engine request failed: {0}")]
    Request(String),
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            EngineError::Unavailable(e.to_string())
        } else {
            EngineError::Request(e.to_string())
        }
    }
}

impl From<ExtractError> for EngineError {
    fn from(e: ExtractError) -> Self {
        EngineError::Request(e.to_string())
    }
}

pub trait DirectExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<DirectText, ExtractError>;
}

/// [`DirectExtractor`] over the built-in PDF/OOXML/text readers.
pub struct BuiltinExtractor;

impl DirectExtractor for BuiltinExtractor {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<DirectText, ExtractError> {
        extract::extract_text(bytes, content_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalOcrOutput {
    pub text: String,
    /// One entry per recognised text region, in `[0, 1]`.
    pub region_confidences: Vec<f64>,
}

#[async_trait]
pub trait LocalOcrEngine: Send + Sync {
    /// Recognises up to `max_pages` pages of the document, rendered at `dpi`.
    async fn recognize(
        &self,
        document: &[u8],
        content_type: &str,
        dpi: u32,
        max_pages: u32,
    ) -> Result<LocalOcrOutput, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionOutput {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait RemoteVisionEngine: Send + Sync {
    async fn recognize(&self, pages: &[PageImage], prompt: &str)
        -> Result<VisionOutput, EngineError>;
}

/// Builds the local OCR client, or `None` when `[engines.local]` is disabled.
pub fn create_local_engine(
    config: &LocalEngineConfig,
    timeout: Duration,
) -> anyhow::Result<Option<Arc<dyn LocalOcrEngine>>> {
    if !config.enabled {
        return Ok(None);
    }
    let engine = HttpOcrEngine::new(&config.url, config.min_region_confidence, timeout)?;
    Ok(Some(Arc::new(engine)))
}

/// Builds the vision client, or `None` when `[engines.remote]` is disabled.
///
/// The API key is read from the environment at call time, so a missing key
/// surfaces as [`EngineError::Unavailable`] on the first document rather
/// than as a startup failure.
pub fn create_remote_engine(
    config: &RemoteEngineConfig,
    timeout: Duration,
) -> anyhow::Result<Option<Arc<dyn RemoteVisionEngine>>> {
    if !config.enabled {
        return Ok(None);
    }
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("engines.remote.model required for the remote engine"))?;
    let engine = OpenAiVisionEngine::new(&config.url, &model, &config.api_key_env, timeout)?;
    Ok(Some(Arc::new(engine)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_engines_are_none() {
        let local = LocalEngineConfig {
            enabled: false,
            ..LocalEngineConfig::default()
        };
        assert!(create_local_engine(&local, Duration::from_secs(5))
            .unwrap()
            .is_none());
        assert!(create_remote_engine(&RemoteEngineConfig::default(), Duration::from_secs(5))
            .unwrap()
            .is_none());
    }

    #[test]
    fn enabled_remote_requires_model() {
        let remote = RemoteEngineConfig {
            enabled: true,
            model: None,
            ..RemoteEngineConfig::default()
        };
        assert!(create_remote_engine(&remote, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn builtin_extractor_reads_text() {
        let out = BuiltinExtractor
            .extract(b"hello", extract::MIME_TEXT)
            .unwrap();
        assert_eq!(out.text, "hello");
    }
}
