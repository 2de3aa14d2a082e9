//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` has defaults, so a minimal file is:
//!
//! ```toml
//! [db]
//! path = "./data/janitor.sqlite"
//! ```

use anyhow::{Context, Result};
use janitor_core::importance::KeywordImportance;
use janitor_core::ocr_trigger::OcrTrigger;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub importance: KeywordImportance,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Final text is truncated to this many characters; 0 disables truncation.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_chars_per_page")]
    pub ocr_trigger_chars_per_page: f64,
    #[serde(default = "default_whitespace_ratio")]
    pub ocr_trigger_whitespace_ratio: f64,
    #[serde(default = "default_garbage_ratio")]
    pub ocr_trigger_garbage_ratio: f64,
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
    #[serde(default = "default_direct_confidence")]
    pub direct_confidence: f64,
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            ocr_trigger_chars_per_page: default_chars_per_page(),
            ocr_trigger_whitespace_ratio: default_whitespace_ratio(),
            ocr_trigger_garbage_ratio: default_garbage_ratio(),
            engine_timeout_secs: default_engine_timeout_secs(),
            direct_confidence: default_direct_confidence(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

impl ExtractionConfig {
    pub fn ocr_trigger(&self) -> OcrTrigger {
        OcrTrigger {
            min_chars_per_page: self.ocr_trigger_chars_per_page,
            max_whitespace_ratio: self.ocr_trigger_whitespace_ratio,
            max_garbage_ratio: self.ocr_trigger_garbage_ratio,
        }
    }
}

fn default_max_text_chars() -> usize {
    1000
}
fn default_chars_per_page() -> f64 {
    100.0
}
fn default_whitespace_ratio() -> f64 {
    0.9
}
fn default_garbage_ratio() -> f64 {
    0.3
}
fn default_engine_timeout_secs() -> u64 {
    60
}
fn default_direct_confidence() -> f64 {
    0.95
}
fn default_fallback_confidence() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnginesConfig {
    #[serde(default)]
    pub local: LocalEngineConfig,
    #[serde(default)]
    pub remote: RemoteEngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalEngineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_local_url")]
    pub url: String,
    #[serde(default = "default_local_dpi")]
    pub dpi: u32,
    #[serde(default = "default_local_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_min_region_confidence")]
    pub min_region_confidence: f64,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_local_url(),
            dpi: default_local_dpi(),
            max_pages: default_local_max_pages(),
            min_region_confidence: default_min_region_confidence(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_local_url() -> String {
    "http://127.0.0.1:9003/ocr".to_string()
}
fn default_local_dpi() -> u32 {
    200
}
fn default_local_max_pages() -> u32 {
    10
}
fn default_min_region_confidence() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteEngineConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_remote_url")]
    pub url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_remote_max_pages")]
    pub max_pages: u32,
    /// Confidence assigned to vision output (the model reports none).
    #[serde(default = "default_remote_confidence")]
    pub confidence: f64,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for RemoteEngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_remote_url(),
            model: None,
            api_key_env: default_api_key_env(),
            max_pages: default_remote_max_pages(),
            confidence: default_remote_confidence(),
            prompt: default_prompt(),
        }
    }
}

fn default_remote_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_remote_max_pages() -> u32 {
    3
}
fn default_remote_confidence() -> f64 {
    0.95
}
fn default_prompt() -> String {
    "Transcribe all text in these scanned document pages. Output plain text only, \
     preserving reading order. Do not summarize or add commentary."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LearningConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_min_confidence() -> f64 {
    janitor_core::preference::DEFAULT_QUERY_CONFIDENCE
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_true")]
    pub ignore_hidden: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            ignore_hidden: true,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_include_globs() -> Vec<String> {
    [
        "**/*.pdf", "**/*.png", "**/*.jpg", "**/*.jpeg", "**/*.webp", "**/*.tif", "**/*.tiff",
        "**/*.txt", "**/*.md", "**/*.docx", "**/*.pptx", "**/*.xlsx",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Defaults with the database under `./data`, for commands run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/janitor.sqlite"),
            },
            extraction: ExtractionConfig::default(),
            engines: EnginesConfig::default(),
            importance: KeywordImportance::default(),
            learning: LearningConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let ex = &config.extraction;
    for (name, v) in [
        ("extraction.ocr_trigger_whitespace_ratio", ex.ocr_trigger_whitespace_ratio),
        ("extraction.ocr_trigger_garbage_ratio", ex.ocr_trigger_garbage_ratio),
        ("extraction.direct_confidence", ex.direct_confidence),
        ("extraction.fallback_confidence", ex.fallback_confidence),
        ("engines.local.min_region_confidence", config.engines.local.min_region_confidence),
        ("engines.remote.confidence", config.engines.remote.confidence),
    ] {
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if ex.engine_timeout_secs == 0 {
        anyhow::bail!("extraction.engine_timeout_secs must be > 0");
    }

    if config.engines.local.enabled && config.engines.local.max_pages == 0 {
        anyhow::bail!("engines.local.max_pages must be > 0 when the local engine is enabled");
    }
    let remote = &config.engines.remote;
    if remote.enabled {
        if remote.max_pages == 0 {
            anyhow::bail!("engines.remote.max_pages must be > 0 when the remote engine is enabled");
        }
        if remote.model.is_none() {
            anyhow::bail!("engines.remote.model must be specified when the remote engine is enabled");
        }
    }

    if config.importance.min_size_kb > config.importance.max_size_kb {
        anyhow::bail!("importance.min_size_kb must be <= importance.max_size_kb");
    }

    if !(0.1..=1.0).contains(&config.learning.min_confidence) {
        anyhow::bail!("learning.min_confidence must be in [0.1, 1.0]");
    }

    if config.batch.workers == 0 {
        anyhow::bail!("batch.workers must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = parse("[db]\npath = \"/tmp/j.sqlite\"\n").unwrap();
        assert_eq!(cfg.extraction.max_text_chars, 1000);
        assert!(cfg.engines.local.enabled);
        assert!(!cfg.engines.remote.enabled);
        assert_eq!(cfg.importance.max_pages, 5);
        assert_eq!(cfg.learning.min_confidence, 0.7);
        assert_eq!(cfg.batch.workers, 4);
    }

    #[test]
    fn remote_engine_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[engines.remote]\nenabled = true\n").unwrap_err();
        assert!(err.to_string().contains("engines.remote.model"));
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[batch]\nworkers = 0\n").is_err());
    }

    #[test]
    fn ratios_out_of_range_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[extraction]\nocr_trigger_garbage_ratio = 1.5\n").is_err());
    }

    #[test]
    fn inverted_size_bounds_rejected() {
        let err = parse("[db]\npath = \"x\"\n[importance]\nmin_size_kb = 500\nmax_size_kb = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("min_size_kb"));
    }
}
