//! Local OCR over HTTP.
//!
//! Talks to an OCR sidecar (RapidOCR, PaddleOCR behind a small web wrapper)
//! that renders the document and returns recognised regions:
//!
//! ```text
//! POST {url}
//! {"content_type": "...", "data": "<base64>", "dpi": 200, "max_pages": 10}
//!
//! 200 OK
//! {"regions": [{"text": "...", "confidence": 0.93}, ...]}
//! ```
//!
//! Regions below `min_region_confidence` are dropped before the text is joined.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;

use super::{EngineError, LocalOcrEngine, LocalOcrOutput};

pub struct HttpOcrEngine {
    client: reqwest::Client,
    url: String,
    min_region_confidence: f64,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    regions: Vec<OcrRegion>,
}

#[derive(Debug, Deserialize)]
struct OcrRegion {
    text: String,
    confidence: f64,
}

impl HttpOcrEngine {
    pub fn new(url: &str, min_region_confidence: f64, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            min_region_confidence,
        })
    }
}

fn collect_regions(regions: Vec<OcrRegion>, min_confidence: f64) -> LocalOcrOutput {
    let mut lines = Vec::new();
    let mut confidences = Vec::new();
    for region in regions {
        if region.confidence >= min_confidence && !region.text.trim().is_empty() {
            lines.push(region.text);
            confidences.push(region.confidence.clamp(0.0, 1.0));
        }
    }
    LocalOcrOutput {
        text: lines.join("\n"),
        region_confidences: confidences,
    }
}

#[async_trait]
impl LocalOcrEngine for HttpOcrEngine {
    async fn recognize(
        &self,
        document: &[u8],
        content_type: &str,
        dpi: u32,
        max_pages: u32,
    ) -> Result<LocalOcrOutput, EngineError> {
        let body = serde_json::json!({
            "content_type": content_type,
            "data": BASE64.encode(document),
            "dpi": dpi,
            "max_pages": max_pages,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Request(format!(
                "OCR service error {}: {}",
                status, body_text
            )));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        Ok(collect_regions(parsed.regions, self.min_region_confidence))
    }
}
