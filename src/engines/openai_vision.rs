//! Remote vision engine over an OpenAI-compatible chat completions API.
//!
//! Page images are sent inline as base64 data URIs in one user message,
//! after the transcription prompt. The reply text is the extraction; the
//! reported `usage.total_tokens` is passed through for cost tracking.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::{EngineError, RemoteVisionEngine, VisionOutput};
use crate::extract::PageImage;

pub struct OpenAiVisionEngine {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key_env: String,
}

impl OpenAiVisionEngine {
    pub fn new(
        url: &str,
        model: &str,
        api_key_env: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
        })
    }

    fn request_body(&self, pages: &[PageImage], prompt: &str) -> serde_json::Value {
        let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
        for page in pages {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", page.content_type, BASE64.encode(&page.bytes)),
                },
            }));
        }
        serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<VisionOutput, EngineError> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| EngineError::InvalidResponse("missing choices[0].message.content".into()))?;
    let tokens_used = json
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0);
    Ok(VisionOutput {
        text: text.to_string(),
        tokens_used,
    })
}

#[async_trait]
impl RemoteVisionEngine for OpenAiVisionEngine {
    async fn recognize(
        &self,
        pages: &[PageImage],
        prompt: &str,
    ) -> Result<VisionOutput, EngineError> {
        if pages.is_empty() {
            return Err(EngineError::Request("no page images to send".into()));
        }
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| EngineError::Unavailable(format!("{} not set", self.api_key_env)))?;

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&self.request_body(pages, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Request(format!(
                "vision API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        parse_chat_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_and_usage() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "INVOICE #42" } }],
            "usage": { "prompt_tokens": 900, "completion_tokens": 12, "total_tokens": 912 }
        });
        let out = parse_chat_response(&json).unwrap();
        assert_eq!(out.text, "INVOICE #42");
        assert_eq!(out.tokens_used, 912);
    }

    #[test]
    fn missing_content_is_invalid() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_chat_response(&json),
            Err(EngineError::InvalidResponse(_))
        ));
    }

    #[test]
    fn body_inlines_pages_as_data_uris() {
        let engine = OpenAiVisionEngine::new(
            "http://localhost/v1/chat/completions",
            "gpt-4o-mini",
            "OPENAI_API_KEY",
            Duration::from_secs(5),
        )
        .unwrap();
        let pages = vec![PageImage {
            content_type: "image/png".into(),
            bytes: b"abc".to_vec(),
        }];
        let body = engine.request_body(&pages, "transcribe");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], "transcribe");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,YWJj");
        assert_eq!(body["model"], "gpt-4o-mini");
    }
}
