use async_trait::async_trait;
use serde_json::json;

use folio_types::{FolioError, Result};

use crate::{GenerationRequest, GenerationSettings, TextGenerator};

// ---------------------------------------------------------------------------
// ChatCompletionsClient
// ---------------------------------------------------------------------------

/// Client for OpenAI-compatible `/v1/chat/completions` servers such as
/// LM Studio. Each prompt is sent as a single user message, non-streaming.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl ChatCompletionsClient {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FolioError::Connectivity {
                endpoint: settings.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
            })?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout_ms: settings.timeout.as_millis() as u64,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        })
    }

    fn parse_response(&self, body: &str) -> Result<String> {
        let json: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| FolioError::parse("chat completion response", e))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .unwrap_or("");
        if content.is_empty() {
            return Err(FolioError::EmptyResponse {
                endpoint: self.completions_url(),
            });
        }
        Ok(content.to_string())
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> FolioError {
        if e.is_timeout() {
            FolioError::Timeout {
                endpoint: url.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            FolioError::Connectivity {
                endpoint: url.to_string(),
                message: e.to_string(),
                retryable: true,
            }
        }
    }
}

fn map_status(url: &str, status: reqwest::StatusCode, body: &str) -> FolioError {
    let retryable = matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504);
    FolioError::Connectivity {
        endpoint: url.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), extract_error_message(body)),
        retryable,
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match &v["error"] {
            serde_json::Value::String(s) => Some(s.clone()),
            other => other["message"].as_str().map(String::from),
        })
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// TextGenerator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = self.completions_url();
        let body = self.build_request_body(request);

        tracing::debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.len(),
            "Generation request"
        );

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_send_error(&url, e))?;
        if !status.is_success() {
            return Err(map_status(&url, status, &text));
        }

        let content = self.parse_response(&text)?;
        tracing::debug!(chars = content.len(), "Generation response");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }

    async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&url, e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(map_status(&url, status, &text))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
