//! Ollama Invoker Implementation
//!
//! Structured generation against Ollama's `/api/generate` endpoint. The JSON
//! schema is passed as the `format` constraint, so the model can only emit an
//! object of the expected shape.
//!
//! # Features
//!
//! - Async HTTP communication with the Ollama API
//! - Retry with exponential backoff for the non-streaming call
//! - Streaming call that reports deltas keyed to the field being written
//!
//! # Examples
//!
//! ```no_run
//! use sift_llm::OllamaInvoker;
//!
//! let invoker = OllamaInvoker::new("http://localhost:11434", "llama3.1");
//! ```

use crate::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_domain::{DeltaSink, ModelInvoker, ModelRequest, ModelResponse, UsageMetrics};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default timeout for a single HTTP request (120 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of HTTP attempts per invocation
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ollama API invoker
pub struct OllamaInvoker {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
}

/// Request body for the Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a Value,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response (or one streamed line) from the Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl OllamaGenerateResponse {
    fn usage(&self) -> UsageMetrics {
        UsageMetrics::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

impl OllamaInvoker {
    /// Create a new Ollama invoker
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "llama3.1", "qwen2.5")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create an invoker against the default local endpoint
    pub fn default_endpoint(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the maximum number of HTTP attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.endpoint)
    }

    fn body<'a>(&'a self, request: &'a ModelRequest, stream: bool) -> OllamaGenerateRequest<'a> {
        OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream,
            format: &request.schema,
            options: OllamaOptions { temperature: 0.0 },
        }
    }

    async fn send(&self, body: &OllamaGenerateRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.url())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Communication(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotAvailable(self.model.clone()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitExceeded);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(LlmError::Communication(format!("HTTP {}: {}", status, error_text)))
    }

    async fn generate_once(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let response = self.send(&self.body(request, false)).await?;
        let generated: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let output = parse_output(&generated.response)?;
        Ok(ModelResponse {
            output,
            usage: generated.usage(),
        })
    }
}

/// Parse generated text as the output object
///
/// The prompt demands bare JSON, so no code-fence stripping is attempted.
fn parse_output(text: &str) -> Result<Value, LlmError> {
    serde_json::from_str(text.trim())
        .map_err(|e| LlmError::InvalidResponse(format!("Output is not valid JSON: {}", e)))
}

/// Field whose key appears last in the text generated so far
fn current_field<'a>(generated: &str, field_ids: &'a [String]) -> Option<&'a str> {
    field_ids
        .iter()
        .filter_map(|id| {
            generated
                .rfind(&format!("\"{}\"", id))
                .map(|pos| (pos, id.as_str()))
        })
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, id)| id)
}

#[async_trait]
impl ModelInvoker for OllamaInvoker {
    type Error = LlmError;

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, Self::Error> {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self.generate_once(request).await {
                Ok(response) => return Ok(response),
                // Retrying cannot fix a missing model or a malformed output
                Err(e @ LlmError::ModelNotAvailable(_)) | Err(e @ LlmError::InvalidResponse(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!("Ollama attempt {}/{} failed: {}", attempts + 1, self.max_retries, e);
                    last_error = Some(e);
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                // Exponential backoff: 1s, 2s, 4s, etc.
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LlmError::Communication("Max retries exceeded".to_string())
        }))
    }

    async fn invoke_streaming(
        &self,
        request: &ModelRequest,
        sink: &dyn DeltaSink,
    ) -> Result<ModelResponse, Self::Error> {
        let mut response = self.send(&self.body(request, true)).await?;

        let mut pending: Vec<u8> = Vec::new();
        let mut generated = String::new();
        let mut usage = UsageMetrics::default();

        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| LlmError::Communication(format!("Stream interrupted: {}", e)))?
        {
            pending.extend_from_slice(&bytes);

            // Lines are split on bytes so multi-byte characters never straddle a chunk
            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let part: OllamaGenerateResponse = serde_json::from_slice(&line).map_err(|e| {
                    LlmError::InvalidResponse(format!("Malformed stream line: {}", e))
                })?;

                if !part.response.is_empty() {
                    generated.push_str(&part.response);
                    sink.on_delta(current_field(&generated, &request.field_ids), &part.response);
                }
                if part.done {
                    usage = part.usage();
                }
            }
        }

        debug!("Streamed {} chars from {}", generated.len(), self.model);

        Ok(ModelResponse {
            output: parse_output(&generated)?,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_invoker_creation() {
        let invoker = OllamaInvoker::new("http://localhost:11434/", "llama3.1");
        assert_eq!(invoker.endpoint, "http://localhost:11434");
        assert_eq!(invoker.model(), "llama3.1");
        assert_eq!(invoker.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(invoker.url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_with_max_retries_is_at_least_one() {
        let invoker = OllamaInvoker::default_endpoint("m").with_max_retries(0);
        assert_eq!(invoker.max_retries, 1);
    }

    #[test]
    fn test_request_body_carries_schema_as_format() {
        let invoker = OllamaInvoker::default_endpoint("m");
        let request = ModelRequest {
            prompt: "p".to_string(),
            schema: json!({"type": "object"}),
            field_ids: vec![],
        };
        let body = serde_json::to_value(invoker.body(&request, false)).unwrap();
        assert_eq!(body["format"], json!({"type": "object"}));
        assert_eq!(body["stream"], json!(false));
    }

    #[test]
    fn test_parse_output_rejects_code_fences() {
        assert!(parse_output("{\"a\": 1}").is_ok());
        assert!(parse_output("```json\n{\"a\": 1}\n```").is_err());
    }

    #[test]
    fn test_current_field_tracks_latest_key() {
        let ids = vec!["design".to_string(), "sample_size".to_string()];
        assert_eq!(current_field("{", &ids), None);
        assert_eq!(current_field("{\"design\": {\"value\": [", &ids), Some("design"));
        assert_eq!(
            current_field("{\"design\": {}, \"sample_size\": {\"va", &ids),
            Some("sample_size")
        );
    }

    #[test]
    fn test_usage_from_counts() {
        let response: OllamaGenerateResponse = serde_json::from_str(
            r#"{"response": "{}", "done": true, "prompt_eval_count": 30, "eval_count": 12}"#,
        )
        .unwrap();
        assert_eq!(response.usage(), UsageMetrics::new(30, 12));
    }

    #[tokio::test]
    async fn test_ollama_error_handling() {
        // Use invalid endpoint to trigger error
        let invoker = OllamaInvoker::new("http://localhost:99999", "llama3.1").with_max_retries(1);
        let request = ModelRequest {
            prompt: "p".to_string(),
            schema: json!({}),
            field_ids: vec![],
        };

        let result = invoker.invoke(&request).await;
        assert!(matches!(result, Err(LlmError::Communication(_))));
    }
}
