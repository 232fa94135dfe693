//! Sift Model Invoker Layer
//!
//! Pluggable implementations of the `ModelInvoker` trait from `sift-domain`.
//!
//! # Invokers
//!
//! - `MockInvoker`: Scripted invoker for testing
//! - `OllamaInvoker`: Structured generation against a local Ollama API
//!
//! # Examples
//!
//! ```
//! use sift_llm::MockInvoker;
//! use sift_domain::{ModelInvoker, ModelRequest};
//! use serde_json::json;
//!
//! # async fn example() {
//! let invoker = MockInvoker::new(json!({"n": {"value": 12, "confidence": 0.9, "citations": []}}));
//! let request = ModelRequest {
//!     prompt: "extract".to_string(),
//!     schema: json!({}),
//!     field_ids: vec!["n".to_string()],
//! };
//! let response = invoker.invoke(&request).await.unwrap();
//! assert_eq!(response.output["n"]["value"], 12);
//! # }
//! ```

#![warn(missing_docs)]

pub mod ollama;

use async_trait::async_trait;
use serde_json::Value;
use sift_domain::{DeltaSink, ModelInvoker, ModelRequest, ModelResponse, UsageMetrics};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaInvoker;

/// Errors that can occur during model invocation
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from the model
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

/// Approximate token count (4 chars ~ 1 token)
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[derive(Debug, Clone)]
enum MockReply {
    Output(Value),
    Error(String),
}

/// Scripted model invoker for deterministic testing
///
/// Queued replies are consumed in order; once the queue is empty every call
/// gets the default response. All state is shared between clones.
///
/// # Examples
///
/// ```
/// use sift_llm::MockInvoker;
/// use serde_json::json;
///
/// let invoker = MockInvoker::new(json!({}));
/// invoker.push_response(json!({"a": {"value": "x", "confidence": 0.5, "citations": []}}));
/// invoker.push_error("model overloaded");
/// assert_eq!(invoker.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockInvoker {
    default_response: Value,
    queue: Arc<Mutex<VecDeque<MockReply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    call_count: Arc<Mutex<usize>>,
    delay: Option<Duration>,
    usage: Option<UsageMetrics>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockInvoker {
    /// Create a MockInvoker with a fixed output for all prompts
    pub fn new(default_response: Value) -> Self {
        Self {
            default_response,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            delay: None,
            usage: None,
        }
    }

    /// Queue an output for the next unanswered call
    pub fn push_response(&self, output: Value) {
        lock(&self.queue).push_back(MockReply::Output(output));
    }

    /// Queue a failure for the next unanswered call
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.queue).push_back(MockReply::Error(message.into()));
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report fixed usage instead of estimating it from text length
    pub fn with_usage(mut self, usage: UsageMetrics) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        *lock(&self.call_count) = 0;
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        *lock(&self.call_count) += 1;
        lock(&self.prompts).push(request.prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| MockReply::Output(self.default_response.clone()));

        match reply {
            MockReply::Output(output) => {
                let usage = self.usage.unwrap_or_else(|| {
                    UsageMetrics::new(
                        estimate_tokens(&request.prompt),
                        estimate_tokens(&output.to_string()),
                    )
                });
                Ok(ModelResponse { output, usage })
            }
            MockReply::Error(message) => Err(LlmError::Other(message)),
        }
    }
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new(Value::Object(Default::default()))
    }
}

#[async_trait]
impl ModelInvoker for MockInvoker {
    type Error = LlmError;

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, Self::Error> {
        self.respond(request).await
    }

    async fn invoke_streaming(
        &self,
        request: &ModelRequest,
        sink: &dyn DeltaSink,
    ) -> Result<ModelResponse, Self::Error> {
        let response = self.respond(request).await?;
        for field_id in &request.field_ids {
            if let Some(envelope) = response.output.get(field_id) {
                sink.on_delta(Some(field_id), &envelope.to_string());
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(prompt: &str) -> ModelRequest {
        ModelRequest {
            prompt: prompt.to_string(),
            schema: json!({}),
            field_ids: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[tokio::test]
    async fn test_default_response() {
        let invoker = MockInvoker::new(json!({"a": 1}));
        let response = invoker.invoke(&request("p")).await.unwrap();
        assert_eq!(response.output, json!({"a": 1}));
        assert!(response.usage.prompt_tokens > 0);
    }

    #[tokio::test]
    async fn test_queue_is_consumed_in_order() {
        let invoker = MockInvoker::default();
        invoker.push_response(json!({"a": 1}));
        invoker.push_error("boom");

        assert_eq!(invoker.invoke(&request("1")).await.unwrap().output, json!({"a": 1}));
        let err = invoker.invoke(&request("2")).await.unwrap_err();
        assert!(matches!(err, LlmError::Other(ref m) if m == "boom"));
        assert_eq!(invoker.invoke(&request("3")).await.unwrap().output, json!({}));
    }

    #[tokio::test]
    async fn test_call_count_and_prompts_are_shared() {
        let invoker = MockInvoker::default();
        let clone = invoker.clone();

        invoker.invoke(&request("first")).await.unwrap();
        clone.invoke(&request("second")).await.unwrap();

        assert_eq!(invoker.call_count(), 2);
        assert_eq!(clone.prompts(), vec!["first", "second"]);

        invoker.reset_call_count();
        assert_eq!(clone.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fixed_usage() {
        let invoker = MockInvoker::default().with_usage(UsageMetrics::new(10, 5));
        let response = invoker.invoke(&request("p")).await.unwrap();
        assert_eq!(response.usage, UsageMetrics::new(10, 5));
    }

    #[tokio::test]
    async fn test_streaming_reports_deltas_per_field() {
        struct Collect(Mutex<Vec<String>>);
        impl DeltaSink for Collect {
            fn on_delta(&self, field_id: Option<&str>, _delta: &str) {
                self.0.lock().unwrap().push(field_id.unwrap_or("?").to_string());
            }
        }

        let invoker = MockInvoker::new(json!({
            "a": {"value": "x", "confidence": 0.5, "citations": []},
            "b": {"value": "y", "confidence": 0.5, "citations": []}
        }));
        let sink = Collect(Mutex::new(Vec::new()));
        invoker.invoke_streaming(&request("p"), &sink).await.unwrap();
        assert_eq!(*sink.0.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
