//! Trait definitions for external collaborators
//!
//! These traits define the boundaries between the extraction pipeline and
//! infrastructure. Implementations live in other crates.

use crate::{DocumentRef, ExtractionMode, SourceText, UsageMetrics};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// One structured-generation call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Full prompt text
    pub prompt: String,

    /// JSON schema constraining the output object
    pub schema: Value,

    /// Field ids the output is keyed by, in prompt order
    pub field_ids: Vec<String>,
}

/// Result of a structured-generation call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Parsed output object, keyed by field id
    pub output: Value,

    /// Tokens consumed by this call
    pub usage: UsageMetrics,
}

/// Receiver of raw text deltas during a streaming invocation
///
/// Deltas drive "still typing" feedback only; they never influence merging.
pub trait DeltaSink: Send + Sync {
    /// Called for each text fragment; `field_id` is the field whose value is
    /// currently being written, when it can be determined
    fn on_delta(&self, field_id: Option<&str>, delta: &str);
}

/// Sink that discards every delta
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardDeltas;

impl DeltaSink for DiscardDeltas {
    fn on_delta(&self, _field_id: Option<&str>, _delta: &str) {}
}

/// Trait for language-model structured generation
///
/// Implemented by the infrastructure layer (sift-llm)
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Error type for invocation failures
    type Error: fmt::Display + Send;

    /// Run one structured-generation call
    ///
    /// Dropping the returned future must abandon the call; cancellation
    /// relies on it.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, Self::Error>;

    /// Run one call while reporting raw text deltas
    ///
    /// Providers without streaming support fall back to [`ModelInvoker::invoke`].
    async fn invoke_streaming(
        &self,
        request: &ModelRequest,
        sink: &dyn DeltaSink,
    ) -> Result<ModelResponse, Self::Error> {
        let _ = sink;
        self.invoke(request).await
    }
}

/// Trait for resolving a document's text
///
/// Implemented outside the pipeline (PDF parsing, repository lookups,
/// scraping); the pipeline only sees `(fullText, sections)`.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Error type for fetch failures
    type Error: fmt::Display + Send;

    /// Resolve text for a document in the given mode
    async fn fetch(
        &self,
        document: &DocumentRef,
        mode: ExtractionMode,
    ) -> Result<SourceText, Self::Error>;

    /// Best-effort abstract lookup used when the primary source has none
    async fn scrape_abstract(&self, document: &DocumentRef) -> Result<Option<String>, Self::Error> {
        let _ = document;
        Ok(None)
    }
}
