//! Request, trace and report types for extraction runs

use crate::error::ExtractorError;
use serde::Serialize;
use sift_domain::{
    Accumulator, DocumentRef, ExtractionMode, FieldDescriptor, RunId, SourceText, UsageMetrics,
};
use std::time::Duration;

/// Request to extract a set of fields from one document
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRequest {
    /// Document to extract from
    pub document: DocumentRef,

    /// Requested fields; only extractable ones reach the model
    pub fields: Vec<FieldDescriptor>,

    /// Which text to read
    pub mode: ExtractionMode,
}

impl WorkRequest {
    /// Create a request
    pub fn new(document: DocumentRef, fields: Vec<FieldDescriptor>, mode: ExtractionMode) -> Self {
        Self {
            document,
            fields,
            mode,
        }
    }

    /// Fields that take part in model extraction
    pub fn extractable_fields(&self) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.is_extractable())
            .cloned()
            .collect()
    }
}

/// Which template produced a chunk's prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// First chunk
    Initial,
    /// Later chunks, seeded with the accumulator
    Update,
}

/// Debug record for one processed chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkTrace {
    /// 0-based chunk index
    pub chunk_index: usize,

    /// Character range `[start, end)` of the chunk
    pub range: (usize, usize),

    /// Template used
    pub prompt_kind: PromptKind,

    /// Prompt length in characters
    pub prompt_chars: usize,

    /// Tokens spent on the call
    pub usage: UsageMetrics,

    /// Fields whose accumulated entry changed
    pub fields_updated: Vec<String>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Every chunk merged
    Completed,
    /// Aborted by an error
    Failed(ExtractorError),
    /// Stopped by the caller
    Cancelled,
}

impl RunStatus {
    /// Whether the run completed
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// Outcome of one run, including partial state when it did not complete
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run identity
    pub run_id: RunId,

    /// How the run ended
    pub status: RunStatus,

    /// Accumulator at the end of the run
    pub results: Accumulator,

    /// Tokens spent across processed chunks
    pub usage: UsageMetrics,

    /// Resolved text, if resolution succeeded
    pub source: Option<SourceText>,

    /// Chunks planned for the run
    pub total_chunks: usize,

    /// Chunks merged before the run ended
    pub chunks_processed: usize,

    /// Per-chunk debug trail
    pub trail: Vec<ChunkTrace>,

    /// Wall-clock duration
    pub duration: Duration,
}
