//! Sift Extractor
//!
//! Extracts user-defined fields from a document by walking it chunk by chunk
//! with a language model and folding each chunk's answer into a running
//! per-field result.
//!
//! # Architecture
//!
//! ```text
//! TextSource → chunks → prompt (initial | update) → ModelInvoker
//!            → parse → merge into accumulator → progress event → … → complete
//! ```
//!
//! The first chunk gets the initial prompt; every later chunk gets an update
//! prompt that embeds the accumulator so far, so chunks of one document are
//! processed strictly in order. Different documents run independently under
//! a [`SessionTracker`], each cancellable and retryable on its own.
//!
//! # Example Usage
//!
//! ```no_run
//! use sift_domain::{DocumentRef, ExtractionMode, FieldDescriptor, FieldType};
//! use sift_extractor::{
//!     CancelToken, ExtractorConfig, NullSink, Orchestrator, StaticTextSource, WorkRequest,
//! };
//! use sift_llm::MockInvoker;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let invoker = MockInvoker::new(json!({
//!     "design": {"value": "RCT", "confidence": 0.9, "citations": []}
//! }));
//! let source = StaticTextSource::new();
//! let orchestrator = Orchestrator::new(invoker, source, ExtractorConfig::default())?;
//!
//! let request = WorkRequest::new(
//!     DocumentRef::new("W1").with_abstract("A randomised controlled trial of ..."),
//!     vec![FieldDescriptor::new("design", "Study design", FieldType::Text)],
//!     ExtractionMode::Abstract,
//! );
//!
//! let report = orchestrator
//!     .process_work(&request, None, &NullSink, &CancelToken::new())
//!     .await;
//! println!("design = {}", report.results["design"].value);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod cancel;
mod chunking;
mod config;
mod error;
mod events;
mod merge;
mod orchestrator;
mod parser;
mod prompt;
mod schema;
mod session;
mod source;
mod stream;
mod types;


pub use cancel::CancelToken;
pub use chunking::{split, Chunk, TextChunker};
pub use config::{ChunkProfile, ExtractorConfig};
pub use error::ExtractorError;
pub use events::{CompletionEvent, DocumentEvent, EventSink, ExtractionEvent, NullSink, ProgressEvent};
pub use merge::{fill_missing, merge, merge_with_decisions, MergeDecision};
pub use orchestrator::{chunk_text, FieldRefresh, Orchestrator};
pub use parser::{parse_model_output, parse_model_text};
pub use prompt::{DocumentContext, PromptBuilder};
pub use schema::{ExtractionSchema, SchemaBuilder};
pub use session::{ExtractionSession, SessionMetrics, SessionStatus, SessionTracker};
pub use source::StaticTextSource;
pub use stream::{encode_line, DecodedLine, LineDecoder, NdjsonWriter, WireEvent};
pub use types::{ChunkTrace, PromptKind, RunReport, RunStatus, WorkRequest};
