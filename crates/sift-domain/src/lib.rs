//! Sift Domain Layer
//!
//! Value types and collaborator traits for the chunked extraction pipeline.
//! Everything here is plain data or a trait; behaviour lives in
//! `sift-extractor` and infrastructure in `sift-llm`.
//!
//! ## Key Concepts
//!
//! - **Field**: one user-configured extraction target with a value type
//! - **FieldExtraction**: the `{value, confidence, citations}` envelope
//! - **Accumulator**: per-field results folded across chunks
//! - **SourceText**: resolved `(fullText, sections)` for one document
//! - **RunId**: identity of one extraction run
//!
//! ## Boundaries
//!
//! - [`traits::ModelInvoker`] performs a structured-generation call
//! - [`traits::TextSource`] resolves document text
//! - [`traits::DeltaSink`] receives raw streaming deltas

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod extraction;
pub mod field;
pub mod run;
pub mod traits;
pub mod usage;

// Re-exports for convenience
pub use document::{DocumentRef, ExtractionMode, SourceKind, SourceText, SECTION_KEYS};
pub use extraction::{clamp_confidence, Accumulator, Citation, FieldExtraction};
pub use field::{FieldDescriptor, FieldType};
pub use run::RunId;
pub use traits::{DeltaSink, DiscardDeltas, ModelInvoker, ModelRequest, ModelResponse, TextSource};
pub use usage::UsageMetrics;
