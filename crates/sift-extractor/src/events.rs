//! Events emitted while a document is being extracted

use crate::stream::WireEvent;
use sift_domain::{Accumulator, DeltaSink, RunId, UsageMetrics};
use tokio::sync::mpsc;

/// A chunk has been merged
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// 0-based chunk index
    pub chunk_index: usize,

    /// Chunks in the run
    pub total_chunks: usize,

    /// Accumulator after merging this chunk
    pub snapshot: Accumulator,

    /// Tokens spent on this chunk
    pub usage_delta: UsageMetrics,
}

/// The run finished successfully
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    /// Final accumulator
    pub results: Accumulator,

    /// Tokens spent across all chunks
    pub total_usage: UsageMetrics,
}

/// Lifecycle of one extraction run
///
/// A successful run emits `Fetching`, `Extracting`, one `Progress` per chunk
/// in order and a single `Complete`. A failed run ends with `Failed`. A
/// cancelled run simply stops.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    /// Resolving document text
    Fetching,

    /// Text resolved and split
    Extracting {
        /// Chunks the run will process
        total_chunks: usize,
    },

    /// Streaming delta for the field currently being written
    Typing {
        /// Field id
        field_id: String,
        /// Raw text fragment
        delta: String,
    },

    /// A chunk was merged
    Progress(ProgressEvent),

    /// The run finished
    Complete(CompletionEvent),

    /// The run failed
    Failed {
        /// Human-readable message
        message: String,
    },
}

impl ExtractionEvent {
    /// Wire representation; internal lifecycle events have none
    pub fn to_wire(&self) -> Option<WireEvent> {
        match self {
            ExtractionEvent::Progress(p) => Some(WireEvent::Progress {
                chunk: p.chunk_index + 1,
                total_chunks: p.total_chunks,
                current_results: p.snapshot.clone(),
                usage: p.usage_delta,
            }),
            ExtractionEvent::Complete(c) => Some(WireEvent::Complete {
                results: c.results.clone(),
            }),
            ExtractionEvent::Failed { message } => Some(WireEvent::Error {
                error: message.clone(),
            }),
            ExtractionEvent::Fetching
            | ExtractionEvent::Extracting { .. }
            | ExtractionEvent::Typing { .. } => None,
        }
    }

    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractionEvent::Complete(_) | ExtractionEvent::Failed { .. }
        )
    }
}

/// An event tagged with the document and run it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    /// Document id
    pub document_id: String,

    /// Run that produced the event
    pub run_id: RunId,

    /// The event
    pub event: ExtractionEvent,
}

/// Receiver of extraction events
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, event: ExtractionEvent);
}

impl EventSink for mpsc::UnboundedSender<ExtractionEvent> {
    fn emit(&self, event: ExtractionEvent) {
        // A closed receiver means nobody is listening any more
        let _ = self.send(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ExtractionEvent) {}
}

/// Turns model deltas into `Typing` events
pub(crate) struct TypingForwarder<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> TypingForwarder<'a> {
    pub(crate) fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }
}

impl DeltaSink for TypingForwarder<'_> {
    fn on_delta(&self, field_id: Option<&str>, delta: &str) {
        if let Some(field_id) = field_id {
            self.sink.emit(ExtractionEvent::Typing {
                field_id: field_id.to_string(),
                delta: delta.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift_domain::FieldExtraction;

    #[test]
    fn test_progress_wire_chunk_is_one_based() {
        let event = ExtractionEvent::Progress(ProgressEvent {
            chunk_index: 0,
            total_chunks: 3,
            snapshot: Accumulator::new(),
            usage_delta: UsageMetrics::new(5, 5),
        });
        match event.to_wire() {
            Some(WireEvent::Progress {
                chunk,
                total_chunks,
                ..
            }) => {
                assert_eq!(chunk, 1);
                assert_eq!(total_chunks, 3);
            }
            other => panic!("unexpected wire event: {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle_events_stay_off_the_wire() {
        assert_eq!(ExtractionEvent::Fetching.to_wire(), None);
        assert_eq!(ExtractionEvent::Extracting { total_chunks: 2 }.to_wire(), None);
        assert_eq!(
            ExtractionEvent::Typing {
                field_id: "n".to_string(),
                delta: "4".to_string()
            }
            .to_wire(),
            None
        );
    }

    #[test]
    fn test_complete_and_failed_wire() {
        let mut results = Accumulator::new();
        results.insert("n".to_string(), FieldExtraction::new(json!(1), 1.0, vec![]));
        let complete = ExtractionEvent::Complete(CompletionEvent {
            results: results.clone(),
            total_usage: UsageMetrics::default(),
        });
        assert_eq!(complete.to_wire(), Some(WireEvent::Complete { results }));
        assert!(complete.is_terminal());

        let failed = ExtractionEvent::Failed {
            message: "down".to_string(),
        };
        assert_eq!(
            failed.to_wire(),
            Some(WireEvent::Error {
                error: "down".to_string()
            })
        );
    }

    #[test]
    fn test_channel_sink_and_typing_forwarder() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forwarder = TypingForwarder::new(&tx);
        forwarder.on_delta(Some("n"), "\"value\": 4");
        forwarder.on_delta(None, "ignored");

        assert_eq!(
            rx.try_recv().unwrap(),
            ExtractionEvent::Typing {
                field_id: "n".to_string(),
                delta: "\"value\": 4".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
