//! Per-document extraction sessions
//!
//! A [`SessionTracker`] owns one session per document id. Each session has
//! at most one run in flight; the run executes on its own task and reports
//! back through a sink that checks, under the session lock, that the run is
//! still the session's current one. Cancelling or restarting a session
//! therefore silences the old run immediately, even if its task has not
//! been torn down yet.

use crate::cancel::CancelToken;
use crate::error::ExtractorError;
use crate::events::{DocumentEvent, EventSink, ExtractionEvent};
use crate::orchestrator::Orchestrator;
use crate::types::{ChunkTrace, RunReport, RunStatus, WorkRequest};
use serde::Serialize;
use sift_domain::{
    Accumulator, ExtractionMode, FieldDescriptor, FieldExtraction, ModelInvoker, RunId,
    SourceKind, SourceText, TextSource, UsageMetrics,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Progress reported once text resolution starts
const FETCH_PROGRESS: u8 = 10;

/// Status of a document's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing running
    Idle,
    /// Resolving text
    Fetching,
    /// Running the chunk loop
    Extracting,
    /// Last run finished
    Completed,
    /// Last run failed
    Error,
}

/// Read-only view of one document's session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSession {
    /// Document id
    pub document_id: String,

    /// Current status
    pub status: SessionStatus,

    /// 0 to 100, never decreasing within a run
    pub progress: u8,

    /// Field currently being written by a streaming call
    pub current_field: Option<String>,

    /// Message of the last failure
    pub error: Option<String>,

    /// Consecutive failed runs since the last start, refresh or success
    pub retry_count: u32,

    /// Failed runs allowed before `retry` is refused
    pub max_retries: u32,

    /// Mode of the latest run
    pub mode: ExtractionMode,

    /// Latest run
    #[serde(skip)]
    pub run_id: Option<RunId>,
}

impl ExtractionSession {
    fn new(document_id: &str, max_retries: u32, mode: ExtractionMode) -> Self {
        Self {
            document_id: document_id.to_string(),
            status: SessionStatus::Idle,
            progress: 0,
            current_field: None,
            error: None,
            retry_count: 0,
            max_retries,
            mode,
            run_id: None,
        }
    }

    /// Retries still available
    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    /// Whether a run is fetching or extracting
    pub fn is_running(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Fetching | SessionStatus::Extracting
        )
    }

    fn reset_to_idle(&mut self) {
        self.status = SessionStatus::Idle;
        self.progress = 0;
        self.current_field = None;
        self.error = None;
    }
}

/// Counters accumulated across a document's runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    /// Runs started, retries included
    pub runs_started: u32,
    /// Runs that completed
    pub runs_completed: u32,
    /// Runs that failed
    pub runs_failed: u32,
    /// Runs cancelled or superseded
    pub runs_cancelled: u32,
    /// Tokens across all runs and single-field refreshes
    pub total_usage: UsageMetrics,
    /// Chunks merged across all runs
    pub chunks_processed: usize,
    /// Provenance of the latest resolved text
    pub source_kind: Option<SourceKind>,
    /// Whether the latest abstract was scraped
    pub scraped_abstract: bool,
    /// Duration of the latest finished run
    pub last_run_ms: Option<u64>,
}

struct ActiveRun {
    id: RunId,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
    done: watch::Receiver<bool>,
}

impl ActiveRun {
    fn stop(self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

struct SessionEntry {
    state: ExtractionSession,
    request: Option<WorkRequest>,
    active: Option<ActiveRun>,
    cached: Option<(ExtractionMode, SourceText)>,
    results: Accumulator,
    trail: Vec<ChunkTrace>,
    metrics: SessionMetrics,
}

impl SessionEntry {
    fn new(document_id: &str, max_retries: u32, mode: ExtractionMode) -> Self {
        Self {
            state: ExtractionSession::new(document_id, max_retries, mode),
            request: None,
            active: None,
            cached: None,
            results: Accumulator::new(),
            trail: Vec::new(),
            metrics: SessionMetrics::default(),
        }
    }

    fn is_current(&self, run_id: RunId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.id == run_id && !run.cancel.is_cancelled())
    }

    /// Stop the in-flight run, if any; returns whether one was running
    fn stop_active(&mut self) -> bool {
        match self.active.take() {
            Some(run) => {
                run.stop();
                self.metrics.runs_cancelled += 1;
                true
            }
            None => false,
        }
    }

    fn cached_source(&self, mode: ExtractionMode) -> Option<SourceText> {
        self.cached
            .as_ref()
            .filter(|(cached_mode, _)| *cached_mode == mode)
            .map(|(_, source)| source.clone())
    }

    fn apply(&mut self, event: &ExtractionEvent) {
        let state = &mut self.state;
        match event {
            ExtractionEvent::Fetching => {
                state.status = SessionStatus::Fetching;
                state.progress = state.progress.max(FETCH_PROGRESS);
            }
            ExtractionEvent::Extracting { .. } => {
                state.status = SessionStatus::Extracting;
            }
            ExtractionEvent::Typing { field_id, .. } => {
                state.current_field = Some(field_id.clone());
            }
            ExtractionEvent::Progress(progress) => {
                state.progress = state
                    .progress
                    .max(chunk_progress(progress.chunk_index, progress.total_chunks));
                self.results = progress.snapshot.clone();
            }
            ExtractionEvent::Complete(completion) => {
                state.status = SessionStatus::Completed;
                state.progress = 100;
                state.current_field = None;
                self.results = completion.results.clone();
            }
            ExtractionEvent::Failed { message } => {
                state.status = SessionStatus::Error;
                state.current_field = None;
                state.error = Some(message.clone());
            }
        }
    }
}

/// Progress after merging chunk `index` of `total`
fn chunk_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return FETCH_PROGRESS;
    }
    let done = (index + 1).min(total);
    (FETCH_PROGRESS as usize + 90 * done / total) as u8
}

type Sessions = Arc<Mutex<HashMap<String, SessionEntry>>>;

fn lock(sessions: &Sessions) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
    sessions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards a run's events while the run is still its session's current one
struct SessionSink {
    document_id: String,
    run_id: RunId,
    sessions: Sessions,
    events: mpsc::UnboundedSender<DocumentEvent>,
}

impl EventSink for SessionSink {
    fn emit(&self, event: ExtractionEvent) {
        let mut sessions = lock(&self.sessions);
        let Some(entry) = sessions.get_mut(&self.document_id) else {
            return;
        };
        if !entry.is_current(self.run_id) {
            debug!(
                "Dropping event from stale run {} of '{}'",
                self.run_id, self.document_id
            );
            return;
        }

        entry.apply(&event);
        // Sent under the lock so a concurrent cancel cannot slip in between
        let _ = self.events.send(DocumentEvent {
            document_id: self.document_id.clone(),
            run_id: self.run_id,
            event,
        });
    }
}

fn finish_run(sessions: &Sessions, document_id: &str, mode: ExtractionMode, report: RunReport) {
    let mut sessions = lock(sessions);
    let Some(entry) = sessions.get_mut(document_id) else {
        return;
    };
    if !entry.is_current(report.run_id) {
        debug!("Ignoring report of stale run {}", report.run_id);
        return;
    }
    entry.active = None;

    let metrics = &mut entry.metrics;
    metrics.total_usage += report.usage;
    metrics.chunks_processed += report.chunks_processed;
    metrics.last_run_ms = Some(report.duration.as_millis() as u64);
    if let Some(source) = report.source {
        metrics.source_kind = Some(source.source_kind.clone());
        metrics.scraped_abstract = source.scraped_abstract;
        entry.cached = Some((mode, source));
    }
    entry.trail = report.trail;

    match report.status {
        RunStatus::Completed => {
            metrics.runs_completed += 1;
            entry.results = report.results;
            entry.state.status = SessionStatus::Completed;
            entry.state.progress = 100;
            entry.state.error = None;
            entry.state.retry_count = 0;
        }
        RunStatus::Failed(e) => {
            metrics.runs_failed += 1;
            entry.state.retry_count = entry.state.retry_count.saturating_add(1);
            entry.state.status = SessionStatus::Error;
            entry.state.current_field = None;
            entry.state.error = Some(e.to_string());
        }
        RunStatus::Cancelled => {
            metrics.runs_cancelled += 1;
            entry.state.reset_to_idle();
        }
    }
}

/// Owns every document's extraction session
pub struct SessionTracker<M, S>
where
    M: ModelInvoker + 'static,
    S: TextSource + 'static,
{
    orchestrator: Arc<Orchestrator<M, S>>,
    sessions: Sessions,
    events: mpsc::UnboundedSender<DocumentEvent>,
}

impl<M, S> SessionTracker<M, S>
where
    M: ModelInvoker + 'static,
    S: TextSource + 'static,
{
    /// Create a tracker; events of current runs are sent to `events`
    pub fn new(
        orchestrator: Orchestrator<M, S>,
        events: mpsc::UnboundedSender<DocumentEvent>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Start extracting a document, cancelling any run already in flight
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, request: WorkRequest) -> Result<RunId, ExtractorError> {
        self.begin(request, false)
    }

    /// Start over from freshly fetched text
    ///
    /// Deletes the cached text and debug trail before the new run starts.
    pub fn refresh(&self, request: WorkRequest) -> Result<RunId, ExtractorError> {
        self.begin(request, true)
    }

    fn begin(&self, request: WorkRequest, force: bool) -> Result<RunId, ExtractorError> {
        if request.extractable_fields().is_empty() {
            return Err(ExtractorError::Config(
                "no enabled AI fields to extract".to_string(),
            ));
        }

        let max_retries = self.orchestrator.config().max_retries;
        let mut sessions = lock(&self.sessions);
        let entry = sessions
            .entry(request.document.id.clone())
            .or_insert_with(|| SessionEntry::new(&request.document.id, max_retries, request.mode));

        if entry.stop_active() {
            info!("Superseding running extraction of '{}'", request.document.id);
        }
        if force {
            debug!("Dropping cached text for '{}'", request.document.id);
            entry.cached = None;
            entry.trail.clear();
        }
        entry.state.retry_count = 0;

        Ok(self.launch(entry, request))
    }

    /// Re-run the latest request for a document
    ///
    /// Every failed run counts against the budget, the first one included.
    /// Once `max_retries` runs have failed in a row the session moves to
    /// `error` and the model is not called again.
    pub fn retry(&self, document_id: &str) -> Result<RunId, ExtractorError> {
        let mut sessions = lock(&self.sessions);
        let entry = sessions
            .get_mut(document_id)
            .ok_or_else(|| ExtractorError::UnknownDocument(document_id.to_string()))?;
        let request = entry
            .request
            .clone()
            .ok_or_else(|| ExtractorError::UnknownDocument(document_id.to_string()))?;

        if entry.state.retry_count >= entry.state.max_retries {
            let err = ExtractorError::RetriesExhausted(entry.state.max_retries);
            warn!("Not retrying '{}': {}", document_id, err);
            entry.stop_active();
            entry.state.status = SessionStatus::Error;
            entry.state.current_field = None;
            entry.state.error = Some(err.to_string());
            return Err(err);
        }

        entry.stop_active();
        info!(
            "Retrying '{}' after {} failed run(s), {} allowed",
            document_id, entry.state.retry_count, entry.state.max_retries
        );
        Ok(self.launch(entry, request))
    }

    /// Cancel the running extraction of a document
    ///
    /// The session returns to `idle` and no further events from the
    /// cancelled run are delivered. A session with nothing running is left
    /// as it is. Returns whether a run was stopped.
    pub fn cancel(&self, document_id: &str) -> bool {
        let mut sessions = lock(&self.sessions);
        let Some(entry) = sessions.get_mut(document_id) else {
            return false;
        };
        if !entry.stop_active() {
            return false;
        }
        info!("Cancelled extraction of '{}'", document_id);
        entry.state.reset_to_idle();
        true
    }

    fn launch(&self, entry: &mut SessionEntry, request: WorkRequest) -> RunId {
        let run_id = RunId::new();
        let cancel = CancelToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let cached = entry.cached_source(request.mode);
        let document_id = request.document.id.clone();

        entry.state.status = SessionStatus::Fetching;
        entry.state.progress = 0;
        entry.state.current_field = None;
        entry.state.error = None;
        entry.state.mode = request.mode;
        entry.state.run_id = Some(run_id);
        entry.request = Some(request.clone());
        entry.results.clear();
        entry.metrics.runs_started += 1;
        entry.active = Some(ActiveRun {
            id: run_id,
            cancel: cancel.clone(),
            handle: None,
            done: done_rx,
        });

        let sink = SessionSink {
            document_id: document_id.clone(),
            run_id,
            sessions: Arc::clone(&self.sessions),
            events: self.events.clone(),
        };
        let orchestrator = Arc::clone(&self.orchestrator);
        let sessions = Arc::clone(&self.sessions);

        // The caller holds the session lock, so the task cannot report
        // before its handle is stored below
        let handle = tokio::spawn(async move {
            let report = orchestrator
                .process_work_as(run_id, &request, cached, &sink, &cancel)
                .await;
            finish_run(&sessions, &document_id, request.mode, report);
            done_tx.send_replace(true);
        });

        if let Some(active) = entry.active.as_mut() {
            active.handle = Some(handle);
        }
        run_id
    }

    /// Wait for the document's current run to end, then return its state
    pub async fn wait(&self, document_id: &str) -> Option<ExtractionSession> {
        let done = {
            let sessions = lock(&self.sessions);
            let entry = sessions.get(document_id)?;
            entry.active.as_ref().map(|run| run.done.clone())
        };
        if let Some(mut done) = done {
            // An aborted task drops the sender, which also ends the wait
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.get_state(document_id)
    }

    /// Re-extract one field of a document and replace its result
    ///
    /// The refresh becomes the session's active run: it supersedes a run in
    /// flight, and [`cancel`](Self::cancel) or a new start stops it without
    /// touching the stored results. Reuses the session's cached text when it
    /// matches the mode. Returns the new extraction, or `None` when the
    /// model reported nothing, in which case the previous result is kept.
    pub async fn extract_field(
        &self,
        document_id: &str,
        field: &FieldDescriptor,
    ) -> Result<Option<FieldExtraction>, ExtractorError> {
        let run_id = RunId::new();
        let cancel = CancelToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        let (document, mode, cached) = {
            let mut sessions = lock(&self.sessions);
            let entry = sessions
                .get_mut(document_id)
                .ok_or_else(|| ExtractorError::UnknownDocument(document_id.to_string()))?;
            let request = entry
                .request
                .as_ref()
                .ok_or_else(|| ExtractorError::UnknownDocument(document_id.to_string()))?;
            let mode = request.mode;
            let document = request.document.clone();

            if entry.stop_active() {
                info!("Superseding running extraction of '{}'", document_id);
                entry.state.reset_to_idle();
            }
            entry.state.current_field = Some(field.id.clone());
            entry.active = Some(ActiveRun {
                id: run_id,
                cancel: cancel.clone(),
                handle: None,
                done: done_rx,
            });
            (document, mode, entry.cached_source(mode))
        };

        let outcome = self
            .orchestrator
            .extract_single_field(&document, field, mode, cached, &cancel)
            .await;

        let mut sessions = lock(&self.sessions);
        let Some(entry) = sessions
            .get_mut(document_id)
            .filter(|entry| entry.is_current(run_id))
        else {
            debug!("Discarding stopped refresh of '{}' for '{}'", field.id, document_id);
            return Err(ExtractorError::Cancelled);
        };
        entry.active = None;
        done_tx.send_replace(true);
        if entry.state.current_field.as_deref() == Some(field.id.as_str()) {
            entry.state.current_field = None;
        }

        let refresh = outcome?;
        entry.metrics.total_usage += refresh.usage;
        if entry.cached_source(mode).is_none() {
            entry.cached = Some((mode, refresh.source));
        }
        if let Some(extraction) = &refresh.extraction {
            entry.results.insert(field.id.clone(), extraction.clone());
        }
        Ok(refresh.extraction)
    }

    /// Current state of a document's session
    pub fn get_state(&self, document_id: &str) -> Option<ExtractionSession> {
        lock(&self.sessions)
            .get(document_id)
            .map(|entry| entry.state.clone())
    }

    /// Retries left for a document
    pub fn retries_remaining(&self, document_id: &str) -> Option<u32> {
        self.get_state(document_id)
            .map(|state| state.retries_remaining())
    }

    /// Latest results for a document, live while a run is in flight
    pub fn results(&self, document_id: &str) -> Option<Accumulator> {
        lock(&self.sessions)
            .get(document_id)
            .map(|entry| entry.results.clone())
    }

    /// Cached text for a document, if any
    pub fn cached_source(&self, document_id: &str) -> Option<SourceText> {
        lock(&self.sessions)
            .get(document_id)
            .and_then(|entry| entry.cached.as_ref().map(|(_, source)| source.clone()))
    }

    /// Debug trail of the latest finished run
    pub fn debug_trail(&self, document_id: &str) -> Vec<ChunkTrace> {
        lock(&self.sessions)
            .get(document_id)
            .map(|entry| entry.trail.clone())
            .unwrap_or_default()
    }

    /// Accumulated metrics for a document
    pub fn metrics(&self, document_id: &str) -> Option<SessionMetrics> {
        lock(&self.sessions)
            .get(document_id)
            .map(|entry| entry.metrics.clone())
    }

    /// Ids of all known documents
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl<M, S> Drop for SessionTracker<M, S>
where
    M: ModelInvoker + 'static,
    S: TextSource + 'static,
{
    fn drop(&mut self) {
        for entry in lock(&self.sessions).values_mut() {
            if let Some(run) = entry.active.take() {
                run.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_progress_mapping() {
        assert_eq!(chunk_progress(0, 1), 100);
        assert_eq!(chunk_progress(0, 4), 32);
        assert_eq!(chunk_progress(1, 4), 55);
        assert_eq!(chunk_progress(3, 4), 100);
        assert_eq!(chunk_progress(0, 0), FETCH_PROGRESS);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut entry = SessionEntry::new("W1", 3, ExtractionMode::Fulltext);
        entry.state.progress = 60;
        entry.apply(&ExtractionEvent::Fetching);
        assert_eq!(entry.state.progress, 60);
        assert_eq!(entry.state.status, SessionStatus::Fetching);
    }

    #[test]
    fn test_failed_event_sets_error() {
        let mut entry = SessionEntry::new("W1", 3, ExtractionMode::Abstract);
        entry.state.current_field = Some("n".to_string());
        entry.apply(&ExtractionEvent::Failed {
            message: "Model invocation failed: 503".to_string(),
        });
        assert_eq!(entry.state.status, SessionStatus::Error);
        assert_eq!(entry.state.current_field, None);
        assert!(entry.state.error.as_deref().unwrap().contains("503"));
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let mut state = ExtractionSession::new("W1", 3, ExtractionMode::Fulltext);
        state.retry_count = 1;
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["documentId"], "W1");
        assert_eq!(value["retryCount"], 1);
        assert_eq!(value["maxRetries"], 3);
        assert_eq!(value["status"], "idle");
        assert_eq!(value["mode"], "fulltext");
        assert_eq!(state.retries_remaining(), 2);
    }
}
