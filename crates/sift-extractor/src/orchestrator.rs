//! Chunk-by-chunk extraction for one document

use crate::cancel::CancelToken;
use crate::chunking::{Chunk, TextChunker};
use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::events::{
    CompletionEvent, EventSink, ExtractionEvent, NullSink, ProgressEvent, TypingForwarder,
};
use crate::merge::{fill_missing, merge_with_decisions};
use crate::parser::parse_model_output;
use crate::prompt::{DocumentContext, PromptBuilder};
use crate::schema::SchemaBuilder;
use crate::types::{ChunkTrace, PromptKind, RunReport, RunStatus, WorkRequest};
use sift_domain::{
    Accumulator, DocumentRef, ExtractionMode, FieldDescriptor, FieldExtraction, ModelInvoker,
    ModelRequest, ModelResponse, RunId, SourceKind, SourceText, TextSource, UsageMetrics,
    SECTION_KEYS,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Result of re-extracting a single field
#[derive(Debug, Clone)]
pub struct FieldRefresh {
    /// New extraction, if the model reported one
    pub extraction: Option<FieldExtraction>,

    /// Tokens spent
    pub usage: UsageMetrics,

    /// Text the field was extracted from
    pub source: SourceText,
}

/// Mutable state of one run, kept so failures can still report progress
struct RunState {
    accumulator: Accumulator,
    usage: UsageMetrics,
    source: Option<SourceText>,
    total_chunks: usize,
    chunks_processed: usize,
    trail: Vec<ChunkTrace>,
}

impl RunState {
    fn new(source: Option<SourceText>) -> Self {
        Self {
            accumulator: Accumulator::new(),
            usage: UsageMetrics::default(),
            source,
            total_chunks: 0,
            chunks_processed: 0,
            trail: Vec::new(),
        }
    }
}

/// Drives text resolution, chunking, prompting, invocation and merging
///
/// Chunks of one document are processed strictly in order: each update
/// prompt embeds the accumulator produced by the previous chunk.
pub struct Orchestrator<M, S>
where
    M: ModelInvoker,
    S: TextSource,
{
    invoker: Arc<M>,
    source: Arc<S>,
    config: ExtractorConfig,
}

impl<M, S> Orchestrator<M, S>
where
    M: ModelInvoker,
    S: TextSource,
{
    /// Create an orchestrator; fails on an invalid configuration
    pub fn new(invoker: M, source: S, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        Ok(Self {
            invoker: Arc::new(invoker),
            source: Arc::new(source),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Resolve `(fullText, sections)` for a document
    ///
    /// In abstract mode a document without an abstract falls back to the
    /// reference's own abstract, then to a best-effort scrape.
    pub async fn resolve_source(
        &self,
        document: &DocumentRef,
        mode: ExtractionMode,
    ) -> Result<SourceText, ExtractorError> {
        debug!("Fetching {} text for document '{}'", mode, document.id);

        let mut source = self
            .source
            .fetch(document, mode)
            .await
            .map_err(|e| ExtractorError::SourceUnavailable(e.to_string()))?;

        if mode == ExtractionMode::Abstract && source.section("abstract").is_none() {
            if let Some(text) = document
                .abstract_text
                .as_deref()
                .filter(|s| !s.trim().is_empty())
            {
                source.sections.insert("abstract".to_string(), text.to_string());
            } else {
                match self.source.scrape_abstract(document).await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        info!("Using scraped abstract for document '{}'", document.id);
                        source.sections.insert("abstract".to_string(), text);
                        source.scraped_abstract = true;
                        source.source_kind = SourceKind::ScrapedAbstract;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Abstract scrape failed for '{}': {}", document.id, e),
                }
            }
        }

        if chunk_text(&source, mode).trim().is_empty() {
            return Err(ExtractorError::SourceUnavailable(format!(
                "no {} text available for document '{}'",
                mode, document.id
            )));
        }
        Ok(source)
    }

    /// Split resolved text into the chunks a run will process
    pub fn plan(&self, source: &SourceText, mode: ExtractionMode) -> Result<Vec<Chunk>, ExtractorError> {
        let chunker = TextChunker::from_profile(self.config.profile(mode))?;
        Ok(chunker.chunk(&chunk_text(source, mode)))
    }

    /// Run a full extraction for one document
    ///
    /// `cached` skips the text fetch. Events go to `sink`; a cancelled run
    /// emits nothing after it notices the cancellation.
    pub async fn process_work(
        &self,
        request: &WorkRequest,
        cached: Option<SourceText>,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> RunReport {
        self.process_work_as(RunId::new(), request, cached, sink, cancel)
            .await
    }

    /// [`process_work`](Self::process_work) under a caller-chosen run id
    pub async fn process_work_as(
        &self,
        run_id: RunId,
        request: &WorkRequest,
        cached: Option<SourceText>,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> RunReport {
        let started = Instant::now();
        info!(
            "Starting {} extraction of document '{}' (run {})",
            request.mode, request.document.id, run_id
        );

        let mut state = RunState::new(cached);
        let result = self.run(request, &mut state, sink, cancel).await;

        let status = match result {
            Ok(()) => {
                info!(
                    "Extraction of '{}' complete: {} chunks, {} tokens",
                    request.document.id, state.chunks_processed, state.usage.total_tokens
                );
                RunStatus::Completed
            }
            Err(ExtractorError::Cancelled) => {
                info!("Extraction of '{}' cancelled", request.document.id);
                RunStatus::Cancelled
            }
            Err(e) => {
                warn!("Extraction of '{}' failed: {}", request.document.id, e);
                sink.emit(ExtractionEvent::Failed {
                    message: e.to_string(),
                });
                RunStatus::Failed(e)
            }
        };

        RunReport {
            run_id,
            status,
            results: state.accumulator,
            usage: state.usage,
            source: state.source,
            total_chunks: state.total_chunks,
            chunks_processed: state.chunks_processed,
            trail: state.trail,
            duration: started.elapsed(),
        }
    }

    async fn run(
        &self,
        request: &WorkRequest,
        state: &mut RunState,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<(), ExtractorError> {
        let fields = request.extractable_fields();
        if fields.is_empty() {
            return Err(ExtractorError::Config(
                "no enabled AI fields to extract".to_string(),
            ));
        }

        sink.emit(ExtractionEvent::Fetching);
        let source = match state.source.take() {
            Some(source) => source,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ExtractorError::Cancelled),
                    resolved = self.resolve_source(&request.document, request.mode) => resolved?,
                }
            }
        };
        let source = state.source.insert(source);

        let chunks = self.plan(source, request.mode)?;
        state.total_chunks = chunks.len();
        info!(
            "Document '{}' split into {} chunks",
            request.document.id,
            chunks.len()
        );
        sink.emit(ExtractionEvent::Extracting {
            total_chunks: chunks.len(),
        });

        let schema = SchemaBuilder::build(&fields);
        let prompts = PromptBuilder::new(
            DocumentContext::new(&request.document, source),
            self.config.fallback_context_chars,
        );

        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }
            debug!("Processing chunk {}/{}", chunk.index + 1, chunk.total);

            let (prompt, prompt_kind) = if chunk.is_first() {
                (
                    prompts.build_initial(chunk, &schema.description, &fields),
                    PromptKind::Initial,
                )
            } else {
                (
                    prompts.build_update(&state.accumulator, chunk, &schema.description, &fields),
                    PromptKind::Update,
                )
            };
            let prompt_chars = prompt.chars().count();
            debug!("Prompt length: {} chars", prompt_chars);

            let model_request = ModelRequest {
                prompt,
                schema: schema.json.clone(),
                field_ids: schema.field_ids.clone(),
            };
            let response = self.invoke(&model_request, sink, cancel).await?;

            let incoming = parse_model_output(&response.output, &fields)?;
            let (merged, decisions) = merge_with_decisions(&state.accumulator, &incoming, &fields);
            state.accumulator = merged;
            state.usage += response.usage;
            state.chunks_processed += 1;
            state.trail.push(ChunkTrace {
                chunk_index: chunk.index,
                range: (chunk.start, chunk.end),
                prompt_kind,
                prompt_chars,
                usage: response.usage,
                fields_updated: decisions
                    .into_iter()
                    .filter(|(_, d)| d.changed())
                    .map(|(id, _)| id)
                    .collect(),
            });

            if cancel.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }
            sink.emit(ExtractionEvent::Progress(ProgressEvent {
                chunk_index: chunk.index,
                total_chunks: chunk.total,
                snapshot: state.accumulator.clone(),
                usage_delta: response.usage,
            }));

            // Let listeners observe each chunk before the next one starts
            tokio::task::yield_now().await;
        }

        fill_missing(&mut state.accumulator, &fields);
        sink.emit(ExtractionEvent::Complete(CompletionEvent {
            results: state.accumulator.clone(),
            total_usage: state.usage,
        }));
        Ok(())
    }

    /// Re-extract one field with a single-chunk plan
    ///
    /// Uses `cached` text when given; otherwise resolves it first.
    pub async fn extract_single_field(
        &self,
        document: &DocumentRef,
        field: &FieldDescriptor,
        mode: ExtractionMode,
        cached: Option<SourceText>,
        cancel: &CancelToken,
    ) -> Result<FieldRefresh, ExtractorError> {
        if !field.is_extractable() {
            return Err(ExtractorError::Config(format!(
                "field '{}' is not an enabled AI field",
                field.id
            )));
        }

        let source = match cached {
            Some(source) => source,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ExtractorError::Cancelled),
                    resolved = self.resolve_source(document, mode) => resolved?,
                }
            }
        };

        let profile = self.config.profile(mode);
        let chunker = TextChunker::new(profile.chunk_size, profile.overlap, Some(1))?;
        let chunk = chunker
            .chunk(&chunk_text(&source, mode))
            .into_iter()
            .next()
            .ok_or_else(|| {
                ExtractorError::SourceUnavailable(format!("document '{}' has no text", document.id))
            })?;

        let fields = std::slice::from_ref(field);
        let schema = SchemaBuilder::build(fields);
        let prompt = PromptBuilder::new(
            DocumentContext::new(document, &source),
            self.config.fallback_context_chars,
        )
        .build_initial(&chunk, &schema.description, fields);

        debug!("Refreshing field '{}' of '{}'", field.id, document.id);
        let request = ModelRequest {
            prompt,
            schema: schema.json,
            field_ids: schema.field_ids,
        };
        let response = self.invoke(&request, &NullSink, cancel).await?;
        let mut parsed = parse_model_output(&response.output, fields)?;

        Ok(FieldRefresh {
            extraction: parsed.remove(&field.id),
            usage: response.usage,
            source,
        })
    }

    /// One model call, bounded by the timeout and abandoned on cancellation
    async fn invoke(
        &self,
        request: &ModelRequest,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<ModelResponse, ExtractorError> {
        let call = async {
            if self.config.stream_deltas {
                let forwarder = TypingForwarder::new(sink);
                self.invoker.invoke_streaming(request, &forwarder).await
            } else {
                self.invoker.invoke(request).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractorError::Cancelled),
            result = timeout(self.config.invocation_timeout(), call) => match result {
                Err(_) => Err(ExtractorError::Timeout(self.config.invocation_timeout_secs)),
                Ok(Err(e)) => Err(ExtractorError::ModelInvocation(e.to_string())),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }
}

/// The text a mode splits into chunks
///
/// Abstract mode reads title and abstract, falling back to the full text.
/// Full-text mode reads the full text, falling back to the sections in
/// document order.
pub fn chunk_text(source: &SourceText, mode: ExtractionMode) -> String {
    match mode {
        ExtractionMode::Abstract => match (source.section("title"), source.section("abstract")) {
            (Some(title), Some(abstract_text)) => format!("{}\n\n{}", title.trim(), abstract_text.trim()),
            (None, Some(abstract_text)) => abstract_text.trim().to_string(),
            _ => source.full_text.clone(),
        },
        ExtractionMode::Fulltext => {
            if !source.full_text.trim().is_empty() {
                return source.full_text.clone();
            }
            SECTION_KEYS
                .iter()
                .filter_map(|key| source.section(key))
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n\n")
        }
    }
}
