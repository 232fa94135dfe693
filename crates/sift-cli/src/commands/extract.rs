//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::commands::load_fields;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::source::FileTextSource;
use sift_domain::{DocumentRef, ModelInvoker};
use sift_extractor::{
    CancelToken, ExtractionEvent, NdjsonWriter, Orchestrator, RunStatus, WorkRequest,
};
use sift_llm::OllamaInvoker;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Execute the extract command, streaming NDJSON to stdout.
pub async fn execute_extract(args: ExtractArgs, config: &Config) -> Result<()> {
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.model.endpoint.clone());
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.model.model.clone());
    info!("Using model '{}' at {}", model, endpoint);

    let invoker =
        OllamaInvoker::new(endpoint, model).with_max_retries(config.model.max_retries);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling extraction");
            on_interrupt.cancel();
        }
    });

    run_extraction(invoker, args, config, tokio::io::stdout(), cancel).await?;
    Ok(())
}

/// Run one extraction with `invoker`, writing wire events to `out`.
///
/// Returns the number of NDJSON lines written.
pub async fn run_extraction<M, W>(
    invoker: M,
    args: ExtractArgs,
    config: &Config,
    out: W,
    cancel: CancelToken,
) -> Result<usize>
where
    M: ModelInvoker,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let fields = load_fields(&args.fields)?;

    let document_id = args.id.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });
    let mut document = DocumentRef::new(document_id.clone());
    if let Some(title) = &args.title {
        document = document.with_title(title.as_str());
    }

    let source = FileTextSource::new().with_file(document_id, &args.input);

    let mut extractor_config = config.extractor.clone();
    extractor_config.stream_deltas |= args.stream;
    let orchestrator = Orchestrator::new(invoker, source, extractor_config)?;

    let request = WorkRequest::new(document, fields, args.mode.into());

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_events(rx, out));

    let report = orchestrator.process_work(&request, None, &tx, &cancel).await;
    drop(tx);

    let lines = writer
        .await
        .map_err(|e| CliError::Io(std::io::Error::other(e)))??;

    match report.status {
        RunStatus::Completed => {
            info!(
                "Extracted {} field(s) from {} chunk(s) in {:?} ({} tokens)",
                report.results.len(),
                report.chunks_processed,
                report.duration,
                report.usage.total_tokens
            );
            Ok(lines)
        }
        RunStatus::Failed(err) => Err(err.into()),
        RunStatus::Cancelled => Err(CliError::Interrupted),
    }
}

async fn forward_events<W>(
    mut rx: mpsc::UnboundedReceiver<ExtractionEvent>,
    out: W,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = NdjsonWriter::new(out);
    while let Some(event) = rx.recv().await {
        match &event {
            ExtractionEvent::Fetching => debug!("Fetching document text"),
            ExtractionEvent::Extracting { total_chunks } => {
                info!("Extracting over {} chunk(s)", total_chunks)
            }
            ExtractionEvent::Typing { field_id, delta } => trace!("{}: {}", field_id, delta),
            _ => {}
        }
        if let Some(wire) = event.to_wire() {
            writer.write_event(&wire).await?;
        }
    }
    Ok(writer.lines_written())
}
