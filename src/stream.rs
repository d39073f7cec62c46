//! Streaming extraction API: emit batches as they complete.
//!
//! Large minute books take minutes to extract. [`extract_stream`] yields one
//! [`BatchOutcome`] per batch as soon as its worker finishes, so callers can
//! show partial text, drive their own progress display, or persist results
//! incrementally. Outcomes arrive in completion order; sort by
//! `batch.number` if order matters.
//!
//! Structure identification needs every page, so it is not part of the
//! stream: collect the outcomes into an
//! [`ExtractionResult`](crate::pipeline::schedule::ExtractionResult) and
//! call the eager pipeline stages, or use [`crate::classify::classify`].

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::pipeline::batch::{plan_batches, prepare_batches, BatchStatus, GridLayout};
use crate::pipeline::llm::ModelClient;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::schedule::run_worker;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

pub use crate::pipeline::extract::WorkerOutput as BatchOutcome;

/// A boxed stream of batch outcomes.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchOutcome> + Send>>;

/// Render, compose and extract every batch, streaming outcomes.
///
/// Rendering and composition finish before the stream is returned; only the
/// model calls are streamed. At most `config.concurrency` are in flight.
///
/// # Errors
/// Fails only if the document is empty or cannot be opened.
pub async fn extract_stream(
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn ModelClient>,
    config: &ClassifierConfig,
) -> Result<BatchStream, ClassifyError> {
    let page_count = renderer.page_count();
    if page_count == 0 {
        return Err(ClassifyError::EmptyDocument);
    }

    let batches = plan_batches(page_count, config.batch_size);
    let total = batches.len();
    info!("Streaming extraction of {} pages in {} batches", page_count, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(page_count, total);
    }

    let prepared = prepare_batches(renderer, batches, GridLayout::from_config(config)).await?;

    let concurrency = config.concurrency.max(1);
    let config = Arc::new(config.clone());

    let s = stream::iter(prepared)
        .map(move |prepared| {
            let client = Arc::clone(&client);
            let config = Arc::clone(&config);
            async move {
                match prepared.grid {
                    Ok(grid) => {
                        run_worker(client.as_ref(), prepared.batch, grid, total, &config).await
                    }
                    Err(e) => {
                        warn!("{}", e);
                        if let Some(ref cb) = config.progress_callback {
                            cb.on_batch_error(prepared.batch.number, total, &e.to_string());
                        }
                        let mut batch = prepared.batch;
                        batch.status = BatchStatus::Failed;
                        BatchOutcome {
                            batch,
                            result: Err(e),
                            attempts: 0,
                        }
                    }
                }
            }
        })
        .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
