//! Concurrency scheduler: run extraction workers over all batches with a
//! bounded number in flight.
//!
//! ## Ordering
//!
//! `buffer_unordered` yields workers in completion order. Nothing downstream
//! depends on that order: every worker owns its batch's page slots, and
//! results are merged into a `BTreeMap` keyed by page number, so iteration
//! is ascending no matter which batch finished first.

use crate::config::ClassifierConfig;
use crate::error::BatchError;
use crate::pipeline::batch::{Batch, BatchStatus, PreparedBatch};
use crate::pipeline::extract::{extract_batch, WorkerOutput};
use crate::pipeline::llm::ModelClient;
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Merged outcome of the extraction phase.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Extracted text per page, ascending.
    pub texts: BTreeMap<usize, String>,
    /// Pages whose batch failed to render or extract.
    pub failed_pages: BTreeSet<usize>,
    /// Every batch with its final status, in batch order.
    pub batches: Vec<Batch>,
    /// One error per failed batch, in batch order.
    pub errors: Vec<BatchError>,
    /// Vision calls made, retries included.
    pub model_requests: u64,
}

impl ExtractionResult {
    pub fn done_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Done)
            .count()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Failed)
            .count()
    }

    /// Record a worker's outcome.
    pub fn merge(&mut self, output: WorkerOutput) {
        let WorkerOutput {
            mut batch,
            result,
            attempts,
        } = output;
        self.model_requests += attempts as u64;

        match result {
            Ok(texts) => {
                for (page, text) in texts {
                    self.texts.entry(page).or_insert(text);
                }
                batch.status = BatchStatus::Done;
            }
            Err(e) => self.record_failure(&mut batch, e),
        }
        self.batches.push(batch);
    }

    fn record_failure(&mut self, batch: &mut Batch, error: BatchError) {
        batch.status = BatchStatus::Failed;
        self.failed_pages.extend(batch.pages());
        self.errors.push(error);
    }

    fn finish(&mut self) {
        self.batches.sort_by_key(|b| b.number);
        self.errors.sort_by_key(BatchError::batch);
    }
}

/// Extract every prepared batch with at most `config.concurrency` workers in
/// flight.
///
/// Batches whose grid could not be composed are recorded as failed without
/// a model call. Never fails: the caller decides whether too few pages
/// survived.
pub async fn run_extraction(
    prepared: Vec<PreparedBatch>,
    client: Arc<dyn ModelClient>,
    config: &ClassifierConfig,
) -> ExtractionResult {
    let total = prepared.len();
    let mut result = ExtractionResult::default();

    let mut ready = Vec::with_capacity(total);
    for p in prepared {
        match p.grid {
            Ok(grid) => ready.push((p.batch, grid)),
            Err(e) => {
                warn!("{}", e);
                if let Some(cb) = &config.progress_callback {
                    cb.on_batch_error(p.batch.number, total, &e.to_string());
                }
                let mut batch = p.batch;
                result.record_failure(&mut batch, e);
                result.batches.push(batch);
            }
        }
    }

    info!(
        "Extracting {} batches (concurrency {})",
        ready.len(),
        config.concurrency
    );

    let outputs: Vec<WorkerOutput> = stream::iter(ready.into_iter().map(|(batch, grid)| {
        let client = Arc::clone(&client);
        async move { run_worker(client.as_ref(), batch, grid, total, config).await }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    for output in outputs {
        result.merge(output);
    }
    result.finish();

    info!(
        "Extraction finished: {} done, {} failed, {} model requests",
        result.done_batches(),
        result.failed_batches(),
        result.model_requests
    );
    result
}

/// One worker with progress events around it.
pub(crate) async fn run_worker(
    client: &dyn ModelClient,
    mut batch: Batch,
    grid: ImageData,
    total: usize,
    config: &ClassifierConfig,
) -> WorkerOutput {
    batch.status = BatchStatus::InFlight;
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_start(batch.number, total);
    }

    let output = extract_batch(client, batch, grid, config).await;

    if let Some(cb) = &config.progress_callback {
        match &output.result {
            Ok(texts) => cb.on_batch_complete(output.batch.number, total, texts.len()),
            Err(e) => cb.on_batch_error(output.batch.number, total, &e.to_string()),
        }
    }
    output
}
