//! Extraction worker: one grid image in, one text per page out.
//!
//! The model is asked for `Page N: text` lines (see
//! [`crate::prompts::DEFAULT_EXTRACTION_PROMPT`]). Models decorate that
//! format freely (`**Page 3:**`, `- Page 3 -`, `PAGE 3 —`), so the marker
//! regex tolerates emphasis and dash separators. Text after a marker runs
//! until the next marker, which lets an entry span several lines.

use crate::config::ClassifierConfig;
use crate::error::{BatchError, ModelError};
use crate::pipeline::batch::{Batch, BatchStatus};
use crate::pipeline::llm::{call_with_retry, Backoff, ModelClient};
use crate::prompts::{self, DEFAULT_EXTRACTION_PROMPT};
use edgequake_llm::ImageData;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Matches a page marker at the start of a line and captures the number and
/// whatever follows the separator.
static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s>*_#\-]*page\s*(\d+)\s*[*_]*\s*(?:([:\-–—.)])|$)\s*[*_]*\s*(.*)$")
        .expect("valid regex")
});

/// Outcome of one worker: texts keyed by page, or the batch error.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub batch: Batch,
    pub result: Result<BTreeMap<usize, String>, BatchError>,
    /// Model calls made, retries included.
    pub attempts: u32,
}

/// Extract the text of every page in `batch` from its composed grid.
///
/// Retries per `config` and never panics or propagates: a batch that
/// exhausts its attempts comes back as `BatchError::ExtractionFailed`.
pub async fn extract_batch(
    client: &dyn ModelClient,
    mut batch: Batch,
    grid: ImageData,
    config: &ClassifierConfig,
) -> WorkerOutput {
    let template = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
    let prompt = prompts::extraction_prompt(
        template,
        batch.start_page,
        batch.end_page,
        config.grid_columns,
    );
    let label = format!("Batch {}", batch.number);
    let (start, end) = (batch.start_page, batch.end_page);

    let outcome = call_with_retry(
        &label,
        config.max_attempts,
        Backoff::from_config(config),
        |_attempt| {
            let grid = grid.clone();
            let prompt = prompt.as_str();
            async move {
                let response = client.complete_vision(prompt, grid).await?;
                parse_page_texts(&response, start, end)
            }
        },
    )
    .await;

    let result = match outcome.result {
        Ok(texts) => {
            info!(
                "Batch {}: extracted pages {}-{} in {} attempt(s)",
                batch.number, batch.start_page, batch.end_page, outcome.attempts
            );
            Ok(texts)
        }
        Err(e) => Err(BatchError::ExtractionFailed {
            batch: batch.number,
            attempts: outcome.attempts,
            detail: e.to_string(),
        }),
    };

    batch.status = if result.is_ok() {
        BatchStatus::Done
    } else {
        BatchStatus::Failed
    };

    WorkerOutput {
        batch,
        result,
        attempts: outcome.attempts,
    }
}

/// Parse a `Page N: text` response into texts for pages `start..=end`.
///
/// Markers for pages outside the range are ignored. Once a page is open,
/// a marker line starts a new entry only if it names the next page, or an
/// unseen page of the range in the `Page N:` form; any other marker-like
/// line (an index page listing `Page 7 - Resolutions`) stays text of the
/// open page. A `Page N:` entry past the range closes the open page. A page
/// with no entry makes the whole response [`ModelError::Malformed`].
pub fn parse_page_texts(
    response: &str,
    start: usize,
    end: usize,
) -> Result<BTreeMap<usize, String>, ModelError> {
    let mut texts: BTreeMap<usize, String> = BTreeMap::new();
    let mut current: Option<usize> = None;

    for line in response.lines() {
        if let Some(caps) = PAGE_MARKER.captures(line) {
            let page = caps[1].parse::<usize>().unwrap_or(0);
            let colon = caps.get(2).is_some_and(|m| m.as_str() == ":");
            let in_range = (start..=end).contains(&page);

            let fresh = in_range && !texts.contains_key(&page);
            let opens = match current {
                None => fresh,
                Some(open) => fresh && (page == open + 1 || colon),
            };
            if opens {
                texts.insert(page, caps[3].trim().to_string());
                current = Some(page);
                continue;
            }
            if current.is_none() || (colon && !in_range) {
                debug!("Ignoring marker for page {} outside {}-{}", page, start, end);
                current = None;
                continue;
            }
        }

        if let Some(page) = current {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(entry) = texts.get_mut(&page) {
                if !entry.is_empty() {
                    entry.push('\n');
                }
                entry.push_str(line);
            }
        }
    }

    let missing: Vec<usize> = (start..=end).filter(|p| !texts.contains_key(p)).collect();
    if !missing.is_empty() {
        return Err(ModelError::Malformed(format!(
            "response has no entry for page(s) {:?}",
            missing
        )));
    }

    Ok(texts)
}
