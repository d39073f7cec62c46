//! Structure identification: aggregated page text → section candidates.
//!
//! The whole text is first sent in one prompt. If that fails every attempt,
//! the text is split into more page-aligned chunks (the configured
//! `chunk_strategies`, `[1, 3, 5]` by default) and sent part by part, each
//! part carrying the sections found so far. Only when every strategy fails
//! does the run fail.

use crate::config::ClassifierConfig;
use crate::error::{ClassifyError, ModelError};
use crate::pipeline::aggregate::{split_into_chunks, TextChunk};
use crate::pipeline::llm::{call_with_retry, Backoff, ModelClient};
use crate::pipeline::recovery::{parse_structure_response, Recovered, SectionCandidate};
use crate::prompts;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Candidates produced by the first strategy that succeeded.
#[derive(Debug, Clone)]
pub struct StructureOutcome {
    pub candidates: Vec<SectionCandidate>,
    pub warnings: Vec<String>,
    /// Structure calls made across all strategies.
    pub attempts: u32,
    /// Number of chunks of the successful strategy.
    pub chunk_strategy: usize,
}

/// Ask the model for the section structure of `text`.
pub async fn identify_structure(
    client: &dyn ModelClient,
    text: &str,
    page_count: usize,
    config: &ClassifierConfig,
) -> Result<StructureOutcome, ClassifyError> {
    let mut attempts = 0u32;
    let mut last_error = String::from("no chunk strategy configured");
    let mut tried = BTreeSet::new();

    for &strategy in &config.chunk_strategies {
        let chunks = split_into_chunks(text, strategy);
        if !tried.insert(chunks.len()) {
            // Fewer pages than chunks: same split as a strategy already tried.
            continue;
        }
        info!(
            "Identifying structure with {} chunk(s) over {} pages",
            chunks.len(),
            page_count
        );

        let result = if chunks.len() == 1 {
            run_single(client, text, page_count, strategy, config).await
        } else {
            run_chunked(client, &chunks, page_count, strategy, config).await
        };

        attempts += result.attempts;
        match result.outcome {
            Ok((candidates, warnings)) => {
                return Ok(StructureOutcome {
                    candidates,
                    warnings,
                    attempts,
                    chunk_strategy: chunks.len(),
                })
            }
            Err(e) => {
                warn!("Structure with {} chunk(s) failed: {}", chunks.len(), e);
                last_error = e.to_string();
                if !e.is_retryable() {
                    break;
                }
            }
        }
    }

    Err(ClassifyError::StructureUnrecoverable {
        attempts,
        last_error,
    })
}

struct StrategyResult {
    outcome: Result<(Vec<SectionCandidate>, Vec<String>), ModelError>,
    attempts: u32,
}

async fn run_single(
    client: &dyn ModelClient,
    text: &str,
    page_count: usize,
    strategy: usize,
    config: &ClassifierConfig,
) -> StrategyResult {
    let prompt = prompts::structure_prompt_single(text, page_count);
    let outcome = request_sections(client, &prompt, strategy, "Structure", config).await;
    StrategyResult {
        attempts: outcome.1,
        outcome: outcome.0.map(|r| (r.candidates, r.warnings)),
    }
}

async fn run_chunked(
    client: &dyn ModelClient,
    chunks: &[TextChunk],
    page_count: usize,
    strategy: usize,
    config: &ClassifierConfig,
) -> StrategyResult {
    let total_parts = chunks.len();
    let mut running: Vec<SectionCandidate> = Vec::new();
    let mut warnings = Vec::new();
    let mut attempts = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let previous = (!running.is_empty()).then(|| sections_json(&running));
        let prompt = prompts::structure_prompt_multi(
            &chunk.text,
            i + 1,
            total_parts,
            page_count,
            previous.as_deref(),
        );
        let label = format!(
            "Structure part {}/{} (pages {}-{})",
            i + 1,
            total_parts,
            chunk.first_page,
            chunk.last_page
        );

        let (result, n) = request_sections(client, &prompt, strategy, &label, config).await;
        attempts += n;
        match result {
            Ok(recovered) => {
                warnings.extend(recovered.warnings);
                running = merge_running(running, recovered.candidates);
            }
            Err(e) => {
                return StrategyResult {
                    outcome: Err(e),
                    attempts,
                }
            }
        }
    }

    StrategyResult {
        outcome: Ok((running, warnings)),
        attempts,
    }
}

/// One structure call with retries; recovery failures count as malformed
/// responses and are retried like transport errors.
async fn request_sections(
    client: &dyn ModelClient,
    prompt: &str,
    strategy: usize,
    label: &str,
    config: &ClassifierConfig,
) -> (Result<Recovered, ModelError>, u32) {
    let outcome = call_with_retry(
        label,
        config.structure_max_attempts,
        Backoff::from_config(config),
        |attempt| {
            if let Some(cb) = &config.progress_callback {
                cb.on_structure_attempt(strategy, attempt);
            }
            async move {
                let response = client.complete_text(prompt).await?;
                parse_structure_response(&response).map_err(|e| ModelError::Malformed(e.to_string()))
            }
        },
    )
    .await;
    (outcome.result, outcome.attempts)
}

/// Combine the sections known so far with a part's reply.
///
/// Each part is asked for the complete list, but models often return only
/// what they saw in that part. Earlier sections that end before the reply's
/// first section are kept.
fn merge_running(
    running: Vec<SectionCandidate>,
    reply: Vec<SectionCandidate>,
) -> Vec<SectionCandidate> {
    let Some(first) = reply.iter().map(|c| c.start_page).min() else {
        return running;
    };
    running
        .into_iter()
        .filter(|c| c.end_page < first)
        .chain(reply)
        .collect()
}

/// `{"sections":[…]}` for the multi-part prompt.
fn sections_json(candidates: &[SectionCandidate]) -> String {
    let sections: Vec<_> = candidates
        .iter()
        .map(|c| {
            json!({
                "name": c.section_type.display_name(),
                "startPage": c.start_page,
                "endPage": c.end_page,
            })
        })
        .collect();
    json!({ "sections": sections }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SectionType;

    #[test]
    fn merge_keeps_sections_before_the_reply() {
        let running = vec![
            SectionCandidate::new(SectionType::ArticlesAndAmendments, 1, 5),
            SectionCandidate::new(SectionType::Bylaws, 6, 12),
        ];
        let reply = vec![
            SectionCandidate::new(SectionType::Bylaws, 6, 15),
            SectionCandidate::new(SectionType::Resolutions, 16, 20),
        ];
        let merged = merge_running(running, reply);
        let ranges: Vec<_> = merged.iter().map(|c| (c.start_page, c.end_page)).collect();
        assert_eq!(ranges, vec![(1, 5), (6, 15), (16, 20)]);
    }

    #[test]
    fn merge_with_complete_reply_replaces_everything() {
        let running = vec![SectionCandidate::new(SectionType::Bylaws, 1, 5)];
        let reply = vec![
            SectionCandidate::new(SectionType::Bylaws, 1, 7),
            SectionCandidate::new(SectionType::Resolutions, 8, 9),
        ];
        assert_eq!(merge_running(running, reply.clone()), reply);
    }

    #[test]
    fn sections_json_uses_display_names() {
        let json = sections_json(&[SectionCandidate::new(SectionType::Bylaws, 1, 3)]);
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["sections"][0]["name"], "By Laws");
        assert_eq!(v["sections"][0]["startPage"], 1);
        assert_eq!(v["sections"][0]["endPage"], 3);
    }
}
