//! Classification entry points.
//!
//! [`classify`] is the high-level API: resolve the input, open the PDF,
//! build the provider, run the pipeline. [`classify_document`] is the same
//! pipeline over caller-supplied [`PageRenderer`] and [`ModelClient`]
//! implementations, which is how tests and embedders with their own model
//! stack drive it.
//!
//! Use [`crate::stream::extract_stream`] instead when you want batch results
//! as they complete rather than one final answer.

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::output::{ClassificationOutput, ClassificationStats, DocumentMetadata, Section};
use crate::pipeline::aggregate::aggregate_text;
use crate::pipeline::batch::{self, GridLayout};
use crate::pipeline::boundaries::correct_boundaries;
use crate::pipeline::llm::{ModelClient, ProviderClient};
use crate::pipeline::render::{self, PageRenderer, PdfiumRenderer};
use crate::pipeline::{input, schedule, structure};
use crate::taxonomy::SectionType;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Classify the sections of a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ClassificationOutput)` whenever a section list could be produced,
/// even if some batches failed (see `output.failed_pages`).
///
/// # Errors
/// Returns `Err(ClassifyError)` only for fatal errors:
/// - File not found, unreadable, not a PDF, wrong password
/// - No provider could be configured
/// - Structure identification failed under every chunk strategy
pub async fn classify(
    input_str: impl AsRef<str>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    let input_str = input_str.as_ref();
    info!("Starting classification: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // ── Step 2: Get/create provider ──────────────────────────────────────
    let provider = resolve_provider(config)?;
    let client: Arc<dyn ModelClient> = Arc::new(ProviderClient::new(provider, config));

    // ── Step 3: Open the document ────────────────────────────────────────
    let password = config.password.clone();
    let max_pixels = config.render_max_pixels;
    let renderer = tokio::task::spawn_blocking(move || {
        PdfiumRenderer::open(&pdf_path, password.as_deref(), max_pixels)
    })
    .await
    .map_err(|e| ClassifyError::Internal(format!("Open task panicked: {}", e)))??;

    // `resolved` keeps a downloaded file alive until the pipeline is done.
    let output = classify_document(Arc::new(renderer), client, config).await;
    drop(resolved);
    output
}

/// Run the pipeline over an already-opened document.
pub async fn classify_document(
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn ModelClient>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    let total_start = Instant::now();
    let page_count = renderer.page_count();
    if page_count == 0 {
        return Err(ClassifyError::EmptyDocument);
    }

    // ── Step 1: Plan batches ─────────────────────────────────────────────
    let batches = batch::plan_batches(page_count, config.batch_size);
    let total_batches = batches.len();
    info!("{} pages in {} batches", page_count, total_batches);
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(page_count, total_batches);
    }

    // ── Step 2: Render and compose grids ─────────────────────────────────
    let compose_start = Instant::now();
    let prepared =
        batch::prepare_batches(renderer, batches, GridLayout::from_config(config)).await?;
    let compose_duration_ms = compose_start.elapsed().as_millis() as u64;

    // ── Step 3: Extract page text ────────────────────────────────────────
    let extraction_start = Instant::now();
    let extraction = schedule::run_extraction(prepared, Arc::clone(&client), config).await;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    let mut warnings = Vec::new();
    let failed_pages: Vec<usize> = extraction.failed_pages.iter().copied().collect();

    // ── Step 4: Identify structure ───────────────────────────────────────
    let structure_start = Instant::now();
    let (sections, structure_attempts, chunk_strategy) = if extraction.texts.is_empty() {
        warn!("No page text was extracted; skipping structure identification");
        warnings.push(format!(
            "all {} batches failed; document left unclassified",
            total_batches
        ));
        (
            vec![Section::new(SectionType::Unclassified, 1, page_count)],
            0,
            0,
        )
    } else {
        let text = aggregate_text(&extraction.texts, page_count);
        let outcome =
            structure::identify_structure(client.as_ref(), &text, page_count, config).await?;
        warnings.extend(outcome.warnings);

        // ── Step 5: Correct boundaries ───────────────────────────────────
        let correction = correct_boundaries(
            &outcome.candidates,
            page_count,
            config.overlap_policy,
            config.gap_policy,
        );
        for note in &correction.notes {
            info!("Boundary correction: {}", note);
        }
        warnings.extend(correction.notes);
        (
            correction.sections,
            outcome.attempts,
            outcome.chunk_strategy,
        )
    };
    let structure_duration_ms = structure_start.elapsed().as_millis() as u64;

    let stats = ClassificationStats {
        total_pages: page_count,
        total_batches,
        done_batches: extraction.done_batches(),
        failed_batches: extraction.failed_batches(),
        model_requests: extraction.model_requests + structure_attempts as u64,
        structure_attempts,
        chunk_strategy,
        compose_duration_ms,
        extraction_duration_ms,
        structure_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Classification complete: {} sections, {} failed pages, {} model requests, {}ms",
        sections.len(),
        failed_pages.len(),
        stats.model_requests,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(sections.len(), failed_pages.len());
    }

    Ok(ClassificationOutput {
        sections,
        failed_pages,
        failed_batches: extraction.errors,
        warnings,
        page_text: config.include_page_text.then_some(extraction.texts),
        stats,
    })
}

/// Classify a PDF and write the JSON result to a file.
///
/// Uses atomic write (temp file + rename) so readers never see a partial file.
pub async fn classify_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    let output = classify(input_str, config).await?;
    write_output(&output, output_path.as_ref()).await?;
    Ok(output)
}

/// Atomically write `output` as pretty JSON to `path`.
pub async fn write_output(output: &ClassificationOutput, path: &Path) -> Result<(), ClassifyError> {
    let write_err = |source: std::io::Error| ClassifyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ClassifyError::Internal(format!("Failed to serialise output: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Synchronous wrapper around [`classify`].
///
/// Creates a temporary tokio runtime internally.
pub fn classify_sync(
    input_str: impl AsRef<str>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ClassifyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(classify(input_str, config))
}

/// Read PDF metadata without classifying.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ClassifierConfig,
) -> Result<DocumentMetadata, ClassifyError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    render::extract_metadata(resolved.path(), config.password.as_deref()).await
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ClassifyError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ClassifyError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`: a pre-built provider, used as-is.
/// 2. `config.provider_name` (+ `config.model`, default [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. Whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &ClassifierConfig) -> Result<Arc<dyn LLMProvider>, ClassifyError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ClassifyError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;

    fn sample_output() -> ClassificationOutput {
        ClassificationOutput {
            sections: vec![
                Section::new(SectionType::Bylaws, 1, 4),
                Section::new(SectionType::Resolutions, 5, 9),
            ],
            failed_pages: vec![7],
            failed_batches: vec![BatchError::RenderFailed {
                batch: 2,
                page: 7,
                detail: "bad page".into(),
            }],
            warnings: vec![],
            page_text: None,
            stats: ClassificationStats::default(),
        }
    }

    #[tokio::test]
    async fn write_output_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.json");

        write_output(&sample_output(), &path).await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let text = std::fs::read_to_string(&path).unwrap();
        let back: ClassificationOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(back.sections, sample_output().sections);
        assert_eq!(back.failed_pages, vec![7]);
    }
}
