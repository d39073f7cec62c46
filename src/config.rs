//! Configuration types for minute-book section classification.
//!
//! All pipeline behaviour is controlled through [`ClassifierConfig`], built
//! via its [`ClassifierConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs to
//! understand why their section lists differ.

use crate::error::ClassifyError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a classification run.
///
/// Built via [`ClassifierConfig::builder()`] or using
/// [`ClassifierConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_minutebook::ClassifierConfig;
///
/// let config = ClassifierConfig::builder()
///     .batch_size(6)
///     .concurrency(10)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Pages per batch (one grid image per batch). Default: 6.
    ///
    /// Six pages in a 2-column grid is three rows of thumbnails: small enough
    /// that headings stay legible, large enough that a 300-page book needs
    /// only 50 vision calls.
    pub batch_size: usize,

    /// Columns in the batch grid image. Default: 2.
    pub grid_columns: u32,

    /// Width of one grid cell in pixels. Default: 600.
    pub cell_width: u32,

    /// Height of one grid cell in pixels. Default: 800.
    pub cell_height: u32,

    /// Longest edge of the pdfium render before thumbnailing. Default: 1000.
    pub render_max_pixels: u32,

    /// JPEG quality of the composed grid (1–100). Default: 85.
    pub jpeg_quality: u8,

    /// Number of batches extracted concurrently. Default: 10.
    ///
    /// Vision calls are network-bound. If you hit rate-limit errors (`429`),
    /// lower this.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum calls (first attempt included) per vision batch. Default: 5.
    pub max_attempts: u32,

    /// Base retry delay in milliseconds, doubled after each attempt. Default: 1500.
    pub retry_backoff_ms: u64,

    /// Ceiling for a single retry delay in milliseconds. Default: 30 000.
    pub max_backoff_ms: u64,

    /// Maximum structure-identification calls per chunk. Default: 3.
    pub structure_max_attempts: u32,

    /// Chunk counts tried in order when structuring fails. Default: `[1, 3, 5]`.
    ///
    /// One chunk sends the whole aggregated text in a single prompt. Very long
    /// books occasionally overflow what the model handles reliably; splitting
    /// into 3 and then 5 page-aligned parts gives it smaller inputs while the
    /// sections found so far are carried forward between parts.
    pub chunk_strategies: Vec<usize>,

    /// How overlapping proposals are resolved. Default: [`OverlapPolicy::Midpoint`].
    pub overlap_policy: OverlapPolicy,

    /// How uncovered pages are filled. Default: [`GapPolicy::Unclassified`].
    pub gap_policy: GapPolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom page-extraction prompt. If None, uses the built-in default.
    pub extraction_prompt: Option<String>,

    /// Include per-page extracted text in the output. Default: false.
    pub include_page_text: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 50.
    pub api_timeout_secs: u64,

    /// Optional progress callback for per-batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 6,
            grid_columns: 2,
            cell_width: 600,
            cell_height: 800,
            render_max_pixels: 1000,
            jpeg_quality: 85,
            concurrency: 10,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_attempts: 5,
            retry_backoff_ms: 1500,
            max_backoff_ms: 30_000,
            structure_max_attempts: 3,
            chunk_strategies: vec![1, 3, 5],
            overlap_policy: OverlapPolicy::default(),
            gap_policy: GapPolicy::default(),
            password: None,
            extraction_prompt: None,
            include_page_text: false,
            download_timeout_secs: 120,
            api_timeout_secs: 50,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("batch_size", &self.batch_size)
            .field("grid_columns", &self.grid_columns)
            .field("cell", &(self.cell_width, self.cell_height))
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("structure_max_attempts", &self.structure_max_attempts)
            .field("chunk_strategies", &self.chunk_strategies)
            .field("overlap_policy", &self.overlap_policy)
            .field("gap_policy", &self.gap_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ClassificationProgressCallback>"),
            )
            .finish()
    }
}

impl ClassifierConfig {
    /// Create a new builder for `ClassifierConfig`.
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClassifierConfig`].
#[derive(Debug)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn grid_columns(mut self, n: u32) -> Self {
        self.config.grid_columns = n.max(1);
        self
    }

    pub fn cell_size(mut self, width: u32, height: u32) -> Self {
        self.config.cell_width = width.max(64);
        self.config.cell_height = height.max(64);
        self
    }

    pub fn render_max_pixels(mut self, px: u32) -> Self {
        self.config.render_max_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn structure_max_attempts(mut self, n: u32) -> Self {
        self.config.structure_max_attempts = n;
        self
    }

    pub fn chunk_strategies(mut self, strategies: Vec<usize>) -> Self {
        self.config.chunk_strategies = strategies;
        self
    }

    pub fn overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.config.overlap_policy = policy;
        self
    }

    pub fn gap_policy(mut self, policy: GapPolicy) -> Self {
        self.config.gap_policy = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn include_page_text(mut self, v: bool) -> Self {
        self.config.include_page_text = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifierConfig, ClassifyError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(ClassifyError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 || c.structure_max_attempts == 0 {
            return Err(ClassifyError::InvalidConfig(
                "Attempt limits must be ≥ 1".into(),
            ));
        }
        if c.chunk_strategies.is_empty() || c.chunk_strategies.contains(&0) {
            return Err(ClassifyError::InvalidConfig(format!(
                "Chunk strategies must be non-empty and positive, got {:?}",
                c.chunk_strategies
            )));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(ClassifyError::InvalidConfig(format!(
                "max_backoff_ms ({}) must be ≥ retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the boundary corrector resolves two partially overlapping proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverlapPolicy {
    /// Split the overlap at its midpoint; an odd middle page goes to the
    /// earlier section. (default)
    #[default]
    Midpoint,
    /// The earlier section keeps the whole overlap.
    EarlierWins,
    /// The later section takes the whole overlap.
    LaterWins,
}

/// How the boundary corrector fills pages no proposal covers.
///
/// A gap before the first section always becomes an `Unclassified` section
/// since there is nothing to extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Insert an `Unclassified` section covering the gap. (default)
    #[default]
    Unclassified,
    /// Extend the preceding section to absorb the gap.
    ExtendPreceding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ClassifierConfig::default();
        assert_eq!(c.batch_size, 6);
        assert_eq!(c.grid_columns, 2);
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.max_attempts, 5);
        assert_eq!(c.chunk_strategies, vec![1, 3, 5]);
        assert_eq!(c.overlap_policy, OverlapPolicy::Midpoint);
        assert_eq!(c.gap_policy, GapPolicy::Unclassified);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ClassifierConfig::builder().batch_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Batch size"));
    }

    #[test]
    fn setters_clamp_out_of_range_values() {
        let c = ClassifierConfig::builder()
            .concurrency(0)
            .grid_columns(0)
            .jpeg_quality(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.grid_columns, 1);
        assert_eq!(c.jpeg_quality, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn invalid_chunk_strategies_are_rejected() {
        assert!(ClassifierConfig::builder()
            .chunk_strategies(vec![])
            .build()
            .is_err());
        assert!(ClassifierConfig::builder()
            .chunk_strategies(vec![1, 0])
            .build()
            .is_err());
    }

    #[test]
    fn backoff_ceiling_must_cover_base() {
        let err = ClassifierConfig::builder()
            .retry_backoff_ms(5000)
            .max_backoff_ms(100)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_backoff_ms"));
    }
}
