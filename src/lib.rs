//! # edgequake-minutebook
//!
//! Classify the sections of scanned corporate minute books using Vision
//! Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! A minute book is several hundred scanned pages (articles, by-laws,
//! resolutions, registers) with no text layer and no table of contents.
//! This crate reads page headings through a vision model, asks a text model
//! where each section starts and ends, and then forces whatever the models
//! return into a clean partition of the page range: sorted, contiguous,
//! every page assigned to exactly one section.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Batch      render pages, 6 per labelled grid image (spawn_blocking)
//!  ├─ 3. Extract    concurrent vision calls, retry with backoff + jitter
//!  ├─ 4. Aggregate  page text in page order with === PAGE N === markers
//!  ├─ 5. Structure  text model proposes sections; 1 → 3 → 5 chunks on failure
//!  ├─ 6. Recover    direct → unwrapped → repaired JSON parsing + validation
//!  └─ 7. Correct    overlaps split, gaps filled → partition of [1, pages]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_minutebook::{classify, ClassifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ClassifierConfig::default();
//!     let output = classify("minute-book.pdf", &config).await?;
//!     for s in &output.sections {
//!         println!("{}: pages {}-{}", s.section_type, s.start_page, s.end_page);
//!     }
//!     eprintln!("{} model requests", output.stats.model_requests);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `minutebook` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `bundled` | off     | Embeds the pdfium shared library in the binary |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-minutebook = { version = "0.1", default-features = false }
//! ```
//!
//! ## Testing without a PDF engine or network
//!
//! [`classify_document`] takes any [`PageRenderer`] and [`ModelClient`], so
//! the whole pipeline runs against synthetic pages and scripted replies.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod taxonomy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{
    classify, classify_document, classify_sync, classify_to_file, inspect, resolve_provider,
    write_output,
};
pub use config::{ClassifierConfig, ClassifierConfigBuilder, GapPolicy, OverlapPolicy};
pub use error::{BatchError, ClassifyError, ModelError};
pub use output::{ClassificationOutput, ClassificationStats, DocumentMetadata, Section};
pub use pipeline::boundaries::{correct_boundaries, is_partition};
pub use pipeline::llm::{ModelClient, ProviderClient};
pub use pipeline::recovery::SectionCandidate;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{ClassificationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, BatchOutcome, BatchStream};
pub use taxonomy::SectionType;
