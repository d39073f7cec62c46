//! Pipeline stages for minute-book section classification.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. The two external collaborators sit behind traits
//! ([`render::PageRenderer`], [`llm::ModelClient`]) so every stage can run
//! without pdfium or a network.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ render ─▶ batch ─▶ encode ─▶ extract ×N ─▶ aggregate
//!                                      (schedule)        │
//!            boundaries ◀─ recovery ◀─ structure ◀───────┘
//! ```
//!
//! 1. [`input`]      canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]     rasterise pages; pdfium is not async-safe, so callers run
//!    it in `spawn_blocking`
//! 3. [`batch`]      group pages and compose labelled grid images
//! 4. [`encode`]     JPEG-encode and base64-wrap each grid
//! 5. [`extract`]    one vision call per grid, parsed into per-page text
//! 6. [`llm`]        the model seam and the retry/backoff loop
//! 7. [`schedule`]   bounded-concurrency dispatch of extraction workers
//! 8. [`postprocess`] and [`aggregate`]  clean and join page text
//! 9. [`structure`]  ask the text model for sections, chunking on failure
//! 10. [`recovery`]  parse and validate the untrusted JSON reply
//! 11. [`boundaries`] force candidates into a partition of the page range

pub mod aggregate;
pub mod batch;
pub mod boundaries;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod recovery;
pub mod render;
pub mod schedule;
pub mod structure;
