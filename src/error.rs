//! Error types for the edgequake-minutebook library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ClassifyError`] — **Fatal**: the run cannot produce a section list
//!   at all (bad input file, provider not configured, structuring exhausted
//!   every attempt). Returned as `Err(ClassifyError)` from the top-level
//!   `classify*` functions.
//!
//! * [`BatchError`] — **Non-fatal**: one batch of pages could not be
//!   rendered or extracted. Stored inside
//!   [`crate::output::ClassificationOutput`] so callers can see which pages
//!   are missing while still getting a full section list.
//!
//! * [`ModelError`] — a single failed call to the external model. The retry
//!   loop in [`crate::pipeline::llm`] consults [`ModelError::is_retryable`]
//!   to decide whether another attempt is worthwhile.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-minutebook library.
#[derive(Debug, Error)]
pub enum ClassifyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document has no pages to classify.
    #[error("Document has no pages")]
    EmptyDocument,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The structure identifier exhausted every attempt and every chunk
    /// strategy without obtaining a usable section list.
    #[error("Section structure could not be identified after {attempts} attempts: {last_error}")]
    StructureUnrecoverable { attempts: u32, last_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single batch.
///
/// The pages of a failed batch are reported as missing and rendered as
/// placeholders in the aggregated text; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BatchError {
    /// A page of the batch could not be rasterised or composed.
    #[error("Batch {batch}: page {page} could not be rendered: {detail}")]
    RenderFailed {
        batch: usize,
        page: usize,
        detail: String,
    },

    /// The vision call failed after all attempts.
    #[error("Batch {batch}: extraction failed after {attempts} attempts: {detail}")]
    ExtractionFailed {
        batch: usize,
        attempts: u32,
        detail: String,
    },
}

impl BatchError {
    /// 1-based number of the batch this error belongs to.
    pub fn batch(&self) -> usize {
        match self {
            BatchError::RenderFailed { batch, .. } | BatchError::ExtractionFailed { batch, .. } => {
                *batch
            }
        }
    }
}

/// Failure of a single call to the external model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The call did not complete within the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429 or an equivalent provider signal.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 5xx, connection reset and other failures worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The call succeeded but the response could not be used.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Authentication, bad request, content filter: retrying will not help.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ModelError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelError::Permanent(_))
    }

    /// Classify a provider error message.
    ///
    /// Provider errors arrive as opaque strings, so the classification looks
    /// for a standalone HTTP status code first and falls back to keywords:
    /// 429 is a rate limit, any other 4xx is permanent, everything else is
    /// assumed transient.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let status = RE_CLIENT_STATUS
            .captures(&lower)
            .and_then(|c| c[1].parse::<u16>().ok());

        if status == Some(429)
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            ModelError::RateLimited(message)
        } else if status.is_some()
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("invalid api key")
            || lower.contains("content_filter")
        {
            ModelError::Permanent(message)
        } else {
            ModelError::Transient(message)
        }
    }
}

/// A 4xx status code standing alone, not embedded in an id or number.
static RE_CLIENT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w.\-])(4\d\d)(?:$|[^\w.\-])").expect("valid regex"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_unrecoverable_display() {
        let e = ClassifyError::StructureUnrecoverable {
            attempts: 9,
            last_error: "no JSON found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("9 attempts"), "got: {msg}");
        assert!(msg.contains("no JSON found"));
    }

    #[test]
    fn batch_error_reports_batch_number() {
        let e = BatchError::ExtractionFailed {
            batch: 3,
            attempts: 5,
            detail: "timeout".into(),
        };
        assert_eq!(e.batch(), 3);
        assert!(e.to_string().contains("5 attempts"));
    }

    #[test]
    fn provider_messages_are_classified() {
        assert!(matches!(
            ModelError::from_provider_message("HTTP 429 Too Many Requests"),
            ModelError::RateLimited(_)
        ));
        assert!(matches!(
            ModelError::from_provider_message("401 Unauthorized"),
            ModelError::Permanent(_)
        ));
        assert!(matches!(
            ModelError::from_provider_message("502 Bad Gateway"),
            ModelError::Transient(_)
        ));
    }

    #[test]
    fn client_errors_are_permanent_except_429() {
        let cases = [
            ("HTTP 400 Bad Request: invalid image_url", false),
            ("404 Not Found: model gpt-9 does not exist", false),
            ("413 Payload Too Large", false),
            ("status: 422, unprocessable entity", false),
            ("HTTP 429 Too Many Requests", true),
            ("503 Service Unavailable (request req_4013ab)", true),
            ("connection reset, request id 1-401-7", true),
            ("timeout after 404.5ms", true),
        ];
        for (message, retryable) in cases {
            assert_eq!(
                ModelError::from_provider_message(message).is_retryable(),
                retryable,
                "{message}"
            );
        }
    }

    #[test]
    fn only_permanent_errors_stop_retries() {
        assert!(ModelError::Timeout { secs: 50 }.is_retryable());
        assert!(ModelError::Malformed("missing page 4".into()).is_retryable());
        assert!(!ModelError::Permanent("bad key".into()).is_retryable());
    }

    #[test]
    fn batch_error_serialises_with_kind_tag() {
        let e = BatchError::RenderFailed {
            batch: 1,
            page: 2,
            detail: "bad xref".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"kind\":\"renderFailed\""), "got: {json}");
    }
}
