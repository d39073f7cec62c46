//! Input resolution: turn a user-supplied path or URL into a local PDF.
//!
//! pdfium opens documents from the file system only, so URL inputs are
//! streamed into a `TempDir` that lives as long as the [`ResolvedInput`].
//! Both paths check the `%PDF` magic before returning, so a stray HTML error
//! page or a misnamed image fails here with a clear message.

use crate::error::ClassifyError;
use futures::StreamExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF on the local file system, possibly downloaded for this run.
#[derive(Debug)]
pub enum ResolvedInput {
    /// The input was already a local file.
    Local(PathBuf),
    /// The input was a URL. The directory is removed when this is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Whether `input` should be downloaded rather than opened.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local PDF path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ClassifyError> {
    if input.trim().is_empty() {
        return Err(ClassifyError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).map(ResolvedInput::Local)
    }
}

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, ClassifyError> {
    let path = path.to_path_buf();
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ClassifyError::PermissionDenied { path })
        }
        Err(_) => return Err(ClassifyError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != PDF_MAGIC {
        return Err(ClassifyError::NotAPdf { path, magic });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

async fn download(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ClassifyError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| ClassifyError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            ClassifyError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(&classify_reqwest)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let temp_dir = TempDir::new().map_err(|e| ClassifyError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(file_name_for(url));
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ClassifyError::Internal(format!("Failed to create temp file: {}", e)))?;

    let mut stream = response.bytes_stream();
    let mut head: Vec<u8> = Vec::with_capacity(4);
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(&classify_reqwest)?;
        if head.len() < 4 {
            let take = (4 - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        total += chunk.len();
        file.write_all(&chunk)
            .await
            .map_err(|e| ClassifyError::Internal(format!("Failed to write temp file: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| ClassifyError::Internal(format!("Failed to write temp file: {}", e)))?;

    if head.as_slice() != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic[..head.len()].copy_from_slice(&head);
        return Err(ClassifyError::NotAPdf { path, magic });
    }

    info!("Downloaded {} bytes to {}", total, path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment if it names a PDF, else a fixed name.
fn file_name_for(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|name| {
            name.to_ascii_lowercase().ends_with(".pdf")
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
        })
        .unwrap_or_else(|| "document.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/book.pdf"));
        assert!(is_url("http://example.com/book.pdf"));
        assert!(!is_url("/tmp/book.pdf"));
        assert!(!is_url("book.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(file_name_for("https://x.org/books/acme-2019.pdf"), "acme-2019.pdf");
        assert_eq!(file_name_for("https://x.org/download?id=3"), "document.pdf");
        assert_eq!(file_name_for("https://x.org/a%20b.pdf"), "document.pdf");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = resolve_local(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ClassifyError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected_with_magic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"<html>oops</html>").unwrap();
        let err = resolve_local(f.path()).unwrap_err();
        match err {
            ClassifyError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(f.path()).unwrap(), f.path());
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidInput { .. }));
    }
}
