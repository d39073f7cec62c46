//! Page rendering: the document side of the pipeline.
//!
//! [`PageRenderer`] is the seam between the pipeline and the rasterisation
//! library. The production implementation, [`PdfiumRenderer`], wraps
//! `pdfium-render`; tests substitute synthetic renderers so batching and
//! composition can be exercised without a PDF engine.
//!
//! ## Threading
//!
//! pdfium uses thread-local state internally and is not safe to call from
//! async contexts. Callers invoke renderers from
//! `tokio::task::spawn_blocking` (see [`crate::pipeline::batch`]).

use crate::error::ClassifyError;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of page images for one document.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Rasterise the given 1-based pages, in order.
    ///
    /// The outer `Result` fails only when the document itself cannot be
    /// opened; each inner `Result` carries the outcome for one page so an
    /// unreadable page never hides its neighbours.
    fn render_pages(
        &self,
        pages: &[usize],
    ) -> Result<Vec<Result<DynamicImage, String>>, ClassifyError>;
}

/// Renders pages of a PDF file through pdfium.
///
/// The document is reopened per [`PageRenderer::render_pages`] call: pdfium
/// document handles borrow the library binding and cannot be stored next to
/// it, and a batch-sized call amortises the open cost over several pages.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    path: PathBuf,
    password: Option<String>,
    max_pixels: u32,
    page_count: usize,
}

impl PdfiumRenderer {
    /// Open `path`, validating that pdfium can load it and counting pages.
    pub fn open(
        path: &Path,
        password: Option<&str>,
        max_pixels: u32,
    ) -> Result<Self, ClassifyError> {
        let pdfium = Pdfium::default();
        let document = load_document(&pdfium, path, password)?;
        let page_count = document.pages().len() as usize;
        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            path: path.to_path_buf(),
            password: password.map(str::to_string),
            max_pixels,
            page_count,
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_pages(
        &self,
        pages: &[usize],
    ) -> Result<Vec<Result<DynamicImage, String>>, ClassifyError> {
        let pdfium = Pdfium::default();
        let document = load_document(&pdfium, &self.path, self.password.as_deref())?;
        let doc_pages = document.pages();

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let rendered = pages
            .iter()
            .map(|&page_num| {
                if page_num == 0 || page_num > self.page_count {
                    return Err(format!(
                        "page {} out of range (document has {} pages)",
                        page_num, self.page_count
                    ));
                }
                let page = doc_pages
                    .get((page_num - 1) as u16)
                    .map_err(|e| format!("{:?}", e))?;
                let bitmap = page
                    .render_with_config(&render_config)
                    .map_err(|e| format!("{:?}", e))?;
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    page_num,
                    image.width(),
                    image.height()
                );
                Ok(image)
            })
            .collect();

        Ok(rendered)
    }
}

/// Open a document, mapping pdfium's errors onto [`ClassifyError`].
fn load_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ClassifyError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ClassifyError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                ClassifyError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        } else {
            ClassifyError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Extract document metadata from a PDF without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, ClassifyError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| ClassifyError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, ClassifyError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
