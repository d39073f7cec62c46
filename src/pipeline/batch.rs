//! Batch composition: group pages into batches and lay each batch out as
//! one labelled grid image.
//!
//! ## Why grids?
//!
//! One vision call per page would mean several hundred calls for a typical
//! minute book. Classification only needs headings, which stay legible at
//! thumbnail size, so six pages share one image and one call.
//!
//! ## Page labels
//!
//! Each cell carries its absolute page number in red in the bottom-right
//! corner; the extraction prompt tells the model to key its answer on those
//! numbers. Labels are drawn from a built-in digit bitmap and the finished
//! label tiles are cached per page number, so a label is rasterised once per
//! process no matter how many runs reuse it.

use crate::config::ClassifierConfig;
use crate::error::{BatchError, ClassifyError};
use crate::pipeline::encode;
use crate::pipeline::render::PageRenderer;
use edgequake_llm::ImageData;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Lifecycle of a batch through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// A contiguous range of pages processed as one grid image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position of the batch in page order.
    pub number: usize,
    pub start_page: usize,
    pub end_page: usize,
    pub status: BatchStatus,
}

impl Batch {
    /// Pages covered, inclusive.
    pub fn pages(&self) -> RangeInclusive<usize> {
        self.start_page..=self.end_page
    }

    pub fn len(&self) -> usize {
        self.end_page + 1 - self.start_page
    }

    pub fn is_empty(&self) -> bool {
        self.end_page < self.start_page
    }
}

/// A batch together with its encoded grid, or the reason it has none.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub batch: Batch,
    pub grid: Result<ImageData, BatchError>,
}

/// Geometry of a batch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub jpeg_quality: u8,
}

impl GridLayout {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            columns: config.grid_columns.max(1),
            cell_width: config.cell_width,
            cell_height: config.cell_height,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Split `[1, page_count]` into consecutive batches of `batch_size` pages.
///
/// The last batch holds whatever remains. Returns no batches for an empty
/// document; `batch_size` 0 is treated as 1.
pub fn plan_batches(page_count: usize, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    (1..=page_count)
        .step_by(size)
        .enumerate()
        .map(|(i, start)| Batch {
            number: i + 1,
            start_page: start,
            end_page: (start + size - 1).min(page_count),
            status: BatchStatus::Pending,
        })
        .collect()
}

/// Render and compose every batch on the blocking thread pool.
///
/// Page-level render failures fail only their own batch. The call as a
/// whole fails only if the renderer cannot open the document.
pub async fn prepare_batches(
    renderer: Arc<dyn PageRenderer>,
    batches: Vec<Batch>,
    layout: GridLayout,
) -> Result<Vec<PreparedBatch>, ClassifyError> {
    tokio::task::spawn_blocking(move || {
        batches
            .into_iter()
            .map(|batch| prepare_batch(renderer.as_ref(), batch, &layout))
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| ClassifyError::Internal(format!("Compose task panicked: {}", e)))?
}

/// Render, compose and encode one batch (blocking).
pub fn prepare_batch(
    renderer: &dyn PageRenderer,
    mut batch: Batch,
    layout: &GridLayout,
) -> Result<PreparedBatch, ClassifyError> {
    let pages: Vec<usize> = batch.pages().collect();
    let rendered = renderer.render_pages(&pages)?;

    let mut images = Vec::with_capacity(pages.len());
    for (page, result) in pages.iter().zip(rendered) {
        match result {
            Ok(img) => images.push((*page, img)),
            Err(detail) => {
                warn!("Batch {}: page {} failed to render: {}", batch.number, page, detail);
                batch.status = BatchStatus::Failed;
                let err = BatchError::RenderFailed {
                    batch: batch.number,
                    page: *page,
                    detail,
                };
                return Ok(PreparedBatch {
                    batch,
                    grid: Err(err),
                });
            }
        }
    }

    let grid = compose_grid(&images, layout);
    let grid = encode::encode_grid(&grid, layout.jpeg_quality).map_err(|e| {
        batch.status = BatchStatus::Failed;
        BatchError::RenderFailed {
            batch: batch.number,
            page: batch.start_page,
            detail: format!("grid encoding failed: {}", e),
        }
    });
    debug!("Batch {}: composed pages {}-{}", batch.number, batch.start_page, batch.end_page);

    Ok(PreparedBatch { batch, grid })
}

/// Lay out `(page_number, image)` pairs into a labelled grid.
pub fn compose_grid(pages: &[(usize, DynamicImage)], layout: &GridLayout) -> RgbImage {
    let columns = layout.columns.max(1);
    let rows = (pages.len() as u32).div_ceil(columns).max(1);
    let (cw, ch) = (layout.cell_width, layout.cell_height);

    let mut grid = RgbImage::from_pixel(cw * columns, ch * rows, WHITE);

    for (i, (page_num, img)) in pages.iter().enumerate() {
        let col = i as u32 % columns;
        let row = i as u32 / columns;
        let (x0, y0) = (col * cw, row * ch);

        let cell = fit_into_cell(img, cw, ch);
        imageops::replace(&mut grid, &cell, x0 as i64, y0 as i64);

        let label = label_tile(*page_num);
        let margin = 10;
        let lx = x0 + cw.saturating_sub(label.width() + margin);
        let ly = y0 + ch.saturating_sub(label.height() + margin);
        imageops::replace(&mut grid, label.as_ref(), lx as i64, ly as i64);

        for inset in 0..2 {
            let rect = Rect::at((x0 + inset) as i32, (y0 + inset) as i32)
                .of_size(cw - 2 * inset, ch - 2 * inset);
            draw_hollow_rect_mut(&mut grid, rect, BLACK);
        }
    }

    info!(
        "Composed grid of {} pages → {}x{} px",
        pages.len(),
        grid.width(),
        grid.height()
    );
    grid
}

/// Downsample a page to fit the cell, preserving aspect ratio, centred on white.
fn fit_into_cell(img: &DynamicImage, cw: u32, ch: u32) -> RgbImage {
    let thumb = img.resize(cw, ch, FilterType::Lanczos3).to_rgb8();
    let mut cell = RgbImage::from_pixel(cw, ch, WHITE);
    let px = (cw.saturating_sub(thumb.width())) / 2;
    let py = (ch.saturating_sub(thumb.height())) / 2;
    imageops::replace(&mut cell, &thumb, px as i64, py as i64);
    cell
}

// ── Page labels ──────────────────────────────────────────────────────────

/// 5×7 bitmaps for the digits 0–9, one row per byte, MSB-first in the low 5 bits.
const DIGITS: [[u8; 7]; 10] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
];

/// Pixel size of one bitmap dot.
const LABEL_SCALE: u32 = 8;
/// White padding around the digits.
const LABEL_PADDING: u32 = 10;

static LABEL_CACHE: Lazy<Mutex<HashMap<usize, Arc<RgbImage>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Red page number on a white box, cached per page number.
fn label_tile(page_num: usize) -> Arc<RgbImage> {
    let mut cache = LABEL_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(
        cache
            .entry(page_num)
            .or_insert_with(|| Arc::new(draw_label(page_num))),
    )
}

fn draw_label(page_num: usize) -> RgbImage {
    let digits: Vec<usize> = page_num
        .to_string()
        .bytes()
        .map(|b| (b - b'0') as usize)
        .collect();

    let glyph_w = 5 * LABEL_SCALE;
    let glyph_h = 7 * LABEL_SCALE;
    let spacing = LABEL_SCALE;
    let width = 2 * LABEL_PADDING + digits.len() as u32 * (glyph_w + spacing) - spacing;
    let height = 2 * LABEL_PADDING + glyph_h;

    let mut tile = RgbImage::from_pixel(width, height, WHITE);
    for (i, d) in digits.iter().enumerate() {
        let gx = LABEL_PADDING + i as u32 * (glyph_w + spacing);
        for (row, bits) in DIGITS[*d].iter().enumerate() {
            for col in 0..5u32 {
                if bits & (0x10 >> col) != 0 {
                    let rect = Rect::at(
                        (gx + col * LABEL_SCALE) as i32,
                        (LABEL_PADDING + row as u32 * LABEL_SCALE) as i32,
                    )
                    .of_size(LABEL_SCALE, LABEL_SCALE);
                    draw_filled_rect_mut(&mut tile, rect, RED);
                }
            }
        }
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(batches: &[Batch], page_count: usize) {
        assert_eq!(batches.first().map(|b| b.start_page), Some(1));
        assert_eq!(batches.last().map(|b| b.end_page), Some(page_count));
        for pair in batches.windows(2) {
            assert_eq!(pair[0].end_page + 1, pair[1].start_page);
            assert_eq!(pair[0].number + 1, pair[1].number);
        }
        assert!(batches.iter().all(|b| b.start_page <= b.end_page));
    }

    #[test]
    fn thirteen_pages_in_batches_of_six() {
        let batches = plan_batches(13, 6);
        let ranges: Vec<_> = batches.iter().map(|b| (b.start_page, b.end_page)).collect();
        assert_eq!(ranges, vec![(1, 6), (7, 12), (13, 13)]);
        assert!(batches.iter().all(|b| b.status == BatchStatus::Pending));
    }

    #[test]
    fn batches_partition_for_many_sizes() {
        for page_count in 1..=40 {
            for batch_size in 1..=12 {
                let batches = plan_batches(page_count, batch_size);
                assert_partition(&batches, page_count);
                assert!(batches.iter().all(|b| b.len() <= batch_size));
                assert_eq!(batches.len(), page_count.div_ceil(batch_size));
            }
        }
    }

    #[test]
    fn empty_document_has_no_batches() {
        assert!(plan_batches(0, 6).is_empty());
    }

    #[test]
    fn grid_dimensions_follow_layout() {
        let layout = GridLayout {
            columns: 2,
            cell_width: 120,
            cell_height: 160,
            jpeg_quality: 85,
        };
        let pages: Vec<_> = (1..=5)
            .map(|p| (p, DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 80, Rgb([200, 200, 200])))))
            .collect();
        let grid = compose_grid(&pages, &layout);
        assert_eq!(grid.width(), 240);
        assert_eq!(grid.height(), 480);
    }

    #[test]
    fn label_tiles_are_cached() {
        let a = label_tile(42);
        let b = label_tile(42);
        assert!(Arc::ptr_eq(&a, &b));
        // two digits are wider than one
        assert!(label_tile(42).width() > label_tile(7).width());
    }

    #[test]
    fn label_contains_red_pixels() {
        let tile = draw_label(8);
        assert!(tile.pixels().any(|p| *p == RED));
        assert_eq!(*tile.get_pixel(0, 0), WHITE);
    }
}
