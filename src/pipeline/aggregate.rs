//! Text aggregation: per-page texts → one document text with page markers.
//!
//! Every page gets a `=== PAGE N ===` header, including pages whose batch
//! failed: those carry an explicit placeholder instead of disappearing, so
//! the structure model never miscounts the pages after a hole.

use crate::pipeline::postprocess::clean_page_text;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^=== PAGE (\d+) ===$").expect("valid regex"));

/// Header placed before each page's text.
pub fn page_marker(page: usize) -> String {
    format!("=== PAGE {} ===", page)
}

/// Stand-in text for a page whose extraction failed.
pub fn unavailable_placeholder(page: usize) -> String {
    format!("[PAGE {}: TEXT UNAVAILABLE - EXTRACTION FAILED]", page)
}

/// Concatenate page texts for pages `1..=page_count` in ascending order.
///
/// Texts are cleaned with [`clean_page_text`]; pages absent from `texts` get
/// [`unavailable_placeholder`].
pub fn aggregate_text(texts: &BTreeMap<usize, String>, page_count: usize) -> String {
    (1..=page_count)
        .map(|page| {
            let body = match texts.get(&page) {
                Some(text) => clean_page_text(text),
                None => unavailable_placeholder(page),
            };
            format!("{}\n{}", page_marker(page), body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A contiguous run of whole pages of the aggregated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub first_page: usize,
    pub last_page: usize,
    pub text: String,
}

/// Split aggregated text into at most `n` chunks of whole pages.
///
/// Pages are spread as evenly as possible, earlier chunks taking the extra
/// page. Text without any page marker comes back as a single chunk.
pub fn split_into_chunks(text: &str, n: usize) -> Vec<TextChunk> {
    let markers: Vec<(usize, usize)> = RE_PAGE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let page = caps[1].parse().ok()?;
            Some((start, page))
        })
        .collect();

    if markers.is_empty() {
        return vec![TextChunk {
            first_page: 1,
            last_page: 1,
            text: text.to_string(),
        }];
    }

    let n = n.clamp(1, markers.len());
    let base = markers.len() / n;
    let extra = markers.len() % n;

    let mut chunks = Vec::with_capacity(n);
    let mut idx = 0;
    for k in 0..n {
        let size = base + usize::from(k < extra);
        let first = idx;
        let last = idx + size - 1;
        let byte_start = if k == 0 { 0 } else { markers[first].0 };
        let byte_end = markers.get(last + 1).map_or(text.len(), |m| m.0);
        chunks.push(TextChunk {
            first_page: markers[first].1,
            last_page: markers[last].1,
            text: text[byte_start..byte_end].trim_end().to_string(),
        });
        idx += size;
    }
    chunks
}
