//! Result types returned by the classification entry points.
//!
//! [`ClassificationOutput`] is both the in-memory result and the on-disk
//! format: it serialises to the JSON written by
//! [`crate::classify::classify_to_file`] and printed by the CLI.

use crate::error::BatchError;
use crate::taxonomy::SectionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A labelled, inclusive page range of the corrected partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Section type, serialised under the key `name`.
    #[serde(rename = "name")]
    pub section_type: SectionType,
    pub start_page: usize,
    pub end_page: usize,
}

impl Section {
    pub fn new(section_type: SectionType, start_page: usize, end_page: usize) -> Self {
        Self {
            section_type,
            start_page,
            end_page,
        }
    }

    /// Number of pages covered.
    pub fn page_count(&self) -> usize {
        self.end_page + 1 - self.start_page
    }
}

/// The complete result of a classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutput {
    /// Sections partitioning `[1, total_pages]`, in page order.
    pub sections: Vec<Section>,
    /// Pages whose text could not be extracted, ascending.
    pub failed_pages: Vec<usize>,
    /// One entry per failed batch.
    pub failed_batches: Vec<BatchError>,
    /// Dropped candidates, unknown labels and boundary corrections.
    pub warnings: Vec<String>,
    /// Extracted text per page (only when `include_page_text` is set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_text: Option<BTreeMap<usize, String>>,
    pub stats: ClassificationStats,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStats {
    pub total_pages: usize,
    pub total_batches: usize,
    pub done_batches: usize,
    pub failed_batches: usize,
    /// Every model call made, retries included.
    pub model_requests: u64,
    pub structure_attempts: u32,
    /// Chunk count of the strategy that produced the sections.
    pub chunk_strategy: usize,
    pub compose_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub structure_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// PDF metadata returned by [`crate::classify::inspect`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_serialises_with_camel_case_keys() {
        let s = Section::new(SectionType::Bylaws, 21, 45);
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["name"], "By Laws");
        assert_eq!(json["startPage"], 21);
        assert_eq!(json["endPage"], 45);
        assert_eq!(s.page_count(), 25);
    }

    #[test]
    fn page_text_is_omitted_when_absent() {
        let out = ClassificationOutput {
            sections: vec![Section::new(SectionType::Unclassified, 1, 1)],
            failed_pages: vec![],
            failed_batches: vec![],
            warnings: vec![],
            page_text: None,
            stats: ClassificationStats::default(),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("pageText"));
        assert!(json.contains("\"failedPages\":[]"));
    }
}
