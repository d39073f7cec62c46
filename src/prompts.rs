//! Prompt templates for page-text extraction and structure identification.
//!
//! Every prompt lives here so that prompt changes never touch retry,
//! parsing or correction logic, and so tests can inspect prompts directly.
//!
//! The extraction prompt fixes the response format (`Page N: text`) that
//! [`crate::pipeline::extract::parse_page_texts`] relies on; the structure
//! prompts fix the JSON shape that [`crate::pipeline::recovery`] validates.

use crate::taxonomy::SectionType;

/// Default prompt for reading one batch grid.
///
/// Placeholders: `{num_pages}`, `{start_page}`, `{end_page}`, `{columns}`.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are examining a grid of scanned page previews from a corporate minute book. The grid shows {num_pages} pages, from page {start_page} through page {end_page}.

VISUAL LAYOUT:
The image is a {columns}-column grid read left to right, top to bottom. Each cell holds one page with its page number printed in red in the bottom-right corner.

YOUR TASK:
For every page in the range, transcribe the most prominent text that reveals what kind of content the page holds:
- Headers and titles at the top of the page
- Section names or category labels
- Legal document identifiers such as "BY-LAW", "ARTICLES", "RESOLUTION", "REGISTER"
- Any other text that helps classify the page

OUTPUT FORMAT:
One entry per page, in page order, exactly like this:

Page <number>: <main heading and a short description>

RULES:
1. Provide an entry for every page from {start_page} to {end_page}; do not skip any
2. Use the red numbers to identify pages
3. Keep each entry to one or two lines
4. Prefer headings over body text
5. If a page is blank, write "Page <number>: (blank)"
6. Output nothing but the entries"#;

/// Single-pass structure prompt.
///
/// Placeholders: `{total_pages}`, `{section_list}`, `{text}`.
pub const STRUCTURE_PROMPT_SINGLE: &str = r#"You are analysing a corporate minute book with {total_pages} pages. Using the extracted page text below, determine where each section begins and ends.

SECTION TYPES (typical order):
{section_list}

EXTRACTED TEXT (each page starts with a "=== PAGE N ===" marker):
{text}

CONSTRAINTS:
- The document runs continuously from page 1 to page {total_pages}
- Every page belongs to exactly one section
- Sections must not overlap: if a section ends on page 50 the next starts on page 51
- Sections must not leave gaps
- Do not omit short sections such as registers, which are often only 1-2 pages

RESPONSE FORMAT:
Return only a JSON object with this exact structure:

{
  "sections": [
    {"name": "Articles & Amendments", "startPage": 1, "endPage": 20},
    {"name": "By Laws", "startPage": 21, "endPage": 45}
  ]
}

Use the exact section names listed above. Before answering, check that the first section starts at page 1, the last ends at page {total_pages}, and consecutive sections neither overlap nor leave gaps."#;

/// Multi-part structure prompt used by the chunked strategies.
///
/// Placeholders: `{part}`, `{total_parts}`, `{total_pages}`,
/// `{section_list}`, `{context}`, `{instruction}`, `{text}`.
pub const STRUCTURE_PROMPT_MULTI: &str = r#"You are working on part {part} of {total_parts} of a minute book analysis. The complete document has {total_pages} pages.

SECTION TYPES (typical order):
{section_list}

{context}

TEXT FOR THIS PART (each page starts with a "=== PAGE N ===" marker):
{text}

YOUR TASK:
{instruction}

CONSTRAINTS:
- The final list starts at page 1 and ends at page {total_pages}
- Sections must not overlap and must not leave gaps
- Do not omit short sections such as registers (often 1-3 pages)
- Look for indicators like "REGISTER OF", "BY-LAW", "ARTICLES", "RESOLUTION"

RESPONSE FORMAT:
Return only a JSON object with the COMPLETE list of sections identified so far:

{
  "sections": [
    {"name": "Section Name", "startPage": 1, "endPage": 10}
  ]
}

Use the exact section names listed above."#;

/// Render the extraction prompt for one batch.
pub fn extraction_prompt(template: &str, start_page: usize, end_page: usize, columns: u32) -> String {
    template
        .replace("{num_pages}", &(end_page - start_page + 1).to_string())
        .replace("{start_page}", &start_page.to_string())
        .replace("{end_page}", &end_page.to_string())
        .replace("{columns}", &columns.to_string())
}

/// Render the single-pass structure prompt.
pub fn structure_prompt_single(text: &str, total_pages: usize) -> String {
    STRUCTURE_PROMPT_SINGLE
        .replace("{total_pages}", &total_pages.to_string())
        .replace("{section_list}", &SectionType::prompt_list())
        .replace("{text}", text)
}

/// Render one part of the multi-part structure prompt.
///
/// `previous` is the JSON of the sections identified by earlier parts, or
/// `None` for the first part.
pub fn structure_prompt_multi(
    text: &str,
    part: usize,
    total_parts: usize,
    total_pages: usize,
    previous: Option<&str>,
) -> String {
    let (context, instruction) = match previous {
        Some(json) => (
            format!("SECTIONS IDENTIFIED SO FAR:\n{json}"),
            "Continue the section list: update endPage values for sections that continue into this part, add new sections as they appear, and return the COMPLETE updated list.",
        ),
        None => (
            "This is the first part of the analysis.".to_string(),
            "Begin identifying sections from the text below.",
        ),
    };

    // Substitute {text} last so page text containing braces is never rewritten.
    STRUCTURE_PROMPT_MULTI
        .replace("{part}", &part.to_string())
        .replace("{total_parts}", &total_parts.to_string())
        .replace("{total_pages}", &total_pages.to_string())
        .replace("{section_list}", &SectionType::prompt_list())
        .replace("{context}", &context)
        .replace("{instruction}", instruction)
        .replace("{text}", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_fills_page_range() {
        let p = extraction_prompt(DEFAULT_EXTRACTION_PROMPT, 7, 12, 2);
        assert!(p.contains("The grid shows 6 pages, from page 7 through page 12"));
        assert!(p.contains("2-column grid"));
        assert!(!p.contains("{start_page}") && !p.contains("{num_pages}"));
    }

    #[test]
    fn single_prompt_lists_taxonomy_and_page_count() {
        let p = structure_prompt_single("=== PAGE 1 ===\nARTICLES", 13);
        assert!(p.contains("minute book with 13 pages"));
        assert!(p.contains("- Directors Register"));
        assert!(p.contains("must not overlap"));
        assert!(p.contains("must not leave gaps"));
        assert!(p.contains("=== PAGE 1 ===\nARTICLES"));
    }

    #[test]
    fn multi_prompt_carries_previous_sections() {
        let first = structure_prompt_multi("text", 1, 3, 100, None);
        assert!(first.contains("first part of the analysis"));

        let later = structure_prompt_multi(
            "text",
            2,
            3,
            100,
            Some(r#"{"sections":[{"name":"By Laws","startPage":1,"endPage":9}]}"#),
        );
        assert!(later.contains("part 2 of 3"));
        assert!(later.contains("SECTIONS IDENTIFIED SO FAR"));
        assert!(later.contains("\"By Laws\""));
    }
}
