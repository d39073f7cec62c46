//! Post-processing: deterministic cleanup of extracted page text.
//!
//! Vision models decorate their answers even when told not to: code fences
//! around the whole reply, bold markers around headings, Windows line
//! endings, zero-width characters copied off the scan. None of that helps the
//! structure prompt and some of it (a stray fence) can confuse it, so every
//! page text passes through [`clean_page_text`] before aggregation.
//!
//! ## Rule Order
//!
//! Line endings are normalised before any line-based rule, and fences are
//! stripped before emphasis so a fenced reply is unwrapped first.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page's extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Remove markdown emphasis markers (`**`, `__`)
/// 5. Trim trailing whitespace per line
/// 6. Collapse runs of blank lines into one
/// 7. Trim the whole text
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = remove_invisible_chars(&s);
    let s = remove_emphasis(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*?)\n?```$").expect("valid regex"));

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Remove emphasis markers ─────────────────────────────────────────

static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__").expect("valid regex"));

fn remove_emphasis(input: &str) -> String {
    RE_EMPHASIS.replace_all(input, "").into_owned()
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse blank lines ────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```text\nBY-LAW NO. 1\n```"), "BY-LAW NO. 1");
        assert_eq!(strip_code_fences("```\nARTICLES\n```"), "ARTICLES");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("Register of Directors"), "Register of Directors");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("RESO\u{200B}LUTION\u{FEFF}"), "RESOLUTION");
    }

    #[test]
    fn test_remove_emphasis() {
        assert_eq!(remove_emphasis("**SHAREHOLDERS REGISTER**"), "SHAREHOLDERS REGISTER");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_clean_page_text_full_pipeline() {
        let raw = "```\r\n**BY-LAW NO. 1**   \r\n\r\n\r\n\r\nA by-law relating generally\u{00AD}\r\n```";
        assert_eq!(
            clean_page_text(raw),
            "BY-LAW NO. 1\n\nA by-law relating generally"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_page_text("  \n \n"), "");
    }
}
