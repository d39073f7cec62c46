//! Response recovery: turn an untrusted structure-model reply into
//! validated section candidates.
//!
//! Parsing escalates through three stages and stops at the first that
//! yields a section array:
//!
//! | Stage | Input |
//! |-------|-------|
//! | [`RecoveryStage::Direct`] | the trimmed reply as-is |
//! | [`RecoveryStage::Unwrapped`] | fence contents, then the first balanced `{…}`/`[…]` span that parses |
//! | [`RecoveryStage::Repaired`] | comments dropped, single-quoted keys and trailing commas fixed, open strings and brackets closed |
//!
//! Only when all three fail is the reply rejected, and the error lists every
//! stage that was tried. Schema validation then drops individual bad
//! candidates (with a warning) rather than the whole reply.

use crate::taxonomy::SectionType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on brackets the repair stage will close.
pub const MAX_REPAIR_CLOSERS: usize = 64;

/// Maximum opening brackets tried when searching for a balanced span.
const MAX_SPAN_STARTS: usize = 32;

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("valid regex"));
static RE_SINGLE_QUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)'([^'"\n]+)'(\s*:)"#).expect("valid regex"));
static RE_TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));
static RE_DANGLING_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#",?\s*"[^"]*"\s*:\s*$"#).expect("valid regex"));

/// A parsing stage of the recovery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryStage {
    Direct,
    Unwrapped,
    Repaired,
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecoveryStage::Direct => "direct",
            RecoveryStage::Unwrapped => "unwrapped",
            RecoveryStage::Repaired => "repaired",
        })
    }
}

/// The reply could not be turned into any section candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unusable structure response (tried {}): {detail}", stage_list(.attempted))]
pub struct RecoveryError {
    pub attempted: Vec<RecoveryStage>,
    pub detail: String,
}

fn stage_list(stages: &[RecoveryStage]) -> String {
    stages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A model-proposed section, validated but not yet corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCandidate {
    pub section_type: SectionType,
    pub start_page: usize,
    pub end_page: usize,
    /// The label exactly as the model wrote it.
    pub label: String,
}

impl SectionCandidate {
    pub fn new(section_type: SectionType, start_page: usize, end_page: usize) -> Self {
        Self {
            section_type,
            start_page,
            end_page,
            label: section_type.display_name().to_string(),
        }
    }
}

/// Candidates recovered from one reply.
#[derive(Debug, Clone)]
pub struct Recovered {
    pub candidates: Vec<SectionCandidate>,
    /// Stage that produced the JSON.
    pub stage: RecoveryStage,
    /// Dropped candidates and unknown labels.
    pub warnings: Vec<String>,
}

/// Recover and validate the section candidates in `raw`.
///
/// Fails when no stage yields a section array, or when the array holds no
/// valid candidate; both are worth another model call.
pub fn parse_structure_response(raw: &str) -> Result<Recovered, RecoveryError> {
    let (value, stage, attempted) = recover_json(raw)?;
    let (candidates, warnings) = validate_candidates(&value);

    for w in &warnings {
        warn!("{}", w);
    }

    if candidates.is_empty() {
        return Err(RecoveryError {
            attempted,
            detail: format!("no valid sections ({} dropped)", warnings.len()),
        });
    }

    debug!(
        "Recovered {} candidates via {} stage",
        candidates.len(),
        stage
    );
    Ok(Recovered {
        candidates,
        stage,
        warnings,
    })
}

/// Run the three parsing stages, returning the first value that holds a
/// section array, the stage that produced it, and every stage tried.
pub fn recover_json(
    raw: &str,
) -> Result<(Value, RecoveryStage, Vec<RecoveryStage>), RecoveryError> {
    let mut attempted = Vec::with_capacity(3);
    let trimmed = raw.trim();

    // ── Stage 1: direct ──
    attempted.push(RecoveryStage::Direct);
    if let Some(v) = parse_sections_value(trimmed) {
        return Ok((v, RecoveryStage::Direct, attempted));
    }

    // ── Stage 2: unwrap fences and prose ──
    attempted.push(RecoveryStage::Unwrapped);
    let body = unwrap_fences(trimmed);
    if let Some(v) = parse_sections_value(body) {
        return Ok((v, RecoveryStage::Unwrapped, attempted));
    }
    for span in balanced_spans(body) {
        if let Some(v) = parse_sections_value(span) {
            return Ok((v, RecoveryStage::Unwrapped, attempted));
        }
    }

    // ── Stage 3: structural repair ──
    attempted.push(RecoveryStage::Repaired);
    let detail = match repair(body) {
        Ok(v) => return Ok((v, RecoveryStage::Repaired, attempted)),
        Err(reason) => reason,
    };

    Err(RecoveryError { attempted, detail })
}

/// Parse `s` and accept it only if it holds a section array.
fn parse_sections_value(s: &str) -> Option<Value> {
    let v: Value = serde_json::from_str(s).ok()?;
    if candidate_array(&v).is_some() {
        Some(v)
    } else {
        None
    }
}

/// `{"sections": [...]}` or a bare array.
fn candidate_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("sections"))
            .and_then(|(_, v)| v.as_array()),
        _ => None,
    }
}

/// Contents of the first code fence, or the text with stray back-ticks trimmed.
fn unwrap_fences(s: &str) -> &str {
    match RE_FENCE.captures(s).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => s.trim_matches('`').trim(),
    }
}

/// Balanced `{…}`/`[…]` spans, one per opening bracket, in order.
fn balanced_spans(s: &str) -> impl Iterator<Item = &str> {
    s.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .take(MAX_SPAN_STARTS)
        .filter_map(move |(i, _)| balanced_end(s, i).map(|end| &s[i..end]))
}

/// Byte index just past the bracket that closes the one at `start`.
fn balanced_end(s: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Bounded structural repair of a JSON-like body.
///
/// Each opening bracket is tried in turn, so a bracket in a prose preamble
/// does not hide the JSON that follows it.
fn repair(body: &str) -> Result<Value, String> {
    let s = strip_comments(body);
    let s = RE_SINGLE_QUOTED_KEY.replace_all(&s, "$1\"$2\"$3").into_owned();
    let s = RE_TRAILING_COMMA.replace_all(&s, "$1").into_owned();

    let mut detail = String::from("no JSON object or array in response");
    for (open, _) in s
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .take(MAX_SPAN_STARTS)
    {
        let candidate = match balanced_end(&s, open) {
            Some(end) => Ok(s[open..end].to_string()),
            None => close_truncated(&s[open..]),
        };
        match candidate {
            Ok(text) => match parse_sections_value(&text) {
                Some(v) => return Ok(v),
                None => detail = "no section array found".to_string(),
            },
            Err(reason) => detail = reason,
        }
    }
    Err(detail)
}

/// Close an unterminated string and every open bracket of a truncated body.
fn close_truncated(s: &str) -> Result<String, String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return Err("mismatched brackets".into());
                }
            }
            _ => {}
        }
    }

    if stack.len() > MAX_REPAIR_CLOSERS {
        return Err(format!(
            "{} unclosed brackets exceeds repair limit of {}",
            stack.len(),
            MAX_REPAIR_CLOSERS
        ));
    }

    let mut out = s.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    // A reply cut mid-pair leaves `"key":` or a trailing comma behind.
    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        } else if let Some(m) = RE_DANGLING_KEY.find(&out) {
            out.truncate(m.start());
        } else {
            break;
        }
    }

    out.extend(stack.iter().rev());
    Ok(out)
}

/// Drop `//` line comments and `/* */` block comments outside strings.
fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ── Schema validation ────────────────────────────────────────────────────

const LABEL_KEYS: [&str; 3] = ["name", "type", "section"];
const START_KEYS: [&str; 3] = ["startPage", "start_page", "start"];
const END_KEYS: [&str; 3] = ["endPage", "end_page", "end"];

/// Validate every entry of the section array, keeping the good ones.
///
/// Returns the surviving candidates in reply order and one warning per
/// dropped entry or unknown label.
pub fn validate_candidates(value: &Value) -> (Vec<SectionCandidate>, Vec<String>) {
    let mut candidates = Vec::new();
    let mut warnings = Vec::new();

    let Some(items) = candidate_array(value) else {
        warnings.push("response has no section array".to_string());
        return (candidates, warnings);
    };

    for (i, item) in items.iter().enumerate() {
        match validate_one(item) {
            Ok(candidate) => {
                if candidate.section_type == SectionType::Unclassified
                    && SectionType::from_label(&candidate.label).is_none()
                {
                    warnings.push(format!(
                        "section {}: unknown label {:?} mapped to Unclassified",
                        i + 1,
                        candidate.label
                    ));
                }
                candidates.push(candidate);
            }
            Err(reason) => warnings.push(format!("section {} dropped: {}", i + 1, reason)),
        }
    }

    (candidates, warnings)
}

fn validate_one(item: &Value) -> Result<SectionCandidate, String> {
    let obj = item.as_object().ok_or("not an object")?;

    let label = LABEL_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or("missing section name")?;

    let start = page_field(obj, &START_KEYS).ok_or("missing or non-integer startPage")?;
    let end = page_field(obj, &END_KEYS).ok_or("missing or non-integer endPage")?;

    if start < 1 {
        return Err(format!("startPage {} is below 1", start));
    }
    if end < start {
        return Err(format!("endPage {} precedes startPage {}", end, start));
    }

    Ok(SectionCandidate {
        section_type: SectionType::from_label_or_unclassified(label),
        start_page: start as usize,
        end_page: end as usize,
        label: label.to_string(),
    })
}

/// A page number given as an integer, a whole float, or a numeric string.
fn page_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<i64> {
    let v = keys.iter().find_map(|k| obj.get(*k))?;
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"{"sections":[{"name":"Articles & Amendments","startPage":1,"endPage":5},{"name":"By Laws","startPage":6,"endPage":10}]}"#;

    #[test]
    fn direct_parse() {
        let r = parse_structure_response(CLEAN).unwrap();
        assert_eq!(r.stage, RecoveryStage::Direct);
        assert_eq!(r.candidates.len(), 2);
        assert_eq!(r.candidates[1].section_type, SectionType::Bylaws);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn fenced_reply_is_unwrapped() {
        let raw = format!("Here is the structure:\n```json\n{}\n```\nLet me know!", CLEAN);
        let r = parse_structure_response(&raw).unwrap();
        assert_eq!(r.stage, RecoveryStage::Unwrapped);
        assert_eq!(r.candidates.len(), 2);
    }

    #[test]
    fn prose_around_json_is_unwrapped() {
        let raw = format!("Based on [the text], the sections are {} as requested.", CLEAN);
        let r = parse_structure_response(&raw).unwrap();
        assert_eq!(r.stage, RecoveryStage::Unwrapped);
    }

    #[test]
    fn braces_inside_strings_do_not_break_balance() {
        let raw = r#"Result: {"sections":[{"name":"By Laws }{","startPage":1,"endPage":2}]} done"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.candidates[0].label, "By Laws }{");
    }

    #[test]
    fn trailing_commas_and_comments_are_repaired() {
        let raw = r#"{
            // first section
            'sections': [
                {"name": "By Laws", "startPage": 1, "endPage": 4,},
                /* registers */
                {"name": "Directors Register", "startPage": 5, "endPage": 6},
            ],
        }"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.stage, RecoveryStage::Repaired);
        assert_eq!(r.candidates.len(), 2);
        assert_eq!(r.candidates[1].section_type, SectionType::DirectorsRegister);
    }

    #[test]
    fn truncated_reply_is_closed() {
        let raw = r#"{"sections":[{"name":"By Laws","startPage":1,"endPage":4},{"name":"Resolutions & Minutes","startPage":5,"endPage":"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.stage, RecoveryStage::Repaired);
        // the cut-off second entry lacks endPage and is dropped
        assert_eq!(r.candidates.len(), 1);
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn truncated_reply_after_bracketed_prose_is_closed() {
        let raw = r#"Based on the text [pages 1-13], the sections are: {"sections":[{"name":"By Laws","startPage":1,"endPage":4},{"name":"Resolutions & Minutes","startPage":5,"endPage":"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.stage, RecoveryStage::Repaired);
        assert_eq!(r.candidates, vec![SectionCandidate::new(SectionType::Bylaws, 1, 4)]);
    }

    #[test]
    fn truncated_inside_string_is_closed() {
        let raw = r#"[{"name":"By Laws","startPage":1,"endPage":4},{"name":"Share"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.candidates.len(), 1);
    }

    #[test]
    fn unrecoverable_reply_lists_all_stages() {
        let err = parse_structure_response("I could not determine the sections.").unwrap_err();
        assert_eq!(
            err.attempted,
            vec![
                RecoveryStage::Direct,
                RecoveryStage::Unwrapped,
                RecoveryStage::Repaired
            ]
        );
        assert!(err.to_string().contains("direct, unwrapped, repaired"));
    }

    #[test]
    fn too_many_open_brackets_gives_up() {
        let raw = "[".repeat(MAX_REPAIR_CLOSERS + 1);
        let err = parse_structure_response(&raw).unwrap_err();
        assert!(err.detail.contains("repair limit"), "got: {}", err.detail);
    }

    #[test]
    fn one_invalid_among_five_leaves_four() {
        let raw = r#"{"sections":[
            {"name":"Articles & Amendments","startPage":1,"endPage":3},
            {"name":"By Laws","startPage":4,"endPage":2},
            {"name":"Resolutions & Minutes","startPage":5,"endPage":8},
            {"name":"Directors Register","startPage":9,"endPage":9},
            {"name":"Officers Register","startPage":10,"endPage":10}
        ]}"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.candidates.len(), 4);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("section 2 dropped"));
    }

    #[test]
    fn lenient_fields_are_accepted() {
        let raw = r#"[{"type":"bylaws","start_page":"2","end_page":3.0}]"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(
            r.candidates[0],
            SectionCandidate {
                section_type: SectionType::Bylaws,
                start_page: 2,
                end_page: 3,
                label: "bylaws".into(),
            }
        );
    }

    #[test]
    fn unknown_label_becomes_unclassified_with_warning() {
        let raw = r#"[{"name":"Minute Book Index","startPage":1,"endPage":2}]"#;
        let r = parse_structure_response(raw).unwrap();
        assert_eq!(r.candidates[0].section_type, SectionType::Unclassified);
        assert!(r.warnings[0].contains("unknown label"));
    }

    #[test]
    fn zero_valid_candidates_is_an_error() {
        let raw = r#"{"sections":[{"name":"By Laws","startPage":0,"endPage":3}]}"#;
        let err = parse_structure_response(raw).unwrap_err();
        assert!(err.detail.contains("no valid sections"));
    }
}
