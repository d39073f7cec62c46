//! Boundary correction: force model-proposed ranges into a partition of
//! `[1, page_count]`.
//!
//! The structure model is asked for non-overlapping, gap-free sections and
//! regularly returns neither. [`correct_boundaries`] is a pure function that
//! accepts any candidate list, however contradictory, and returns sections
//! that are sorted, contiguous, non-empty and cover every page exactly once.
//!
//! ## Algorithm
//!
//! ```text
//! clamp → stable sort by start → drop duplicate ranges
//!       → sweep: resolve each candidate against the last placed section
//!       → fill gaps → drop empties
//! ```
//!
//! The sweep keeps the remaining candidates in a queue ordered by start
//! page. When a candidate sits wholly inside the last placed section, that
//! section is cut before it and its remainder goes back into the queue as a
//! new candidate, so a one-page register proposed inside a long resolutions
//! section splits it instead of being swallowed.

use crate::config::{GapPolicy, OverlapPolicy};
use crate::output::Section;
use crate::pipeline::recovery::SectionCandidate;
use crate::taxonomy::SectionType;
use std::collections::VecDeque;
use tracing::debug;

/// Corrected sections plus a note for every change made to the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub sections: Vec<Section>,
    pub notes: Vec<String>,
}

/// Correct `candidates` into a partition of `[1, page_count]`.
///
/// `page_count` 0 yields no sections.
pub fn correct_boundaries(
    candidates: &[SectionCandidate],
    page_count: usize,
    overlap: OverlapPolicy,
    gap: GapPolicy,
) -> Correction {
    let mut notes = Vec::new();
    if page_count == 0 {
        return Correction {
            sections: Vec::new(),
            notes,
        };
    }

    // ── Step 1: clamp ──
    let mut ranges: Vec<Section> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if c.start_page > page_count {
            notes.push(format!(
                "dropped {} {}-{}: starts after the last page ({})",
                c.section_type, c.start_page, c.end_page, page_count
            ));
            continue;
        }
        let start = c.start_page.max(1);
        let end = c.end_page.clamp(start, page_count);
        if end != c.end_page || start != c.start_page {
            notes.push(format!(
                "clamped {} {}-{} to {}-{}",
                c.section_type, c.start_page, c.end_page, start, end
            ));
        }
        ranges.push(Section::new(c.section_type, start, end));
    }

    // ── Step 2: stable sort, drop duplicate ranges ──
    ranges.sort_by_key(|s| s.start_page);
    let mut queue: VecDeque<Section> = VecDeque::with_capacity(ranges.len());
    for s in ranges {
        let duplicate = queue
            .iter()
            .any(|q| q.start_page == s.start_page && q.end_page == s.end_page);
        if duplicate {
            notes.push(format!(
                "dropped duplicate {} {}-{}",
                s.section_type, s.start_page, s.end_page
            ));
        } else {
            queue.push_back(s);
        }
    }

    // ── Step 3: resolve overlaps ──
    let placed = resolve_overlaps(queue, overlap, &mut notes);

    // ── Step 4: fill gaps ──
    let filled = fill_gaps(placed, page_count, gap, &mut notes);

    // ── Step 5: drop empties ──
    let sections: Vec<Section> = filled
        .into_iter()
        .filter(|s| s.start_page <= s.end_page)
        .collect();

    debug_assert!(is_partition(&sections, page_count));
    debug!(
        "Corrected {} candidates into {} sections ({} notes)",
        candidates.len(),
        sections.len(),
        notes.len()
    );

    Correction { sections, notes }
}

fn resolve_overlaps(
    mut queue: VecDeque<Section>,
    policy: OverlapPolicy,
    notes: &mut Vec<String>,
) -> Vec<Section> {
    let mut placed: Vec<Section> = Vec::with_capacity(queue.len());

    while let Some(mut next) = queue.pop_front() {
        let Some(prev) = placed.last_mut() else {
            placed.push(next);
            continue;
        };

        if next.start_page > prev.end_page {
            placed.push(next);
            continue;
        }

        // An earlier overlap moved `prev` forward past where `next` starts;
        // pages before `prev` are already settled.
        if next.start_page < prev.start_page {
            if next.end_page < prev.start_page {
                notes.push(format!(
                    "dropped {} {}-{}: pages already assigned",
                    next.section_type, next.start_page, next.end_page
                ));
                continue;
            }
            next.start_page = prev.start_page;
        }

        if next.end_page <= prev.end_page {
            // Nested: `next` lies within `prev`.
            let prev_end = prev.end_page;
            if next.start_page == prev.start_page && next.end_page == prev_end {
                notes.push(format!(
                    "dropped {} {}-{}: same pages as {}",
                    next.section_type, next.start_page, next.end_page, prev.section_type
                ));
                continue;
            }

            notes.push(format!(
                "split {} {}-{} around nested {} {}-{}",
                prev.section_type,
                prev.start_page,
                prev_end,
                next.section_type,
                next.start_page,
                next.end_page
            ));
            let prev_type = prev.section_type;
            if next.start_page == prev.start_page {
                placed.pop();
            } else {
                prev.end_page = next.start_page - 1;
            }
            if next.end_page < prev_end {
                requeue(
                    &mut queue,
                    Section::new(prev_type, next.end_page + 1, prev_end),
                );
            }
            placed.push(next);
            continue;
        }

        // Partial overlap: prev.start ≤ next.start ≤ prev.end < next.end.
        let (lo, hi) = (next.start_page, prev.end_page);
        match policy {
            OverlapPolicy::Midpoint => {
                let mid = (lo + hi).div_ceil(2);
                prev.end_page = mid;
                next.start_page = mid + 1;
            }
            OverlapPolicy::EarlierWins => {
                next.start_page = hi + 1;
            }
            OverlapPolicy::LaterWins => {
                if lo == prev.start_page {
                    notes.push(format!(
                        "dropped {} {}-{}: fully covered by {}",
                        prev.section_type, prev.start_page, prev.end_page, next.section_type
                    ));
                    placed.pop();
                    placed.push(next);
                    continue;
                }
                prev.end_page = lo - 1;
            }
        }
        notes.push(format!(
            "overlap {}-{} resolved: {} ends at {}, {} starts at {}",
            lo, hi, prev.section_type, prev.end_page, next.section_type, next.start_page
        ));
        placed.push(next);
    }

    placed
}

/// Insert `section` after every queued section starting at or before it.
fn requeue(queue: &mut VecDeque<Section>, section: Section) {
    let pos = queue
        .iter()
        .position(|q| q.start_page > section.start_page)
        .unwrap_or(queue.len());
    queue.insert(pos, section);
}

fn fill_gaps(
    placed: Vec<Section>,
    page_count: usize,
    policy: GapPolicy,
    notes: &mut Vec<String>,
) -> Vec<Section> {
    let mut out: Vec<Section> = Vec::with_capacity(placed.len() + 2);
    let mut cursor = 1;

    for s in placed {
        if s.start_page > cursor {
            fill(&mut out, cursor, s.start_page - 1, policy, notes);
        }
        cursor = s.end_page + 1;
        out.push(s);
    }
    if cursor <= page_count {
        fill(&mut out, cursor, page_count, policy, notes);
    }
    out
}

fn fill(out: &mut Vec<Section>, from: usize, to: usize, policy: GapPolicy, notes: &mut Vec<String>) {
    match (policy, out.last_mut()) {
        (GapPolicy::ExtendPreceding, Some(prev)) => {
            notes.push(format!(
                "gap {}-{} absorbed by {}",
                from, to, prev.section_type
            ));
            prev.end_page = to;
        }
        _ => {
            notes.push(format!("gap {}-{} marked Unclassified", from, to));
            out.push(Section::new(SectionType::Unclassified, from, to));
        }
    }
}

/// Whether `sections` partition `[1, page_count]`: sorted, contiguous,
/// non-empty, first starting at 1 and last ending at `page_count`.
pub fn is_partition(sections: &[Section], page_count: usize) -> bool {
    if page_count == 0 {
        return sections.is_empty();
    }
    let (Some(first), Some(last)) = (sections.first(), sections.last()) else {
        return false;
    };
    first.start_page == 1
        && last.end_page == page_count
        && sections.iter().all(|s| s.start_page <= s.end_page)
        && sections
            .windows(2)
            .all(|w| w[0].end_page + 1 == w[1].start_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use SectionType::*;

    fn cand(t: SectionType, s: usize, e: usize) -> SectionCandidate {
        SectionCandidate::new(t, s, e)
    }

    fn ranges(c: &Correction) -> Vec<(SectionType, usize, usize)> {
        c.sections
            .iter()
            .map(|s| (s.section_type, s.start_page, s.end_page))
            .collect()
    }

    fn default_correct(c: &[SectionCandidate], pages: usize) -> Correction {
        correct_boundaries(c, pages, OverlapPolicy::Midpoint, GapPolicy::Unclassified)
    }

    #[test]
    fn thirteen_page_scenario() {
        let c = [
            cand(ArticlesAndAmendments, 1, 5),
            cand(Bylaws, 4, 10),
            cand(TransfersRegister, 12, 13),
        ];
        let out = default_correct(&c, 13);
        assert_eq!(
            ranges(&out),
            vec![
                (ArticlesAndAmendments, 1, 5),
                (Bylaws, 6, 10),
                (Unclassified, 11, 11),
                (TransfersRegister, 12, 13),
            ]
        );
        assert_eq!(out.notes.len(), 2);
    }

    #[test]
    fn valid_partition_is_unchanged() {
        let c = [cand(Bylaws, 1, 4), cand(Resolutions, 5, 9), cand(DirectorsRegister, 10, 10)];
        let out = default_correct(&c, 10);
        assert_eq!(
            ranges(&out),
            vec![(Bylaws, 1, 4), (Resolutions, 5, 9), (DirectorsRegister, 10, 10)]
        );
        assert!(out.notes.is_empty());
    }

    #[test]
    fn no_candidates_is_one_unclassified_section() {
        let out = default_correct(&[], 7);
        assert_eq!(ranges(&out), vec![(Unclassified, 1, 7)]);
    }

    #[test]
    fn leading_gap_is_always_unclassified() {
        let c = [cand(Bylaws, 3, 6)];
        let out = correct_boundaries(&c, 6, OverlapPolicy::Midpoint, GapPolicy::ExtendPreceding);
        assert_eq!(ranges(&out), vec![(Unclassified, 1, 2), (Bylaws, 3, 6)]);
    }

    #[test]
    fn extend_preceding_absorbs_interior_and_trailing_gaps() {
        let c = [cand(Bylaws, 1, 3), cand(Resolutions, 6, 8)];
        let out = correct_boundaries(&c, 10, OverlapPolicy::Midpoint, GapPolicy::ExtendPreceding);
        assert_eq!(ranges(&out), vec![(Bylaws, 1, 5), (Resolutions, 6, 10)]);
    }

    #[test]
    fn odd_overlap_midpoint_favours_earlier() {
        let c = [cand(Bylaws, 1, 7), cand(Resolutions, 5, 12)];
        let out = default_correct(&c, 12);
        // overlap 5-7, midpoint 6
        assert_eq!(ranges(&out), vec![(Bylaws, 1, 6), (Resolutions, 7, 12)]);
    }

    #[test]
    fn overlap_policies() {
        let c = [cand(Bylaws, 1, 7), cand(Resolutions, 5, 12)];
        let earlier = correct_boundaries(&c, 12, OverlapPolicy::EarlierWins, GapPolicy::Unclassified);
        assert_eq!(ranges(&earlier), vec![(Bylaws, 1, 7), (Resolutions, 8, 12)]);
        let later = correct_boundaries(&c, 12, OverlapPolicy::LaterWins, GapPolicy::Unclassified);
        assert_eq!(ranges(&later), vec![(Bylaws, 1, 4), (Resolutions, 5, 12)]);
    }

    #[test]
    fn later_wins_with_shared_start_drops_earlier() {
        let c = [cand(Bylaws, 1, 3), cand(Resolutions, 1, 6)];
        let out = correct_boundaries(&c, 6, OverlapPolicy::LaterWins, GapPolicy::Unclassified);
        assert_eq!(ranges(&out), vec![(Resolutions, 1, 6)]);
    }

    #[test]
    fn nested_candidate_splits_the_outer_section() {
        let c = [cand(Resolutions, 1, 20), cand(DirectorsRegister, 8, 9)];
        let out = default_correct(&c, 20);
        assert_eq!(
            ranges(&out),
            vec![
                (Resolutions, 1, 7),
                (DirectorsRegister, 8, 9),
                (Resolutions, 10, 20)
            ]
        );
    }

    #[test]
    fn nested_tail_meets_later_candidates() {
        let c = [
            cand(Resolutions, 1, 20),
            cand(DirectorsRegister, 8, 9),
            cand(OfficersRegister, 15, 25),
        ];
        let out = default_correct(&c, 25);
        assert_eq!(
            ranges(&out),
            vec![
                (Resolutions, 1, 7),
                (DirectorsRegister, 8, 9),
                (Resolutions, 10, 18),
                (OfficersRegister, 19, 25),
            ]
        );
    }

    #[test]
    fn candidate_behind_a_shifted_section_is_clipped() {
        let c = [cand(Bylaws, 1, 5), cand(Resolutions, 4, 10), cand(DirectorsRegister, 5, 7)];
        let out = default_correct(&c, 10);
        assert_eq!(
            ranges(&out),
            vec![(Bylaws, 1, 5), (DirectorsRegister, 6, 7), (Resolutions, 8, 10)]
        );
    }

    #[test]
    fn duplicate_ranges_keep_the_first() {
        let c = [cand(Bylaws, 1, 4), cand(Resolutions, 1, 4), cand(Bylaws, 5, 6)];
        let out = default_correct(&c, 6);
        assert_eq!(ranges(&out), vec![(Bylaws, 1, 4), (Bylaws, 5, 6)]);
        assert!(out.notes[0].contains("duplicate"));
    }

    #[test]
    fn out_of_range_candidates_are_clamped_or_dropped() {
        let c = [cand(Bylaws, 1, 40), cand(Resolutions, 50, 60)];
        let out = default_correct(&c, 10);
        assert_eq!(ranges(&out), vec![(Bylaws, 1, 10)]);
        assert_eq!(out.notes.len(), 2);
    }

    #[test]
    fn single_page_document() {
        let out = default_correct(&[cand(SignaturePages, 1, 1)], 1);
        assert_eq!(ranges(&out), vec![(SignaturePages, 1, 1)]);
    }

    #[test]
    fn is_partition_detects_defects() {
        let ok = [Section::new(Bylaws, 1, 3), Section::new(Resolutions, 4, 5)];
        assert!(is_partition(&ok, 5));
        assert!(!is_partition(&ok, 6));
        let gap = [Section::new(Bylaws, 1, 2), Section::new(Resolutions, 4, 5)];
        assert!(!is_partition(&gap, 5));
        let overlap = [Section::new(Bylaws, 1, 3), Section::new(Resolutions, 3, 5)];
        assert!(!is_partition(&overlap, 5));
        assert!(!is_partition(&[], 5));
    }

    #[test]
    fn random_candidates_always_partition() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let policies = [
            (OverlapPolicy::Midpoint, GapPolicy::Unclassified),
            (OverlapPolicy::EarlierWins, GapPolicy::ExtendPreceding),
            (OverlapPolicy::LaterWins, GapPolicy::Unclassified),
            (OverlapPolicy::Midpoint, GapPolicy::ExtendPreceding),
        ];
        for _ in 0..2000 {
            let pages = rng.random_range(1..=60);
            let n = rng.random_range(0..=12);
            let c: Vec<_> = (0..n)
                .map(|_| {
                    let s = rng.random_range(1..=pages + 5);
                    let e = s + rng.random_range(0..=20);
                    let t = SectionType::CLASSIFIABLE[rng.random_range(0..10)];
                    cand(t, s, e)
                })
                .collect();
            for (overlap, gap) in policies {
                let out = correct_boundaries(&c, pages, overlap, gap);
                assert!(
                    is_partition(&out.sections, pages),
                    "not a partition for {c:?} ({pages} pages, {overlap:?}/{gap:?}): {:?}",
                    out.sections
                );
            }
        }
    }
}
