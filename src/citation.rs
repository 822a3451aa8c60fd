//! Citation renumbering and relocation.
//!
//! The generator is shown sources numbered in retrieval order, but its
//! answer mentions them in its own order. This module remaps every
//! bracketed marker `[k]` onto a canonical numbering defined by first
//! appearance in the answer itself, then relocates markers to paragraph
//! ends: each body paragraph keeps at most `max_refs_per_paragraph`
//! distinct trailing citations, and the final (summary) paragraph collects
//! one marker for every source assigned to a body paragraph plus any
//! source never mentioned at all, so every presented source is cited
//! somewhere.
//!
//! The caller reorders its document list with [`NormalizedAnswer::canonical_order`]
//! so position 1..N in the list is exactly what the text cites.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::CitationConfig;

static REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());
static PARA_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static TRAILING_DOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+\.$").unwrap());

/// Result of one normalization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAnswer {
    /// Paragraph-rejoined answer text with remapped, relocated citations.
    pub text: String,
    /// Zero-based presentation indices in canonical order:
    /// `canonical_order[new] = old`. Always a permutation of `0..n_sources`.
    pub canonical_order: Vec<usize>,
}

/// Normalize a raw generated answer against `n_sources` presented sources.
pub fn normalize_answer(raw: &str, n_sources: usize, config: &CitationConfig) -> NormalizedAnswer {
    let order = first_appearance_order(raw, n_sources);

    let mut old_to_new = vec![0usize; n_sources + 1];
    for (new_idx, &old) in order.iter().enumerate() {
        old_to_new[old] = new_idx + 1;
    }

    let renumbered = renumber(raw, &old_to_new);
    let text = redistribute(&renumbered, n_sources, config.max_refs_per_paragraph);

    NormalizedAnswer {
        text,
        canonical_order: order.iter().map(|&old| old - 1).collect(),
    }
}

/// Remove every citation marker; used when an answer must carry no
/// citations at all.
pub fn strip_markers(text: &str) -> String {
    REF_RE.replace_all(text, "").into_owned()
}

/// Distinct in-range citation numbers (1-based) in order of first
/// appearance, with never-mentioned sources appended in their original
/// relative order so every source still receives a final number.
fn first_appearance_order(text: &str, n_sources: usize) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::new();
    for caps in REF_RE.captures_iter(text) {
        if let Some(num) = parse_ref(&caps, n_sources) {
            if !order.contains(&num) {
                order.push(num);
            }
        }
    }
    for num in 1..=n_sources {
        if !order.contains(&num) {
            order.push(num);
        }
    }
    order
}

/// Rewrite every `[k]` through the old-to-new mapping. Out-of-range
/// markers are left untouched here; the relocation pass strips them from
/// prose anyway.
fn renumber(text: &str, old_to_new: &[usize]) -> String {
    REF_RE
        .replace_all(text, |caps: &regex::Captures| {
            match caps[1].parse::<usize>() {
                Ok(old) if old >= 1 && old < old_to_new.len() && old_to_new[old] != 0 => {
                    format!("[{}]", old_to_new[old])
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Relocate citations to paragraph ends.
///
/// A trailing paragraph consisting solely of markers (no alphabetic
/// content) is a stray artifact and is dropped. Every other paragraph has
/// all inline markers stripped from its prose; body paragraphs re-append
/// their first `max_refs` distinct citations, and the last paragraph (the
/// summary) collects the distinct body-assigned numbers in first-assignment
/// order plus every never-mentioned source, skipping numbers already
/// trailing it.
fn redistribute(text: &str, n_sources: usize, max_refs: usize) -> String {
    let mut paragraphs: Vec<String> = PARA_SPLIT_RE.split(text).map(|p| p.to_string()).collect();

    if let Some(last) = paragraphs.last() {
        let has_refs = REF_RE.is_match(last);
        let has_alpha = last.chars().any(|c| c.is_alphabetic());
        if has_refs && !has_alpha {
            paragraphs.pop();
        }
    }
    if paragraphs.is_empty() {
        return String::new();
    }

    let mentioned: HashSet<usize> = paragraphs
        .iter()
        .flat_map(|p| REF_RE.captures_iter(p).collect::<Vec<_>>())
        .filter_map(|caps| parse_ref(&caps, n_sources))
        .collect();

    let n_body = paragraphs.len().saturating_sub(1).max(1);
    let mut processed: Vec<String> = Vec::new();
    let mut assigned: Vec<usize> = Vec::new();

    for (i, para) in paragraphs.iter().enumerate() {
        let mut kept: Vec<usize> = Vec::new();
        for caps in REF_RE.captures_iter(para) {
            if let Some(num) = parse_ref(&caps, n_sources) {
                if !kept.contains(&num) {
                    kept.push(num);
                    if kept.len() == max_refs {
                        break;
                    }
                }
            }
        }

        let stripped = REF_RE.replace_all(para, "");
        let mut clean = stripped.trim().to_string();
        clean = TRAILING_DOT_RE.replace(&clean, ".").into_owned();

        if i < n_body {
            for num in &kept {
                clean.push_str(&format!("[{}]", num));
                assigned.push(*num);
            }
        }
        processed.push(clean);
    }

    if let Some(summary) = processed.last_mut() {
        let mut summary_refs: Vec<usize> = Vec::new();
        for num in &assigned {
            if !summary_refs.contains(num) {
                summary_refs.push(*num);
            }
        }
        for num in 1..=n_sources {
            if !mentioned.contains(&num) && !summary_refs.contains(&num) {
                summary_refs.push(num);
            }
        }

        *summary = TRAILING_DOT_RE.replace(summary, ".").into_owned();
        let tail = summary.rsplit('.').next().unwrap_or("");
        let already: HashSet<usize> = REF_RE
            .captures_iter(tail)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .collect();
        for num in summary_refs {
            if !already.contains(&num) {
                summary.push_str(&format!("[{}]", num));
            }
        }
    }

    processed.join("\n\n")
}

fn parse_ref(caps: &regex::Captures, n_sources: usize) -> Option<usize> {
    caps[1]
        .parse::<usize>()
        .ok()
        .filter(|&num| num >= 1 && num <= n_sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CitationConfig {
        CitationConfig {
            max_refs_per_paragraph: 2,
            context_docs: 5,
        }
    }

    #[test]
    fn test_remap_is_bijection_on_first_appearance() {
        let raw = "Tillage effects were strongest [2] in upland plots.\n\n\
                   Irrigation mattered less [1] than cover crops [3].\n\n\
                   Overall the practices interact.";
        let normalized = normalize_answer(raw, 3, &config());

        // First-appearance order {2,1,3} becomes canonical 1,2,3
        assert_eq!(normalized.canonical_order, vec![1, 0, 2]);
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert!(paragraphs[0].ends_with("[1]"));
        assert!(paragraphs[1].ends_with("[2][3]"));
    }

    #[test]
    fn test_unmentioned_sources_keep_relative_order() {
        let raw = "Only one source matters here [3].\n\nSummary paragraph.";
        let normalized = normalize_answer(raw, 5, &config());
        // 3 first, then 1,2,4,5 in original order
        assert_eq!(normalized.canonical_order, vec![2, 0, 1, 3, 4]);
    }

    #[test]
    fn test_paragraph_cap_keeps_first_two_distinct() {
        let raw = "Findings converge [1] across methods [2] and sites [3].\n\n\
                   A summarizing paragraph.";
        let normalized = normalize_answer(raw, 3, &config());
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert!(paragraphs[0].ends_with("[1][2]"));
        assert!(!paragraphs[0].contains("[3]"));
    }

    #[test]
    fn test_markers_move_to_paragraph_end() {
        let raw = "Mulching [1] reduced runoff, and terracing [2] stabilized slopes.\n\n\
                   Both practices were cost effective.";
        let normalized = normalize_answer(raw, 2, &config());
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert!(paragraphs[0].ends_with("stabilized slopes.[1][2]"));
        assert!(!paragraphs[0].contains("[1] reduced"));
    }

    #[test]
    fn test_summary_collects_body_assignments() {
        let raw = "First theme [1].\n\nSecond theme [2].\n\nIn summary, themes align.";
        let normalized = normalize_answer(raw, 2, &config());
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert_eq!(paragraphs[2], "In summary, themes align.[1][2]");
    }

    #[test]
    fn test_never_cited_source_appears_in_summary() {
        let raw = "Alpha finding [1].\n\nBeta finding [2] and [3].\n\n\
                   Gamma finding [5].\n\nIn conclusion, results agree.";
        let normalized = normalize_answer(raw, 5, &config());
        // Old 4 was never cited; canonical order is 1,2,3,5,4 so it maps
        // to new number 5 and must still surface in the summary trail
        assert_eq!(normalized.canonical_order, vec![0, 1, 2, 4, 3]);
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        let summary = paragraphs.last().unwrap();
        assert!(summary.contains("[5]"), "summary was: {}", summary);
    }

    #[test]
    fn test_reference_only_trailing_paragraph_dropped() {
        let raw = "Body paragraph [1].\n\nSummary paragraph.\n\n[1][2]";
        let normalized = normalize_answer(raw, 2, &config());
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert_eq!(paragraphs.len(), 2);
        assert!(paragraphs[1].starts_with("Summary paragraph."));
    }

    #[test]
    fn test_out_of_range_markers_are_stripped_from_prose() {
        let raw = "A claim [7] with a stray marker [1].\n\nSummary text.";
        let normalized = normalize_answer(raw, 2, &config());
        let paragraphs: Vec<&str> = normalized.text.split("\n\n").collect();
        assert!(!paragraphs[0].contains("[7]"));
        assert!(paragraphs[0].ends_with("[1]"));
    }

    #[test]
    fn test_single_paragraph_answer() {
        let raw = "Everything in one paragraph [2] with two sources [1].";
        let normalized = normalize_answer(raw, 2, &config());
        // The lone paragraph is both body and summary; refs appended once
        assert!(normalized.text.starts_with("Everything in one paragraph"));
        assert!(normalized.text.ends_with("with two sources.[1][2]"));
        assert_eq!(normalized.canonical_order, vec![1, 0]);
    }

    #[test]
    fn test_no_sources_passes_text_through() {
        let raw = "Nothing cited here.\n\nStill nothing.";
        let normalized = normalize_answer(raw, 0, &config());
        assert_eq!(normalized.text, "Nothing cited here.\n\nStill nothing.");
        assert!(normalized.canonical_order.is_empty());
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(
            strip_markers("No relevant results [1][2] found."),
            "No relevant results  found."
        );
    }

    #[test]
    fn test_deterministic() {
        let raw = "Theme one [2].\n\nTheme two [1][3].\n\nSummary closes.";
        let a = normalize_answer(raw, 3, &config());
        let b = normalize_answer(raw, 3, &config());
        assert_eq!(a, b);
    }
}
