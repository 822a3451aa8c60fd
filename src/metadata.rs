//! Bibliographic metadata extraction and normalization.
//!
//! Field extraction runs as an ordered list of independent strategies, each
//! returning an optional match over the document's leading lines; the first
//! match wins. [`normalize`] then coerces the guesses into a schema-complete
//! [`ThesisMeta`] record: every canonical field present (empty string when
//! unknown), `subjects` joined to a scalar string with the main subject
//! first and never duplicated.
//!
//! The main subject comes from a deterministic fallback chain:
//! 1. rule match of degree/title terms against [`DEGREE_TO_MAIN_SUBJECT`];
//! 2. exact match of an extracted subject against [`MAIN_SUBJECTS`];
//! 3. embedding-similarity nearest vocabulary entry (skipped when the
//!    provider is disabled or errors);
//! 4. the fixed default `"General Works"`.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::EmbeddingConfig;
use crate::embedding;
use crate::models::ThesisMeta;

/// Controlled vocabulary for main subjects.
pub const MAIN_SUBJECTS: &[&str] = &[
    "Agriculture",
    "Anthropology",
    "Archaeology",
    "Architecture",
    "Astronomy",
    "Biology",
    "Botany",
    "Chemistry",
    "Communications",
    "Computer Science",
    "Ecology",
    "Education",
    "Engineering",
    "Information and Communications Technology",
    "Environmental Science",
    "Fisheries",
    "Food Science and Technology",
    "Forestry",
    "Genetics",
    "Geology",
    "Health and Wellness",
    "Hydrology",
    "Industry",
    "Library and Information Science",
    "Livelihood",
    "Marine Science",
    "Mathematics",
    "Medicine",
    "Meteorology",
    "Nutrition",
    "Physics",
    "Science and Technology",
    "Statistics",
    "Social Sciences",
    "Veterinary Medicine",
    "Zoology",
    "General Works",
];

/// Fixed fallback when no other strategy resolves a main subject.
pub const DEFAULT_MAIN_SUBJECT: &str = "General Works";

/// Rule-based mapping from degree/title terms to a main subject.
const DEGREE_TO_MAIN_SUBJECT: &[(&str, &str)] = &[
    ("agronomy", "Agriculture"),
    ("horticulture", "Agriculture"),
    ("plant breeding", "Agriculture"),
    ("soil science", "Agriculture"),
    ("entomology", "Agriculture"),
    ("botany", "Botany"),
    ("forestry", "Forestry"),
    ("environmental science", "Environmental Science"),
    ("marine science", "Marine Science"),
    ("applied nutrition", "Food Science and Technology"),
    ("food science", "Food Science and Technology"),
    ("genetics", "Genetics"),
    ("mathematics", "Mathematics"),
    ("statistics", "Statistics"),
    ("physics", "Physics"),
    ("chemistry", "Chemistry"),
    ("engineering", "Engineering"),
    ("computer science", "Computer Science"),
    ("information technology", "Computer Science"),
    ("social science", "Social Sciences"),
    ("economics", "Social Sciences"),
    ("education", "Education"),
    ("general science", "General Works"),
];

static SECTION_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(CHAPTER|INTRODUCTION|BACKGROUND|REVIEW|STATEMENT|OBJECTIVES|SCOPE|SIGNIFICANCE|SUMMARY|CONCLUSION|REFERENCES|ACKNOWLEDGMENTS?)",
    )
    .unwrap()
});

static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([IVXLCDM]+|\d+)\.\s*([A-Z][A-Z ]+)?$").unwrap());

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(19|20)\d{2}").unwrap());

static DEGREE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Master|Doctor|Bachelor|Philosophy|Science|Arts|Engineering)").unwrap()
});

/// Raw field guesses produced by the extractor strategies; every field is
/// optional until [`normalize`] fills in the canonical defaults.
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub degree: Option<String>,
    pub university: Option<String>,
    pub publication_year: Option<String>,
    pub abstract_text: Option<String>,
    pub subjects: Vec<String>,
}

/// Run every extractor strategy over the document text.
pub fn extract(text: &str) -> RawMetadata {
    let lines: Vec<&str> = text.lines().collect();
    RawMetadata {
        title: extract_title(&lines),
        author: extract_author(&lines),
        degree: extract_degree(&lines),
        university: extract_university(&lines),
        publication_year: extract_year(&lines),
        abstract_text: extract_abstract(&lines),
        subjects: extract_subjects(&lines),
    }
}

/// Title: first non-empty line.
fn extract_title(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
}

/// Author: first non-empty line among lines 2..10 that is not a section
/// header.
fn extract_author(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .skip(1)
        .take(9)
        .find(|l| !l.trim().is_empty() && !SECTION_HEADER_RE.is_match(l.trim()))
        .map(|l| l.trim().to_string())
}

/// Degree: first line mentioning a degree keyword.
fn extract_degree(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .find(|l| DEGREE_RE.is_match(l))
        .map(|l| l.trim().to_string())
}

/// University: first line containing "university".
fn extract_university(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .find(|l| l.to_lowercase().contains("university"))
        .map(|l| l.trim().to_string())
}

/// Publication year: first 4-digit 19xx/20xx year in lines 2..20.
fn extract_year(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .skip(1)
        .take(19)
        .find_map(|l| YEAR_RE.find(l).map(|m| m.as_str().to_string()))
}

/// Abstract: lines between an `ABSTRACT` heading and the next section
/// header, numbered heading, or keywords line.
fn extract_abstract(lines: &[&str]) -> Option<String> {
    let mut collected: Vec<&str> = Vec::new();
    let mut in_abstract = false;

    for line in lines {
        if !in_abstract {
            if line.trim().to_uppercase().starts_with("ABSTRACT") {
                in_abstract = true;
            }
            continue;
        }
        let trimmed = line.trim();
        if SECTION_HEADER_RE.is_match(trimmed)
            || NUMBERED_HEADING_RE.is_match(trimmed)
            || is_keywords_line(trimmed)
        {
            break;
        }
        collected.push(trimmed);
    }

    let joined = collected.join(" ").trim().to_string();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Subjects: a `Keywords:`/`PACS:` line plus continuation lines until a
/// blank line or section boundary, split on commas and semicolons.
fn extract_subjects(lines: &[&str]) -> Vec<String> {
    let mut subjects = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_keywords_line(line.trim()) {
            continue;
        }
        let after_prefix = match line.split_once(':') {
            Some((_, rest)) => rest,
            None => line,
        };
        push_subject_terms(&mut subjects, after_prefix);

        for next in lines.iter().skip(i + 1) {
            let trimmed = next.trim();
            if trimmed.is_empty()
                || SECTION_HEADER_RE.is_match(trimmed)
                || NUMBERED_HEADING_RE.is_match(trimmed)
            {
                break;
            }
            push_subject_terms(&mut subjects, trimmed);
        }
        break;
    }

    subjects
}

fn is_keywords_line(line: &str) -> bool {
    line.to_lowercase().starts_with("keywords:") || line.to_uppercase().starts_with("PACS:")
}

fn push_subject_terms(subjects: &mut Vec<String>, text: &str) {
    for term in text.split([',', ';']) {
        let term = term.trim();
        if !term.is_empty() {
            subjects.push(term.to_string());
        }
    }
}

/// Resolve the main subject through the fallback chain. Deterministic for
/// identical inputs: the similarity step depends only on the embedding
/// service, which is assumed deterministic, and ties break on vocabulary
/// order.
pub async fn resolve_main_subject(config: &EmbeddingConfig, raw: &RawMetadata) -> String {
    if let Some(subject) = main_subject_by_rule(raw.degree.as_deref(), raw.title.as_deref()) {
        return subject.to_string();
    }
    if let Some(subject) = main_subject_by_vocab(&raw.subjects) {
        return subject.to_string();
    }
    if config.is_enabled() {
        match main_subject_by_similarity(config, raw).await {
            Ok(Some(subject)) => return subject,
            Ok(None) => {}
            Err(e) => {
                eprintln!("Warning: subject similarity lookup failed: {}", e);
            }
        }
    }
    DEFAULT_MAIN_SUBJECT.to_string()
}

/// Strategy 1: rule-based mapping from degree/title terms.
pub fn main_subject_by_rule(degree: Option<&str>, title: Option<&str>) -> Option<&'static str> {
    let degree = degree.unwrap_or_default().to_lowercase();
    let title = title.unwrap_or_default().to_lowercase();
    DEGREE_TO_MAIN_SUBJECT
        .iter()
        .find(|(term, _)| degree.contains(term) || title.contains(term))
        .map(|(_, subject)| *subject)
}

/// Strategy 2: exact (case-insensitive) controlled-vocabulary match.
pub fn main_subject_by_vocab(subjects: &[String]) -> Option<&'static str> {
    subjects.iter().find_map(|s| {
        MAIN_SUBJECTS
            .iter()
            .find(|main| s.eq_ignore_ascii_case(main))
            .copied()
    })
}

/// Strategy 3: embedding-similarity nearest vocabulary entry for the
/// "degree. title" context, falling back to the abstract.
async fn main_subject_by_similarity(
    config: &EmbeddingConfig,
    raw: &RawMetadata,
) -> anyhow::Result<Option<String>> {
    let context = format!(
        "{}. {}",
        raw.degree.as_deref().unwrap_or_default(),
        raw.title.as_deref().unwrap_or_default()
    );
    let context = context.trim_matches(['.', ' ']).to_string();
    let context = if context.is_empty() {
        match &raw.abstract_text {
            Some(a) if !a.trim().is_empty() => a.clone(),
            _ => return Ok(None),
        }
    } else {
        context
    };

    let mut texts: Vec<String> = vec![context];
    texts.extend(MAIN_SUBJECTS.iter().map(|s| s.to_string()));
    let vectors = embedding::embed_texts(config, &texts).await?;

    let (context_vec, subject_vecs) = match vectors.split_first() {
        Some(split) => split,
        None => return Ok(None),
    };

    let mut best: Option<(usize, f32)> = None;
    for (idx, vec) in subject_vecs.iter().enumerate() {
        let sim = embedding::cosine_similarity(context_vec, vec);
        if best.is_none_or(|(_, s)| sim > s) {
            best = Some((idx, sim));
        }
    }

    Ok(best.map(|(idx, _)| MAIN_SUBJECTS[idx].to_string()))
}

/// Coerce raw guesses into the canonical schema-complete record.
///
/// The main subject leads the `subjects` scalar and any duplicate of it in
/// the extracted list is dropped.
pub fn normalize(raw: RawMetadata, main_subject: String) -> ThesisMeta {
    let mut subjects = vec![main_subject.clone()];
    subjects.extend(
        raw.subjects
            .into_iter()
            .filter(|s| !s.eq_ignore_ascii_case(&main_subject)),
    );

    ThesisMeta {
        title: raw.title.unwrap_or_default(),
        author: raw.author.unwrap_or_default(),
        degree: raw.degree.unwrap_or_default(),
        publication_year: raw.publication_year.unwrap_or_default(),
        university: raw.university.unwrap_or_default(),
        abstract_text: raw.abstract_text.unwrap_or_default(),
        subjects: subjects.join(", "),
        call_no: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Effects of Mulching on Soil Erosion in Upland Farms
MARIA L. SANTOS
A thesis submitted in partial fulfillment of the requirements
for the degree of Master of Science in Soil Science
Central Highlands University
2019

ABSTRACT
Mulching trials were conducted on sloped plots.
Erosion rates dropped under all treatments.
Keywords: soil erosion, mulching, upland farming
CHAPTER 1
";

    #[test]
    fn test_extract_fields() {
        let raw = extract(SAMPLE);
        assert_eq!(
            raw.title.as_deref(),
            Some("Effects of Mulching on Soil Erosion in Upland Farms")
        );
        assert_eq!(raw.author.as_deref(), Some("MARIA L. SANTOS"));
        assert_eq!(
            raw.degree.as_deref(),
            Some("for the degree of Master of Science in Soil Science")
        );
        assert_eq!(
            raw.university.as_deref(),
            Some("Central Highlands University")
        );
        assert_eq!(raw.publication_year.as_deref(), Some("2019"));
        assert_eq!(
            raw.abstract_text.as_deref(),
            Some("Mulching trials were conducted on sloped plots. Erosion rates dropped under all treatments.")
        );
        assert_eq!(
            raw.subjects,
            vec!["soil erosion", "mulching", "upland farming"]
        );
    }

    #[test]
    fn test_extract_empty_text() {
        let raw = extract("");
        assert!(raw.title.is_none());
        assert!(raw.author.is_none());
        assert!(raw.subjects.is_empty());
    }

    #[test]
    fn test_rule_match_from_title() {
        let subject = main_subject_by_rule(None, Some("Advances in Plant Breeding Methods"));
        assert_eq!(subject, Some("Agriculture"));
    }

    #[test]
    fn test_rule_match_from_degree() {
        let subject = main_subject_by_rule(Some("Master of Science in Forestry"), None);
        assert_eq!(subject, Some("Forestry"));
    }

    #[test]
    fn test_vocab_match_case_insensitive() {
        let subjects = vec!["irrigation".to_string(), "hydrology".to_string()];
        assert_eq!(main_subject_by_vocab(&subjects), Some("Hydrology"));
    }

    #[test]
    fn test_vocab_no_match() {
        let subjects = vec!["mulching".to_string()];
        assert_eq!(main_subject_by_vocab(&subjects), None);
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let meta = normalize(RawMetadata::default(), DEFAULT_MAIN_SUBJECT.to_string());
        assert_eq!(meta.title, "");
        assert_eq!(meta.author, "");
        assert_eq!(meta.call_no, "");
        assert_eq!(meta.subjects, "General Works");
    }

    #[test]
    fn test_normalize_dedupes_main_subject() {
        let raw = RawMetadata {
            subjects: vec![
                "soil erosion".to_string(),
                "AGRICULTURE".to_string(),
                "mulching".to_string(),
            ],
            ..Default::default()
        };
        let meta = normalize(raw, "Agriculture".to_string());
        assert_eq!(meta.subjects, "Agriculture, soil erosion, mulching");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_default_when_disabled() {
        let config = EmbeddingConfig::default();
        let raw = RawMetadata {
            title: Some("An Unclassifiable Study".to_string()),
            ..Default::default()
        };
        let subject = resolve_main_subject(&config, &raw).await;
        assert_eq!(subject, DEFAULT_MAIN_SUBJECT);
    }

    #[tokio::test]
    async fn test_resolve_prefers_rule_over_vocab() {
        let config = EmbeddingConfig::default();
        let raw = RawMetadata {
            degree: Some("Doctor of Philosophy in Economics".to_string()),
            subjects: vec!["Physics".to_string()],
            ..Default::default()
        };
        let subject = resolve_main_subject(&config, &raw).await;
        assert_eq!(subject, "Social Sciences");
    }
}
