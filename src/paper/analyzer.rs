//! Structural Analyzer (C1): section detection, citation extraction, figure/table
//! caption extraction, and paper-identity extraction from raw PDF text (spec.md §4.1).
//!
//! All operations here are total: no match simply yields an empty result, they never
//! raise (spec.md §4.1 "Failure semantics").

use crate::paper::types::{DetectedSection, FigureTable, FigureTableKind, PaperMetadata};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Canonical scholarly section headings recognized by [`detect_sections`], ported from
/// the original implementation's `SECTION_PATTERNS` (see SPEC_FULL.md §4.1).
const SECTION_NAMES: &[&str] = &[
    "Abstract",
    "Introduction",
    "Background",
    "Related Work",
    "Literature Review",
    "Methodology",
    "Methods",
    "Method",
    "Results",
    "Experiments",
    "Discussion",
    "Conclusion",
    "Conclusions",
    "References",
    "Bibliography",
];

fn section_regexes() -> &'static Vec<(String, Regex)> {
    static CELL: OnceLock<Vec<(String, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        SECTION_NAMES
            .iter()
            .map(|name| {
                let escaped = regex::escape(name);
                let pattern = format!(r"(?i)^\s*(?:\d+\.?\s*)?{}\s*:?\s*$", escaped);
                (name.to_string(), Regex::new(&pattern).expect("valid section regex"))
            })
            .collect()
    })
}

fn citation_regexes() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        vec![
            // (Author, 2020), (Author et al., 2020), (Author1 and Author2, 2020),
            // multi-citation (Author1, 2020; Author2, 2021)
            Regex::new(r"\(([A-Z][A-Za-z.\-]+(?:\s+(?:et al\.|and\s+[A-Z][A-Za-z.\-]+))?,\s*\d{4}[a-z]?(?:\s*;\s*[A-Z][A-Za-z.\-]+(?:\s+et al\.)?,\s*\d{4}[a-z]?)*)\)").unwrap(),
            // bracketed numeric [12], [1, 2], [1-3]
            Regex::new(r"\[(\d+(?:\s*[-,]\s*\d+)*)\]").unwrap(),
        ]
    })
}

fn figure_table_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?m)^(Figure|Fig\.|Table)\s+(\d+)[.:]\s*(.*)$").expect("valid fig/table regex")
    })
}

/// Detect section headings, line by line, in file order. Case-insensitive; the first
/// matching pattern on a trimmed line wins and later matches on the same line are
/// ignored (there can be only one heading per line).
pub fn detect_sections(text: &str) -> Vec<DetectedSection> {
    let mut sections = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        for (name, re) in section_regexes() {
            if re.is_match(trimmed) {
                sections.push(DetectedSection {
                    name: name.clone(),
                    start_line: line_number,
                });
                break;
            }
        }
    }
    sections
}

/// Extract a deduplicated set of citation strings (spec.md §4.1).
pub fn extract_citations(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in citation_regexes() {
        for caps in re.captures_iter(text) {
            let inner = caps.get(1).map(|m| m.as_str().to_string());
            if let Some(inner) = inner {
                if seen.insert(inner.clone()) {
                    out.push(inner);
                }
            }
        }
    }
    out
}

/// Extract figure/table captions (spec.md §4.1).
pub fn extract_figures_tables(text: &str) -> Vec<FigureTable> {
    let re = figure_table_regex();
    re.captures_iter(text)
        .map(|caps| {
            let kind = match &caps[1] {
                "Table" => FigureTableKind::Table,
                _ => FigureTableKind::Figure,
            };
            let number = &caps[2];
            let caption = caps[3].trim().to_string();
            FigureTable {
                kind,
                label: number.to_string(),
                caption,
            }
        })
        .collect()
}

fn year_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year regex"))
}

fn arxiv_id_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?i)arXiv:\s*(\d{4}\.\d{4,5})").expect("valid arxiv regex"))
}

/// Extract `{paper_id, title, authors, year, venue}` (spec.md §4.1).
///
/// `paper_id` defaults to the source basename without `.pdf`. `title` is the first
/// line, among the first five non-empty lines, with length >= 20 and not starting
/// with `"arXiv:"`. `year` is the first 4-digit 19xx|20xx match in the first 2000
/// characters. `venue` is `"arXiv"` iff `"arxiv"` occurs in the first 1000 characters.
pub fn extract_paper_metadata(text: &str, source_path: &str) -> PaperMetadata {
    let basename = std::path::Path::new(source_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_path)
        .to_string();

    let title = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(5)
        .find(|l| {
            let t = l.trim();
            t.len() >= 20 && !t.to_lowercase().starts_with("arxiv:")
        })
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| basename.clone());

    let prefix_2000: String = text.chars().take(2000).collect();
    let year = year_regex()
        .find(&prefix_2000)
        .and_then(|m| m.as_str().parse::<i32>().ok());

    let prefix_1000: String = text.chars().take(1000).collect();
    let venue = if prefix_1000.to_lowercase().contains("arxiv") {
        "arXiv".to_string()
    } else {
        String::new()
    };

    PaperMetadata {
        paper_id: basename,
        title,
        authors: Vec::new(),
        year,
        venue,
        arxiv_id: extract_arxiv_id(text),
        abstract_text: extract_abstract(text),
        categories: extract_categories(text),
    }
}

/// Extract the arXiv identifier, scanning the first 2000 characters.
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    let prefix: String = text.chars().take(2000).collect();
    arxiv_id_regex()
        .captures(&prefix)
        .map(|caps| caps[1].to_string())
}

/// Extract the abstract as the text between an `Abstract` heading and the next
/// detected section, bounded to 2000 characters.
pub fn extract_abstract(text: &str) -> String {
    let sections = detect_sections(text);
    let Some(abstract_idx) = sections.iter().position(|s| s.name == "Abstract") else {
        return String::new();
    };
    let start_line = sections[abstract_idx].start_line + 1;
    let end_line = sections
        .get(abstract_idx + 1)
        .map(|s| s.start_line)
        .unwrap_or(usize::MAX);

    let body: String = text
        .lines()
        .enumerate()
        .filter(|(i, _)| *i >= start_line && *i < end_line)
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    body.chars().take(2000).collect()
}

const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("natural language", "cs.CL"),
    ("language model", "cs.CL"),
    ("neural network", "cs.LG"),
    ("machine learning", "cs.LG"),
    ("reinforcement learning", "cs.LG"),
    ("computer vision", "cs.CV"),
    ("image recognition", "cs.CV"),
    ("artificial intelligence", "cs.AI"),
    ("statistical learning", "stat.ML"),
];

/// Extract arXiv-style subject categories by keyword match over the first 3000
/// characters, case-insensitive.
pub fn extract_categories(text: &str) -> Vec<String> {
    let prefix: String = text.chars().take(3000).collect();
    let lower = prefix.to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (keyword, category) in CATEGORY_KEYWORDS {
        if lower.contains(keyword) && seen.insert(*category) {
            out.push(category.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_sections_in_order() {
        let text = "Title\n\nAbstract\nSome abstract text.\n\n1. Introduction\nBody.\n\nMethodology\nMore body.\n\nConclusion\nDone.\n";
        let sections = detect_sections(text);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Abstract", "Introduction", "Methodology", "Conclusion"]);
    }

    #[test]
    fn test_detect_sections_case_insensitive_numbered() {
        let text = "ABSTRACT\ntext\n2. methodology\nmore text\n";
        let sections = detect_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].name, "Methodology");
    }

    #[test]
    fn test_no_sections_detected() {
        let text = "Just some plain body text with no headings at all.";
        assert!(detect_sections(text).is_empty());
    }

    #[test]
    fn test_extract_citations_dedup_and_forms() {
        let text = "As shown (Smith, 2020) and (Jones et al., 2019; Lee, 2021), also [12] and [1, 2]. Again (Smith, 2020).";
        let citations = extract_citations(text);
        assert!(citations.iter().any(|c| c.contains("Smith, 2020")));
        assert!(citations.iter().any(|c| c.contains("Jones et al., 2019")));
        assert!(citations.contains(&"12".to_string()));
        // deduped: "Smith, 2020" appears twice in source but once in output
        assert_eq!(citations.iter().filter(|c| c.contains("Smith, 2020")).count(), 1);
    }

    #[test]
    fn test_extract_figures_tables() {
        let text = "See Figure 1. A plot of accuracy over time.\nAlso Table 2: Dataset statistics.\nFig. 3. Architecture diagram.";
        let items = extract_figures_tables(text);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].kind.as_str(), "figure");
        assert_eq!(items[0].label, "1");
        assert!(items[0].caption.starts_with("A plot"));
        assert_eq!(items[1].kind.as_str(), "table");
    }

    #[test]
    fn test_extract_paper_metadata_title_and_year() {
        let text = "arXiv:2301.00001v1\n\nAttention Is All You Need Again\nJohn Doe, Jane Roe\n\nPublished 2023 at a workshop.\n";
        let meta = extract_paper_metadata(text, "/tmp/paper_123.pdf");
        assert_eq!(meta.paper_id, "paper_123");
        assert_eq!(meta.title, "Attention Is All You Need Again");
        assert_eq!(meta.year, Some(2023));
        assert_eq!(meta.venue, "arXiv");
    }

    #[test]
    fn test_extract_paper_metadata_fallback_title() {
        let text = "x\ny\n";
        let meta = extract_paper_metadata(text, "short.pdf");
        assert_eq!(meta.title, "short");
        assert_eq!(meta.venue, "");
    }

    #[test]
    fn test_extract_arxiv_id() {
        let text = "Preprint. arXiv:2301.12345 under review.";
        assert_eq!(extract_arxiv_id(text), Some("2301.12345".to_string()));
        assert_eq!(extract_arxiv_id("no id here"), None);
    }

    #[test]
    fn test_extract_abstract_bounded_by_next_section() {
        let text = "Title\n\nAbstract\nThis paper studies things.\nMore abstract text.\n\nIntroduction\nBody here.\n";
        let abs = extract_abstract(text);
        assert!(abs.contains("This paper studies things."));
        assert!(!abs.contains("Body here."));
    }

    #[test]
    fn test_extract_categories() {
        let text = "We study a new neural network architecture for natural language understanding.";
        let cats = extract_categories(text);
        assert!(cats.contains(&"cs.LG".to_string()));
        assert!(cats.contains(&"cs.CL".to_string()));
    }

    #[test]
    fn test_operations_are_total_on_empty_input() {
        assert!(detect_sections("").is_empty());
        assert!(extract_citations("").is_empty());
        assert!(extract_figures_tables("").is_empty());
        assert_eq!(extract_arxiv_id(""), None);
        assert_eq!(extract_abstract(""), "");
        assert!(extract_categories("").is_empty());
    }
}
