//! Hierarchical Chunker (C2): turns a detected-structure document into retrieval
//! chunks, carrying section prefixes, citations, figure/table captions, and paper
//! metadata through to each emitted chunk (spec.md §4.2).

use crate::config::ChunkingConfig;
use crate::paper::types::{Chunk, ChunkType, DetectedSection, FigureTable, PaperMetadata};

/// One page of extracted PDF text.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: i64,
    pub text: String,
}

/// Split `text` into overlapping windows of `size` characters with `overlap`
/// characters shared between consecutive windows (spec.md §4.2, §8's chunk-count
/// invariant: `ceil((len(text) - overlap) / (size - overlap))`).
fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= size {
        return vec![chars.iter().collect()];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Splits each page's text into section-free, length-bounded chunks (spec.md §4.2
/// step 2), used when the document has no detected sections.
fn fallback_chunk_page(
    page: &Page,
    source: &str,
    config: &ChunkingConfig,
    citations: &[String],
    figures_tables: &[FigureTable],
    paper: &PaperMetadata,
    next_index: &mut usize,
) -> Vec<Chunk> {
    split_text(
        &page.text,
        config.chunk_size_default,
        config.chunk_overlap_default,
    )
    .into_iter()
    .map(|text| {
        let chunk = Chunk {
            chunk_id: format!("{}_page_{}_chunk_{}", source, page.number, next_index),
            text,
            source: source.to_string(),
            page: page.number,
            section: None,
            subsection: None,
            chunk_type: ChunkType::Content,
            citations: citations.to_vec(),
            figures_tables: figures_tables.to_vec(),
            paper: paper.clone(),
            figure_label: None,
        };
        *next_index += 1;
        chunk
    })
    .collect()
}

/// Map a global line index (over the whole concatenated document) back to the page
/// it originated from.
fn page_for_line(line_starts: &[(usize, i64)], line: usize) -> i64 {
    let mut page = line_starts.first().map(|(_, p)| *p).unwrap_or(1);
    for (start, p) in line_starts {
        if *start <= line {
            page = *p;
        } else {
            break;
        }
    }
    page
}

/// Chunk an entire document: dispatches to the fallback, length-bounded path when no
/// sections are detected, otherwise to the section-aware path, then appends one chunk
/// per detected figure/table caption (spec.md §4.2 step 4).
pub fn chunk_document(
    pages: &[Page],
    source: &str,
    sections: &[DetectedSection],
    citations: &[String],
    figures_tables: &[FigureTable],
    paper: &PaperMetadata,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let mut next_index = 0usize;
    let mut chunks = Vec::new();

    if sections.is_empty() {
        for page in pages {
            chunks.extend(fallback_chunk_page(
                page,
                source,
                config,
                citations,
                figures_tables,
                paper,
                &mut next_index,
            ));
        }
    } else {
        // Build a line -> page map by concatenating page texts with "\n" (spec.md
        // §4.2 step 1) and tracking where each page's lines begin.
        let mut line_starts = Vec::new();
        let mut cursor = 0usize;
        let mut all_lines: Vec<&str> = Vec::new();
        for page in pages {
            line_starts.push((cursor, page.number));
            let page_lines: Vec<&str> = page.text.lines().collect();
            cursor += page_lines.len();
            all_lines.extend(page_lines);
        }

        for (idx, section) in sections.iter().enumerate() {
            let start_line = section.start_line;
            // Half-open [start_line, end_line): a heading line belongs to its own
            // section, not the previous one (spec.md §4.2 tie-break).
            let end_line = sections
                .get(idx + 1)
                .map(|s| s.start_line)
                .unwrap_or(all_lines.len());

            if start_line >= all_lines.len() {
                continue;
            }
            let section_text = all_lines[start_line..end_line.min(all_lines.len())].join("\n");
            let page_number = page_for_line(&line_starts, start_line);

            if section_text.len() <= config.section_split_threshold {
                let text = format!("[Section: {}]\n{}", section.name, section_text);
                chunks.push(Chunk {
                    chunk_id: format!("{}_page_{}_chunk_{}", source, page_number, next_index),
                    text,
                    source: source.to_string(),
                    page: page_number,
                    section: Some(section.name.clone()),
                    subsection: None,
                    chunk_type: ChunkType::SectionContent,
                    citations: citations.to_vec(),
                    figures_tables: figures_tables.to_vec(),
                    paper: paper.clone(),
                    figure_label: None,
                });
                next_index += 1;
            } else {
                for piece in split_text(
                    &section_text,
                    config.section_split_size,
                    config.section_split_overlap,
                ) {
                    let text = format!("[Section: {}]\n{}", section.name, piece);
                    chunks.push(Chunk {
                        chunk_id: format!("{}_page_{}_chunk_{}", source, page_number, next_index),
                        text,
                        source: source.to_string(),
                        page: page_number,
                        section: Some(section.name.clone()),
                        subsection: None,
                        chunk_type: ChunkType::SectionContent,
                        citations: citations.to_vec(),
                        figures_tables: figures_tables.to_vec(),
                        paper: paper.clone(),
                        figure_label: None,
                    });
                    next_index += 1;
                }
            }
        }
    }

    let last_page = pages.last().map(|p| p.number).unwrap_or(1);
    for ft in figures_tables {
        let kind_label = match ft.kind {
            crate::paper::types::FigureTableKind::Figure => "Figure",
            crate::paper::types::FigureTableKind::Table => "Table",
        };
        let text = format!("[{}: {}] {}", kind_label, ft.label, ft.caption);
        chunks.push(Chunk {
            chunk_id: format!("{}_page_{}_chunk_{}", source, last_page, next_index),
            text,
            source: source.to_string(),
            page: last_page,
            section: Some("Figures/Tables".to_string()),
            subsection: None,
            chunk_type: match ft.kind {
                crate::paper::types::FigureTableKind::Figure => ChunkType::Figure,
                crate::paper::types::FigureTableKind::Table => ChunkType::Table,
            },
            citations: citations.to_vec(),
            figures_tables: figures_tables.to_vec(),
            paper: paper.clone(),
            figure_label: Some(ft.label.clone()),
        });
        next_index += 1;
    }

    chunks
}
