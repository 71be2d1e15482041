//! Section-aware text chunker for case-study bodies.
//!
//! # Algorithm
//!
//! 1. Split the body on markdown headings (`#` to `###`). The section name
//!    is the heading text before any `:`, lowercased (`## Results: Q3` →
//!    `"results"`). Text before the first heading has no section.
//! 2. Drop `[START OF SECTION]` / `[END OF SECTION]` markers.
//! 3. Within a section, accumulate `\n\n`-separated paragraphs into a
//!    buffer until adding the next one would exceed `max_chars`, then flush.
//! 4. A single paragraph longer than `max_chars` is hard-split at the last
//!    newline or space before the limit, never inside a UTF-8 character.
//! 5. Indices run `0..n-1` across the whole document.
//!
//! Chunk ids are UUID v5 over `file_id`, index and content, so chunking the
//! same text twice yields identical chunks and re-ingestion is idempotent.
//!
//! # Example
//!
//! ```rust
//! use proposal_writer_core::chunk::chunk_sections;
//!
//! let drafts = chunk_sections("doc-1", "## Context\nRetailer.\n\n## Results\nCut costs 40%.", 500);
//! assert_eq!(drafts.len(), 2);
//! assert_eq!(drafts[1].section.as_deref(), Some("results"));
//! assert_eq!(drafts[1].chunk_index, 1);
//! ```

use uuid::Uuid;

use crate::models::Chunk;

const SECTION_MARKERS: [&str; 2] = ["[START OF SECTION]", "[END OF SECTION]"];

/// A chunk that has not been embedded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub id: String,
    pub source_document_id: String,
    pub chunk_index: i64,
    pub section: Option<String>,
    pub content: String,
}

impl ChunkDraft {
    /// Attach an embedding, producing a storable [`Chunk`].
    pub fn into_chunk(self, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            content: self.content,
            embedding,
            section: self.section,
            source_document_id: self.source_document_id,
            chunk_index: self.chunk_index,
        }
    }
}

/// Split `text` into section-tagged chunks of at most `max_chars` bytes.
///
/// Empty or whitespace-only text yields no chunks.
pub fn chunk_sections(file_id: &str, text: &str, max_chars: usize) -> Vec<ChunkDraft> {
    let max_chars = max_chars.max(1);
    let mut drafts = Vec::new();

    for (section, body) in split_sections(text) {
        for piece in pack_paragraphs(&body, max_chars) {
            let index = drafts.len() as i64;
            drafts.push(ChunkDraft {
                id: chunk_id(file_id, index, &piece),
                source_document_id: file_id.to_string(),
                chunk_index: index,
                section: section.clone(),
                content: piece,
            });
        }
    }

    drafts
}

fn chunk_id(file_id: &str, index: i64, content: &str) -> String {
    let key = format!("{}\u{1f}{}\u{1f}{}", file_id, index, content);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Parse a `#`..`###` heading line into its section name.
fn heading_section(line: &str) -> Option<Option<String>> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = rest.split(':').next().unwrap_or("").trim().to_lowercase();
    Some(if name.is_empty() { None } else { Some(name) })
}

fn split_sections(text: &str) -> Vec<(Option<String>, String)> {
    let mut sections = Vec::new();
    let mut current: Option<String> = None;
    let mut body = String::new();

    for line in text.lines() {
        if let Some(section) = heading_section(line) {
            sections.push((current.take(), std::mem::take(&mut body)));
            current = section;
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    sections.push((current, body));

    sections
        .into_iter()
        .map(|(section, body)| {
            let cleaned = SECTION_MARKERS
                .iter()
                .fold(body, |acc, marker| acc.replace(marker, ""));
            (section, cleaned)
        })
        .filter(|(_, body)| !body.trim().is_empty())
        .collect()
}

fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > max_chars {
            pieces.extend(hard_split(trimmed, max_chars).into_iter().map(str::to_string));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Cut an oversized paragraph at whitespace, respecting char boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.trim());
            break;
        }
        let limit = snap_to_char_boundary(remaining, max_chars);
        let cut = remaining[..limit]
            .rfind(|c: char| c == '\n' || c == ' ')
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        let cut = if cut == 0 {
            // Not even one character fits below the limit.
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        remaining = &remaining[cut..];
    }

    out.retain(|p| !p.is_empty());
    out
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
