//! Sentence-aware child chunker.
//!
//! Splits a parent chunk's finalized text into bounded, overlapping
//! child spans. Children are the only unit that is ever embedded, so
//! every span must fit the embedding window; consecutive spans share a
//! fixed overlap so that a sentence cut at a boundary is still seen whole
//! by at least one child.
//!
//! # Algorithm
//!
//! 1. Split the text into sentences at `.`, `!` or `?` followed by
//!    whitespace.
//! 2. Accumulate sentences into a buffer while it stays within
//!    `max_chars`.
//! 3. When the next sentence does not fit, flush the buffer as a child
//!    and seed the next buffer with the last `overlap_chars` of the
//!    flushed text (snapped to a word boundary). If the overlap and the
//!    next sentence together would exceed `max_chars`, the overlap is
//!    shortened to the room left; a sentence that fills the whole window
//!    starts its child without one.
//! 4. A single sentence longer than `max_chars` is hard-split at the
//!    nearest whitespace, each piece again overlapping the previous one.
//!
//! Lengths are measured in bytes and every cut is snapped to a UTF-8
//! character boundary.
//!
//! # Example
//!
//! ```rust
//! use lexguard_core::chunk::split_text;
//!
//! let spans = split_text("ca2013_act_s001", "Short section text.", 1000, 100);
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].chunk_id, "ca2013_act_s001_c1");
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkContent, ChunkIdentity};

/// One derived child span, before it is attached to a parent identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSpan {
    /// `<parent_id>_c<n>`, 1-based.
    pub chunk_id: String,
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, used for embedding staleness detection.
    pub hash: String,
}

/// Split `text` into child spans of at most `max_chars` bytes.
///
/// # Guarantees
///
/// - Empty or whitespace-only text yields no spans.
/// - Any other text yields at least one span.
/// - Every span is at most `max_chars` bytes.
/// - Span ids are `<parent_id>_c1`, `<parent_id>_c2`, … in order.
pub fn split_text(
    parent_id: &str,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<ChildSpan> {
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars.saturating_sub(1));

    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for sentence in split_sentences(text) {
        if sentence.len() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            for piece in hard_split(sentence, max_chars, overlap_chars) {
                pieces.push(piece.to_string());
            }
            continue;
        }

        if buf.is_empty() {
            buf.push_str(sentence);
        } else if buf.len() + 1 + sentence.len() <= max_chars {
            buf.push(' ');
            buf.push_str(sentence);
        } else {
            let room = max_chars.saturating_sub(sentence.len() + 1);
            let tail = overlap_tail(&buf, overlap_chars.min(room)).to_string();
            pieces.push(std::mem::take(&mut buf));
            if !tail.is_empty() {
                buf.push_str(&tail);
                buf.push(' ');
            }
            buf.push_str(sentence);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| ChildSpan {
            chunk_id: child_id(parent_id, i + 1),
            index: i + 1,
            hash: content_hash(&text),
            text,
        })
        .collect()
}

/// Derive the child [`Chunk`]s of `parent`. Children inherit the parent's
/// classification, anchors, title, compliance area and citation.
pub fn derive_children(parent: &Chunk, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    split_text(parent.id(), parent.text(), max_chars, overlap_chars)
        .into_iter()
        .map(|span| Chunk {
            identity: ChunkIdentity::child_of(span.chunk_id, &parent.identity),
            content: ChunkContent {
                title: parent.content.title.clone(),
                compliance_area: parent.content.compliance_area.clone(),
                text: span.text,
                summary: None,
                citation: parent.content.citation.clone(),
            },
        })
        .collect()
}

pub fn child_id(parent_id: &str, index: usize) -> String {
    format!("{}_c{}", parent_id, index)
}

/// SHA-256 hex digest of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(j, next)) = chars.peek() {
            if next.is_whitespace() {
                let s = text[start..j].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = j;
            }
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Split an oversized sentence at whitespace, overlapping consecutive pieces.
fn hard_split(s: &str, max_chars: usize, overlap_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;

    while start < s.len() {
        let rest = &s[start..];
        if rest.len() <= max_chars {
            let piece = rest.trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            break;
        }

        let limit = snap_down(rest, max_chars);
        let cut = rest[..limit]
            .rfind(char::is_whitespace)
            .filter(|&p| p > 0)
            .unwrap_or(limit);
        let cut = if cut == 0 { next_boundary(rest) } else { cut };

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece);
        }

        let back = snap_down(rest, cut.saturating_sub(overlap_chars));
        let next = rest[back..cut]
            .find(char::is_whitespace)
            .map(|p| back + p + 1)
            .unwrap_or(cut);
        start += next.max(1).min(rest.len());
        while start < s.len() && !s.is_char_boundary(start) {
            start += 1;
        }
    }

    out
}

/// Trailing `overlap` bytes of `s`, starting at a word boundary.
fn overlap_tail(s: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    if s.len() <= overlap {
        return s;
    }
    let mut start = s.len() - overlap;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    let tail = &s[start..];
    match tail.find(char::is_whitespace) {
        Some(p) => tail[p..].trim_start(),
        None => tail,
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_down(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkRole, DocumentType};

    #[test]
    fn test_empty_text_has_no_children() {
        assert!(split_text("p", "", 1000, 100).is_empty());
        assert!(split_text("p", "   \n ", 1000, 100).is_empty());
    }

    #[test]
    fn test_short_text_single_child() {
        let spans = split_text("p", "One sentence only.", 1000, 100);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].chunk_id, "p_c1");
        assert_eq!(spans[0].text, "One sentence only.");
        assert_eq!(spans[0].hash, content_hash("One sentence only."));
    }

    #[test]
    fn test_spans_bounded_and_numbered() {
        let text = (0..200)
            .map(|i| format!("Clause {} applies to every company registered under this Act.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let spans = split_text("ca2013_act_s002", &text, 1000, 100);
        assert!(spans.len() > 5);
        for (i, s) in spans.iter().enumerate() {
            assert!(s.text.len() <= 1000, "span {} is {} bytes", i, s.text.len());
            assert_eq!(s.index, i + 1);
            assert_eq!(s.chunk_id, format!("ca2013_act_s002_c{}", i + 1));
        }
    }

    #[test]
    fn test_consecutive_spans_overlap() {
        let text = (0..60)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let spans = split_text("p", &text, 200, 40);
        assert!(spans.len() > 2);
        for pair in spans.windows(2) {
            let prev_tail = overlap_tail(&pair[0].text, 40);
            assert!(
                pair[1].text.starts_with(prev_tail),
                "expected {:?} to start with {:?}",
                pair[1].text,
                prev_tail
            );
        }
    }

    #[test]
    fn test_overlap_shrinks_to_fit_long_sentence() {
        let text = "one two three four five six. seven eight nine ten eleven twel.";
        let spans = split_text("p", text, 40, 10);
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "one two three four five six.",
                "six. seven eight nine ten eleven twel."
            ]
        );
        assert!(spans.iter().all(|s| s.text.len() <= 40));
    }

    #[test]
    fn test_sentence_filling_window_has_no_overlap() {
        let text = "Short one. Every company shall file it.";
        let spans = split_text("p", text, 29, 5);
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Short one.", "Every company shall file it."]);
    }

    #[test]
    fn test_oversized_sentence_hard_split() {
        let word = "shareholding ";
        let text = word.repeat(300);
        let spans = split_text("p", &text, 100, 20);
        assert!(spans.len() > 1);
        for s in &spans {
            assert!(s.text.len() <= 100);
            assert!(!s.text.is_empty());
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "धारा ".repeat(400);
        let spans = split_text("p", &text, 50, 10);
        assert!(!spans.is_empty());
        for s in &spans {
            assert!(s.text.len() <= 50);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta! Gamma? Delta.";
        assert_eq!(split_text("p", text, 12, 4), split_text("p", text, 12, 4));
    }

    #[test]
    fn test_derive_children_inherit_parent() {
        let parent = Chunk {
            identity: ChunkIdentity::parent("s017", DocumentType::Act, Some("017".into()), None),
            content: ChunkContent {
                title: Some("Copies of memorandum".into()),
                compliance_area: Some("incorporation".into()),
                text: "A company shall send copies. Fees apply.".into(),
                summary: Some("summary".into()),
                citation: Some("Companies Act, 2013, s. 17".into()),
            },
        };
        let children = derive_children(&parent, 1000, 100);
        assert_eq!(children.len(), 1);
        let c = &children[0];
        assert_eq!(c.role(), ChunkRole::Child);
        assert_eq!(c.identity.parent_chunk_id.as_deref(), Some("s017"));
        assert_eq!(c.content.title.as_deref(), Some("Copies of memorandum"));
        assert!(c.content.summary.is_none());
    }
}
