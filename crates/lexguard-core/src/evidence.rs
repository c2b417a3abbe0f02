//! Evidence items and the caller-facing chunk view.

use serde::{Deserialize, Serialize};

use crate::models::{AuthorityLevel, ChunkRecord, ChunkRole, DocumentType, Priority};

/// How a piece of evidence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Structural lookup by section or definitions anchor. Authoritative.
    DirectLookup,
    /// Vector similarity for a general question. Authoritative.
    Semantic,
    /// Vector similarity attached to a direct answer. Never synthesized from.
    Supplementary,
}

/// A chunk record selected for a query, with its score and origin.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub record: ChunkRecord,
    /// `1.0` for direct lookups; `clamp(1 - distance, 0, 1)` otherwise.
    pub similarity_score: f64,
    pub source_type: SourceType,
}

impl Evidence {
    pub fn direct(record: ChunkRecord) -> Self {
        Self {
            record,
            similarity_score: 1.0,
            source_type: SourceType::DirectLookup,
        }
    }

    pub fn id(&self) -> &str {
        self.record.id()
    }

    pub fn priority(&self) -> Priority {
        self.record.priority()
    }

    /// Caller-facing view with the text cut to `preview_chars`.
    pub fn view(&self, preview_chars: usize) -> ChunkView {
        let identity = &self.record.chunk.identity;
        let content = &self.record.chunk.content;
        ChunkView {
            chunk_id: identity.chunk_id.clone(),
            chunk_role: identity.chunk_role,
            parent_chunk_id: identity.parent_chunk_id.clone(),
            section: identity.section.clone(),
            document_type: identity.document_type,
            text: preview(&content.text, preview_chars),
            title: content.title.clone(),
            compliance_area: content.compliance_area.clone(),
            priority: self.record.rule.priority,
            authority_level: identity.authority_level,
            citation: content.citation.clone(),
            similarity_score: self.similarity_score,
            source_type: self.source_type,
        }
    }
}

/// One retrieved chunk as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkView {
    pub chunk_id: String,
    pub chunk_role: ChunkRole,
    pub parent_chunk_id: Option<String>,
    pub section: Option<String>,
    pub document_type: DocumentType,
    pub text: String,
    pub title: Option<String>,
    pub compliance_area: Option<String>,
    pub priority: Priority,
    pub authority_level: AuthorityLevel,
    pub citation: Option<String>,
    pub similarity_score: f64,
    pub source_type: SourceType,
}

/// Parent chunk reference attached to answers that cite child evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentLaw {
    pub chunk_id: String,
    pub section: Option<String>,
    pub title: Option<String>,
    pub document_type: DocumentType,
}

impl ParentLaw {
    pub fn from_record(record: &ChunkRecord) -> Self {
        Self {
            chunk_id: record.id().to_string(),
            section: record.chunk.identity.section.clone(),
            title: record.chunk.content.title.clone(),
            document_type: record.chunk.identity.document_type,
        }
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
