//! Error taxonomy for the retrieval path.
//!
//! Refusal is not an error and has no variant here; see [`RefusalReason`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures the retrieval pipeline can hit.
///
/// `EmbeddingUnavailable` and `ChunkResolutionInconsistent` are absorbed
/// by the semantic engine and only ever logged. `AnswerGenerationFailed`
/// and `Store` reach the caller.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("vector id {vector_id} has no matching active chunk")]
    ChunkResolutionInconsistent { vector_id: String },
    #[error("answer generation failed: {0}")]
    AnswerGenerationFailed(String),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl RetrievalError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::EmbeddingUnavailable(_) => "embedding_unavailable",
            RetrievalError::ChunkResolutionInconsistent { .. } => "chunk_resolution_inconsistent",
            RetrievalError::AnswerGenerationFailed(_) => "answer_generation_failed",
            RetrievalError::Store(_) => "store_error",
        }
    }
}

/// Why a query was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    InsufficientAuthoritativeSource,
}

impl RefusalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalReason::InsufficientAuthoritativeSource => "insufficient_authoritative_source",
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
