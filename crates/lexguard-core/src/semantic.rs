//! Best-effort semantic search.
//!
//! Embeds the question, asks the [`VectorIndex`] for the nearest child
//! vectors, converts distances to similarities, drops weak hits, and
//! resolves the survivors to ACTIVE chunk records.
//!
//! Every failure on this path is absorbed: a timed-out or failed embedding
//! call, an index error, or a store error all yield an empty result and a
//! `warn!` event. Vector ids with no ACTIVE chunk behind them are dropped
//! one by one.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::embedding::{distance_to_similarity, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::evidence::{Evidence, SourceType};
use crate::store::{ChunkRepository, VectorIndex};

#[derive(Debug, Clone)]
pub struct SemanticParams {
    pub top_k: usize,
    /// Hits scoring below this are discarded.
    pub min_similarity: f64,
    /// Bound on the embedding call.
    pub embed_timeout: Duration,
}

impl Default for SemanticParams {
    fn default() -> Self {
        Self {
            top_k: 15,
            min_similarity: 0.5,
            embed_timeout: Duration::from_secs(10),
        }
    }
}

/// Run a semantic search. Results are ordered by similarity, highest first,
/// and tagged with `source_type`.
pub async fn search(
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    repo: &dyn ChunkRepository,
    text: &str,
    params: &SemanticParams,
    source_type: SourceType,
) -> Vec<Evidence> {
    if text.trim().is_empty() || params.top_k == 0 {
        return Vec::new();
    }
    match try_search(embedder, index, repo, text, params, source_type).await {
        Ok(found) => found,
        Err(e) => {
            warn!(code = e.code(), error = %e, "semantic search degraded to empty result");
            Vec::new()
        }
    }
}

async fn try_search(
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    repo: &dyn ChunkRepository,
    text: &str,
    params: &SemanticParams,
    source_type: SourceType,
) -> Result<Vec<Evidence>, RetrievalError> {
    let vector = match tokio::time::timeout(params.embed_timeout, embedder.embed(text)).await {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return Err(RetrievalError::EmbeddingUnavailable(e.to_string())),
        Err(_) => {
            return Err(RetrievalError::EmbeddingUnavailable(format!(
                "timed out after {:?}",
                params.embed_timeout
            )))
        }
    };

    let hits = index.search(&vector, params.top_k).await?;
    let scored: Vec<(String, f64)> = hits
        .into_iter()
        .map(|(vid, distance)| (vid, distance_to_similarity(distance)))
        .filter(|(_, sim)| *sim >= params.min_similarity)
        .collect();
    if scored.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = scored.iter().map(|(vid, _)| vid.clone()).collect();
    let resolved = repo.resolve_vector_ids(&ids).await?;
    let resolved_ids: HashSet<&str> = resolved.iter().map(|(vid, _)| vid.as_str()).collect();
    for vid in ids.iter().filter(|v| !resolved_ids.contains(v.as_str())) {
        let e = RetrievalError::ChunkResolutionInconsistent {
            vector_id: vid.clone(),
        };
        debug!(code = e.code(), "{}", e);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(resolved.len());
    for (vid, record) in resolved {
        if !seen.insert(record.id().to_string()) {
            continue;
        }
        let similarity_score = scored
            .iter()
            .find(|(v, _)| *v == vid)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);
        out.push(Evidence {
            record,
            similarity_score,
            source_type,
        });
    }
    out.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(chunk_count = out.len(), ?source_type, "semantic search");
    Ok(out)
}
