//! Direct structural lookup.
//!
//! Resolves `section` and `definition` intents against the repository by
//! anchor. Never touches the embedding service or the vector index.

use anyhow::Result;
use tracing::debug;

use crate::classifier::QueryIntent;
use crate::evidence::Evidence;
use crate::store::{sort_parent_first, ChunkRepository};

/// Bounds for direct lookups.
#[derive(Debug, Clone)]
pub struct DirectLookupParams {
    pub top_k: usize,
    pub definition_top_k: usize,
    /// Section key of the statute's definitions section, e.g. `"002"`.
    pub definitions_section: String,
}

impl Default for DirectLookupParams {
    fn default() -> Self {
        Self {
            top_k: 15,
            definition_top_k: 5,
            definitions_section: "002".to_string(),
        }
    }
}

/// Run a direct lookup. `General` intents yield an empty set.
///
/// Results are ordered parent-before-child, then by chunk id, and tagged
/// [`SourceType::DirectLookup`](crate::evidence::SourceType::DirectLookup).
/// Chunks whose retrieval rule excludes the intent are dropped before the
/// bound is applied, so they never take a slot.
pub async fn lookup<R>(
    repo: &R,
    intent: &QueryIntent,
    params: &DirectLookupParams,
) -> Result<Vec<Evidence>>
where
    R: ChunkRepository + ?Sized,
{
    // The anchor sets are small; bound after filtering.
    let (mut records, limit) = match intent {
        QueryIntent::Section { number } => (
            repo.active_chunks_by_section(number, usize::MAX).await?,
            params.top_k,
        ),
        QueryIntent::Definition { term } => (
            repo.active_chunks_by_definition_match(&params.definitions_section, term, usize::MAX)
                .await?,
            params.definition_top_k,
        ),
        QueryIntent::General { .. } => return Ok(Vec::new()),
    };

    records.retain(|r| r.rule.allows(intent.kind()));
    sort_parent_first(&mut records);
    records.truncate(limit);

    debug!(intent = ?intent.kind(), chunk_count = records.len(), "direct lookup");
    Ok(records.into_iter().map(Evidence::direct).collect())
}
