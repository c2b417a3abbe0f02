//! Storage abstraction for the governance knowledge base.
//!
//! Three traits split the store by who uses it:
//!
//! | Trait | Used by | Purpose |
//! |-------|---------|---------|
//! | [`ChunkRepository`] | retrieval core | Read-only access to ACTIVE chunks and their rule rows |
//! | [`ChunkWriter`] | import, lifecycle, backfill | Inserts, lifecycle transitions, embedding bookkeeping |
//! | [`VectorIndex`] | semantic search | k-nearest-neighbour search over child vectors |
//!
//! The retrieval core only ever holds `ChunkRepository` and `VectorIndex`,
//! so it cannot mutate chunk records.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    ChunkRecord, EmbeddingRecord, LifecycleStatus, RefusalPolicy, Relationship,
    RelationshipLabel, RetrievalRule,
};

/// A child chunk waiting for an embedding.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEmbedding {
    pub chunk_id: String,
    pub text: String,
    pub content_hash: String,
}

/// Read-only repository over ACTIVE chunks.
///
/// Every `active_*` method filters to `LifecycleStatus::Active` and returns
/// records ordered parent-before-child, then by `chunk_id`.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// ACTIVE chunks whose `section` equals `section`, at most `limit`.
    async fn active_chunks_by_section(&self, section: &str, limit: usize)
        -> Result<Vec<ChunkRecord>>;

    /// ACTIVE Act chunks in `definitions_section` whose text contains
    /// `term` (case-insensitive), at most `limit`. Circulars, notifications
    /// and other material filed under the same section number are not
    /// definitions and never match.
    async fn active_chunks_by_definition_match(
        &self,
        definitions_section: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>>;

    /// ACTIVE chunks at an exact statutory anchor. `sub_section = None`
    /// matches every sub-section of the section.
    async fn active_chunks_by_anchor(
        &self,
        section: &str,
        sub_section: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>>;

    /// Ids of chunks reachable from `chunk_id` by one `label` edge.
    async fn related_chunks(&self, chunk_id: &str, label: RelationshipLabel)
        -> Result<Vec<String>>;

    async fn retrieval_rule(&self, chunk_id: &str) -> Result<Option<RetrievalRule>>;

    async fn refusal_policy(&self, chunk_id: &str) -> Result<Option<RefusalPolicy>>;

    /// Resolve vector ids to ACTIVE child chunks with an enabled embedding.
    /// Ids that do not resolve are absent from the result; order follows
    /// the input.
    async fn resolve_vector_ids(&self, vector_ids: &[String])
        -> Result<Vec<(String, ChunkRecord)>>;

    /// Any chunk by id, whatever its lifecycle status.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>>;

    /// All outgoing edges of `chunk_id`.
    async fn relationships(&self, chunk_id: &str) -> Result<Vec<Relationship>>;
}

/// Write side, used by ingestion-boundary commands only.
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// Insert or replace a chunk with its rule and policy.
    ///
    /// `record.status` seeds the lifecycle of a new chunk only. The status
    /// of an existing chunk is left as it is; use [`set_status`] to move it.
    /// Identity fields of an existing chunk must not change.
    ///
    /// [`set_status`]: ChunkWriter::set_status
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()>;

    /// Insert an edge and its inverse.
    async fn link(
        &self,
        source_chunk_id: &str,
        label: RelationshipLabel,
        target_chunk_id: &str,
        confidence: Option<f64>,
    ) -> Result<()>;

    /// Move a chunk to `next`, rejecting illegal transitions. Returns the
    /// previous status.
    async fn set_status(&self, chunk_id: &str, next: LifecycleStatus)
        -> Result<LifecycleStatus>;

    /// Store a vector and its bookkeeping row for a child chunk.
    async fn upsert_embedding(&self, record: &EmbeddingRecord, vector: &[f32]) -> Result<()>;

    /// Non-retired child chunks with no embedding or a stale content hash.
    async fn pending_embeddings(&self, limit: Option<usize>) -> Result<Vec<PendingEmbedding>>;
}

/// Nearest-neighbour search over stored child vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` `(vector_id, distance)` pairs, nearest first. Distance is
    /// cosine distance. Only enabled vectors of ACTIVE child chunks are
    /// candidates, so DRAFT and RETIRED vectors never take a slot.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>>;
}

/// Two-key order: parents first, then by chunk id.
pub fn sort_parent_first(records: &mut [ChunkRecord]) {
    records.sort_by(|a, b| {
        a.chunk
            .role()
            .rank()
            .cmp(&b.chunk.role().rank())
            .then_with(|| a.id().cmp(b.id()))
    });
}
