//! In-memory store for tests and embedding into other hosts.
//!
//! Implements [`ChunkRepository`], [`ChunkWriter`], and [`VectorIndex`]
//! over `HashMap`s and `Vec`s behind `std::sync::RwLock`. Vector search is
//! brute-force cosine distance over the enabled vectors of ACTIVE children.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::chunk::content_hash;
use crate::embedding::cosine_distance;
use crate::models::{
    ChunkRecord, ChunkRole, DocumentType, EmbeddingRecord, LifecycleStatus, RefusalPolicy,
    Relationship, RelationshipLabel, RetrievalRule,
};
use crate::rules::{validate_embedding, validate_identity, validate_relationship, validate_rule_policy};

use super::{sort_parent_first, ChunkRepository, ChunkWriter, PendingEmbedding, VectorIndex};

struct StoredVector {
    record: EmbeddingRecord,
    vector: Vec<f32>,
}

/// In-memory store.
pub struct InMemoryStore {
    chunks: RwLock<HashMap<String, ChunkRecord>>,
    edges: RwLock<Vec<Relationship>>,
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            edges: RwLock::new(Vec::new()),
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn chunks(&self) -> Result<RwLockReadGuard<'_, HashMap<String, ChunkRecord>>> {
        self.chunks.read().map_err(|_| anyhow!("chunk table lock poisoned"))
    }

    fn chunks_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, ChunkRecord>>> {
        self.chunks.write().map_err(|_| anyhow!("chunk table lock poisoned"))
    }

    fn edges(&self) -> Result<RwLockReadGuard<'_, Vec<Relationship>>> {
        self.edges.read().map_err(|_| anyhow!("edge table lock poisoned"))
    }

    fn vectors(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors.read().map_err(|_| anyhow!("vector table lock poisoned"))
    }

    fn active_where<F>(&self, limit: usize, pred: F) -> Result<Vec<ChunkRecord>>
    where
        F: Fn(&ChunkRecord) -> bool,
    {
        let chunks = self.chunks()?;
        let mut out: Vec<ChunkRecord> = chunks
            .values()
            .filter(|r| r.status == LifecycleStatus::Active && pred(r))
            .cloned()
            .collect();
        sort_parent_first(&mut out);
        out.truncate(limit);
        Ok(out)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkRepository for InMemoryStore {
    async fn active_chunks_by_section(
        &self,
        section: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        self.active_where(limit, |r| {
            r.chunk.identity.section.as_deref() == Some(section)
        })
    }

    async fn active_chunks_by_definition_match(
        &self,
        definitions_section: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        let needle = term.to_lowercase();
        self.active_where(limit, |r| {
            r.chunk.identity.document_type == DocumentType::Act
                && r.chunk.identity.section.as_deref() == Some(definitions_section)
                && r.chunk.text().to_lowercase().contains(&needle)
        })
    }

    async fn active_chunks_by_anchor(
        &self,
        section: &str,
        sub_section: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        self.active_where(limit, |r| {
            r.chunk.identity.section.as_deref() == Some(section)
                && sub_section.map_or(true, |s| r.chunk.identity.sub_section.as_deref() == Some(s))
        })
    }

    async fn related_chunks(
        &self,
        chunk_id: &str,
        label: RelationshipLabel,
    ) -> Result<Vec<String>> {
        Ok(self
            .edges()?
            .iter()
            .filter(|e| e.source_chunk_id == chunk_id && e.label == label)
            .map(|e| e.target_chunk_id.clone())
            .collect())
    }

    async fn retrieval_rule(&self, chunk_id: &str) -> Result<Option<RetrievalRule>> {
        Ok(self.chunks()?.get(chunk_id).map(|r| r.rule.clone()))
    }

    async fn refusal_policy(&self, chunk_id: &str) -> Result<Option<RefusalPolicy>> {
        Ok(self.chunks()?.get(chunk_id).map(|r| r.policy))
    }

    async fn resolve_vector_ids(
        &self,
        vector_ids: &[String],
    ) -> Result<Vec<(String, ChunkRecord)>> {
        let chunks = self.chunks()?;
        let vectors = self.vectors()?;
        let by_vector_id: HashMap<&str, &str> = vectors
            .values()
            .filter(|v| v.record.enabled)
            .filter_map(|v| {
                v.record
                    .vector_id
                    .as_deref()
                    .map(|vid| (vid, v.record.chunk_id.as_str()))
            })
            .collect();

        Ok(vector_ids
            .iter()
            .filter_map(|vid| {
                let chunk_id = by_vector_id.get(vid.as_str())?;
                let record = chunks.get(*chunk_id)?;
                (record.status == LifecycleStatus::Active && record.chunk.role() == ChunkRole::Child)
                    .then(|| (vid.clone(), record.clone()))
            })
            .collect())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        Ok(self.chunks()?.get(chunk_id).cloned())
    }

    async fn relationships(&self, chunk_id: &str) -> Result<Vec<Relationship>> {
        Ok(self
            .edges()?
            .iter()
            .filter(|e| e.source_chunk_id == chunk_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChunkWriter for InMemoryStore {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        validate_identity(&record.chunk.identity)?;
        validate_rule_policy(record.id(), &record.rule, &record.policy)?;
        let mut chunks = self.chunks_mut()?;
        let mut next = record.clone();
        if let Some(existing) = chunks.get(record.id()) {
            if existing.chunk.identity != record.chunk.identity {
                bail!("identity of chunk {} is immutable", record.id());
            }
            next.status = existing.status;
        }
        chunks.insert(record.id().to_string(), next);
        Ok(())
    }

    async fn link(
        &self,
        source_chunk_id: &str,
        label: RelationshipLabel,
        target_chunk_id: &str,
        confidence: Option<f64>,
    ) -> Result<()> {
        {
            let chunks = self.chunks()?;
            let (Some(src), Some(dst)) = (chunks.get(source_chunk_id), chunks.get(target_chunk_id))
            else {
                bail!(
                    "cannot link unknown chunks {} -> {}",
                    source_chunk_id,
                    target_chunk_id
                );
            };
            validate_relationship(
                src.chunk.identity.document_type,
                label,
                dst.chunk.identity.document_type,
            )?;
        }

        let mut edges = self
            .edges
            .write()
            .map_err(|_| anyhow!("edge table lock poisoned"))?;
        for (from, l, to) in [
            (source_chunk_id, label, target_chunk_id),
            (target_chunk_id, label.inverse(), source_chunk_id),
        ] {
            edges.retain(|e| !(e.source_chunk_id == from && e.label == l && e.target_chunk_id == to));
            edges.push(Relationship {
                source_chunk_id: from.to_string(),
                label: l,
                target_chunk_id: to.to_string(),
                confidence,
            });
        }
        Ok(())
    }

    async fn set_status(
        &self,
        chunk_id: &str,
        next: LifecycleStatus,
    ) -> Result<LifecycleStatus> {
        let mut chunks = self.chunks_mut()?;
        let record = chunks
            .get_mut(chunk_id)
            .ok_or_else(|| anyhow!("chunk not found: {}", chunk_id))?;
        let prev = record.status;
        if !prev.can_transition_to(next) {
            bail!("illegal lifecycle transition for {}: {} -> {}", chunk_id, prev, next);
        }
        record.status = next;
        Ok(prev)
    }

    async fn upsert_embedding(&self, record: &EmbeddingRecord, vector: &[f32]) -> Result<()> {
        let role = self
            .chunks()?
            .get(&record.chunk_id)
            .map(|r| r.chunk.role())
            .ok_or_else(|| anyhow!("chunk not found: {}", record.chunk_id))?;
        validate_embedding(role, record)?;
        if role == ChunkRole::Parent {
            bail!("parent chunk {} cannot be embedded", record.chunk_id);
        }
        self.vectors
            .write()
            .map_err(|_| anyhow!("vector table lock poisoned"))?
            .insert(
                record.chunk_id.clone(),
                StoredVector {
                    record: record.clone(),
                    vector: vector.to_vec(),
                },
            );
        Ok(())
    }

    async fn pending_embeddings(&self, limit: Option<usize>) -> Result<Vec<PendingEmbedding>> {
        let chunks = self.chunks()?;
        let vectors = self.vectors()?;
        let mut out: Vec<PendingEmbedding> = chunks
            .values()
            .filter(|r| r.chunk.role() == ChunkRole::Child && r.status.is_embeddable())
            .filter_map(|r| {
                let hash = content_hash(r.chunk.text());
                let fresh = vectors
                    .get(r.id())
                    .is_some_and(|v| v.record.content_hash.as_deref() == Some(hash.as_str()));
                (!fresh).then(|| PendingEmbedding {
                    chunk_id: r.id().to_string(),
                    text: r.chunk.text().to_string(),
                    content_hash: hash,
                })
            })
            .collect();
        out.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        if let Some(n) = limit {
            out.truncate(n);
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let chunks = self.chunks()?;
        let vectors = self.vectors()?;
        let mut hits: Vec<(String, f32)> = vectors
            .values()
            .filter(|v| v.record.enabled)
            .filter(|v| {
                chunks.get(&v.record.chunk_id).is_some_and(|r| {
                    r.status == LifecycleStatus::Active && r.chunk.role() == ChunkRole::Child
                })
            })
            .filter_map(|v| {
                v.record
                    .vector_id
                    .clone()
                    .map(|vid| (vid, cosine_distance(vector, &v.vector)))
            })
            .collect();
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
