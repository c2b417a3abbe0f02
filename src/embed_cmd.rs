//! Embedding backfill.
//!
//! Embeds child chunks that are DRAFT or ACTIVE and have no embedding or a
//! stale content hash. Parents are never embedded. Each stored vector gets
//! a fresh opaque `vector_id`, which is what the vector index returns and
//! the repository resolves back to a chunk.

use anyhow::{bail, Result};
use tracing::warn;

use lexguard_core::embedding::EmbeddingProvider;
use lexguard_core::store::ChunkWriter;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::{new_embedding_record, SqliteStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillStats {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Embed everything `store` reports as pending, `batch_size` texts per
/// provider call. A failed batch is counted and skipped.
pub async fn backfill<W>(
    store: &W,
    provider: &dyn EmbeddingProvider,
    limit: Option<usize>,
    batch_size: usize,
) -> Result<BackfillStats>
where
    W: ChunkWriter + ?Sized,
{
    let pending = store.pending_embeddings(limit).await?;
    let mut stats = BackfillStats {
        pending: pending.len(),
        ..Default::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match provider.embed_batch(&texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    if provider.dims() > 0 && vec.len() != provider.dims() {
                        warn!(
                            chunk_id = %item.chunk_id,
                            expected = provider.dims(),
                            got = vec.len(),
                            "embedding dimension mismatch"
                        );
                        stats.failed += 1;
                        continue;
                    }
                    let record = new_embedding_record(
                        &item.chunk_id,
                        provider.model_name(),
                        &item.content_hash,
                    );
                    store.upsert_embedding(&record, vec).await?;
                    stats.embedded += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, batch = batch.len(), "embedding batch failed");
                stats.failed += batch.len();
            }
        }
    }

    Ok(stats)
}

pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    if dry_run {
        let pending = store.pending_embeddings(limit).await?;
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        store.pool().close().await;
        return Ok(());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);
    let stats = backfill(&store, provider.as_ref(), limit, batch_size).await?;

    println!("embed pending");
    if stats.pending == 0 {
        println!("  all chunks up to date");
    } else {
        println!("  total pending: {}", stats.pending);
        println!("  embedded: {}", stats.embedded);
        println!("  failed: {}", stats.failed);
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use lexguard_core::models::{
        Chunk, ChunkContent, ChunkIdentity, ChunkRecord, DocumentType, LifecycleStatus,
    };
    use lexguard_core::store::memory::InMemoryStore;
    use lexguard_core::store::VectorIndex;

    struct FixedEmbedder {
        dims: usize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(anyhow!("down"));
            }
            Ok(vec![1.0, 0.0])
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let parent = Chunk {
            identity: ChunkIdentity::parent("p", DocumentType::Act, Some("017".into()), None),
            content: ChunkContent {
                text: "a. b.".into(),
                ..Default::default()
            },
        };
        store
            .upsert_chunk(&ChunkRecord::derived(parent.clone(), LifecycleStatus::Draft))
            .await
            .unwrap();
        for (id, text) in [("p_c1", "a."), ("p_c2", "b.")] {
            let child = Chunk {
                identity: ChunkIdentity::child_of(id, &parent.identity),
                content: ChunkContent {
                    text: text.into(),
                    ..Default::default()
                },
            };
            store
                .upsert_chunk(&ChunkRecord::derived(child, LifecycleStatus::Draft))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_backfill_embeds_children_only() {
        let store = seeded().await;
        let stats = backfill(&store, &FixedEmbedder { dims: 2, fail: false }, None, 1)
            .await
            .unwrap();
        assert_eq!(
            stats,
            BackfillStats {
                pending: 2,
                embedded: 2,
                failed: 0
            }
        );
        assert_eq!(store.search(&[1.0, 0.0], 10).await.unwrap().len(), 2);
        assert!(store.pending_embeddings(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backfill_counts_failures_and_dimension_mismatch() {
        let store = seeded().await;
        let down = backfill(&store, &FixedEmbedder { dims: 2, fail: true }, None, 8)
            .await
            .unwrap();
        assert_eq!(down.failed, 2);
        assert_eq!(down.embedded, 0);

        let wrong = backfill(&store, &FixedEmbedder { dims: 3, fail: false }, Some(1), 8)
            .await
            .unwrap();
        assert_eq!(wrong.pending, 1);
        assert_eq!(wrong.failed, 1);
    }
}
