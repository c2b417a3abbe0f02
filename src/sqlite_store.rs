//! SQLite-backed store.
//!
//! Implements the core [`ChunkRepository`], [`ChunkWriter`] and
//! [`VectorIndex`] traits over the schema created by [`crate::migrate`].
//! Vectors are little-endian f32 BLOBs in `chunk_embeddings`; search is a
//! brute-force cosine scan over ACTIVE children, which is ample for a
//! single statute corpus.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

use lexguard_core::chunk::content_hash;
use lexguard_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use lexguard_core::models::{
    Chunk, ChunkContent, ChunkIdentity, ChunkRecord, ChunkRole, EmbeddingRecord, LifecycleStatus,
    Priority, QueryKind, RefusalPolicy, Relationship, RelationshipLabel, RetrievalRule,
};
use lexguard_core::rules::{
    validate_embedding, validate_identity, validate_relationship, validate_rule_policy,
};
use lexguard_core::store::{ChunkRepository, ChunkWriter, PendingEmbedding, VectorIndex};

const RECORD_SELECT: &str = r#"
    SELECT i.chunk_id, i.chunk_role, i.parent_chunk_id, i.document_type,
           i.authority_level, i.binding, i.section, i.sub_section,
           c.title, c.compliance_area, c.text, c.summary, c.citation,
           r.priority, r.requires_parent_law, r.allowed_query_types,
           p.can_answer_standalone, p.must_reference_parent_law, p.refuse_if_parent_missing,
           l.status
    FROM chunks_identity i
    JOIN chunks_content c ON c.chunk_id = i.chunk_id
    JOIN retrieval_rules r ON r.chunk_id = i.chunk_id
    JOIN refusal_policies p ON p.chunk_id = i.chunk_id
    JOIN chunk_lifecycle l ON l.chunk_id = i.chunk_id
"#;

const PARENT_FIRST: &str =
    "ORDER BY CASE i.chunk_role WHEN 'parent' THEN 0 ELSE 1 END, i.chunk_id LIMIT ?";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn identity_of(&self, chunk_id: &str) -> Result<Option<ChunkIdentity>> {
        Ok(self.get_chunk(chunk_id).await?.map(|r| r.chunk.identity))
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ChunkRecord> {
    let chunk_id: String = row.try_get("chunk_id")?;
    let priority: i64 = row.try_get("priority")?;
    let priority = u8::try_from(priority)
        .ok()
        .and_then(Priority::new)
        .ok_or_else(|| anyhow!("chunk {} has invalid priority {}", chunk_id, priority))?;
    let allowed: String = row.try_get("allowed_query_types")?;
    let allowed_query_types = allowed
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<BTreeSet<QueryKind>>>()?;

    let identity = ChunkIdentity {
        chunk_role: row.try_get::<String, _>("chunk_role")?.parse()?,
        parent_chunk_id: row.try_get("parent_chunk_id")?,
        document_type: row.try_get::<String, _>("document_type")?.parse()?,
        authority_level: row.try_get::<String, _>("authority_level")?.parse()?,
        binding: row.try_get("binding")?,
        section: row.try_get("section")?,
        sub_section: row.try_get("sub_section")?,
        chunk_id,
    };
    let content = ChunkContent {
        title: row.try_get("title")?,
        compliance_area: row.try_get("compliance_area")?,
        text: row.try_get("text")?,
        summary: row.try_get("summary")?,
        citation: row.try_get("citation")?,
    };

    Ok(ChunkRecord {
        chunk: Chunk { identity, content },
        rule: RetrievalRule {
            priority,
            requires_parent_law: row.try_get("requires_parent_law")?,
            allowed_query_types,
        },
        policy: RefusalPolicy {
            can_answer_standalone: row.try_get("can_answer_standalone")?,
            must_reference_parent_law: row.try_get("must_reference_parent_law")?,
            refuse_if_parent_missing: row.try_get("refuse_if_parent_missing")?,
        },
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn rows_to_records(rows: &[SqliteRow]) -> Result<Vec<ChunkRecord>> {
    rows.iter().map(row_to_record).collect()
}

fn join_query_types(types: &BTreeSet<QueryKind>) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn limit_arg(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ChunkRepository for SqliteStore {
    async fn active_chunks_by_section(
        &self,
        section: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        let sql = format!(
            "{} WHERE l.status = 'ACTIVE' AND i.section = ? {}",
            RECORD_SELECT, PARENT_FIRST
        );
        let rows = sqlx::query(&sql)
            .bind(section)
            .bind(limit_arg(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_records(&rows)
    }

    async fn active_chunks_by_definition_match(
        &self,
        definitions_section: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        // instr() instead of LIKE so '%' and '_' in the term match literally.
        let sql = format!(
            "{} WHERE l.status = 'ACTIVE' AND i.document_type = 'act' AND i.section = ? \
               AND instr(lower(c.text), lower(?)) > 0 {}",
            RECORD_SELECT, PARENT_FIRST
        );
        let rows = sqlx::query(&sql)
            .bind(definitions_section)
            .bind(term)
            .bind(limit_arg(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_records(&rows)
    }

    async fn active_chunks_by_anchor(
        &self,
        section: &str,
        sub_section: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChunkRecord>> {
        let sql = format!(
            "{} WHERE l.status = 'ACTIVE' AND i.section = ? AND (? IS NULL OR i.sub_section = ?) {}",
            RECORD_SELECT, PARENT_FIRST
        );
        let rows = sqlx::query(&sql)
            .bind(section)
            .bind(sub_section)
            .bind(sub_section)
            .bind(limit_arg(limit))
            .fetch_all(&self.pool)
            .await?;
        rows_to_records(&rows)
    }

    async fn related_chunks(
        &self,
        chunk_id: &str,
        label: RelationshipLabel,
    ) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT target_chunk_id FROM chunk_relationships WHERE source_chunk_id = ? AND label = ? ORDER BY target_chunk_id",
        )
        .bind(chunk_id)
        .bind(label.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn retrieval_rule(&self, chunk_id: &str) -> Result<Option<RetrievalRule>> {
        Ok(self.get_chunk(chunk_id).await?.map(|r| r.rule))
    }

    async fn refusal_policy(&self, chunk_id: &str) -> Result<Option<RefusalPolicy>> {
        Ok(self.get_chunk(chunk_id).await?.map(|r| r.policy))
    }

    async fn resolve_vector_ids(
        &self,
        vector_ids: &[String],
    ) -> Result<Vec<(String, ChunkRecord)>> {
        let sql = format!(
            "{} JOIN chunk_embeddings e ON e.chunk_id = i.chunk_id \
             WHERE e.vector_id = ? AND e.enabled = 1 \
               AND l.status = 'ACTIVE' AND i.chunk_role = 'child'",
            RECORD_SELECT
        );
        let mut out = Vec::with_capacity(vector_ids.len());
        for vid in vector_ids {
            let row = sqlx::query(&sql)
                .bind(vid)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                out.push((vid.clone(), row_to_record(&row)?));
            }
        }
        Ok(out)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>> {
        let sql = format!("{} WHERE i.chunk_id = ?", RECORD_SELECT);
        let row = sqlx::query(&sql)
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn relationships(&self, chunk_id: &str) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            r#"
            SELECT source_chunk_id, label, target_chunk_id, confidence
            FROM chunk_relationships
            WHERE source_chunk_id = ?
            ORDER BY label, target_chunk_id
            "#,
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Relationship {
                    source_chunk_id: row.try_get("source_chunk_id")?,
                    label: row.try_get::<String, _>("label")?.parse()?,
                    target_chunk_id: row.try_get("target_chunk_id")?,
                    confidence: row.try_get("confidence")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChunkWriter for SqliteStore {
    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        let identity = &record.chunk.identity;
        let content = &record.chunk.content;
        validate_identity(identity)?;
        validate_rule_policy(record.id(), &record.rule, &record.policy)?;

        if let Some(existing) = self.identity_of(record.id()).await? {
            if &existing != identity {
                bail!("identity of chunk {} is immutable", record.id());
            }
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks_identity (chunk_id, chunk_role, parent_chunk_id, document_type,
                                         authority_level, binding, section, sub_section)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO NOTHING
            "#,
        )
        .bind(&identity.chunk_id)
        .bind(identity.chunk_role.as_str())
        .bind(&identity.parent_chunk_id)
        .bind(identity.document_type.as_str())
        .bind(identity.authority_level.as_str())
        .bind(identity.binding)
        .bind(&identity.section)
        .bind(&identity.sub_section)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunks_content (chunk_id, title, compliance_area, text, summary, citation, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                title = excluded.title,
                compliance_area = excluded.compliance_area,
                text = excluded.text,
                summary = excluded.summary,
                citation = excluded.citation,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id())
        .bind(&content.title)
        .bind(&content.compliance_area)
        .bind(&content.text)
        .bind(&content.summary)
        .bind(&content.citation)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO retrieval_rules (chunk_id, priority, requires_parent_law, allowed_query_types)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                priority = excluded.priority,
                requires_parent_law = excluded.requires_parent_law,
                allowed_query_types = excluded.allowed_query_types
            "#,
        )
        .bind(record.id())
        .bind(i64::from(record.rule.priority.get()))
        .bind(record.rule.requires_parent_law)
        .bind(join_query_types(&record.rule.allowed_query_types))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO refusal_policies (chunk_id, can_answer_standalone,
                                          must_reference_parent_law, refuse_if_parent_missing)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                can_answer_standalone = excluded.can_answer_standalone,
                must_reference_parent_law = excluded.must_reference_parent_law,
                refuse_if_parent_missing = excluded.refuse_if_parent_missing
            "#,
        )
        .bind(record.id())
        .bind(record.policy.can_answer_standalone)
        .bind(record.policy.must_reference_parent_law)
        .bind(record.policy.refuse_if_parent_missing)
        .execute(&mut *tx)
        .await?;

        // Status is only seeded here; transitions go through set_status.
        sqlx::query(
            r#"
            INSERT INTO chunk_lifecycle (chunk_id, status, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO NOTHING
            "#,
        )
        .bind(record.id())
        .bind(record.status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn link(
        &self,
        source_chunk_id: &str,
        label: RelationshipLabel,
        target_chunk_id: &str,
        confidence: Option<f64>,
    ) -> Result<()> {
        let (Some(src), Some(dst)) = (
            self.identity_of(source_chunk_id).await?,
            self.identity_of(target_chunk_id).await?,
        ) else {
            bail!(
                "cannot link unknown chunks {} -> {}",
                source_chunk_id,
                target_chunk_id
            );
        };
        validate_relationship(src.document_type, label, dst.document_type)?;

        let mut tx = self.pool.begin().await?;
        for (from, l, to) in [
            (source_chunk_id, label, target_chunk_id),
            (target_chunk_id, label.inverse(), source_chunk_id),
        ] {
            sqlx::query(
                r#"
                INSERT INTO chunk_relationships (source_chunk_id, label, target_chunk_id, confidence)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(source_chunk_id, label, target_chunk_id) DO UPDATE SET
                    confidence = excluded.confidence
                "#,
            )
            .bind(from)
            .bind(l.as_str())
            .bind(to)
            .bind(confidence)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_status(
        &self,
        chunk_id: &str,
        next: LifecycleStatus,
    ) -> Result<LifecycleStatus> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM chunk_lifecycle WHERE chunk_id = ?")
                .bind(chunk_id)
                .fetch_optional(&self.pool)
                .await?;
        let prev: LifecycleStatus = current
            .ok_or_else(|| anyhow!("chunk not found: {}", chunk_id))?
            .parse()?;
        if !prev.can_transition_to(next) {
            bail!(
                "illegal lifecycle transition for {}: {} -> {}",
                chunk_id,
                prev,
                next
            );
        }

        sqlx::query("UPDATE chunk_lifecycle SET status = ?, updated_at = ? WHERE chunk_id = ? AND status = ?")
            .bind(next.as_str())
            .bind(Utc::now().timestamp())
            .bind(chunk_id)
            .bind(prev.as_str())
            .execute(&self.pool)
            .await?;
        Ok(prev)
    }

    async fn upsert_embedding(&self, record: &EmbeddingRecord, vector: &[f32]) -> Result<()> {
        let role = self
            .identity_of(&record.chunk_id)
            .await?
            .map(|i| i.chunk_role)
            .ok_or_else(|| anyhow!("chunk not found: {}", record.chunk_id))?;
        validate_embedding(role, record)?;
        if role == ChunkRole::Parent {
            bail!("parent chunk {} cannot be embedded", record.chunk_id);
        }

        sqlx::query(
            r#"
            INSERT INTO chunk_embeddings (chunk_id, enabled, model, vector_id, embedded_at, content_hash, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                enabled = excluded.enabled,
                model = excluded.model,
                vector_id = excluded.vector_id,
                embedded_at = excluded.embedded_at,
                content_hash = excluded.content_hash,
                vector = excluded.vector
            "#,
        )
        .bind(&record.chunk_id)
        .bind(record.enabled)
        .bind(&record.model)
        .bind(&record.vector_id)
        .bind(record.embedded_at.map(|t| t.timestamp()))
        .bind(&record.content_hash)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_embeddings(&self, limit: Option<usize>) -> Result<Vec<PendingEmbedding>> {
        let rows = sqlx::query(
            r#"
            SELECT i.chunk_id, c.text, e.content_hash AS stored_hash
            FROM chunks_identity i
            JOIN chunks_content c ON c.chunk_id = i.chunk_id
            JOIN chunk_lifecycle l ON l.chunk_id = i.chunk_id
            LEFT JOIN chunk_embeddings e ON e.chunk_id = i.chunk_id
            WHERE i.chunk_role = 'child' AND l.status != 'RETIRED'
            ORDER BY i.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for row in &rows {
            let text: String = row.try_get("text")?;
            let stored: Option<String> = row.try_get("stored_hash")?;
            let hash = content_hash(&text);
            if stored.as_deref() == Some(hash.as_str()) {
                continue;
            }
            out.push(PendingEmbedding {
                chunk_id: row.try_get("chunk_id")?,
                text,
                content_hash: hash,
            });
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let rows = sqlx::query(
            r#"
            SELECT e.vector_id, e.vector
            FROM chunk_embeddings e
            JOIN chunks_identity i ON i.chunk_id = e.chunk_id
            JOIN chunk_lifecycle l ON l.chunk_id = e.chunk_id
            WHERE e.enabled = 1 AND e.vector_id IS NOT NULL AND e.vector IS NOT NULL
              AND l.status = 'ACTIVE' AND i.chunk_role = 'child'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let vid: String = row.try_get("vector_id")?;
            let blob: Vec<u8> = row.try_get("vector")?;
            hits.push((vid, cosine_distance(vector, &blob_to_vec(&blob))));
        }

        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Embedding row for a freshly computed vector.
pub fn new_embedding_record(chunk_id: &str, model: &str, content_hash: &str) -> EmbeddingRecord {
    EmbeddingRecord {
        chunk_id: chunk_id.to_string(),
        enabled: true,
        model: Some(model.to_string()),
        vector_id: Some(uuid::Uuid::new_v4().to_string()),
        embedded_at: Some(Utc::now()),
        content_hash: Some(content_hash.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::migrate_pool;
    use lexguard_core::models::DocumentType;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(tmp.path().join("test.sqlite"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        migrate_pool(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn parent(id: &str, t: DocumentType, section: &str, sub: Option<&str>, text: &str) -> ChunkRecord {
        ChunkRecord::derived(
            Chunk {
                identity: ChunkIdentity::parent(id, t, Some(section.into()), sub.map(Into::into)),
                content: ChunkContent {
                    title: Some(format!("Title {}", id)),
                    text: text.into(),
                    ..Default::default()
                },
            },
            LifecycleStatus::Active,
        )
    }

    fn child(id: &str, of: &ChunkRecord, text: &str) -> ChunkRecord {
        ChunkRecord::derived(
            Chunk {
                identity: ChunkIdentity::child_of(id, &of.chunk.identity),
                content: ChunkContent {
                    text: text.into(),
                    ..Default::default()
                },
            },
            of.status,
        )
    }

    #[tokio::test]
    async fn test_record_roundtrips_through_tables() {
        let (_tmp, store) = test_store().await;
        let p = parent("act_s017", DocumentType::Act, "017", Some("1"), "Annual return.");
        store.upsert_chunk(&p).await.unwrap();
        let got = store.get_chunk("act_s017").await.unwrap().unwrap();
        assert_eq!(got, p);
        assert!(store.get_chunk("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_section_lookup_orders_parent_first_and_hides_drafts() {
        let (_tmp, store) = test_store().await;
        let p = parent("act_s017", DocumentType::Act, "017", None, "Parent text.");
        store.upsert_chunk(&p).await.unwrap();
        store.upsert_chunk(&child("act_s017_c2", &p, "two")).await.unwrap();
        store.upsert_chunk(&child("act_s017_c1", &p, "one")).await.unwrap();
        let mut draft = parent("sop_s017", DocumentType::Sop, "017", None, "Draft sop.");
        draft.status = LifecycleStatus::Draft;
        store.upsert_chunk(&draft).await.unwrap();

        let ids: Vec<String> = store
            .active_chunks_by_section("017", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["act_s017", "act_s017_c1", "act_s017_c2"]);

        let limited = store.active_chunks_by_section("017", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_definition_match_is_case_insensitive_and_literal() {
        let (_tmp, store) = test_store().await;
        let defs = parent(
            "act_s002",
            DocumentType::Act,
            "002",
            None,
            "(20) \"Company\" means a company incorporated under this Act.",
        );
        store.upsert_chunk(&defs).await.unwrap();
        let hits = store
            .active_chunks_by_definition_match("002", "company", 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        let none = store
            .active_chunks_by_definition_match("002", "comp%", 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_definition_match_ignores_non_act_material() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_chunk(&parent("act_s002", DocumentType::Act, "002", None, "\"memorandum\" means..."))
            .await
            .unwrap();
        store
            .upsert_chunk(&parent("circ_s002", DocumentType::Circular, "002", None, "On the memorandum."))
            .await
            .unwrap();
        let hits = store
            .active_chunks_by_definition_match("002", "memorandum", 5)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["act_s002"]);
    }

    #[tokio::test]
    async fn test_upsert_does_not_change_lifecycle() {
        let (_tmp, store) = test_store().await;
        let p = parent("x", DocumentType::Act, "017", None, "a");
        store.upsert_chunk(&p).await.unwrap();
        store.set_status("x", LifecycleStatus::Retired).await.unwrap();

        // A full rewrite with ACTIVE status updates content only.
        store
            .upsert_chunk(&parent("x", DocumentType::Act, "017", None, "b"))
            .await
            .unwrap();
        let got = store.get_chunk("x").await.unwrap().unwrap();
        assert_eq!(got.status, LifecycleStatus::Retired);
        assert_eq!(got.chunk.text(), "b");
    }

    #[tokio::test]
    async fn test_anchor_lookup_filters_sub_section() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_chunk(&parent("a1", DocumentType::Act, "017", Some("1"), "x"))
            .await
            .unwrap();
        store
            .upsert_chunk(&parent("a2", DocumentType::Act, "017", Some("2"), "y"))
            .await
            .unwrap();
        assert_eq!(store.active_chunks_by_anchor("017", None, 10).await.unwrap().len(), 2);
        let only = store
            .active_chunks_by_anchor("017", Some("2"), 10)
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id(), "a2");
    }

    #[tokio::test]
    async fn test_identity_is_immutable() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_chunk(&parent("x", DocumentType::Act, "017", None, "a"))
            .await
            .unwrap();
        // Content edits are fine.
        store
            .upsert_chunk(&parent("x", DocumentType::Act, "017", None, "b"))
            .await
            .unwrap();
        assert_eq!(store.get_chunk("x").await.unwrap().unwrap().chunk.text(), "b");
        // Identity edits are not.
        assert!(store
            .upsert_chunk(&parent("x", DocumentType::Rule, "017", None, "b"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_link_writes_both_directions_and_validates() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_chunk(&parent("act", DocumentType::Act, "017", None, "a"))
            .await
            .unwrap();
        store
            .upsert_chunk(&parent("sop", DocumentType::Sop, "017", None, "b"))
            .await
            .unwrap();
        store
            .link("sop", RelationshipLabel::Implements, "act", Some(0.9))
            .await
            .unwrap();
        assert_eq!(
            store.related_chunks("sop", RelationshipLabel::Implements).await.unwrap(),
            vec!["act".to_string()]
        );
        assert_eq!(
            store.related_chunks("act", RelationshipLabel::ImplementedBy).await.unwrap(),
            vec!["sop".to_string()]
        );
        assert!(store
            .link("act", RelationshipLabel::Implements, "sop", None)
            .await
            .is_err());
        assert!(store
            .link("sop", RelationshipLabel::Clarifies, "ghost", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (_tmp, store) = test_store().await;
        let mut p = parent("x", DocumentType::Act, "017", None, "a");
        p.status = LifecycleStatus::Draft;
        store.upsert_chunk(&p).await.unwrap();

        assert!(store.set_status("x", LifecycleStatus::Retired).await.is_err());
        assert_eq!(
            store.set_status("x", LifecycleStatus::Active).await.unwrap(),
            LifecycleStatus::Draft
        );
        assert_eq!(
            store.set_status("x", LifecycleStatus::Retired).await.unwrap(),
            LifecycleStatus::Active
        );
        assert!(store.set_status("x", LifecycleStatus::Active).await.is_err());
        assert!(store.set_status("nope", LifecycleStatus::Active).await.is_err());
    }

    #[tokio::test]
    async fn test_embeddings_search_and_resolution() {
        let (_tmp, store) = test_store().await;
        let p = parent("act_s017", DocumentType::Act, "017", None, "a. b.");
        store.upsert_chunk(&p).await.unwrap();
        let c1 = child("act_s017_c1", &p, "a.");
        let c2 = child("act_s017_c2", &p, "b.");
        store.upsert_chunk(&c1).await.unwrap();
        store.upsert_chunk(&c2).await.unwrap();

        assert_eq!(store.pending_embeddings(None).await.unwrap().len(), 2);

        let r1 = new_embedding_record("act_s017_c1", "m", &content_hash("a."));
        let r2 = new_embedding_record("act_s017_c2", "m", &content_hash("b."));
        store.upsert_embedding(&r1, &[1.0, 0.0]).await.unwrap();
        store.upsert_embedding(&r2, &[0.0, 1.0]).await.unwrap();
        assert!(store.pending_embeddings(None).await.unwrap().is_empty());

        let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(Some(&hits[0].0), r1.vector_id.as_ref());
        assert!(hits[0].1 < hits[1].1);

        let ids: Vec<String> = hits.iter().map(|h| h.0.clone()).collect();
        let resolved = store.resolve_vector_ids(&ids).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].1.id(), "act_s017_c1");

        store.set_status("act_s017_c2", LifecycleStatus::Retired).await.unwrap();
        let resolved = store.resolve_vector_ids(&ids).await.unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn test_search_skips_vectors_of_inactive_chunks() {
        let (_tmp, store) = test_store().await;
        let p = parent("p", DocumentType::Act, "017", None, "a. b. c. d.");
        store.upsert_chunk(&p).await.unwrap();
        let mut draft = parent("d", DocumentType::Act, "018", None, "x. y. z.");
        draft.status = LifecycleStatus::Draft;
        store.upsert_chunk(&draft).await.unwrap();

        store.upsert_chunk(&child("p_c1", &p, "a.")).await.unwrap();
        let active = new_embedding_record("p_c1", "m", &content_hash("a."));
        store.upsert_embedding(&active, &[0.8, 0.6]).await.unwrap();
        for n in 1..=3 {
            let id = format!("d_c{}", n);
            store.upsert_chunk(&child(&id, &draft, "x.")).await.unwrap();
            let rec = new_embedding_record(&id, "m", &content_hash("x."));
            store.upsert_embedding(&rec, &[1.0, 0.0]).await.unwrap();
        }

        let hits = store.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(Some(&hits[0].0), active.vector_id.as_ref());

        store.set_status("p_c1", LifecycleStatus::Retired).await.unwrap();
        assert!(store.search(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parent_cannot_be_embedded() {
        let (_tmp, store) = test_store().await;
        let p = parent("act_s017", DocumentType::Act, "017", None, "a");
        store.upsert_chunk(&p).await.unwrap();
        let rec = new_embedding_record("act_s017", "m", &content_hash("a"));
        assert!(store.upsert_embedding(&rec, &[1.0]).await.is_err());
    }

    #[tokio::test]
    async fn test_changed_text_makes_embedding_stale() {
        let (_tmp, store) = test_store().await;
        let p = parent("p", DocumentType::Act, "017", None, "a");
        store.upsert_chunk(&p).await.unwrap();
        store.upsert_chunk(&child("p_c1", &p, "old")).await.unwrap();
        let rec = new_embedding_record("p_c1", "m", &content_hash("old"));
        store.upsert_embedding(&rec, &[1.0]).await.unwrap();
        assert!(store.pending_embeddings(None).await.unwrap().is_empty());

        store.upsert_chunk(&child("p_c1", &p, "new")).await.unwrap();
        let pending = store.pending_embeddings(Some(5)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content_hash, content_hash("new"));
    }
}
