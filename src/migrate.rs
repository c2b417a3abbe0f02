//! Schema migrations.
//!
//! Identity, content, retrieval rule, refusal policy, lifecycle and
//! embedding rows are kept in separate tables keyed by `chunk_id`, so that
//! editorial content changes never touch lineage and lifecycle changes
//! never touch content. All statements are `IF NOT EXISTS`; running the
//! migrations twice is a no-op.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chunks_identity (
        chunk_id TEXT PRIMARY KEY,
        chunk_role TEXT NOT NULL CHECK (chunk_role IN ('parent', 'child')),
        parent_chunk_id TEXT REFERENCES chunks_identity(chunk_id),
        document_type TEXT NOT NULL,
        authority_level TEXT NOT NULL,
        binding INTEGER NOT NULL,
        section TEXT,
        sub_section TEXT,
        CHECK (
            (chunk_role = 'parent' AND parent_chunk_id IS NULL)
            OR (chunk_role = 'child' AND parent_chunk_id IS NOT NULL)
        )
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_identity_section ON chunks_identity(section, sub_section)",
    "CREATE INDEX IF NOT EXISTS idx_identity_parent ON chunks_identity(parent_chunk_id)",
    r#"
    CREATE TABLE IF NOT EXISTS chunks_content (
        chunk_id TEXT PRIMARY KEY REFERENCES chunks_identity(chunk_id),
        title TEXT,
        compliance_area TEXT,
        text TEXT NOT NULL,
        summary TEXT,
        citation TEXT,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS retrieval_rules (
        chunk_id TEXT PRIMARY KEY REFERENCES chunks_identity(chunk_id),
        priority INTEGER NOT NULL CHECK (priority BETWEEN 1 AND 4),
        requires_parent_law INTEGER NOT NULL,
        allowed_query_types TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS refusal_policies (
        chunk_id TEXT PRIMARY KEY REFERENCES chunks_identity(chunk_id),
        can_answer_standalone INTEGER NOT NULL,
        must_reference_parent_law INTEGER NOT NULL,
        refuse_if_parent_missing INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_lifecycle (
        chunk_id TEXT PRIMARY KEY REFERENCES chunks_identity(chunk_id),
        status TEXT NOT NULL CHECK (status IN ('DRAFT', 'ACTIVE', 'RETIRED')),
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_lifecycle_status ON chunk_lifecycle(status)",
    r#"
    CREATE TABLE IF NOT EXISTS chunk_relationships (
        source_chunk_id TEXT NOT NULL REFERENCES chunks_identity(chunk_id),
        label TEXT NOT NULL,
        target_chunk_id TEXT NOT NULL REFERENCES chunks_identity(chunk_id),
        confidence REAL,
        PRIMARY KEY (source_chunk_id, label, target_chunk_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_embeddings (
        chunk_id TEXT PRIMARY KEY REFERENCES chunks_identity(chunk_id),
        enabled INTEGER NOT NULL DEFAULT 0,
        model TEXT,
        vector_id TEXT UNIQUE,
        embedded_at INTEGER,
        content_hash TEXT,
        vector BLOB
    )
    "#,
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
