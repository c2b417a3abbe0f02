//! Chunk retrieval by id or by statutory anchor.
//!
//! Used by both the `lexguard get` CLI command and the
//! `GET /api/chunk/{id}` and `GET /api/relationships/{id}` endpoints.
//! Lookup by id returns a chunk in any lifecycle state, so lineage can be
//! inspected; anchor lookup returns ACTIVE chunks only.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use lexguard_core::models::{ChunkRecord, Relationship};
use lexguard_core::store::ChunkRepository;

use crate::config::Config;
use crate::db;
use crate::import::normalize_section;
use crate::sqlite_store::SqliteStore;

/// A chunk with its governance rows and outgoing edges.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkDetail {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub relationships: Vec<Relationship>,
}

pub async fn get_chunk_detail(
    repo: &dyn ChunkRepository,
    chunk_id: &str,
) -> Result<Option<ChunkDetail>> {
    let Some(record) = repo.get_chunk(chunk_id).await? else {
        return Ok(None);
    };
    let relationships = repo.relationships(chunk_id).await?;
    Ok(Some(ChunkDetail {
        record,
        relationships,
    }))
}

/// ACTIVE chunks at `section` (and `sub_section`, if given), parents first.
pub async fn lookup_anchor(
    repo: &dyn ChunkRepository,
    section: &str,
    sub_section: Option<&str>,
    limit: usize,
) -> Result<Vec<ChunkRecord>> {
    repo.active_chunks_by_anchor(section, sub_section, limit)
        .await
}

/// CLI entry point for `lexguard get`.
pub async fn run_get(
    config: &Config,
    id: Option<&str>,
    section: Option<&str>,
    sub_section: Option<&str>,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let result = match (id, section) {
        (Some(id), _) => print_detail(&store, id, json).await,
        (None, Some(section)) => match normalize_section(Some(section.to_string())) {
            Some(section) => {
                print_anchor(&store, &section, sub_section, config.retrieval.top_k, json).await
            }
            None => Err(anyhow!("--section must not be empty")),
        },
        (None, None) => Err(anyhow!("either <chunk_id> or --section is required")),
    };
    store.pool().close().await;
    result
}

async fn print_detail(store: &SqliteStore, id: &str, json: bool) -> Result<()> {
    let Some(detail) = get_chunk_detail(store, id).await? else {
        bail!("chunk not found: {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let identity = &detail.record.chunk.identity;
    let content = &detail.record.chunk.content;
    println!("--- Chunk ---");
    println!("chunk_id:        {}", identity.chunk_id);
    println!("role:            {}", identity.chunk_role.as_str());
    if let Some(ref parent) = identity.parent_chunk_id {
        println!("parent:          {}", parent);
    }
    println!("document_type:   {}", identity.document_type);
    println!("authority_level: {}", identity.authority_level);
    println!("binding:         {}", identity.binding);
    println!(
        "section:         {}",
        identity.section.as_deref().unwrap_or("-")
    );
    if let Some(ref sub) = identity.sub_section {
        println!("sub_section:     {}", sub);
    }
    println!(
        "title:           {}",
        content.title.as_deref().unwrap_or("(untitled)")
    );
    println!("status:          {}", detail.record.status);
    println!("priority:        {}", detail.record.rule.priority);
    if let Some(ref citation) = content.citation {
        println!("citation:        {}", citation);
    }
    println!();

    println!("--- Text ---");
    println!("{}", content.text);
    println!();

    println!("--- Relationships ({}) ---", detail.relationships.len());
    for rel in &detail.relationships {
        println!("{} {}", rel.label, rel.target_chunk_id);
    }

    Ok(())
}

async fn print_anchor(
    store: &SqliteStore,
    section: &str,
    sub_section: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let records = lookup_anchor(store, section, sub_section, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No active chunks at section {}.", section);
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  [{}] {}  {}",
            record.id(),
            record.chunk.identity.document_type,
            record.chunk.role().as_str(),
            record.chunk.content.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
