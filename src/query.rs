//! `lexguard query`: run one question through the retrieval pipeline.
//!
//! The store backs both the chunk repository and the vector index. The
//! embedding provider and language model come from config; either may be
//! `disabled`, in which case semantic search contributes nothing and
//! synthesis fails with the evidence still printed.

use anyhow::{bail, Result};
use std::sync::Arc;

use lexguard_core::evidence::{ChunkView, SourceType};
use lexguard_core::retrieval::{QueryRequest, QueryResponse, Retriever};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::llm;
use crate::sqlite_store::SqliteStore;

/// Build a [`Retriever`] over the configured database and providers.
pub async fn open_retriever(config: &Config) -> Result<(Arc<SqliteStore>, Retriever)> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let embedder = embedding::create_provider(&config.embedding)?;
    let model = llm::create_llm(&config.llm)?;
    let retriever = Retriever::new(
        store.clone(),
        store.clone(),
        embedder,
        model,
        config.retriever_config(),
    );
    Ok((store, retriever))
}

pub async fn run_query(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let (store, retriever) = open_retriever(config).await?;
    let request = QueryRequest {
        query: query.to_string(),
        top_k,
    };
    let result = retriever.answer(&request).await;
    store.pool().close().await;
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        QueryResponse::Answer(answer) => {
            println!("{}", answer.answer.trim());
            println!();
            if !answer.citations.is_empty() {
                println!("Citations: {}", answer.citations.join(", "));
            }
            println!(
                "intent: {}  direct: {}  supplementary: {}",
                answer.intent.as_str(),
                answer.direct_lookup_count,
                answer.supplementary_count
            );
            if !answer.parent_laws.is_empty() {
                let parents: Vec<&str> = answer
                    .parent_laws
                    .iter()
                    .map(|p| p.chunk_id.as_str())
                    .collect();
                println!("parent laws: {}", parents.join(", "));
            }
            print_sources(&answer.retrieved_chunks);
        }
        QueryResponse::Refusal(refusal) => {
            println!("Refused: {}", refusal.reason);
            print_sources(&refusal.retrieved_chunks);
        }
        QueryResponse::GenerationFailed(failure) => {
            println!("{}: {}", failure.code, failure.message);
            print_sources(&failure.retrieved_chunks);
        }
    }

    Ok(())
}

fn source_label(source: SourceType) -> &'static str {
    match source {
        SourceType::DirectLookup => "direct",
        SourceType::Semantic => "semantic",
        SourceType::Supplementary => "supplementary",
    }
}

fn print_sources(chunks: &[ChunkView]) {
    if chunks.is_empty() {
        println!("No sources.");
        return;
    }
    println!();
    println!("Sources:");
    for (i, c) in chunks.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}, {}, {})",
            i + 1,
            c.similarity_score,
            c.chunk_id,
            c.document_type,
            c.priority,
            source_label(c.source_type)
        );
        if let Some(ref title) = c.title {
            println!("    {}", title);
        }
    }
}
