//! Lifecycle commands: `approve` (DRAFT → ACTIVE) and `retire`
//! (ACTIVE → RETIRED).
//!
//! Acting on a parent also moves those of its children that are in the
//! same starting state, so a section becomes visible or invisible to
//! retrieval as a unit. Acting on a single child moves only that child.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use lexguard_core::models::{ChunkRole, LifecycleStatus};
use lexguard_core::store::{ChunkRepository, ChunkWriter};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Approve,
    Retire,
}

impl LifecycleAction {
    pub fn target(&self) -> LifecycleStatus {
        match self {
            LifecycleAction::Approve => LifecycleStatus::Active,
            LifecycleAction::Retire => LifecycleStatus::Retired,
        }
    }
}

/// Apply `action` to `chunk_id`, cascading to children of a parent.
/// Returns the ids that changed state.
pub async fn apply(
    store: &SqliteStore,
    chunk_id: &str,
    action: LifecycleAction,
) -> Result<Vec<String>> {
    let next = action.target();
    let prev = store.set_status(chunk_id, next).await?;
    let mut changed = vec![chunk_id.to_string()];

    let is_parent = store
        .get_chunk(chunk_id)
        .await?
        .is_some_and(|r| r.chunk.role() == ChunkRole::Parent);
    if is_parent {
        for child in children_of(store.pool(), chunk_id).await? {
            let Some(record) = store.get_chunk(&child).await? else {
                continue;
            };
            if record.status == prev {
                store.set_status(&child, next).await?;
                changed.push(child);
            }
        }
    }

    info!(chunk_id, from = %prev, to = %next, changed = changed.len(), "lifecycle transition");
    Ok(changed)
}

async fn children_of(pool: &SqlitePool, parent_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        "SELECT chunk_id FROM chunks_identity WHERE parent_chunk_id = ? ORDER BY chunk_id",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn run_lifecycle(config: &Config, chunk_id: &str, action: LifecycleAction) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let result = apply(&store, chunk_id, action).await;
    store.pool().close().await;
    let changed = result?;

    println!("lifecycle {}", action.target());
    for id in &changed {
        println!("  {}", id);
    }
    Ok(())
}
