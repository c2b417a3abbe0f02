//! Refusal policy engine.
//!
//! Decides whether an authoritative evidence set may be synthesized from.
//! Only the least authoritative tier of the set is evaluated: if every
//! chunk in it is priority 1 the set proceeds; otherwise each chunk in that
//! tier that requires a parent law must have a related chunk of strictly
//! higher priority in the same set.
//!
//! "Related" means reachable by one `implements` or `clarifies` edge from
//! the chunk itself or from its parent chunk. Edges are read as stored;
//! inverses are never inferred here.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use crate::error::RefusalReason;
use crate::evidence::Evidence;
use crate::models::{Priority, RelationshipLabel};
use crate::store::ChunkRepository;

const PARENT_LAW_LABELS: [RelationshipLabel; 2] =
    [RelationshipLabel::Implements, RelationshipLabel::Clarifies];

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Proceed,
    Refuse {
        reason: RefusalReason,
        /// The chunk that failed the check.
        chunk_id: String,
    },
}

impl PolicyDecision {
    pub fn is_refusal(&self) -> bool {
        matches!(self, PolicyDecision::Refuse { .. })
    }
}

/// Evaluate `evidence` against the refusal policy.
///
/// An empty set proceeds; the caller answers it without the LLM.
pub async fn evaluate(
    repo: &dyn ChunkRepository,
    evidence: &[Evidence],
) -> Result<PolicyDecision> {
    let Some(lowest) = evidence.iter().map(|e| e.priority()).max() else {
        return Ok(PolicyDecision::Proceed);
    };
    if lowest == Priority::HIGHEST {
        return Ok(PolicyDecision::Proceed);
    }

    for item in evidence.iter().filter(|e| e.priority() == lowest) {
        let policy = item.record.policy;
        let needs_parent = lowest == Priority::LOWEST || policy.refuse_if_parent_missing;
        if !needs_parent {
            continue;
        }

        let related = related_ids(repo, item).await?;
        let satisfied = evidence.iter().any(|other| {
            other.priority().outranks(item.priority())
                && (related.contains(other.id())
                    || other
                        .record
                        .chunk
                        .identity
                        .parent_chunk_id
                        .as_deref()
                        .is_some_and(|p| related.contains(p)))
        });

        if !satisfied {
            debug!(
                chunk_id = item.id(),
                priority = item.priority().get(),
                "no higher-authority parent law in evidence set"
            );
            return Ok(PolicyDecision::Refuse {
                reason: RefusalReason::InsufficientAuthoritativeSource,
                chunk_id: item.id().to_string(),
            });
        }
    }

    Ok(PolicyDecision::Proceed)
}

async fn related_ids(repo: &dyn ChunkRepository, item: &Evidence) -> Result<HashSet<String>> {
    let identity = &item.record.chunk.identity;
    let mut sources = vec![identity.chunk_id.as_str()];
    if let Some(p) = identity.parent_chunk_id.as_deref() {
        sources.push(p);
    }

    let mut out = HashSet::new();
    for source in sources {
        for label in PARENT_LAW_LABELS {
            out.extend(repo.related_chunks(source, label).await?);
        }
    }
    Ok(out)
}
