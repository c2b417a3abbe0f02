//! Governance rule tables and consistency checks.
//!
//! Authority level, binding status, and retrieval priority are all derived
//! deterministically from a chunk's [`DocumentType`]. The refusal policy is
//! in turn derived from the priority:
//!
//! | priority | standalone | must reference parent | refuse if parent missing |
//! |----------|------------|-----------------------|--------------------------|
//! | 1        | yes        | no                    | no                       |
//! | 2–4      | no         | yes                   | yes                      |
//!
//! The validators in this module check records produced elsewhere
//! (ingestion, imports) against the same invariants.

use thiserror::Error;

use crate::models::{
    AuthorityLevel, ChunkIdentity, ChunkRole, DocumentType, EmbeddingRecord, Priority, QueryKind,
    RefusalPolicy, RelationshipLabel, RetrievalRule,
};

/// A record that breaks one of the governance invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceViolation {
    #[error("parent chunk {0} must not have a parent_chunk_id")]
    ParentWithParentId(String),
    #[error("child chunk {0} must have a parent_chunk_id")]
    ChildWithoutParentId(String),
    #[error("chunk {chunk_id}: priority 1 requires can_answer_standalone")]
    TopPriorityNotStandalone { chunk_id: String },
    #[error("chunk {chunk_id}: priority {priority} requires must_reference_parent_law")]
    MissingParentReference { chunk_id: String, priority: u8 },
    #[error("chunk {chunk_id}: requires_parent_law must be set exactly when priority >= 2")]
    InconsistentParentRequirement { chunk_id: String },
    #[error("parent chunk {0} must never have an enabled embedding")]
    ParentEmbedded(String),
    #[error("{from} cannot {label} {to}")]
    InvalidRelationship {
        from: DocumentType,
        label: RelationshipLabel,
        to: DocumentType,
    },
}

impl DocumentType {
    pub fn authority_level(&self) -> AuthorityLevel {
        match self {
            DocumentType::Act
            | DocumentType::Rule
            | DocumentType::Regulation
            | DocumentType::Schedule => AuthorityLevel::Statutory,
            DocumentType::Order | DocumentType::Notification | DocumentType::Circular => {
                AuthorityLevel::Interpretive
            }
            DocumentType::Sop
            | DocumentType::Form
            | DocumentType::Guideline
            | DocumentType::Register
            | DocumentType::Return => AuthorityLevel::Procedural,
            DocumentType::PracticeNote
            | DocumentType::Commentary
            | DocumentType::Textbook
            | DocumentType::QaBook
            | DocumentType::Qa
            | DocumentType::Other => AuthorityLevel::Commentary,
        }
    }

    pub fn is_binding(&self) -> bool {
        match self {
            DocumentType::Act
            | DocumentType::Rule
            | DocumentType::Regulation
            | DocumentType::Order
            | DocumentType::Notification
            | DocumentType::Form
            | DocumentType::Schedule
            | DocumentType::Register
            | DocumentType::Return => true,
            DocumentType::Circular
            | DocumentType::Sop
            | DocumentType::Guideline
            | DocumentType::PracticeNote
            | DocumentType::Commentary
            | DocumentType::Textbook
            | DocumentType::QaBook
            | DocumentType::Qa
            | DocumentType::Other => false,
        }
    }

    pub fn default_priority(&self) -> Priority {
        let p = match self {
            DocumentType::Act | DocumentType::Rule | DocumentType::Schedule => 1,
            DocumentType::Regulation
            | DocumentType::Order
            | DocumentType::Notification
            | DocumentType::Circular => 2,
            DocumentType::Sop
            | DocumentType::Form
            | DocumentType::Guideline
            | DocumentType::Register
            | DocumentType::Return => 3,
            DocumentType::PracticeNote
            | DocumentType::Commentary
            | DocumentType::Textbook
            | DocumentType::QaBook
            | DocumentType::Qa
            | DocumentType::Other => 4,
        };
        Priority::new(p).unwrap_or(Priority::LOWEST)
    }
}

impl RetrievalRule {
    pub fn for_document_type(document_type: DocumentType) -> Self {
        let priority = document_type.default_priority();
        Self {
            priority,
            requires_parent_law: priority != Priority::HIGHEST,
            allowed_query_types: QueryKind::ALL.into_iter().collect(),
        }
    }

    pub fn allows(&self, kind: QueryKind) -> bool {
        self.allowed_query_types.contains(&kind)
    }
}

impl RefusalPolicy {
    pub fn for_priority(priority: Priority) -> Self {
        if priority == Priority::HIGHEST {
            Self {
                can_answer_standalone: true,
                must_reference_parent_law: false,
                refuse_if_parent_missing: false,
            }
        } else {
            Self {
                can_answer_standalone: false,
                must_reference_parent_law: true,
                refuse_if_parent_missing: true,
            }
        }
    }
}

/// `parent` role ⇔ no parent id; `child` role ⇔ parent id present.
pub fn validate_identity(identity: &ChunkIdentity) -> Result<(), GovernanceViolation> {
    match (identity.chunk_role, identity.parent_chunk_id.as_deref()) {
        (ChunkRole::Parent, Some(_)) => Err(GovernanceViolation::ParentWithParentId(
            identity.chunk_id.clone(),
        )),
        (ChunkRole::Child, None) | (ChunkRole::Child, Some("")) => Err(
            GovernanceViolation::ChildWithoutParentId(identity.chunk_id.clone()),
        ),
        _ => Ok(()),
    }
}

/// Priority and refusal fields must agree.
pub fn validate_rule_policy(
    chunk_id: &str,
    rule: &RetrievalRule,
    policy: &RefusalPolicy,
) -> Result<(), GovernanceViolation> {
    let top = rule.priority == Priority::HIGHEST;
    if top && !policy.can_answer_standalone {
        return Err(GovernanceViolation::TopPriorityNotStandalone {
            chunk_id: chunk_id.to_string(),
        });
    }
    if !top && !policy.must_reference_parent_law {
        return Err(GovernanceViolation::MissingParentReference {
            chunk_id: chunk_id.to_string(),
            priority: rule.priority.get(),
        });
    }
    if rule.requires_parent_law == top {
        return Err(GovernanceViolation::InconsistentParentRequirement {
            chunk_id: chunk_id.to_string(),
        });
    }
    Ok(())
}

/// Parents are never embedded.
pub fn validate_embedding(
    role: ChunkRole,
    record: &EmbeddingRecord,
) -> Result<(), GovernanceViolation> {
    if role == ChunkRole::Parent && record.enabled {
        return Err(GovernanceViolation::ParentEmbedded(record.chunk_id.clone()));
    }
    Ok(())
}

/// Semantic checks on an edge before it is written.
///
/// Only procedural documents implement, and only statutory documents are
/// implemented. Amendments come from acts, rules, regulations or
/// notifications. Inverse labels are checked from the forward side.
pub fn validate_relationship(
    from: DocumentType,
    label: RelationshipLabel,
    to: DocumentType,
) -> Result<(), GovernanceViolation> {
    let (src, fwd, dst) = match label {
        RelationshipLabel::ImplementedBy | RelationshipLabel::AmendedBy => {
            (to, label.inverse(), from)
        }
        _ => (from, label, to),
    };
    let ok = match fwd {
        RelationshipLabel::Implements => {
            matches!(
                src,
                DocumentType::Sop | DocumentType::Form | DocumentType::Guideline
            ) && matches!(
                dst,
                DocumentType::Act | DocumentType::Rule | DocumentType::Regulation
            )
        }
        RelationshipLabel::Amends => matches!(
            src,
            DocumentType::Act
                | DocumentType::Rule
                | DocumentType::Regulation
                | DocumentType::Notification
        ),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(GovernanceViolation::InvalidRelationship { from, label, to })
    }
}
