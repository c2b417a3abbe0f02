//! Core data models for the governance knowledge base.
//!
//! A [`Chunk`] is split into an immutable [`ChunkIdentity`] (id, role,
//! lineage, document type and the authority fields derived from it,
//! statutory anchors) and a mutable [`ChunkContent`] (title, text,
//! summary, citation). Editorial corrections only ever touch the content
//! half, so lineage and embeddings keyed on identity stay valid.
//!
//! Governance metadata lives alongside each chunk as one
//! [`RetrievalRule`] and one [`RefusalPolicy`] row, and the read side of
//! the store hands all of it back together as a [`ChunkRecord`].
//!
//! All classification fields are closed enums so that the priority and
//! binding derivations in [`crate::rules`] are checked for exhaustiveness
//! by the compiler.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of source document a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Act,
    Rule,
    Regulation,
    Order,
    Notification,
    Circular,
    Sop,
    Form,
    Guideline,
    PracticeNote,
    Commentary,
    Textbook,
    QaBook,
    Schedule,
    Register,
    Return,
    Qa,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 18] = [
        DocumentType::Act,
        DocumentType::Rule,
        DocumentType::Regulation,
        DocumentType::Order,
        DocumentType::Notification,
        DocumentType::Circular,
        DocumentType::Sop,
        DocumentType::Form,
        DocumentType::Guideline,
        DocumentType::PracticeNote,
        DocumentType::Commentary,
        DocumentType::Textbook,
        DocumentType::QaBook,
        DocumentType::Schedule,
        DocumentType::Register,
        DocumentType::Return,
        DocumentType::Qa,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Act => "act",
            DocumentType::Rule => "rule",
            DocumentType::Regulation => "regulation",
            DocumentType::Order => "order",
            DocumentType::Notification => "notification",
            DocumentType::Circular => "circular",
            DocumentType::Sop => "sop",
            DocumentType::Form => "form",
            DocumentType::Guideline => "guideline",
            DocumentType::PracticeNote => "practice_note",
            DocumentType::Commentary => "commentary",
            DocumentType::Textbook => "textbook",
            DocumentType::QaBook => "qa_book",
            DocumentType::Schedule => "schedule",
            DocumentType::Register => "register",
            DocumentType::Return => "return",
            DocumentType::Qa => "qa",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match DocumentType::ALL.iter().find(|t| t.as_str() == s) {
            Some(t) => Ok(*t),
            None => bail!("invalid document_type: {}", s),
        }
    }
}

/// How much weight a source carries, derived from its [`DocumentType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Statutory,
    Interpretive,
    Procedural,
    Commentary,
}

impl AuthorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityLevel::Statutory => "statutory",
            AuthorityLevel::Interpretive => "interpretive",
            AuthorityLevel::Procedural => "procedural",
            AuthorityLevel::Commentary => "commentary",
        }
    }
}

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "statutory" => Ok(AuthorityLevel::Statutory),
            "interpretive" => Ok(AuthorityLevel::Interpretive),
            "procedural" => Ok(AuthorityLevel::Procedural),
            "commentary" => Ok(AuthorityLevel::Commentary),
            other => bail!("invalid authority_level: {}", other),
        }
    }
}

/// Whether a chunk is a whole logical unit or an embedded sub-span of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRole {
    Parent,
    Child,
}

impl ChunkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkRole::Parent => "parent",
            ChunkRole::Child => "child",
        }
    }

    /// Sort rank used for parent-before-child ordering.
    pub fn rank(&self) -> u8 {
        match self {
            ChunkRole::Parent => 0,
            ChunkRole::Child => 1,
        }
    }
}

impl FromStr for ChunkRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "parent" => Ok(ChunkRole::Parent),
            "child" => Ok(ChunkRole::Child),
            other => bail!("invalid chunk_role: {}", other),
        }
    }
}

/// Approval state of a chunk. Only `Active` chunks are visible to retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LifecycleStatus {
    Draft,
    Active,
    Retired,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "DRAFT",
            LifecycleStatus::Active => "ACTIVE",
            LifecycleStatus::Retired => "RETIRED",
        }
    }

    /// `DRAFT → ACTIVE` and `ACTIVE → RETIRED` are the only legal moves.
    pub fn can_transition_to(&self, next: LifecycleStatus) -> bool {
        matches!(
            (self, next),
            (LifecycleStatus::Draft, LifecycleStatus::Active)
                | (LifecycleStatus::Active, LifecycleStatus::Retired)
        )
    }

    /// Chunks in this state may still receive embeddings.
    pub fn is_embeddable(&self) -> bool {
        !matches!(self, LifecycleStatus::Retired)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "DRAFT" => Ok(LifecycleStatus::Draft),
            "ACTIVE" => Ok(LifecycleStatus::Active),
            "RETIRED" => Ok(LifecycleStatus::Retired),
            other => bail!("invalid lifecycle status: {}", other),
        }
    }
}

/// Directed edge label between two chunks.
///
/// Every label has an inverse. Writers store both directions; readers
/// never derive one from the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLabel {
    PartOf,
    HasPart,
    Precedes,
    Follows,
    Clarifies,
    ClarifiedBy,
    Proceduralises,
    ProceduralisedBy,
    Implements,
    ImplementedBy,
    Amends,
    AmendedBy,
    Supersedes,
    SupersededBy,
}

impl RelationshipLabel {
    pub const ALL: [RelationshipLabel; 14] = [
        RelationshipLabel::PartOf,
        RelationshipLabel::HasPart,
        RelationshipLabel::Precedes,
        RelationshipLabel::Follows,
        RelationshipLabel::Clarifies,
        RelationshipLabel::ClarifiedBy,
        RelationshipLabel::Proceduralises,
        RelationshipLabel::ProceduralisedBy,
        RelationshipLabel::Implements,
        RelationshipLabel::ImplementedBy,
        RelationshipLabel::Amends,
        RelationshipLabel::AmendedBy,
        RelationshipLabel::Supersedes,
        RelationshipLabel::SupersededBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipLabel::PartOf => "part_of",
            RelationshipLabel::HasPart => "has_part",
            RelationshipLabel::Precedes => "precedes",
            RelationshipLabel::Follows => "follows",
            RelationshipLabel::Clarifies => "clarifies",
            RelationshipLabel::ClarifiedBy => "clarified_by",
            RelationshipLabel::Proceduralises => "proceduralises",
            RelationshipLabel::ProceduralisedBy => "proceduralised_by",
            RelationshipLabel::Implements => "implements",
            RelationshipLabel::ImplementedBy => "implemented_by",
            RelationshipLabel::Amends => "amends",
            RelationshipLabel::AmendedBy => "amended_by",
            RelationshipLabel::Supersedes => "supersedes",
            RelationshipLabel::SupersededBy => "superseded_by",
        }
    }

    pub fn inverse(&self) -> RelationshipLabel {
        match self {
            RelationshipLabel::PartOf => RelationshipLabel::HasPart,
            RelationshipLabel::HasPart => RelationshipLabel::PartOf,
            RelationshipLabel::Precedes => RelationshipLabel::Follows,
            RelationshipLabel::Follows => RelationshipLabel::Precedes,
            RelationshipLabel::Clarifies => RelationshipLabel::ClarifiedBy,
            RelationshipLabel::ClarifiedBy => RelationshipLabel::Clarifies,
            RelationshipLabel::Proceduralises => RelationshipLabel::ProceduralisedBy,
            RelationshipLabel::ProceduralisedBy => RelationshipLabel::Proceduralises,
            RelationshipLabel::Implements => RelationshipLabel::ImplementedBy,
            RelationshipLabel::ImplementedBy => RelationshipLabel::Implements,
            RelationshipLabel::Amends => RelationshipLabel::AmendedBy,
            RelationshipLabel::AmendedBy => RelationshipLabel::Amends,
            RelationshipLabel::Supersedes => RelationshipLabel::SupersededBy,
            RelationshipLabel::SupersededBy => RelationshipLabel::Supersedes,
        }
    }
}

impl fmt::Display for RelationshipLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match RelationshipLabel::ALL.iter().find(|l| l.as_str() == s) {
            Some(l) => Ok(*l),
            None => bail!("invalid relationship label: {}", s),
        }
    }
}

/// Query intent category, used in [`RetrievalRule::allowed_query_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Definition,
    Section,
    General,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [QueryKind::Definition, QueryKind::Section, QueryKind::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Definition => "definition",
            QueryKind::Section => "section",
            QueryKind::General => "general",
        }
    }
}

impl FromStr for QueryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "definition" => Ok(QueryKind::Definition),
            "section" => Ok(QueryKind::Section),
            "general" => Ok(QueryKind::General),
            other => bail!("invalid query type: {}", other),
        }
    }
}

/// Retrieval priority, `1` (highest authority) through `4` (commentary only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const LOWEST: Priority = Priority(4);

    pub fn new(value: u8) -> Option<Self> {
        (1..=4).contains(&value).then_some(Priority(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// True when `self` carries strictly more authority than `other`.
    pub fn outranks(&self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value).ok_or_else(|| format!("priority must be in 1..=4, got {}", value))
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable identity half of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkIdentity {
    pub chunk_id: String,
    pub chunk_role: ChunkRole,
    pub parent_chunk_id: Option<String>,
    pub document_type: DocumentType,
    pub authority_level: AuthorityLevel,
    pub binding: bool,
    pub section: Option<String>,
    pub sub_section: Option<String>,
}

impl ChunkIdentity {
    /// Identity for a parent chunk; authority and binding are derived.
    pub fn parent(
        chunk_id: impl Into<String>,
        document_type: DocumentType,
        section: Option<String>,
        sub_section: Option<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            chunk_role: ChunkRole::Parent,
            parent_chunk_id: None,
            document_type,
            authority_level: document_type.authority_level(),
            binding: document_type.is_binding(),
            section,
            sub_section,
        }
    }

    /// Identity for a child of `parent`, inheriting its classification
    /// and anchors.
    pub fn child_of(chunk_id: impl Into<String>, parent: &ChunkIdentity) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            chunk_role: ChunkRole::Child,
            parent_chunk_id: Some(parent.chunk_id.clone()),
            document_type: parent.document_type,
            authority_level: parent.authority_level,
            binding: parent.binding,
            section: parent.section.clone(),
            sub_section: parent.sub_section.clone(),
        }
    }
}

/// Mutable content half of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkContent {
    pub title: Option<String>,
    pub compliance_area: Option<String>,
    pub text: String,
    pub summary: Option<String>,
    pub citation: Option<String>,
}

/// A chunk: identity plus content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub identity: ChunkIdentity,
    pub content: ChunkContent,
}

impl Chunk {
    pub fn id(&self) -> &str {
        &self.identity.chunk_id
    }

    pub fn role(&self) -> ChunkRole {
        self.identity.chunk_role
    }

    pub fn text(&self) -> &str {
        &self.content.text
    }
}

/// Per-chunk retrieval rule row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRule {
    pub priority: Priority,
    pub requires_parent_law: bool,
    pub allowed_query_types: BTreeSet<QueryKind>,
}

/// Per-chunk refusal policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefusalPolicy {
    pub can_answer_standalone: bool,
    pub must_reference_parent_law: bool,
    pub refuse_if_parent_missing: bool,
}

/// Embedding bookkeeping for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub enabled: bool,
    pub model: Option<String>,
    pub vector_id: Option<String>,
    pub embedded_at: Option<DateTime<Utc>>,
    /// SHA-256 of the text the vector was computed from.
    pub content_hash: Option<String>,
}

/// A directed, labelled edge between two chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_chunk_id: String,
    pub label: RelationshipLabel,
    pub target_chunk_id: String,
    pub confidence: Option<f64>,
}

/// A chunk joined with its governance rows and lifecycle status, as the
/// repository returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub rule: RetrievalRule,
    pub policy: RefusalPolicy,
    pub status: LifecycleStatus,
}

impl ChunkRecord {
    /// Build a record whose rule and policy are derived from the
    /// document type, in the given lifecycle state.
    pub fn derived(chunk: Chunk, status: LifecycleStatus) -> Self {
        let rule = RetrievalRule::for_document_type(chunk.identity.document_type);
        let policy = RefusalPolicy::for_priority(rule.priority);
        Self {
            chunk,
            rule,
            policy,
            status,
        }
    }

    pub fn id(&self) -> &str {
        self.chunk.id()
    }

    pub fn priority(&self) -> Priority {
        self.rule.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_str_roundtrip() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
        }
        assert!("memo".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_relationship_inverse_is_involution() {
        for l in RelationshipLabel::ALL {
            assert_ne!(l.inverse(), l);
            assert_eq!(l.inverse().inverse(), l);
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Retired));
        assert!(!Draft.can_transition_to(Retired));
        assert!(!Retired.can_transition_to(Active));
        assert!(!Active.can_transition_to(Draft));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_priority_bounds() {
        assert!(Priority::new(0).is_none());
        assert!(Priority::new(5).is_none());
        assert_eq!(Priority::new(3).unwrap().get(), 3);
        assert!(Priority::HIGHEST.outranks(Priority::LOWEST));
        assert!(!Priority::LOWEST.outranks(Priority::LOWEST));
    }

    #[test]
    fn test_priority_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<Priority>("2").is_ok());
        assert!(serde_json::from_str::<Priority>("7").is_err());
    }

    #[test]
    fn test_child_inherits_parent_anchor() {
        let parent = ChunkIdentity::parent(
            "ca2013_act_s017",
            DocumentType::Act,
            Some("017".into()),
            None,
        );
        let child = ChunkIdentity::child_of("ca2013_act_s017_c1", &parent);
        assert_eq!(child.chunk_role, ChunkRole::Child);
        assert_eq!(child.parent_chunk_id.as_deref(), Some("ca2013_act_s017"));
        assert_eq!(child.section.as_deref(), Some("017"));
        assert_eq!(child.authority_level, AuthorityLevel::Statutory);
    }
}
