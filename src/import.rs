//! Chunk import: the ingestion boundary.
//!
//! Reads finalized parent chunks from a JSONL file (one JSON object per
//! line) and writes, for each one, its identity, content, derived
//! retrieval rule and refusal policy, lifecycle row, derived children, and
//! reciprocal relationship edges.
//!
//! ```json
//! {"chunk_id": "ca2013_act_s017", "document_type": "act", "section": "17",
//!  "title": "Annual return", "text": "...", "status": "ACTIVE",
//!  "relationships": [{"label": "clarified_by", "target": "ca2013_circ_s017"}]}
//! ```
//!
//! Chunks are written in a first pass and edges in a second, so a line may
//! reference a chunk that appears later in the file. Re-importing a chunk
//! replaces its content and keeps its lifecycle status. A `status` on the
//! line of an existing chunk is applied as a lifecycle transition, which
//! cascades to children in the same state like `lexguard lifecycle`;
//! illegal transitions (anything out of RETIRED, or DRAFT to RETIRED) are
//! reported and skipped. Children left over from a longer previous text
//! are retired if they were active.
//!
//! With auto-linking on, parents that declare no relationships of their
//! own are linked to the Act chunk of the same section by document type:
//!
//! | document_type | edge to the Act |
//! |---------------|-----------------|
//! | sop, form, guideline | `implements` |
//! | rule, regulation, notification, order, circular | `clarifies` |
//! | schedule, register, return | `proceduralises` |
//!
//! Commentary-tier material is never linked automatically.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use lexguard_core::chunk::{child_id, derive_children};
use lexguard_core::classifier::canonical_section;
use lexguard_core::models::{
    Chunk, ChunkContent, ChunkIdentity, ChunkRecord, ChunkRole, DocumentType, LifecycleStatus,
    RelationshipLabel,
};
use lexguard_core::rules::validate_relationship;
use lexguard_core::store::{ChunkRepository, ChunkWriter};

use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub chunk_id: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub sub_section: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub compliance_area: Option<String>,
    pub text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub relationships: Vec<ImportRelationship>,
    #[serde(default)]
    pub status: Option<LifecycleStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRelationship {
    pub label: RelationshipLabel,
    pub target: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub parents: usize,
    pub children: usize,
    pub relationships: usize,
    pub derived_relationships: usize,
    pub retired_children: usize,
    pub status_changes: usize,
    pub rejected_status_changes: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportOptions {
    /// Derive edges to the same-section Act for parents without any.
    pub auto_link: bool,
}

/// Edge label an auto-linked parent of type `t` gets towards its Act.
pub fn auto_link_label(t: DocumentType) -> Option<RelationshipLabel> {
    match t {
        DocumentType::Sop | DocumentType::Form | DocumentType::Guideline => {
            Some(RelationshipLabel::Implements)
        }
        DocumentType::Rule
        | DocumentType::Regulation
        | DocumentType::Notification
        | DocumentType::Order
        | DocumentType::Circular => Some(RelationshipLabel::Clarifies),
        DocumentType::Schedule | DocumentType::Register | DocumentType::Return => {
            Some(RelationshipLabel::Proceduralises)
        }
        DocumentType::Act
        | DocumentType::PracticeNote
        | DocumentType::Commentary
        | DocumentType::Textbook
        | DocumentType::QaBook
        | DocumentType::Qa
        | DocumentType::Other => None,
    }
}

/// A parent written by this import, kept for auto-linking.
struct Imported {
    chunk_id: String,
    document_type: DocumentType,
    section: Option<String>,
    declares_edges: bool,
}

/// Parse JSONL, skipping blank lines. Errors name the offending line.
pub fn parse_jsonl(content: &str) -> Result<Vec<ImportRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid record on line {}", n + 1))
        })
        .collect()
}

/// Numeric sections are stored in the same 3-digit form the classifier
/// produces for queries.
pub fn normalize_section(section: Option<String>) -> Option<String> {
    let s = section?.trim().to_string();
    if s.is_empty() {
        return None;
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        Some(canonical_section(&s))
    } else {
        Some(s)
    }
}

/// Write `records` and their children and edges to `store`.
pub async fn import_records<S>(
    store: &S,
    records: Vec<ImportRecord>,
    chunking: &ChunkingConfig,
    options: ImportOptions,
) -> Result<ImportStats>
where
    S: ChunkRepository + ChunkWriter + ?Sized,
{
    let mut stats = ImportStats::default();
    let mut edges = Vec::new();
    let mut imported = Vec::new();

    for rec in records {
        if rec.chunk_id.trim().is_empty() {
            bail!("chunk_id must not be empty");
        }
        let existing = store.get_chunk(&rec.chunk_id).await?.map(|r| r.status);
        let status = existing
            .or(rec.status)
            .unwrap_or(LifecycleStatus::Draft);
        let section = normalize_section(rec.section);

        let parent = Chunk {
            identity: ChunkIdentity::parent(
                rec.chunk_id.clone(),
                rec.document_type,
                section.clone(),
                rec.sub_section.filter(|s| !s.trim().is_empty()),
            ),
            content: ChunkContent {
                title: rec.title,
                compliance_area: rec.compliance_area,
                text: rec.text,
                summary: rec.summary,
                citation: rec.citation,
            },
        };
        let children = derive_children(&parent, chunking.max_chars, chunking.overlap_chars);

        store
            .upsert_chunk(&ChunkRecord::derived(parent, status))
            .await
            .with_context(|| format!("failed to write chunk {}", rec.chunk_id))?;
        stats.parents += 1;

        // New children start in the parent's state; existing ones keep theirs.
        for child in &children {
            store
                .upsert_chunk(&ChunkRecord::derived(child.clone(), status))
                .await
                .with_context(|| format!("failed to write chunk {}", child.id()))?;
        }
        stats.children += children.len();

        stats.retired_children +=
            retire_surplus_children(store, &rec.chunk_id, children.len() + 1).await?;

        if let (Some(current), Some(wanted)) = (existing, rec.status) {
            if current != wanted {
                let child_ids: Vec<&str> = children.iter().map(|c| c.id()).collect();
                if transition(store, &rec.chunk_id, &child_ids, current, wanted).await? {
                    stats.status_changes += 1;
                } else {
                    stats.rejected_status_changes += 1;
                }
            }
        }

        imported.push(Imported {
            chunk_id: rec.chunk_id.clone(),
            document_type: rec.document_type,
            section,
            declares_edges: !rec.relationships.is_empty(),
        });
        for rel in rec.relationships {
            edges.push((rec.chunk_id.clone(), rel));
        }
    }

    for (source, rel) in edges {
        store
            .link(&source, rel.label, &rel.target, rel.confidence)
            .await
            .with_context(|| format!("failed to link {} {} {}", source, rel.label, rel.target))?;
        stats.relationships += 1;
    }

    if options.auto_link {
        stats.derived_relationships = auto_link(store, &imported).await?;
    }

    Ok(stats)
}

/// Move an existing parent from `current` to `wanted`, cascading to the
/// listed children that were in `current`. Returns `false` and leaves
/// everything unchanged when the transition is illegal.
async fn transition<S>(
    store: &S,
    parent_id: &str,
    child_ids: &[&str],
    current: LifecycleStatus,
    wanted: LifecycleStatus,
) -> Result<bool>
where
    S: ChunkRepository + ChunkWriter + ?Sized,
{
    if !current.can_transition_to(wanted) {
        warn!(
            chunk_id = parent_id,
            from = %current,
            to = %wanted,
            "illegal lifecycle transition in import, status kept"
        );
        return Ok(false);
    }

    store.set_status(parent_id, wanted).await?;
    for id in child_ids {
        let Some(child) = store.get_chunk(id).await? else {
            continue;
        };
        if child.status == current {
            store.set_status(id, wanted).await?;
        }
    }
    info!(chunk_id = parent_id, from = %current, to = %wanted, "lifecycle transition in import");
    Ok(true)
}

/// Link parents without declared edges to the first Act chunk of their
/// section. The Act may come from this import in any state, or from the
/// store if it is ACTIVE. Returns the number of edges written.
async fn auto_link<S>(store: &S, imported: &[Imported]) -> Result<usize>
where
    S: ChunkRepository + ChunkWriter + ?Sized,
{
    let mut acts: BTreeMap<&str, String> = BTreeMap::new();
    for rec in imported {
        if let (DocumentType::Act, Some(section)) = (rec.document_type, rec.section.as_deref()) {
            let slot = acts.entry(section).or_insert_with(|| rec.chunk_id.clone());
            if rec.chunk_id < *slot {
                *slot = rec.chunk_id.clone();
            }
        }
    }

    let mut linked = 0;
    for rec in imported.iter().filter(|r| !r.declares_edges) {
        let (Some(label), Some(section)) = (auto_link_label(rec.document_type), rec.section.as_deref())
        else {
            continue;
        };
        let anchor = match acts.get(section) {
            Some(id) => Some(id.clone()),
            None => stored_act(store, section).await?,
        };
        let Some(anchor) = anchor else {
            debug!(chunk_id = %rec.chunk_id, section, "no Act chunk to link to");
            continue;
        };
        if let Err(e) = validate_relationship(rec.document_type, label, DocumentType::Act) {
            warn!(chunk_id = %rec.chunk_id, error = %e, "derived relationship skipped");
            continue;
        }
        store
            .link(&rec.chunk_id, label, &anchor, None)
            .await
            .with_context(|| format!("failed to link {} {} {}", rec.chunk_id, label, anchor))?;
        linked += 1;
    }
    Ok(linked)
}

async fn stored_act<S>(store: &S, section: &str) -> Result<Option<String>>
where
    S: ChunkRepository + ?Sized,
{
    Ok(store
        .active_chunks_by_section(section, usize::MAX)
        .await?
        .into_iter()
        .find(|r| {
            r.chunk.role() == ChunkRole::Parent
                && r.chunk.identity.document_type == DocumentType::Act
        })
        .map(|r| r.id().to_string()))
}

/// Retire active children numbered `from` and up, left over from a
/// previous import of a longer text.
async fn retire_surplus_children<S>(store: &S, parent_id: &str, from: usize) -> Result<usize>
where
    S: ChunkRepository + ChunkWriter + ?Sized,
{
    let mut retired = 0;
    let mut n = from;
    while let Some(stale) = store.get_chunk(&child_id(parent_id, n)).await? {
        if stale.status == LifecycleStatus::Active {
            store.set_status(stale.id(), LifecycleStatus::Retired).await?;
            retired += 1;
        } else {
            warn!(chunk_id = stale.id(), status = %stale.status, "surplus child left in place");
        }
        n += 1;
    }
    Ok(retired)
}

pub async fn run_import(config: &Config, path: &Path, options: ImportOptions) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let records = parse_jsonl(&content)?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let stats = import_records(&store, records, &config.chunking, options).await?;

    info!(
        parents = stats.parents,
        children = stats.children,
        relationships = stats.relationships,
        derived_relationships = stats.derived_relationships,
        "import complete"
    );
    println!("import");
    println!("  parents: {}", stats.parents);
    println!("  children: {}", stats.children);
    println!("  relationships: {}", stats.relationships);
    if options.auto_link {
        println!("  derived relationships: {}", stats.derived_relationships);
    }
    if stats.retired_children > 0 {
        println!("  retired stale children: {}", stats.retired_children);
    }
    if stats.status_changes > 0 {
        println!("  status changes: {}", stats.status_changes);
    }
    if stats.rejected_status_changes > 0 {
        println!(
            "  rejected status changes: {} (see log)",
            stats.rejected_status_changes
        );
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexguard_core::store::memory::InMemoryStore;

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            max_chars: 40,
            overlap_chars: 5,
        }
    }

    const JSONL: &str = r#"
{"chunk_id": "ca2013_act_s017", "document_type": "act", "section": "17", "title": "Annual return", "text": "Every company shall prepare a return. It shall be filed with the Registrar.", "status": "ACTIVE"}

{"chunk_id": "ca2013_sop_s017", "document_type": "sop", "section": "017", "text": "Steps to file.", "relationships": [{"label": "implements", "target": "ca2013_act_s017", "confidence": 0.8}]}
"#;

    #[test]
    fn test_parse_jsonl_skips_blank_lines_and_names_bad_line() {
        assert_eq!(parse_jsonl(JSONL).unwrap().len(), 2);
        let err = parse_jsonl("{\"chunk_id\": \"x\", \"document_type\": \"memo\", \"text\": \"t\"}")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[test]
    fn test_normalize_section() {
        assert_eq!(normalize_section(Some("17".into())).as_deref(), Some("017"));
        assert_eq!(normalize_section(Some("0002".into())).as_deref(), Some("002"));
        assert_eq!(normalize_section(Some("Schedule I".into())).as_deref(), Some("Schedule I"));
        assert_eq!(normalize_section(Some("  ".into())), None);
    }

    #[tokio::test]
    async fn test_import_writes_parents_children_and_edges() {
        let store = InMemoryStore::new();
        let stats = import_records(&store, parse_jsonl(JSONL).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.parents, 2);
        assert_eq!(stats.relationships, 1);
        assert!(stats.children >= 3);

        let act = store.get_chunk("ca2013_act_s017").await.unwrap().unwrap();
        assert_eq!(act.status, LifecycleStatus::Active);
        assert_eq!(act.chunk.identity.section.as_deref(), Some("017"));

        let c1 = store.get_chunk("ca2013_act_s017_c1").await.unwrap().unwrap();
        assert_eq!(c1.chunk.role(), ChunkRole::Child);
        assert_eq!(c1.status, LifecycleStatus::Active);

        let sop = store.get_chunk("ca2013_sop_s017").await.unwrap().unwrap();
        assert_eq!(sop.status, LifecycleStatus::Draft);

        assert_eq!(
            store
                .related_chunks("ca2013_act_s017", RelationshipLabel::ImplementedBy)
                .await
                .unwrap(),
            vec!["ca2013_sop_s017".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reimport_keeps_status_and_retires_surplus_children() {
        let store = InMemoryStore::new();
        import_records(&store, parse_jsonl(JSONL).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert!(store.get_chunk("ca2013_act_s017_c2").await.unwrap().is_some());

        let shorter = r#"{"chunk_id": "ca2013_act_s017", "document_type": "act", "section": "17", "text": "Short."}"#;
        let stats = import_records(&store, parse_jsonl(shorter).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.children, 1);
        assert!(stats.retired_children >= 1);

        let act = store.get_chunk("ca2013_act_s017").await.unwrap().unwrap();
        assert_eq!(act.status, LifecycleStatus::Active);
        assert_eq!(act.chunk.text(), "Short.");
        let c2 = store.get_chunk("ca2013_act_s017_c2").await.unwrap().unwrap();
        assert_eq!(c2.status, LifecycleStatus::Retired);
    }

    #[tokio::test]
    async fn test_invalid_relationship_is_rejected() {
        let store = InMemoryStore::new();
        let bad = r#"{"chunk_id": "a", "document_type": "act", "section": "1", "text": "x", "relationships": [{"label": "implements", "target": "b"}]}
{"chunk_id": "b", "document_type": "sop", "section": "1", "text": "y"}"#;
        assert!(import_records(&store, parse_jsonl(bad).unwrap(), &chunking(), ImportOptions::default())
            .await
            .is_err());
    }

    const ACTIVE_ACT: &str = r#"{"chunk_id": "c1", "document_type": "act", "section": "1", "text": "First sentence here. Second sentence follows it.", "status": "ACTIVE"}"#;

    #[tokio::test]
    async fn test_reimport_never_reactivates_retired_chunks() {
        let store = InMemoryStore::new();
        import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        store.set_status("c1", LifecycleStatus::Retired).await.unwrap();
        store.set_status("c1_c1", LifecycleStatus::Retired).await.unwrap();

        let stats = import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.rejected_status_changes, 1);
        assert_eq!(stats.status_changes, 0);
        assert_eq!(
            store.get_chunk("c1").await.unwrap().unwrap().status,
            LifecycleStatus::Retired
        );
        assert_eq!(
            store.get_chunk("c1_c1").await.unwrap().unwrap().status,
            LifecycleStatus::Retired
        );
    }

    #[tokio::test]
    async fn test_reimport_keeps_individually_retired_child() {
        let store = InMemoryStore::new();
        import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        store.set_status("c1_c1", LifecycleStatus::Retired).await.unwrap();

        let stats = import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.rejected_status_changes, 0);
        assert_eq!(
            store.get_chunk("c1").await.unwrap().unwrap().status,
            LifecycleStatus::Active
        );
        assert_eq!(
            store.get_chunk("c1_c1").await.unwrap().unwrap().status,
            LifecycleStatus::Retired
        );
        assert_eq!(
            store.get_chunk("c1_c2").await.unwrap().unwrap().status,
            LifecycleStatus::Active
        );
    }

    #[tokio::test]
    async fn test_reimport_with_status_approves_draft_and_children() {
        let store = InMemoryStore::new();
        let draft = r#"{"chunk_id": "c1", "document_type": "act", "section": "1", "text": "First sentence here. Second sentence follows it."}"#;
        import_records(&store, parse_jsonl(draft).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(
            store.get_chunk("c1_c2").await.unwrap().unwrap().status,
            LifecycleStatus::Draft
        );

        let stats = import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.status_changes, 1);
        for id in ["c1", "c1_c1", "c1_c2"] {
            assert_eq!(
                store.get_chunk(id).await.unwrap().unwrap().status,
                LifecycleStatus::Active,
                "{} should be active",
                id
            );
        }
    }

    const SECTION_17: &str = r#"{"chunk_id": "ca2013_act_s017", "document_type": "act", "section": "17", "text": "Annual return.", "status": "ACTIVE"}
{"chunk_id": "ca2013_circ_s017", "document_type": "circular", "section": "17", "text": "Clarification."}
{"chunk_id": "ca2013_sop_s017", "document_type": "sop", "section": "017", "text": "Steps."}
{"chunk_id": "ca2013_form_s017", "document_type": "form", "section": "17", "text": "Form.", "relationships": [{"label": "proceduralises", "target": "ca2013_act_s017"}]}
{"chunk_id": "ca2013_comm_s017", "document_type": "commentary", "section": "17", "text": "Notes."}
{"chunk_id": "ca2013_circ_s099", "document_type": "circular", "section": "99", "text": "Orphan."}"#;

    #[tokio::test]
    async fn test_auto_link_derives_edges_by_document_type() {
        let store = InMemoryStore::new();
        let stats = import_records(
            &store,
            parse_jsonl(SECTION_17).unwrap(),
            &chunking(),
            ImportOptions { auto_link: true },
        )
        .await
        .unwrap();
        assert_eq!(stats.relationships, 1);
        assert_eq!(stats.derived_relationships, 2);

        assert_eq!(
            store
                .related_chunks("ca2013_circ_s017", RelationshipLabel::Clarifies)
                .await
                .unwrap(),
            vec!["ca2013_act_s017".to_string()]
        );
        assert_eq!(
            store
                .related_chunks("ca2013_sop_s017", RelationshipLabel::Implements)
                .await
                .unwrap(),
            vec!["ca2013_act_s017".to_string()]
        );
        let mut back = store
            .related_chunks("ca2013_act_s017", RelationshipLabel::ClarifiedBy)
            .await
            .unwrap();
        back.extend(
            store
                .related_chunks("ca2013_act_s017", RelationshipLabel::ImplementedBy)
                .await
                .unwrap(),
        );
        assert_eq!(back, vec!["ca2013_circ_s017", "ca2013_sop_s017"]);

        // Declared edges win, commentary and sections without an Act stay unlinked.
        assert_eq!(store.relationships("ca2013_form_s017").await.unwrap().len(), 1);
        assert!(store.relationships("ca2013_comm_s017").await.unwrap().is_empty());
        assert!(store.relationships("ca2013_circ_s099").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_link_finds_act_already_in_store() {
        let store = InMemoryStore::new();
        import_records(&store, parse_jsonl(ACTIVE_ACT).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        let sop = r#"{"chunk_id": "sop1", "document_type": "sop", "section": "1", "text": "Steps."}"#;
        let stats = import_records(
            &store,
            parse_jsonl(sop).unwrap(),
            &chunking(),
            ImportOptions { auto_link: true },
        )
        .await
        .unwrap();
        assert_eq!(stats.derived_relationships, 1);
        assert_eq!(
            store.related_chunks("c1", RelationshipLabel::ImplementedBy).await.unwrap(),
            vec!["sop1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_auto_link_is_off_by_default() {
        let store = InMemoryStore::new();
        let stats = import_records(&store, parse_jsonl(SECTION_17).unwrap(), &chunking(), ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.derived_relationships, 0);
        assert!(store.relationships("ca2013_sop_s017").await.unwrap().is_empty());
    }

    #[test]
    fn test_auto_link_labels_pass_relationship_rules() {
        for t in DocumentType::ALL {
            if let Some(label) = auto_link_label(t) {
                assert!(
                    validate_relationship(t, label, DocumentType::Act).is_ok(),
                    "{} {} act",
                    t,
                    label
                );
            }
        }
        assert_eq!(auto_link_label(DocumentType::Commentary), None);
    }
}
