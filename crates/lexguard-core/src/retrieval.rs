//! Retrieval orchestrator.
//!
//! [`Retriever::answer`] drives one query through
//! `classified → evidence_gathered → policy_checked → synthesizing | refused`:
//!
//! - **section / definition**: direct lookup and a supplementary semantic
//!   search run concurrently. The answer is synthesized from the direct
//!   set alone; supplementary chunks are attached to the response but never
//!   fed to the model. If the direct lookup finds nothing, the semantic
//!   hits become the authoritative set instead.
//! - **general**: semantic search only; its hits are the authoritative set.
//!
//! The refusal policy runs exactly once, on the authoritative set, before
//! any model call. The model is called at most once per query.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{classify, QueryIntent};
use crate::direct::{self, DirectLookupParams};
use crate::embedding::EmbeddingProvider;
use crate::error::{RefusalReason, RetrievalError};
use crate::evidence::{ChunkView, Evidence, ParentLaw, SourceType};
use crate::llm::LanguageModel;
use crate::models::{ChunkRole, QueryKind};
use crate::refusal::{self, PolicyDecision};
use crate::semantic::{self, SemanticParams};
use crate::store::{ChunkRepository, VectorIndex};
use crate::synth::{self, SynthParams};

/// Query contract input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
        }
    }
}

/// A synthesized answer with its evidence.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<String>,
    pub retrieved_chunks: Vec<ChunkView>,
    pub direct_lookup_count: usize,
    pub supplementary_count: usize,
    pub parent_laws: Vec<ParentLaw>,
    pub intent: QueryKind,
}

/// A deliberate non-answer. Evidence is still surfaced.
#[derive(Debug, Clone, Serialize)]
pub struct RefusalResponse {
    pub refused: bool,
    pub reason: RefusalReason,
    pub retrieved_chunks: Vec<ChunkView>,
}

/// The model failed; evidence is returned so callers can show raw sources.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub code: String,
    pub message: String,
    pub retrieved_chunks: Vec<ChunkView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Answer(AnswerResponse),
    Refusal(RefusalResponse),
    GenerationFailed(GenerationFailure),
}

/// Tunables for a [`Retriever`].
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub direct: DirectLookupParams,
    pub semantic: SemanticParams,
    pub synth: SynthParams,
    pub preview_chars: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            direct: DirectLookupParams::default(),
            semantic: SemanticParams::default(),
            synth: SynthParams::default(),
            preview_chars: 500,
        }
    }
}

/// Composes classifier, direct lookup, semantic search, refusal policy and
/// synthesizer over shared, read-only collaborators.
#[derive(Clone)]
pub struct Retriever {
    repo: Arc<dyn ChunkRepository>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    config: RetrieverConfig,
}

/// Evidence gathered for one query, split by role.
struct Gathered {
    authoritative: Vec<Evidence>,
    supplementary: Vec<Evidence>,
    direct_count: usize,
}

impl Retriever {
    pub fn new(
        repo: Arc<dyn ChunkRepository>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            repo,
            index,
            embedder,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Answer one query.
    ///
    /// Returns `Err` only when the repository fails; refusals and model
    /// failures are ordinary [`QueryResponse`] variants.
    pub async fn answer(&self, req: &QueryRequest) -> Result<QueryResponse, RetrievalError> {
        let intent = classify(&req.query);
        debug!(state = "classified", intent = ?intent, "query");

        let top_k = req.top_k.unwrap_or(self.config.semantic.top_k).max(1);
        let gathered = self.gather(&req.query, &intent, top_k).await?;
        debug!(
            state = "evidence_gathered",
            authoritative = gathered.authoritative.len(),
            supplementary = gathered.supplementary.len(),
            "query"
        );

        let decision = refusal::evaluate(self.repo.as_ref(), &gathered.authoritative).await?;
        debug!(state = "policy_checked", refused = decision.is_refusal(), "query");

        let retrieved_chunks = self.views(&gathered);

        if let PolicyDecision::Refuse { reason, chunk_id } = decision {
            info!(state = "refused", %reason, chunk_id = %chunk_id, "query refused");
            return Ok(QueryResponse::Refusal(RefusalResponse {
                refused: true,
                reason,
                retrieved_chunks,
            }));
        }

        debug!(state = "synthesizing", "query");
        let synthesized = match synth::synthesize(
            self.llm.as_ref(),
            &req.query,
            &gathered.authoritative,
            &self.config.synth,
        )
        .await
        {
            Ok(s) => s,
            Err(e) => {
                return Ok(QueryResponse::GenerationFailed(GenerationFailure {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    retrieved_chunks,
                }))
            }
        };

        let parent_laws = self
            .parent_laws(gathered.authoritative.iter().chain(&gathered.supplementary))
            .await?;

        info!(
            intent = intent.kind().as_str(),
            direct = gathered.direct_count,
            supplementary = gathered.supplementary.len(),
            citations = synthesized.citations.len(),
            "query answered"
        );

        Ok(QueryResponse::Answer(AnswerResponse {
            answer: synthesized.answer,
            citations: synthesized.citations,
            retrieved_chunks,
            direct_lookup_count: gathered.direct_count,
            supplementary_count: gathered.supplementary.len(),
            parent_laws,
            intent: intent.kind(),
        }))
    }

    async fn gather(
        &self,
        query: &str,
        intent: &QueryIntent,
        top_k: usize,
    ) -> Result<Gathered, RetrievalError> {
        let semantic_params = SemanticParams {
            top_k,
            ..self.config.semantic.clone()
        };

        if !intent.is_direct() {
            let hits = semantic::search(
                self.embedder.as_ref(),
                self.index.as_ref(),
                self.repo.as_ref(),
                query,
                &semantic_params,
                SourceType::Semantic,
            )
            .await;
            return Ok(Gathered {
                authoritative: hits,
                supplementary: Vec::new(),
                direct_count: 0,
            });
        }

        let direct_params = DirectLookupParams {
            top_k,
            ..self.config.direct.clone()
        };
        let (direct, semantic) = tokio::join!(
            direct::lookup(self.repo.as_ref(), intent, &direct_params),
            semantic::search(
                self.embedder.as_ref(),
                self.index.as_ref(),
                self.repo.as_ref(),
                query,
                &semantic_params,
                SourceType::Supplementary,
            )
        );
        let direct = direct?;

        if direct.is_empty() {
            debug!(intent = ?intent.kind(), "direct lookup empty; using semantic hits");
            let authoritative = semantic
                .into_iter()
                .map(|mut e| {
                    e.source_type = SourceType::Semantic;
                    e
                })
                .collect();
            return Ok(Gathered {
                authoritative,
                supplementary: Vec::new(),
                direct_count: 0,
            });
        }

        let direct_ids: HashSet<&str> = direct.iter().map(|e| e.id()).collect();
        let room = top_k.saturating_sub(direct.len());
        let supplementary: Vec<Evidence> = semantic
            .into_iter()
            .filter(|e| !direct_ids.contains(e.id()))
            .take(room)
            .collect();

        Ok(Gathered {
            direct_count: direct.len(),
            authoritative: direct,
            supplementary,
        })
    }

    fn views(&self, gathered: &Gathered) -> Vec<ChunkView> {
        gathered
            .authoritative
            .iter()
            .chain(&gathered.supplementary)
            .map(|e| e.view(self.config.preview_chars))
            .collect()
    }

    async fn parent_laws<'a, I>(&self, evidence: I) -> Result<Vec<ParentLaw>, RetrievalError>
    where
        I: Iterator<Item = &'a Evidence>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in evidence {
            let identity = &item.record.chunk.identity;
            if identity.chunk_role != ChunkRole::Child {
                continue;
            }
            let Some(parent_id) = identity.parent_chunk_id.as_deref() else {
                continue;
            };
            if !seen.insert(parent_id.to_string()) {
                continue;
            }
            if let Some(parent) = self.repo.get_chunk(parent_id).await? {
                out.push(ParentLaw::from_record(&parent));
            }
        }
        Ok(out)
    }
}
