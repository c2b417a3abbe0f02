//! Answer synthesis.
//!
//! Turns an authoritative evidence set into a cited answer:
//!
//! 1. Order evidence by priority (ascending), then section, then
//!    similarity (descending).
//! 2. Render each item as `[DOC_TYPE] Section X: Title\nText` and join the
//!    blocks with `\n\n---\n\n`, stopping before the first block that would
//!    overflow the character budget. The top-ranked block is always kept
//!    whole.
//! 3. Wrap the context in a fixed instruction prompt and call the
//!    [`LanguageModel`] under a timeout.
//! 4. Extract `Section <num>(<sub>)` tokens from the output as citations.
//!
//! Timeouts, model errors, and empty output all surface as
//! [`RetrievalError::AnswerGenerationFailed`]; partial text is never
//! returned.

use std::cmp::Ordering;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RetrievalError;
use crate::evidence::Evidence;
use crate::llm::{GenerateOptions, LanguageModel};

/// Returned without calling the model when there is no evidence.
pub const NO_EVIDENCE_ANSWER: &str = "No relevant information found in the database.";

/// The sentence the model is told to use when the context is silent.
pub const NOT_IN_SOURCES: &str = "The provided sources do not contain information about this topic.";

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

static CITATION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bsection\s+(\d+[a-z]?)(\(\w+\))?").ok());

#[derive(Debug, Clone)]
pub struct SynthParams {
    pub context_char_budget: usize,
    pub llm_timeout: Duration,
    pub options: GenerateOptions,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            context_char_budget: 6000,
            llm_timeout: Duration::from_secs(45),
            options: GenerateOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub citations: Vec<String>,
}

/// Synthesize an answer to `query` from `evidence` alone.
pub async fn synthesize(
    llm: &dyn LanguageModel,
    query: &str,
    evidence: &[Evidence],
    params: &SynthParams,
) -> Result<SynthesizedAnswer, RetrievalError> {
    if evidence.is_empty() {
        return Ok(SynthesizedAnswer {
            answer: NO_EVIDENCE_ANSWER.to_string(),
            citations: Vec::new(),
        });
    }

    let context = build_context(evidence, params.context_char_budget);
    let prompt = build_prompt(query, &context);
    debug!(
        model = llm.model_name(),
        context_chars = context.chars().count(),
        "calling language model"
    );

    let call = llm.generate(&prompt, &params.options);
    let raw = match tokio::time::timeout(params.llm_timeout, call).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "language model call failed");
            return Err(RetrievalError::AnswerGenerationFailed(e.to_string()));
        }
        Err(_) => {
            warn!(timeout = ?params.llm_timeout, "language model call timed out");
            return Err(RetrievalError::AnswerGenerationFailed(format!(
                "timed out after {:?}",
                params.llm_timeout
            )));
        }
    };

    let answer = raw.trim().to_string();
    if answer.is_empty() {
        return Err(RetrievalError::AnswerGenerationFailed(
            "empty response from language model".to_string(),
        ));
    }

    let mut citations = extract_citations(&answer);
    if citations.is_empty() {
        citations = evidence_citations(evidence);
    }

    Ok(SynthesizedAnswer { answer, citations })
}

/// Render the bounded context string.
pub fn build_context(evidence: &[Evidence], budget: usize) -> String {
    let mut ordered: Vec<&Evidence> = evidence.iter().collect();
    ordered.sort_by(|a, b| synthesis_order(a, b));

    let mut out = String::new();
    let mut used = 0usize;
    for (i, item) in ordered.iter().enumerate() {
        let block = render_block(item);
        let block_len = block.chars().count();
        if i == 0 {
            used = block_len;
            out.push_str(&block);
            continue;
        }
        let needed = BLOCK_SEPARATOR.len() + block_len;
        if used + needed > budget {
            break;
        }
        out.push_str(BLOCK_SEPARATOR);
        out.push_str(&block);
        used += needed;
    }
    out
}

/// The fixed instruction prompt.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a legal assistant for the Companies Act, 2013 (India). \
Answer strictly from the source documents below.\n\
\n\
Rules:\n\
- Use ONLY the source documents. Do not add outside knowledge.\n\
- Cite the exact section number for every statement, as \"Section X\" or \"Section X(Y)\".\n\
- Keep definitions separate from procedural requirements.\n\
- If the answer is not in the sources, say: \"{not_found}\"\n\
\n\
Question:\n\
{query}\n\
\n\
Source documents:\n\
{context}\n\
\n\
Answer format:\n\
\n\
## Answer\n\
A clear, structured explanation based only on the sources.\n\
\n\
## Legal References\n\
- Section X: supporting reference from the sources\n",
        not_found = NOT_IN_SOURCES,
        query = query,
        context = context,
    )
}

/// `Section <num>(<sub>)` tokens in order of first appearance, deduplicated.
pub fn extract_citations(text: &str) -> Vec<String> {
    let Some(re) = CITATION_PATTERN.as_ref() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for caps in re.captures_iter(text) {
        let Some(num) = caps.get(1) else { continue };
        let sub = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let token = format!("Section {}{}", display_section(num.as_str()), sub);
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Section key without leading zeros, e.g. `"017"` → `"17"`.
pub fn display_section(section: &str) -> String {
    let digits_end = section
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(section.len());
    let (digits, suffix) = section.split_at(digits_end);
    let trimmed = digits.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() && !digits.is_empty() {
        "0"
    } else {
        trimmed
    };
    format!("{}{}", trimmed, suffix.to_uppercase())
}

fn evidence_citations(evidence: &[Evidence]) -> Vec<String> {
    let mut ordered: Vec<&Evidence> = evidence.iter().collect();
    ordered.sort_by(|a, b| synthesis_order(a, b));
    let mut out: Vec<String> = Vec::new();
    for item in ordered {
        if let Some(section) = item.record.chunk.identity.section.as_deref() {
            let token = format!("Section {}", display_section(section));
            if !out.contains(&token) {
                out.push(token);
            }
        }
    }
    out
}

fn render_block(item: &Evidence) -> String {
    let identity = &item.record.chunk.identity;
    let content = &item.record.chunk.content;
    let section = identity
        .section
        .as_deref()
        .map(display_section)
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "[{}] Section {}: {}\n{}",
        identity.document_type.as_str().to_uppercase(),
        section,
        content.title.as_deref().unwrap_or(""),
        content.text
    )
}

fn synthesis_order(a: &Evidence, b: &Evidence) -> Ordering {
    let sec = |e: &Evidence| e.record.chunk.identity.section.clone();
    a.priority()
        .cmp(&b.priority())
        .then_with(|| match (sec(a), sec(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SourceType;
    use crate::models::{Chunk, ChunkContent, ChunkIdentity, ChunkRecord, DocumentType, LifecycleStatus};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    fn ev(id: &str, t: DocumentType, section: Option<&str>, text: &str, sim: f64) -> Evidence {
        Evidence {
            record: ChunkRecord::derived(
                Chunk {
                    identity: ChunkIdentity::parent(id, t, section.map(String::from), None),
                    content: ChunkContent {
                        title: Some(format!("Title {}", id)),
                        text: text.into(),
                        ..Default::default()
                    },
                },
                LifecycleStatus::Active,
            ),
            similarity_score: sim,
            source_type: SourceType::Semantic,
        }
    }

    struct Echo(&'static str);

    #[async_trait]
    impl LanguageModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl LanguageModel for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            Err(anyhow!("500 Internal Server Error"))
        }
    }

    struct Slow;

    #[async_trait]
    impl LanguageModel for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }
        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[test]
    fn test_context_block_format_and_order() {
        let items = vec![
            ev("comm", DocumentType::Commentary, Some("017"), "commentary", 0.99),
            ev("act", DocumentType::Act, Some("017"), "act text", 0.6),
        ];
        let ctx = build_context(&items, 6000);
        assert_eq!(
            ctx,
            "[ACT] Section 17: Title act\nact text\n\n---\n\n[COMMENTARY] Section 17: Title comm\ncommentary"
        );
    }

    #[test]
    fn test_context_budget_drops_tail_keeps_first_whole() {
        let big = "x".repeat(200);
        let items = vec![
            ev("a", DocumentType::Act, Some("001"), &big, 0.9),
            ev("b", DocumentType::Act, Some("002"), &big, 0.9),
        ];
        let ctx = build_context(&items, 50);
        assert!(ctx.contains(&big));
        assert!(ctx.starts_with("[ACT] Section 1:"));
        assert!(!ctx.contains("Section 2:"));
    }

    #[test]
    fn test_extract_citations() {
        let text = "Under Section 2(56) and section 17, read with Section 2(56) and Section 149A.";
        assert_eq!(
            extract_citations(text),
            vec!["Section 2(56)", "Section 17", "Section 149A"]
        );
        assert_eq!(extract_citations("Section 017 applies"), vec!["Section 17"]);
        assert!(extract_citations("no references here").is_empty());
    }

    #[test]
    fn test_display_section() {
        assert_eq!(display_section("002"), "2");
        assert_eq!(display_section("149"), "149");
        assert_eq!(display_section("000"), "0");
        assert_eq!(display_section("0a"), "0A");
    }

    #[test]
    fn test_prompt_carries_rules() {
        let p = build_prompt("What is X?", "CTX");
        assert!(p.contains("Use ONLY the source documents"));
        assert!(p.contains(NOT_IN_SOURCES));
        assert!(p.contains("What is X?"));
        assert!(p.contains("CTX"));
    }

    #[tokio::test]
    async fn test_empty_evidence_skips_model() {
        let out = synthesize(&Failing, "q", &[], &SynthParams::default())
            .await
            .unwrap();
        assert_eq!(out.answer, NO_EVIDENCE_ANSWER);
        assert!(out.citations.is_empty());
    }

    #[tokio::test]
    async fn test_citations_fall_back_to_evidence_sections() {
        let items = vec![ev("a", DocumentType::Act, Some("002"), "defs", 1.0)];
        let out = synthesize(&Echo("A memorandum is a charter."), "q", &items, &SynthParams::default())
            .await
            .unwrap();
        assert_eq!(out.citations, vec!["Section 2"]);
    }

    #[tokio::test]
    async fn test_failures_surface_as_generation_failed() {
        let items = vec![ev("a", DocumentType::Act, Some("002"), "defs", 1.0)];
        let err = synthesize(&Failing, "q", &items, &SynthParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "answer_generation_failed");

        let err = synthesize(&Echo("   "), "q", &items, &SynthParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "answer_generation_failed");

        let params = SynthParams {
            llm_timeout: Duration::from_millis(20),
            ..SynthParams::default()
        };
        let err = synthesize(&Slow, "q", &items, &params).await.unwrap_err();
        assert_eq!(err.code(), "answer_generation_failed");
    }
}
