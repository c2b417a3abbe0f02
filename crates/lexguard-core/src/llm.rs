//! Language model trait used by the answer synthesizer.
//!
//! HTTP-backed implementations (Ollama, OpenAI) live in the `lexguard` app
//! crate. The synthesizer wraps every call in its own timeout, so
//! implementations need not enforce one.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling and length bounds for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Context window hint for backends that accept one.
    pub num_ctx: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            max_tokens: 768,
            num_ctx: 4096,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`. Any error, including a
    /// non-success HTTP status, is reported as `Err`.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}
