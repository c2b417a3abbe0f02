//! Language model clients.
//!
//! Concrete backends for the core [`LanguageModel`] trait:
//! - **[`DisabledLlm`]**: always errors, so queries that reach synthesis
//!   come back as `answer_generation_failed` with their evidence.
//! - **[`OllamaLlm`]**: `POST {url}/api/generate`, non-streaming.
//! - **[`OpenAiLlm`]**: `POST {url}/v1/chat/completions`.
//!
//! No retries: the synthesizer calls the model at most once per query and
//! enforces its own timeout. The HTTP client timeout is set to the same
//! value as a backstop.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use lexguard_core::llm::{GenerateOptions, LanguageModel};

use crate::config::LlmConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

pub struct DisabledLlm;

#[async_trait]
impl LanguageModel for DisabledLlm {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn post_json(
    req: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = req
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("LLM API error {}: {}", status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Ollama ============

pub struct OllamaLlm {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/api/generate", base.trim_end_matches('/')),
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "top_p": options.top_p,
                "num_predict": options.max_tokens,
                "num_ctx": options.num_ctx,
            }
        });
        let json = post_json(self.client.post(&self.url), &body).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))
    }
}

// ============ OpenAI ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiLlm {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
        });
        let req = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let json = post_json(req, &body).await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Create the configured model client.
pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLlm)),
        "ollama" => Ok(Arc::new(OllamaLlm::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiLlm::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Per Section 2(20)..."}}]
        });
        assert_eq!(parse_chat_completion(&json).unwrap(), "Per Section 2(20)...");
        assert!(parse_chat_completion(&serde_json::json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_llm_errors() {
        let llm = create_llm(&LlmConfig::default()).unwrap();
        assert_eq!(llm.model_name(), "disabled");
        assert!(llm
            .generate("prompt", &GenerateOptions::default())
            .await
            .is_err());
    }

    #[test]
    fn test_ollama_endpoint_from_url() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: Some("llama3".into()),
            url: Some("http://127.0.0.1:9999/".into()),
            ..Default::default()
        };
        let llm = OllamaLlm::new(&config).unwrap();
        assert_eq!(llm.url, "http://127.0.0.1:9999/api/generate");
    }
}
