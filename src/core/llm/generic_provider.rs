//! Wire-format implementations for the two provider shapes the registry
//! supports. Grounded on the teacher's `GenericProvider` (`core/llm/generic_provider.rs`):
//! same `apply_auth`/per-format-generate-method structure, with the
//! Gemini/Anthropic branches replaced by an Ollama-native branch matching
//! §6.2's wire shape exactly, and the OpenAI branch kept since it is the
//! lowest-common-denominator format many self-hosted gateways speak too.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::registry::{ApiFormat, AuthType, ProviderDef};
use super::{ChatMessage, GenerateOptions, LlmGenerateOutput, LlmProvider};

pub struct GenericProvider {
    def: ProviderDef,
    http: reqwest::Client,
}

impl GenericProvider {
    pub fn new(def: ProviderDef) -> Self {
        Self { def, http: reqwest::Client::new() }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.def.auth {
            Some(auth) => match auth.auth_type {
                AuthType::Bearer => {
                    let key = std::env::var(&auth.env_key).unwrap_or_default();
                    builder.bearer_auth(key)
                }
            },
            None => builder,
        }
    }

    async fn generate_ollama(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
    ) -> Result<LlmGenerateOutput> {
        let body = json!({
            "model": model_id,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
            "options": {
                "temperature": options.temperature,
                "num_predict": options.num_predict,
            },
            "think": false,
            "stream": false,
        });

        let url = format!("{}/api/chat", self.def.base_url.trim_end_matches('/'));
        let resp = self
            .apply_auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?
            .error_for_status()
            .with_context(|| format!("error response from {url}"))?;

        let value: serde_json::Value = resp.json().await.context("decoding ollama response")?;
        let text = value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(LlmGenerateOutput { text })
    }

    async fn generate_openai(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
    ) -> Result<LlmGenerateOutput> {
        let body = json!({
            "model": model_id,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
            "temperature": options.temperature,
            "max_tokens": options.num_predict,
        });

        let url = format!("{}/chat/completions", self.def.base_url.trim_end_matches('/'));
        let resp = self
            .apply_auth(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?
            .error_for_status()
            .with_context(|| format!("error response from {url}"))?;

        let value: serde_json::Value = resp.json().await.context("decoding openai response")?;
        let text = value["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();

        Ok(LlmGenerateOutput { text })
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn provider_id(&self) -> &str {
        &self.def.id
    }

    async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
    ) -> Result<LlmGenerateOutput> {
        match self.def.api_format {
            ApiFormat::Ollama => self.generate_ollama(model_id, messages, options).await,
            ApiFormat::OpenAi => self.generate_openai(model_id, messages, options).await,
        }
    }
}
