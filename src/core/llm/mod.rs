//! Language-model RPC layer. Grounded on the teacher's `LlmManager`/`LlmProvider`
//! pair (`core/llm/mod.rs`), reshaped from a single "selected provider/model"
//! onto the two named slots (`strong`, `fast`) §4.8 and §6.2 require, and
//! with `vault_key`/`set_api_key` hot-reload dropped since the secrets vault
//! was not carried over — the API key is read once from the environment at
//! startup (§6.6).

pub mod generic_provider;
pub mod registry;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSlot {
    Strong,
    Fast,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { temperature: 0.7, num_predict: 512 }
    }
}

#[derive(Debug, Clone)]
pub struct LlmGenerateOutput {
    pub text: String,
}

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn generate(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
    ) -> Result<LlmGenerateOutput>;
}

pub struct LlmManager {
    providers: HashMap<String, Box<dyn LlmProvider>>,
    strong: (String, String),
    fast: (String, String),
}

impl LlmManager {
    pub fn new(strong: (String, String), fast: (String, String)) -> Self {
        Self { providers: HashMap::new(), strong, fast }
    }

    pub fn register_provider(&mut self, provider: Box<dyn LlmProvider>) {
        info!("registered LLM provider: {}", provider.provider_id());
        self.providers.insert(provider.provider_id().to_string(), provider);
    }

    fn slot_binding(&self, slot: ModelSlot) -> &(String, String) {
        match slot {
            ModelSlot::Strong => &self.strong,
            ModelSlot::Fast => &self.fast,
        }
    }

    /// Generates via the given slot, applying the RPC timeout of §9/§7: on
    /// timeout or transport error, callers are expected to fall back to a
    /// safe-idle decision rather than propagate.
    pub async fn generate(
        &self,
        slot: ModelSlot,
        messages: &[ChatMessage],
        options: GenerateOptions,
    ) -> Result<LlmGenerateOutput> {
        let (provider_id, model_id) = self.slot_binding(slot);
        let provider = self
            .providers
            .get(provider_id)
            .with_context(|| format!("provider '{provider_id}' not registered for slot"))?;

        match tokio::time::timeout(RPC_TIMEOUT, provider.generate(model_id, messages, options)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("LLM RPC to {provider_id}/{model_id} timed out after {:?}", RPC_TIMEOUT);
                anyhow::bail!("llm rpc timeout")
            }
        }
    }
}
