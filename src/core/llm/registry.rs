//! Provider registry: which wire format and base URL each named provider
//! speaks, and which provider/model pair backs the `strong` and `fast`
//! slots. Grounded on the teacher's `ProviderRegistry` (`core/llm/registry.rs`),
//! re-expressed in TOML to match this crate's configuration format, with
//! `vault_key` dropped for a plain environment-variable lookup since the
//! secrets vault was not carried over.

use serde::{Deserialize, Serialize};

const DEFAULT_PROVIDERS_TOML: &str = include_str!("providers.default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistry {
    pub providers: Vec<ProviderDef>,
    pub strong: SlotBinding,
    pub fast: SlotBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotBinding {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDef {
    pub id: String,
    pub name: String,
    pub api_format: ApiFormat,
    pub base_url: String,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    /// Environment variable holding the API key/token.
    pub env_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
}

impl ProviderRegistry {
    pub fn load_default() -> Self {
        toml::from_str(DEFAULT_PROVIDERS_TOML).expect("embedded providers.default.toml is invalid")
    }

    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn get_provider(&self, id: &str) -> Option<&ProviderDef> {
        self.providers.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_parses_and_resolves_slots() {
        let reg = ProviderRegistry::load_default();
        assert!(reg.get_provider(&reg.strong.provider).is_some());
        assert!(reg.get_provider(&reg.fast.provider).is_some());
    }
}
