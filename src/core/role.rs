//! Static per-agent configuration loaded once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named anchor point in the world, used for home/stash/safe-spawn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Anchor {
    pub fn distance(&self, x: f64, y: f64, z: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2) + (self.z - z).powi(2)).sqrt()
    }
}

/// A minimum-count requirement for an item or item pattern the agent should
/// never drop below when depositing into its stash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepItem {
    pub pattern: String,
    pub min_count: u32,
}

/// The static configuration bound to one agent at startup. Loaded from a
/// per-agent `role.toml`; a missing optional field falls back to the
/// documented default rather than failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub display_name: String,
    #[serde(default)]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub allowed_actions: Vec<String>,
    #[serde(default)]
    pub allowed_skills: Vec<String>,

    pub personality: String,
    #[serde(default)]
    pub priorities: String,

    pub home: Option<Anchor>,
    #[serde(default = "default_leash_radius")]
    pub leash_radius: f64,
    pub stash_pos: Option<Anchor>,
    pub safe_spawn: Option<Anchor>,

    #[serde(default)]
    pub keep_items: Vec<KeepItem>,

    /// Skill names that are shipped as built-in source and therefore healed
    /// (removed from the persistent broken-skill ledger) on every startup.
    #[serde(default = "default_static_skill_names")]
    pub static_skill_names: Vec<String>,

    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// `host:port` for the optional stream-overlay SSE server (§4.10). Unset
    /// disables the overlay.
    pub overlay_bind: Option<String>,
    /// HTTP endpoint for the optional TTS adapter (§4.10). Unset disables
    /// speech.
    pub tts_endpoint: Option<String>,
    /// `host:port` for the optional neural-combat coprocessor (§6.4). Unset
    /// falls back to the internal PvP routine for every reactive combat
    /// decision.
    pub combat_addr: Option<String>,
}

fn default_port() -> u16 {
    25565
}

fn default_leash_radius() -> f64 {
    64.0
}

fn default_idle_interval_secs() -> u64 {
    10
}

fn default_static_skill_names() -> Vec<String> {
    vec![
        "craft_item".to_string(),
        "build_house".to_string(),
        "mine_vein".to_string(),
        "go_fish".to_string(),
        "farm_plot".to_string(),
    ]
}

impl RoleConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading role config {}: {}", path.display(), e))?;
        let role: RoleConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing role config {}: {}", path.display(), e))?;
        Ok(role)
    }

    pub fn is_skill_allowed(&self, name: &str) -> bool {
        self.allowed_skills.iter().any(|s| s == name)
    }

    pub fn keep_count_for(&self, item: &str) -> u32 {
        self.keep_items
            .iter()
            .find(|k| item.contains(&k.pattern))
            .map(|k| k.min_count)
            .unwrap_or(0)
    }
}

/// Universal actions every role may use regardless of `allowed_actions`.
pub fn universal_actions() -> &'static [&'static str] {
    &["idle", "chat", "respond_to_chat", "invoke_skill", "generate_skill"]
}

pub fn gated_actions(role: &RoleConfig) -> HashMap<String, ()> {
    let mut set = HashMap::new();
    for a in universal_actions() {
        set.insert(a.to_string(), ());
    }
    for a in &role.allowed_actions {
        set.insert(a.clone(), ());
    }
    for s in &role.allowed_skills {
        set.insert(s.clone(), ());
    }
    set
}
