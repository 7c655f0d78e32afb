//! Record shapes stored in the per-agent persistent memory file (§6.1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(rename = "builtAt")]
    pub built_at: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathRecord {
    pub location: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub cause: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OreDiscovery {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillAttempt {
    pub skill: String,
    pub success: bool,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: f64,
    #[serde(default)]
    pub notes: String,
    pub timestamp: String,
}
