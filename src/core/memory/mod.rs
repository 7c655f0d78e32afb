//! Per-agent persistent memory: a single JSON document on disk (§6.1),
//! grounded on the teacher's `MemorySystem` (workspace-dir ownership,
//! restricted file permissions, single-writer-task discipline) but backed by
//! a JSON file instead of sqlite, since the spec's memory model is a small
//! bounded document rather than an unbounded log needing SQL queries.

pub mod types;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::platform;
use types::{DeathRecord, OreDiscovery, SkillAttempt, StructureRecord};

const MAX_DEATHS: usize = 50;
const MAX_SKILL_HISTORY: usize = 100;
const MAX_LESSONS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryDocument {
    #[serde(default)]
    pub structures: Vec<StructureRecord>,
    #[serde(default)]
    pub deaths: Vec<DeathRecord>,
    #[serde(default)]
    pub ore_discoveries: Vec<OreDiscovery>,
    #[serde(default)]
    pub skill_history: Vec<SkillAttempt>,
    #[serde(default)]
    pub lessons: Vec<String>,
    #[serde(default)]
    pub broken_skill_names: Vec<String>,
    #[serde(default)]
    pub season_goal: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

pub struct MemorySystem {
    path: PathBuf,
    doc: MemoryDocument,
}

impl MemorySystem {
    pub async fn load<P: AsRef<Path>>(workspace_dir: P) -> Result<Self> {
        let workspace_dir = workspace_dir.as_ref().to_path_buf();
        if !workspace_dir.exists() {
            tokio::fs::create_dir_all(&workspace_dir).await?;
        }
        platform::restrict_dir_permissions(&workspace_dir);

        let path = workspace_dir.join("memory.json");
        let doc = if path.exists() {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading memory file {}", path.display()))?;
            serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("memory file {} unparsable ({}), starting fresh", path.display(), e);
                MemoryDocument::default()
            })
        } else {
            MemoryDocument::default()
        };

        Ok(Self { path, doc })
    }

    /// Removes statically-defined skill names from the broken-skill ledger
    /// at startup, since their source may have since been fixed.
    pub async fn heal_static_skills(&mut self, static_names: &[String]) -> Result<()> {
        let before = self.doc.broken_skill_names.len();
        self.doc
            .broken_skill_names
            .retain(|n| !static_names.iter().any(|s| s == n));
        if self.doc.broken_skill_names.len() != before {
            info!("healed {} statically-defined skill(s) on startup", before - self.doc.broken_skill_names.len());
            self.persist().await?;
        }
        Ok(())
    }

    pub fn is_skill_broken(&self, name: &str) -> bool {
        self.doc.broken_skill_names.iter().any(|n| n == name)
    }

    pub async fn mark_skill_broken(&mut self, name: &str) -> Result<()> {
        if !self.is_skill_broken(name) {
            self.doc.broken_skill_names.push(name.to_string());
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn record_skill_attempt(&mut self, attempt: SkillAttempt) -> Result<()> {
        self.doc.skill_history.push(attempt);
        if self.doc.skill_history.len() > MAX_SKILL_HISTORY {
            let overflow = self.doc.skill_history.len() - MAX_SKILL_HISTORY;
            self.doc.skill_history.drain(0..overflow);
        }
        self.persist().await
    }

    /// Returns the last attempts recorded for a skill, most recent last.
    pub fn recent_attempts(&self, name: &str) -> Vec<&SkillAttempt> {
        self.doc.skill_history.iter().filter(|a| a.skill == name).collect()
    }

    pub async fn record_death(&mut self, death: DeathRecord) -> Result<()> {
        self.doc.deaths.push(death);
        if self.doc.deaths.len() > MAX_DEATHS {
            let overflow = self.doc.deaths.len() - MAX_DEATHS;
            self.doc.deaths.drain(0..overflow);
        }
        self.persist().await
    }

    pub async fn record_ore(&mut self, ore: OreDiscovery) -> Result<()> {
        self.doc.ore_discoveries.push(ore);
        self.persist().await
    }

    pub async fn record_structure(&mut self, structure: StructureRecord) -> Result<()> {
        self.doc.structures.push(structure);
        self.persist().await
    }

    pub async fn add_lesson(&mut self, lesson: String) -> Result<()> {
        self.doc.lessons.push(lesson);
        if self.doc.lessons.len() > MAX_LESSONS {
            let overflow = self.doc.lessons.len() - MAX_LESSONS;
            self.doc.lessons.drain(0..overflow);
        }
        self.persist().await
    }

    pub fn season_goal(&self) -> Option<&str> {
        self.doc.season_goal.as_deref()
    }

    pub async fn set_season_goal(&mut self, goal: Option<String>) -> Result<()> {
        self.doc.season_goal = goal;
        self.persist().await
    }

    pub fn broken_skill_names(&self) -> &[String] {
        &self.doc.broken_skill_names
    }

    async fn persist(&mut self) -> Result<()> {
        self.doc.last_updated = Some(chrono::Utc::now().to_rfc3339());
        let text = serde_json::to_string_pretty(&self.doc)?;
        tokio::fs::write(&self.path, &text)
            .await
            .with_context(|| format!("writing memory file {}", self.path.display()))?;
        platform::restrict_file_permissions(&self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heal_static_skills_removes_shipped_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemorySystem::load(dir.path()).await.unwrap();
        mem.mark_skill_broken("go_fish").await.unwrap();
        mem.mark_skill_broken("generated_trap_skill").await.unwrap();
        mem.heal_static_skills(&["go_fish".to_string()]).await.unwrap();
        assert!(!mem.is_skill_broken("go_fish"));
        assert!(mem.is_skill_broken("generated_trap_skill"));
    }

    #[tokio::test]
    async fn skill_history_caps_at_100() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemorySystem::load(dir.path()).await.unwrap();
        for i in 0..110 {
            mem.record_skill_attempt(SkillAttempt {
                skill: "craft_item".into(),
                success: true,
                duration_seconds: 1.0,
                notes: format!("attempt {i}"),
                timestamp: "2026-01-01T00:00:00Z".into(),
            })
            .await
            .unwrap();
        }
        assert_eq!(mem.doc.skill_history.len(), MAX_SKILL_HISTORY);
    }

    #[tokio::test]
    async fn reload_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut mem = MemorySystem::load(dir.path()).await.unwrap();
            mem.set_season_goal(Some("build a castle".into())).await.unwrap();
        }
        let mem = MemorySystem::load(dir.path()).await.unwrap();
        assert_eq!(mem.season_goal(), Some("build a castle"));
    }
}
