//! The `Skill` abstraction, the dynamic skill-source-provider, and the
//! built-in skill set. Grounded on the teacher's `SkillManager`
//! (`skills/mod.rs`): the `register_skill`/catalog/`load_skills_from_dir`
//! shape is kept, but `SkillSandbox::execute` (a generic shell/wasm runner)
//! is replaced by the `Skill` trait's `estimate_materials`/`execute` pair
//! since these skills are native state machines over `GameClient`
//! primitives, not externally sandboxed processes.

pub mod builtin;
pub mod executor;
pub mod material;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::game::GameClient;

#[derive(Debug, Clone)]
pub struct MaterialNeed {
    pub item: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub skill_name: String,
    pub phase: String,
    pub progress: f32,
    pub message: String,
    pub active: bool,
}

pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<ProgressSnapshot>;

#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub success: bool,
    pub message: String,
    pub stats: HashMap<String, String>,
}

impl SkillOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), stats: HashMap::new() }
    }
    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), stats: HashMap::new() }
    }
}

/// A multi-step, cancellable procedure run against the game client.
/// Implementors must check the cancellation token at every loop iteration
/// and between awaits.
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Returns the materials still missing for `params`, given the current
    /// inventory snapshot. An empty vec means execution can start
    /// immediately.
    async fn estimate_materials(
        &self,
        game: &dyn GameClient,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<MaterialNeed>;

    async fn execute(
        &self,
        game: &dyn GameClient,
        params: &serde_json::Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome;
}

/// Write+scan abstraction over generated skill source. The core never
/// compiles or sandboxes generated skills itself — it only tracks which
/// names exist on disk and is told by an external generator when a new one
/// has been written.
#[async_trait]
pub trait SkillSourceProvider: Send + Sync {
    async fn write(&self, name: &str, source: &str) -> anyhow::Result<()>;
    async fn scan(&self) -> anyhow::Result<Vec<String>>;
}

pub struct DirSkillSourceProvider {
    dir: std::path::PathBuf,
}

impl DirSkillSourceProvider {
    pub fn new(dir: std::path::PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl SkillSourceProvider for DirSkillSourceProvider {
    async fn write(&self, name: &str, source: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{name}.rs"));
        tokio::fs::write(path, source).await?;
        Ok(())
    }

    async fn scan(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.dir.exists() {
            return Ok(names);
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        Ok(names)
    }
}

/// Process-wide registry of statically-defined skills, built once at
/// startup.
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    pub fn catalog(&self) -> Vec<(&str, &str)> {
        self.skills.values().map(|s| (s.name(), s.description())).collect()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(builtin::CraftItem));
        reg.register(Arc::new(builtin::BuildHouse));
        reg.register(Arc::new(builtin::MineVein));
        reg.register(Arc::new(builtin::GoFish));
        reg.register(Arc::new(builtin::FarmPlot));
        reg
    }
}
