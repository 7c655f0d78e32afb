//! Single-slot skill runner (§4.5). Grounded on the teacher's
//! `SkillManager::prepare_skill` pattern of cloning what's needed out of a
//! lock before awaiting — here applied to guarantee only one skill runs at
//! a time per agent while still allowing the brain to poll `is_running`
//! without blocking on the running skill's own lock.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::game::GameClient;
use crate::core::memory::types::SkillAttempt;
use crate::core::memory::MemorySystem;

use super::material::{decompose, Step};
use super::{ProgressSnapshot, Skill, SkillOutcome};

struct RunningState {
    name: String,
    cancel: CancellationToken,
}

pub struct SkillExecutor {
    running: Mutex<Option<RunningState>>,
    progress_tx: super::ProgressSender,
}

impl SkillExecutor {
    pub fn new(progress_tx: super::ProgressSender) -> Self {
        Self { running: Mutex::new(None), progress_tx }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn active_name(&self) -> Option<String> {
        self.running.lock().await.as_ref().map(|r| r.name.clone())
    }

    pub async fn abort(&self) {
        if let Some(state) = self.running.lock().await.as_ref() {
            state.cancel.cancel();
        }
    }

    fn emit(&self, skill_name: &str, phase: &str, progress: f32, message: &str, active: bool) {
        let _ = self.progress_tx.send(ProgressSnapshot {
            skill_name: skill_name.to_string(),
            phase: phase.to_string(),
            progress,
            message: message.to_string(),
            active,
        });
    }

    pub async fn run_skill(
        &self,
        skill: Arc<dyn Skill>,
        game: &dyn GameClient,
        params: serde_json::Map<String, serde_json::Value>,
        memory: &Mutex<MemorySystem>,
    ) -> String {
        {
            let mut guard = self.running.lock().await;
            if let Some(state) = guard.as_ref() {
                return format!("Already running skill {}", state.name);
            }
            let cancel = CancellationToken::new();
            *guard = Some(RunningState { name: skill.name().to_string(), cancel });
        }

        let cancel = {
            let guard = self.running.lock().await;
            guard.as_ref().unwrap().cancel.clone()
        };

        let started = Instant::now();
        let name = skill.name().to_string();

        self.emit(&name, "materials", 0.0, "Checking materials", true);
        let needs = skill.estimate_materials(game, &params).await;
        if !needs.is_empty() {
            let total_steps: usize = needs
                .iter()
                .map(|n| decompose(&n.item, n.count).len())
                .sum::<usize>()
                .max(1);
            let mut completed = 0usize;
            'gather: for need in &needs {
                for step in decompose(&need.item, need.count) {
                    if cancel.is_cancelled() {
                        break 'gather;
                    }
                    match step {
                        Step::Gather { block, count } => {
                            if let Some(b) = game.find_nearest_block(&block, 64.0).await {
                                for _ in 0..count.max(1) {
                                    let _ = game.dig(b.position).await;
                                }
                            }
                        }
                        Step::Craft { item, count } => {
                            let _ = game.craft(&item, count, None).await;
                        }
                    }
                    completed += 1;
                    let frac = completed as f32 / total_steps as f32;
                    self.emit(&name, "materials", frac * 0.3, "Gathering materials", true);
                }
            }
        }

        if cancel.is_cancelled() {
            self.finish(&name).await;
            self.emit(&name, "aborted", 1.0, &format!("{name} was interrupted"), false);
            return format!("{name} was interrupted");
        }

        self.emit(&name, "execute", 0.3, "Executing", true);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressSnapshot>();
        let exec_fut = skill.execute(game, &params, cancel.clone(), tx);

        let outcome = tokio::select! {
            outcome = exec_fut => outcome,
            _ = cancel.cancelled() => SkillOutcome::fail(format!("{name} was interrupted")),
        };

        while let Ok(inner) = rx.try_recv() {
            let remapped = 0.3 + inner.progress.clamp(0.0, 1.0) * 0.7;
            self.emit(&name, &inner.phase, remapped, &inner.message, true);
        }

        let elapsed = started.elapsed().as_secs_f64();
        let attempt = SkillAttempt {
            skill: name.clone(),
            success: outcome.success,
            duration_seconds: elapsed,
            notes: outcome.message.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        {
            let mut mem = memory.lock().await;
            if let Err(e) = mem.record_skill_attempt(attempt).await {
                warn!("failed to record skill attempt for {name}: {e}");
            }
        }

        self.finish(&name).await;
        self.emit(&name, "done", 1.0, &outcome.message, false);
        info!("skill {name} finished: success={} message={}", outcome.success, outcome.message);
        outcome.message
    }

    async fn finish(&self, _name: &str) {
        *self.running.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::mock::MockGameClient;
    use crate::core::skills::builtin::CraftItem;
    use serde_json::json;

    #[tokio::test]
    async fn refuses_concurrent_start() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = Arc::new(SkillExecutor::new(tx));
        let game = MockGameClient::new();
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());

        let mut params = serde_json::Map::new();
        params.insert("item".to_string(), json!("oak_planks"));
        params.insert("count".to_string(), json!(1));

        // Pre-seed a running state directly to simulate a skill in flight.
        *executor.running.lock().await = Some(RunningState {
            name: "build_house".to_string(),
            cancel: CancellationToken::new(),
        });

        let result = executor.run_skill(Arc::new(CraftItem), &game, params, &memory).await;
        assert_eq!(result, "Already running skill build_house");
    }
}
