//! Action Dispatcher (§4.3): gates a decoded decision, consults both
//! failure-memory shelves, injects stash parameters, runs the primitive or
//! skill, and performs post-execution bookkeeping. Grounded on the
//! teacher's `SkillManager::prepare_skill` (clone what's needed, drop the
//! lock, then await) and its `PROTECTED_SKILLS` gating idea, generalised
//! into the role-based allow-list of §3/§4.3.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::bulletin::{BulletinEntry, TeamBulletin};
use crate::core::combat::{CombatClient, CombatObservation, NearestHostile};
use crate::core::event::Decision;
use crate::core::failure_memory::{canonical_key, FailureMemory};
use crate::core::game::{EntityKind, GameClient, Position};
use crate::core::memory::MemorySystem;
use crate::core::primitives;
use crate::core::role::{gated_actions, RoleConfig};
use crate::core::skills::executor::SkillExecutor;
use crate::core::skills::SkillRegistry;

const HISTORY_CAP: usize = 12;
const HISTORY_TRIM_TO: usize = 8;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("not allowed for this role: {0}")]
    NotAllowed(String),
    #[error("Blocked: {0}")]
    Blacklisted(String),
    #[error("{0} is marked broken, try an alternative")]
    PersistentlyBroken(String),
}

fn success_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)complet|harvest|built|planted|smelted|crafted|arriv|gather|mined|caught|lit|bridg|chop|killed|ate|explored|placed|fished|sleep|zzz",
        )
        .unwrap()
    })
}

fn classify_success(result: &str) -> bool {
    success_verb_re().is_match(result)
}

/// Bearing from `from` to `target`, relative to `yaw` (0 = directly ahead,
/// positive = clockwise), normalised to `[-180, 180]` degrees.
fn relative_angle(from: Position, yaw: f32, target: Position) -> f32 {
    let bearing = (target.x - from.x).atan2(target.z - from.z).to_degrees() as f32;
    let mut rel = bearing - yaw;
    while rel > 180.0 {
        rel -= 360.0;
    }
    while rel < -180.0 {
        rel += 360.0;
    }
    rel
}

async fn build_combat_observation(game: &dyn GameClient) -> CombatObservation {
    let snap = game.snapshot().await;
    let entities = game.entities().await;

    let nearest_hostile = entities
        .values()
        .filter(|e| e.kind == EntityKind::Hostile)
        .min_by(|a, b| {
            a.position
                .distance(snap.position)
                .partial_cmp(&b.position.distance(snap.position))
                .unwrap()
        })
        .map(|e| NearestHostile {
            name: e.name.clone(),
            distance: e.position.distance(snap.position),
            relative_angle_deg: relative_angle(snap.position, snap.yaw, e.position),
        });

    CombatObservation {
        health: snap.health,
        food: snap.food,
        pos: (snap.position.x, snap.position.y, snap.position.z),
        nearest_hostile,
        entities: entities.values().map(|e| e.name.clone()).collect(),
        has_sword: snap.inventory.iter().any(|i| i.name.contains("sword")),
        has_shield: snap.inventory.iter().any(|i| i.name.contains("shield")),
        has_bow: snap.inventory.iter().any(|i| i.name.contains("bow")),
    }
}

pub struct DispatchOutcome {
    pub result: String,
    pub success: bool,
    pub newly_broken_skill: Option<String>,
}

pub struct ActionDispatcher {
    role: Arc<RoleConfig>,
    game: Arc<dyn GameClient>,
    skills: Arc<SkillRegistry>,
    executor: Arc<SkillExecutor>,
    bulletin: TeamBulletin,
    combat: Option<Arc<CombatClient>>,
    history: VecDeque<String>,
}

impl ActionDispatcher {
    pub fn new(
        role: Arc<RoleConfig>,
        game: Arc<dyn GameClient>,
        skills: Arc<SkillRegistry>,
        executor: Arc<SkillExecutor>,
        bulletin: TeamBulletin,
        combat: Option<Arc<CombatClient>>,
    ) -> Self {
        Self { role, game, skills, executor, bulletin, combat, history: VecDeque::new() }
    }

    pub fn history(&self) -> impl Iterator<Item = &String> {
        self.history.iter()
    }

    pub async fn is_skill_running(&self) -> bool {
        self.executor.is_running().await
    }

    pub async fn abort_running_skill(&self) {
        self.executor.abort().await;
    }

    pub fn bulletin_ref(&self) -> &TeamBulletin {
        &self.bulletin
    }

    /// Runs the full gate → dispatch → bookkeeping pipeline for one
    /// decision.
    pub async fn dispatch(
        &mut self,
        decision: &Decision,
        failure_memory: &mut FailureMemory,
        memory: &Mutex<MemorySystem>,
    ) -> DispatchOutcome {
        let mut params = decision.params.clone();
        let action = decision.action.as_str();

        if let Err(e) = self.gate(action) {
            warn!("dispatch rejected action {action}: {e}");
            return DispatchOutcome { result: e.to_string(), success: false, newly_broken_skill: None };
        }

        let key = canonical_key(action, &params);

        if key.contains("build_farm") {
            let water_near = self.game.find_nearest_block("water", 96.0).await.is_some();
            failure_memory.reprieve_build_farm_if_water_near(water_near);
        }

        if failure_memory.is_blacklisted(&key) {
            let msg = failure_memory.blacklist_message(&key).unwrap_or("blocked").to_string();
            return DispatchOutcome {
                result: format!("Blocked: {msg}"),
                success: false,
                newly_broken_skill: None,
            };
        }

        if let Some(skill_name) = params.get("skill").and_then(|v| v.as_str()) {
            let broken = memory.lock().await.is_skill_broken(skill_name);
            if broken {
                let result = format!("{skill_name} is marked broken, try an alternative");
                return DispatchOutcome { result, success: false, newly_broken_skill: None };
            }
        }

        if action == "deposit_stash" || action == "withdraw_stash" {
            if let Some(stash) = self.role.stash_pos {
                params.insert("x".to_string(), serde_json::json!(stash.x));
                params.insert("y".to_string(), serde_json::json!(stash.y));
                params.insert("z".to_string(), serde_json::json!(stash.z));
            }
        }

        let result = self.execute(action, &params, memory).await;
        let success = classify_success(&result);

        let newly_broken = failure_memory.record(&key, success, &result);

        let snap = self.game.snapshot().await;
        self.bulletin
            .publish(
                &self.role.display_name,
                BulletinEntry {
                    action: action.to_string(),
                    x: snap.position.x,
                    y: snap.position.y,
                    z: snap.position.z,
                    thought: decision.thought.clone(),
                    health: snap.health,
                    food: snap.food,
                    updated_at: std::time::Instant::now(),
                },
            )
            .await;

        let inv_names: Vec<String> = snap.inventory.iter().map(|i| i.name.clone()).collect();
        failure_memory.reenable_on_inventory(&inv_names);

        self.history.push_back(format!("{action} -> {result}"));
        if self.history.len() > HISTORY_CAP {
            while self.history.len() > HISTORY_TRIM_TO {
                self.history.pop_front();
            }
        }

        info!("dispatched {action}: success={success} result={result}");
        DispatchOutcome { result, success, newly_broken_skill: newly_broken }
    }

    fn gate(&self, action: &str) -> Result<(), ActionError> {
        let allowed = gated_actions(&self.role);
        if !allowed.contains_key(action) {
            let mut names: Vec<&str> = allowed.keys().map(|s| s.as_str()).collect();
            names.sort();
            return Err(ActionError::NotAllowed(names.join(", ")));
        }
        Ok(())
    }

    async fn execute(&self, action: &str, params: &serde_json::Map<String, serde_json::Value>, memory: &Mutex<MemorySystem>) -> String {
        match action {
            "gather_wood" => primitives::gather_wood(self.game.as_ref()).await,
            "mine_block" => primitives::mine_block(self.game.as_ref(), params).await,
            "go_to" => primitives::go_to(self.game.as_ref(), params).await,
            "explore" => primitives::explore(self.game.as_ref(), params).await,
            "craft" => primitives::craft(self.game.as_ref(), params).await,
            "eat" => primitives::eat(self.game.as_ref()).await,
            "attack" => primitives::attack(self.game.as_ref()).await,
            "flee" => primitives::flee(self.game.as_ref()).await,
            "build_shelter" => primitives::build_shelter(self.game.as_ref()).await,
            "place_block" => primitives::place_block(self.game.as_ref(), params).await,
            "sleep" => primitives::sleep(self.game.as_ref()).await,
            "idle" => "Idling".to_string(),
            "chat" | "respond_to_chat" => params
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("...")
                .to_string(),
            "invoke_skill" | "generate_skill" => {
                let name = params.get("skill").and_then(|v| v.as_str()).unwrap_or("");
                match self.skills.get(name) {
                    Some(skill) => self.executor.run_skill(skill, self.game.as_ref(), params.clone(), memory).await,
                    None => format!("Unknown action: no such skill '{name}'"),
                }
            }
            "neural_combat" => match &self.combat {
                Some(combat) => {
                    let observation = build_combat_observation(self.game.as_ref()).await;
                    match combat.decide(&observation).await {
                        Ok(decision) => {
                            let confidence = decision.confidence;
                            match decision.action {
                                crate::core::combat::CombatAction::Attack => {
                                    format!("Neural combat attack (confidence {confidence:.2}): {}", primitives::attack(self.game.as_ref()).await)
                                }
                                crate::core::combat::CombatAction::Flee => {
                                    format!("Neural combat flee (confidence {confidence:.2}): {}", primitives::flee(self.game.as_ref()).await)
                                }
                                other => format!("Neural combat coprocessor chose {other:?} (confidence {confidence:.2})"),
                            }
                        }
                        Err(e) => {
                            warn!("neural combat coprocessor unreachable: {e}, falling back to melee");
                            primitives::attack(self.game.as_ref()).await
                        }
                    }
                }
                None => "Neural combat coprocessor unavailable, falling back to melee".to_string(),
            },
            other => format!("Unknown action: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::mock::MockGameClient;
    use crate::core::role::RoleConfig;

    fn test_role() -> RoleConfig {
        toml::from_str(
            r#"
            display_name = "tester"
            personality = "curious"
            allowed_actions = ["gather_wood", "go_to"]
            allowed_skills = []
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn not_allowed_action_is_rejected_before_execution() {
        let role = Arc::new(test_role());
        let game: Arc<dyn GameClient> = Arc::new(MockGameClient::new());
        let skills = Arc::new(SkillRegistry::with_builtins());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = Arc::new(SkillExecutor::new(tx));
        let mut dispatcher = ActionDispatcher::new(role, game, skills, executor, TeamBulletin::new(), None);
        let mut fm = FailureMemory::new();
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());

        let decision = Decision { action: "mine_block".to_string(), ..Default::default() };
        let outcome = dispatcher.dispatch(&decision, &mut fm, &memory).await;
        assert!(!outcome.success);
        assert!(outcome.result.contains("not allowed"));
    }

    #[tokio::test]
    async fn go_to_over_200_blocks_is_rejected() {
        let role = Arc::new(test_role());
        let game: Arc<dyn GameClient> = Arc::new(MockGameClient::new());
        let skills = Arc::new(SkillRegistry::with_builtins());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = Arc::new(SkillExecutor::new(tx));
        let mut dispatcher = ActionDispatcher::new(role, game, skills, executor, TeamBulletin::new(), None);
        let mut fm = FailureMemory::new();
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());

        let mut params = serde_json::Map::new();
        params.insert("x".to_string(), serde_json::json!(500.0));
        params.insert("y".to_string(), serde_json::json!(64.0));
        params.insert("z".to_string(), serde_json::json!(0.0));
        let decision = Decision { action: "go_to".to_string(), params, ..Default::default() };
        let outcome = dispatcher.dispatch(&decision, &mut fm, &memory).await;
        assert!(!outcome.success);
        assert!(outcome.result.contains("exceeds"));
    }

    fn test_role_with_combat() -> RoleConfig {
        toml::from_str(
            r#"
            display_name = "tester"
            personality = "curious"
            allowed_actions = ["neural_combat"]
            allowed_skills = []
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn neural_combat_calls_the_coprocessor_when_configured() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            socket.read_exact(&mut buf).await.unwrap();

            let resp = serde_json::json!({"action": "attack", "confidence": 0.8});
            let resp_bytes = serde_json::to_vec(&resp).unwrap();
            socket.write_all(&(resp_bytes.len() as u32).to_be_bytes()).await.unwrap();
            socket.write_all(&resp_bytes).await.unwrap();
        });

        let role = Arc::new(test_role_with_combat());
        let game: Arc<dyn GameClient> = Arc::new(MockGameClient::new());
        let skills = Arc::new(SkillRegistry::with_builtins());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = Arc::new(SkillExecutor::new(tx));
        let combat = Some(Arc::new(CombatClient::new(addr.to_string())));
        let mut dispatcher = ActionDispatcher::new(role, game, skills, executor, TeamBulletin::new(), combat);
        let mut fm = FailureMemory::new();
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());

        let decision = Decision { action: "neural_combat".to_string(), ..Default::default() };
        let outcome = dispatcher.dispatch(&decision, &mut fm, &memory).await;
        assert!(outcome.result.contains("Neural combat attack"));
    }

    #[tokio::test]
    async fn neural_combat_falls_back_to_melee_when_unconfigured() {
        let role = Arc::new(test_role_with_combat());
        let game: Arc<dyn GameClient> = Arc::new(MockGameClient::new());
        let skills = Arc::new(SkillRegistry::with_builtins());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = Arc::new(SkillExecutor::new(tx));
        let mut dispatcher = ActionDispatcher::new(role, game, skills, executor, TeamBulletin::new(), None);
        let mut fm = FailureMemory::new();
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());

        let decision = Decision { action: "neural_combat".to_string(), ..Default::default() };
        let outcome = dispatcher.dispatch(&decision, &mut fm, &memory).await;
        assert!(outcome.result.contains("falling back to melee"));
    }
}
