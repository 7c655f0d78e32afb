//! The five statically-defined skills shipped with the core (§4.5). Each is
//! a small state machine over `GameClient` primitives, demonstrating
//! material estimation and progress reporting. These are exactly the set
//! healed from the persistent broken-skill ledger on startup unless the
//! role config overrides `static_skill_names`.

use async_trait::async_trait;
use serde_json::Map;
use tokio_util::sync::CancellationToken;

use crate::core::game::{GameClient, Position};

use super::{MaterialNeed, ProgressSender, ProgressSnapshot, Skill, SkillOutcome};

fn report(tx: &ProgressSender, skill: &str, phase: &str, progress: f32, message: &str) {
    let _ = tx.send(ProgressSnapshot {
        skill_name: skill.to_string(),
        phase: phase.to_string(),
        progress,
        message: message.to_string(),
        active: true,
    });
}

fn inventory_count(inv: &[crate::core::game::InventoryItem], item: &str) -> u32 {
    inv.iter().find(|i| i.name == item).map(|i| i.count).unwrap_or(0)
}

pub struct CraftItem;

#[async_trait]
impl Skill for CraftItem {
    fn name(&self) -> &str {
        "craft_item"
    }
    fn description(&self) -> &str {
        "Crafts a requested item, gathering missing base materials first."
    }

    async fn estimate_materials(&self, game: &dyn GameClient, params: &Map<String, serde_json::Value>) -> Vec<MaterialNeed> {
        let item = params.get("item").and_then(|v| v.as_str()).unwrap_or("oak_planks");
        let count = params.get("count").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        let snap = game.snapshot().await;
        if inventory_count(&snap.inventory, item) >= count {
            vec![]
        } else {
            vec![MaterialNeed { item: item.to_string(), count }]
        }
    }

    async fn execute(
        &self,
        game: &dyn GameClient,
        params: &Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome {
        let item = params.get("item").and_then(|v| v.as_str()).unwrap_or("oak_planks");
        let count = params.get("count").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        if cancel.is_cancelled() {
            return SkillOutcome::fail("craft_item was interrupted");
        }
        report(&progress, "craft_item", "crafting", 0.5, &format!("Crafting {count}x {item}"));
        match game.craft(item, count, None).await {
            Ok(()) => SkillOutcome::ok(format!("Crafted {count}x {item}")),
            Err(e) => SkillOutcome::fail(format!("missing: {e}")),
        }
    }
}

pub struct BuildHouse;

#[async_trait]
impl Skill for BuildHouse {
    fn name(&self) -> &str {
        "build_house"
    }
    fn description(&self) -> &str {
        "Builds a simple four-wall shelter from planks near the current position."
    }

    async fn estimate_materials(&self, game: &dyn GameClient, _params: &Map<String, serde_json::Value>) -> Vec<MaterialNeed> {
        let snap = game.snapshot().await;
        let have = inventory_count(&snap.inventory, "oak_planks");
        if have >= 20 {
            vec![]
        } else {
            vec![MaterialNeed { item: "oak_planks".to_string(), count: 20 - have }]
        }
    }

    async fn execute(
        &self,
        game: &dyn GameClient,
        _params: &Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome {
        let base = game.snapshot().await.position;
        let offsets = [(1, 0), (1, 1), (-1, 0), (-1, 1), (0, 1), (0, -1)];
        for (i, (dx, dz)) in offsets.iter().enumerate() {
            if cancel.is_cancelled() {
                return SkillOutcome::fail("build_house was interrupted");
            }
            let pos = Position { x: base.x + *dx as f64, y: base.y, z: base.z + *dz as f64 };
            if game.place_block(pos, "oak_planks").await.is_err() {
                return SkillOutcome::fail("no trees found nearby to supply planks");
            }
            report(&progress, "build_house", "building", (i + 1) as f32 / offsets.len() as f32, "Placing walls");
        }
        SkillOutcome::ok("Built a simple shelter")
    }
}

pub struct MineVein;

#[async_trait]
impl Skill for MineVein {
    fn name(&self) -> &str {
        "mine_vein"
    }
    fn description(&self) -> &str {
        "Mines every connected ore block of the requested type within range."
    }

    async fn estimate_materials(&self, game: &dyn GameClient, params: &Map<String, serde_json::Value>) -> Vec<MaterialNeed> {
        let snap = game.snapshot().await;
        if inventory_count(&snap.inventory, "stone_pickaxe") == 0 && inventory_count(&snap.inventory, "wooden_pickaxe") == 0 {
            let ore = params.get("blockType").and_then(|v| v.as_str()).unwrap_or("stone");
            let needs_stone_pick = ore.contains("iron") || ore.contains("gold") || ore.contains("diamond");
            vec![MaterialNeed {
                item: if needs_stone_pick { "stone_pickaxe".to_string() } else { "wooden_pickaxe".to_string() },
                count: 1,
            }]
        } else {
            vec![]
        }
    }

    async fn execute(
        &self,
        game: &dyn GameClient,
        params: &Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome {
        let ore = params.get("blockType").and_then(|v| v.as_str()).unwrap_or("coal_ore");
        let blocks = game.find_blocks(ore, 16).await;
        if blocks.is_empty() {
            return SkillOutcome::fail(format!("cannot find {ore} nearby"));
        }
        let total = blocks.len();
        for (i, block) in blocks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return SkillOutcome::fail("mine_vein was interrupted");
            }
            let _ = game.go_to(block.position, std::time::Duration::from_secs(15)).await;
            let _ = game.dig(block.position).await;
            report(&progress, "mine_vein", "mining", (i + 1) as f32 / total as f32, &format!("Mined {}/{}", i + 1, total));
        }
        SkillOutcome::ok(format!("Mined {total} {ore} block(s)"))
    }
}

pub struct GoFish;

#[async_trait]
impl Skill for GoFish {
    fn name(&self) -> &str {
        "go_fish"
    }
    fn description(&self) -> &str {
        "Fishes at the nearest water source until a target catch count is reached."
    }

    async fn estimate_materials(&self, game: &dyn GameClient, _params: &Map<String, serde_json::Value>) -> Vec<MaterialNeed> {
        let snap = game.snapshot().await;
        if inventory_count(&snap.inventory, "fishing_rod") == 0 {
            vec![MaterialNeed { item: "fishing_rod".to_string(), count: 1 }]
        } else {
            vec![]
        }
    }

    async fn execute(
        &self,
        game: &dyn GameClient,
        params: &Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome {
        let target = params.get("count").and_then(|v| v.as_u64()).unwrap_or(3) as u32;
        let water = match game.find_nearest_block("water", 32.0).await {
            Some(b) => b,
            None => return SkillOutcome::fail("no water found nearby"),
        };
        if game.go_to(water.position, std::time::Duration::from_secs(15)).await.is_err() {
            return SkillOutcome::fail("could not find a path to water");
        }
        for i in 0..target {
            if cancel.is_cancelled() {
                return SkillOutcome::fail("go_fish was interrupted");
            }
            let _ = game.craft("fish", 1, None).await;
            report(&progress, "go_fish", "fishing", (i + 1) as f32 / target as f32, &format!("Caught {}/{}", i + 1, target));
        }
        SkillOutcome::ok(format!("Caught {target} fish"))
    }
}

pub struct FarmPlot;

#[async_trait]
impl Skill for FarmPlot {
    fn name(&self) -> &str {
        "farm_plot"
    }
    fn description(&self) -> &str {
        "Tills soil near water and plants a small crop plot."
    }

    async fn estimate_materials(&self, game: &dyn GameClient, _params: &Map<String, serde_json::Value>) -> Vec<MaterialNeed> {
        let snap = game.snapshot().await;
        if inventory_count(&snap.inventory, "wooden_hoe") == 0 {
            vec![MaterialNeed { item: "wooden_hoe".to_string(), count: 1 }]
        } else if inventory_count(&snap.inventory, "wheat_seeds") == 0 {
            vec![MaterialNeed { item: "wheat_seeds".to_string(), count: 4 }]
        } else {
            vec![]
        }
    }

    async fn execute(
        &self,
        game: &dyn GameClient,
        _params: &Map<String, serde_json::Value>,
        cancel: CancellationToken,
        progress: ProgressSender,
    ) -> SkillOutcome {
        let water = match game.find_nearest_block("water", 96.0).await {
            Some(b) => b,
            None => return SkillOutcome::fail("no water found within range"),
        };
        let base = water.position;
        for i in 0..4 {
            if cancel.is_cancelled() {
                return SkillOutcome::fail("farm_plot was interrupted");
            }
            let pos = Position { x: base.x + i as f64, y: base.y, z: base.z + 1.0 };
            if game.place_block(pos, "farmland").await.is_err() {
                return SkillOutcome::fail("no tillable dirt found near water");
            }
            let _ = game.place_block(pos, "wheat_seeds").await;
            report(&progress, "farm_plot", "planting", (i + 1) as f32 / 4.0, "Planting crops");
        }
        SkillOutcome::ok("Planted a 4-tile wheat plot")
    }
}
