//! Deterministic observation-string formatter fed to the strategic prompt.
//! Grounded on the teacher's prompt-assembly style in `core/brain.rs`
//! (building a flat, line-oriented context block), reshaped around the
//! `GameClient` snapshot instead of a chat transcript.

use crate::core::game::{EntityKind, GameClient, Position};
use crate::core::memory::types::OreDiscovery;
use crate::core::memory::MemorySystem;

const SCAN_RADIUS_XZ: i32 = 4;
const SCAN_RADIUS_Y: i32 = 2;
const NEARBY_RADIUS: f64 = 16.0;

fn is_ore(name: &str) -> bool {
    ["coal_ore", "iron_ore", "gold_ore", "diamond_ore", "redstone_ore", "lapis_ore", "copper_ore"]
        .iter()
        .any(|o| name.contains(o))
}

fn is_notable(name: &str) -> bool {
    is_ore(name)
        || [
            "crafting_table",
            "furnace",
            "chest",
            "bed",
            "enchanting_table",
            "anvil",
            "spawner",
        ]
        .iter()
        .any(|n| name.contains(n))
}

pub async fn format_world_context(
    game: &dyn GameClient,
    memory: &mut MemorySystem,
) -> String {
    let snap = game.snapshot().await;
    let mut lines = Vec::new();

    lines.push(format!(
        "Position: ({:.0}, {:.0}, {:.0})",
        snap.position.x, snap.position.y, snap.position.z
    ));
    lines.push(format!("Health: {:.0}/20", snap.health));
    lines.push(format!("Food: {:.0}/20", snap.food));

    let is_day = snap.tick < 13000 || snap.tick > 23000;
    lines.push(format!("Time: {}", if is_day { "day" } else { "night" }));

    if snap.inventory.is_empty() {
        lines.push("Inventory: (empty)".to_string());
    } else {
        let items: Vec<String> = snap.inventory.iter().map(|i| format!("{}x{}", i.name, i.count)).collect();
        lines.push(format!("Inventory: {}", items.join(", ")));
    }

    let entities = game.entities().await;
    let mut hostiles = Vec::new();
    let mut players = Vec::new();
    let mut animals = Vec::new();
    for entity in entities.values() {
        let dist = entity.position.distance(snap.position);
        if dist > NEARBY_RADIUS {
            continue;
        }
        let line = format!("{} at {:.0} blocks", entity.name, dist);
        match entity.kind {
            EntityKind::Hostile => hostiles.push(line),
            EntityKind::Player => players.push(line),
            EntityKind::Passive => animals.push(line),
        }
    }
    if !hostiles.is_empty() {
        lines.push(format!("Hostiles nearby: {}", hostiles.join("; ")));
    }
    if !players.is_empty() {
        lines.push(format!("Players nearby: {}", players.join("; ")));
    }
    if !animals.is_empty() {
        lines.push(format!("Animals nearby: {}", animals.join("; ")));
    }

    let mut notable = Vec::new();
    for dx in -SCAN_RADIUS_XZ..=SCAN_RADIUS_XZ {
        for dy in -SCAN_RADIUS_Y..=SCAN_RADIUS_Y {
            for dz in -SCAN_RADIUS_XZ..=SCAN_RADIUS_XZ {
                let pos = Position {
                    x: snap.position.x + dx as f64,
                    y: snap.position.y + dy as f64,
                    z: snap.position.z + dz as f64,
                };
                if let Some(block) = game.block_at(pos).await {
                    if is_notable(&block.name) {
                        notable.push(format!("{} at ({:.0},{:.0},{:.0})", block.name, pos.x, pos.y, pos.z));
                        if is_ore(&block.name) {
                            let _ = memory
                                .record_ore(OreDiscovery {
                                    kind: block.name.clone(),
                                    x: pos.x,
                                    y: pos.y,
                                    z: pos.z,
                                    timestamp: chrono::Utc::now().to_rfc3339(),
                                })
                                .await;
                        }
                    }
                }
            }
        }
    }
    if !notable.is_empty() {
        lines.push(format!("Notable blocks: {}", notable.join("; ")));
    }

    if !is_day {
        lines.push("Warning: it is nighttime, hostiles may spawn nearby.".to_string());
    }

    if let Some(block) = game.block_at(snap.position).await {
        if block.name.contains("water") {
            lines.push("Warning: currently in water.".to_string());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::mock::MockGameClient;
    use crate::core::game::{BlockInfo, Entity, EntityKind};

    #[tokio::test]
    async fn includes_position_health_food_and_time() {
        let client = MockGameClient::new();
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemorySystem::load(dir.path()).await.unwrap();
        let ctx = format_world_context(&client, &mut mem).await;
        assert!(ctx.contains("Position:"));
        assert!(ctx.contains("Health: 20/20"));
        assert!(ctx.contains("Time: day"));
    }

    #[tokio::test]
    async fn ore_sighting_is_recorded_to_memory() {
        let client = MockGameClient::new();
        client.push_block(BlockInfo {
            name: "diamond_ore".to_string(),
            diggable: true,
            position: Position { x: 1.0, y: 64.0, z: 0.0 },
        });
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemorySystem::load(dir.path()).await.unwrap();
        let ctx = format_world_context(&client, &mut mem).await;
        assert!(ctx.contains("diamond_ore"));
        assert_eq!(mem.recent_attempts("diamond_ore").len(), 0);
    }

    #[tokio::test]
    async fn hostile_within_range_is_listed() {
        let client = MockGameClient::new();
        client.push_entity(
            "zombie-1",
            Entity { name: "zombie".to_string(), kind: EntityKind::Hostile, position: Position { x: 3.0, y: 64.0, z: 0.0 } },
        );
        let dir = tempfile::tempdir().unwrap();
        let mut mem = MemorySystem::load(dir.path()).await.unwrap();
        let ctx = format_world_context(&client, &mut mem).await;
        assert!(ctx.contains("Hostiles nearby"));
        assert!(ctx.contains("zombie"));
    }
}
