//! Shared in-process status board. Every agent writes its own row after each
//! action and can read a snapshot of its peers. Process-wide singleton,
//! analogous in shape to the teacher's global swarm-memory table but kept
//! entirely in memory: this state never needs to survive a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BulletinEntry {
    pub action: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub thought: String,
    pub health: f32,
    pub food: f32,
    pub updated_at: Instant,
}

impl BulletinEntry {
    fn is_stale(&self) -> bool {
        self.updated_at.elapsed() > STALE_AFTER
    }
}

#[derive(Clone, Default)]
pub struct TeamBulletin {
    rows: Arc<RwLock<HashMap<String, BulletinEntry>>>,
}

impl TeamBulletin {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, agent_name: &str, entry: BulletinEntry) {
        self.rows.write().await.insert(agent_name.to_string(), entry);
    }

    /// Returns every peer's row except `agent_name`'s own, formatted one
    /// line per agent for inclusion in the strategic prompt.
    pub async fn format_for_peers(&self, agent_name: &str) -> String {
        let rows = self.rows.read().await;
        let mut lines: Vec<String> = rows
            .iter()
            .filter(|(name, _)| name.as_str() != agent_name)
            .map(|(name, e)| {
                let staleness = if e.is_stale() { " (stale)" } else { "" };
                format!(
                    "{name}: {action} at ({x:.0}, {y:.0}, {z:.0}), hp {health:.0}/20, food {food:.0}/20 — \"{thought}\"{staleness}",
                    name = name,
                    action = e.action,
                    x = e.x,
                    y = e.y,
                    z = e.z,
                    health = e.health,
                    food = e.food,
                    thought = e.thought,
                    staleness = staleness,
                )
            })
            .collect();
        lines.sort();
        if lines.is_empty() {
            "No other agents reporting.".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Every agent's row, including the caller's own — used by the stream
    /// overlay, which has no "self" to exclude.
    pub async fn snapshot_all(&self) -> String {
        let rows = self.rows.read().await;
        let mut names: Vec<&String> = rows.keys().collect();
        names.sort();
        if names.is_empty() {
            return "No agents reporting.".to_string();
        }
        names
            .into_iter()
            .map(|name| {
                let e = &rows[name];
                format!("{name}: {} at ({:.0}, {:.0}, {:.0})", e.action, e.x, e.y, e.z)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readers_filter_out_their_own_entry() {
        let board = TeamBulletin::new();
        board
            .publish(
                "alice",
                BulletinEntry {
                    action: "gather_wood".into(),
                    x: 1.0,
                    y: 64.0,
                    z: 2.0,
                    thought: "chopping".into(),
                    health: 20.0,
                    food: 18.0,
                    updated_at: Instant::now(),
                },
            )
            .await;
        board
            .publish(
                "bob",
                BulletinEntry {
                    action: "mine_block".into(),
                    x: 5.0,
                    y: 40.0,
                    z: -3.0,
                    thought: "digging".into(),
                    health: 15.0,
                    food: 10.0,
                    updated_at: Instant::now(),
                },
            )
            .await;

        let view = board.format_for_peers("alice").await;
        assert!(view.contains("bob"));
        assert!(!view.contains("alice"));
    }

    #[tokio::test]
    async fn empty_board_reports_no_peers() {
        let board = TeamBulletin::new();
        assert_eq!(board.format_for_peers("solo").await, "No other agents reporting.");
    }
}
