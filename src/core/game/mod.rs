//! The abstract capability set the core consumes from a game-protocol
//! client (§6.3), plus an in-memory mock implementing it for tests and for
//! local development without a live connection.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn distance(&self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub position: Position,
    pub yaw: f32,
    pub health: f32,
    pub food: f32,
    pub inventory: Vec<InventoryItem>,
    pub tick: u64,
}

#[derive(Debug, Clone)]
pub struct InventoryItem {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub name: String,
    pub diggable: bool,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Hostile,
    Passive,
    Player,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub enum GameEvent {
    Spawn,
    Death { cause: String },
    Kicked { reason: String },
    HealthChanged { health: f32 },
    DamageTaken { amount: f32 },
    Chat { user: String, text: String },
}

/// The abstract capability set a game-protocol client must provide. A real
/// implementation talks the wire protocol; `mock::MockGameClient` backs
/// tests and local development.
#[async_trait]
pub trait GameClient: Send + Sync {
    async fn snapshot(&self) -> Snapshot;
    async fn block_at(&self, pos: Position) -> Option<BlockInfo>;
    async fn find_nearest_block(&self, predicate: &str, max_distance: f64) -> Option<BlockInfo>;
    async fn find_blocks(&self, predicate: &str, max_count: usize) -> Vec<BlockInfo>;
    async fn entities(&self) -> HashMap<String, Entity>;
    async fn go_to(&self, goal: Position, timeout: std::time::Duration) -> anyhow::Result<()>;
    async fn dig(&self, pos: Position) -> anyhow::Result<()>;
    async fn place_block(&self, pos: Position, item: &str) -> anyhow::Result<()>;
    async fn craft(&self, recipe: &str, count: u32, table: Option<Position>) -> anyhow::Result<()>;
    async fn send_chat(&self, text: &str) -> anyhow::Result<()>;
    async fn poll_event(&self) -> Option<GameEvent>;
}
