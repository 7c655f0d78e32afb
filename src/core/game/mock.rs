//! In-memory `GameClient` used by tests and local development. Not a stub
//! for production use — just the sanctioned way to exercise the brain,
//! dispatcher and skill executor without a live protocol connection.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{BlockInfo, Entity, GameClient, GameEvent, InventoryItem, Position, Snapshot};

pub struct MockGameClient {
    state: Mutex<MockState>,
}

struct MockState {
    position: Position,
    yaw: f32,
    health: f32,
    food: f32,
    inventory: Vec<InventoryItem>,
    tick: u64,
    blocks: Vec<BlockInfo>,
    entities: HashMap<String, Entity>,
    events: VecDeque<GameEvent>,
}

impl Default for MockGameClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState {
                position: Position { x: 0.0, y: 64.0, z: 0.0 },
                yaw: 0.0,
                health: 20.0,
                food: 20.0,
                inventory: Vec::new(),
                tick: 6000,
                blocks: Vec::new(),
                entities: HashMap::new(),
                events: VecDeque::new(),
            }),
        }
    }
}

impl MockGameClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, pos: Position) {
        self.state.lock().unwrap().position = pos;
    }

    pub fn set_inventory(&self, items: Vec<InventoryItem>) {
        self.state.lock().unwrap().inventory = items;
    }

    pub fn push_block(&self, block: BlockInfo) {
        self.state.lock().unwrap().blocks.push(block);
    }

    pub fn push_entity(&self, key: &str, entity: Entity) {
        self.state.lock().unwrap().entities.insert(key.to_string(), entity);
    }

    pub fn push_event(&self, event: GameEvent) {
        self.state.lock().unwrap().events.push_back(event);
    }

    pub fn set_health(&self, health: f32) {
        self.state.lock().unwrap().health = health;
    }

    pub fn set_food(&self, food: f32) {
        self.state.lock().unwrap().food = food;
    }
}

#[async_trait]
impl GameClient for MockGameClient {
    async fn snapshot(&self) -> Snapshot {
        let s = self.state.lock().unwrap();
        Snapshot {
            position: s.position,
            yaw: s.yaw,
            health: s.health,
            food: s.food,
            inventory: s.inventory.clone(),
            tick: s.tick,
        }
    }

    async fn block_at(&self, pos: Position) -> Option<BlockInfo> {
        let s = self.state.lock().unwrap();
        s.blocks.iter().find(|b| b.position == pos).cloned()
    }

    async fn find_nearest_block(&self, predicate: &str, max_distance: f64) -> Option<BlockInfo> {
        let s = self.state.lock().unwrap();
        s.blocks
            .iter()
            .filter(|b| b.name.contains(predicate) && b.position.distance(s.position) <= max_distance)
            .min_by(|a, b| {
                a.position
                    .distance(s.position)
                    .partial_cmp(&b.position.distance(s.position))
                    .unwrap()
            })
            .cloned()
    }

    async fn find_blocks(&self, predicate: &str, max_count: usize) -> Vec<BlockInfo> {
        let s = self.state.lock().unwrap();
        s.blocks
            .iter()
            .filter(|b| b.name.contains(predicate))
            .take(max_count)
            .cloned()
            .collect()
    }

    async fn entities(&self) -> HashMap<String, Entity> {
        self.state.lock().unwrap().entities.clone()
    }

    async fn go_to(&self, goal: Position, _timeout: Duration) -> anyhow::Result<()> {
        self.state.lock().unwrap().position = goal;
        Ok(())
    }

    async fn dig(&self, pos: Position) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.blocks.retain(|b| b.position != pos);
        Ok(())
    }

    async fn place_block(&self, pos: Position, item: &str) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.blocks.push(BlockInfo { name: item.to_string(), diggable: true, position: pos });
        Ok(())
    }

    async fn craft(&self, recipe: &str, count: u32, _table: Option<Position>) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(item) = s.inventory.iter_mut().find(|i| i.name == recipe) {
            item.count += count;
        } else {
            s.inventory.push(InventoryItem { name: recipe.to_string(), count });
        }
        Ok(())
    }

    async fn send_chat(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn poll_event(&self) -> Option<GameEvent> {
        self.state.lock().unwrap().events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn go_to_updates_position() {
        let client = MockGameClient::new();
        client.go_to(Position { x: 10.0, y: 64.0, z: 10.0 }, Duration::from_secs(1)).await.unwrap();
        let snap = client.snapshot().await;
        assert_eq!(snap.position, Position { x: 10.0, y: 64.0, z: 10.0 });
    }

    #[tokio::test]
    async fn craft_increments_inventory_count() {
        let client = MockGameClient::new();
        client.craft("torch", 4, None).await.unwrap();
        client.craft("torch", 2, None).await.unwrap();
        let snap = client.snapshot().await;
        assert_eq!(snap.inventory.iter().find(|i| i.name == "torch").unwrap().count, 6);
    }
}
