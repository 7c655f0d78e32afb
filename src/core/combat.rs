//! Neural combat coprocessor client (§6.4). Grounded on the teacher's
//! `McpClient` (formerly `core/mcp.rs`): the same pending-requests /
//! oneshot-channel / reader-writer-task architecture, but addressed over a
//! `tokio::net::TcpStream` with a length-prefixed line framing instead of a
//! spawned subprocess's stdio.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CombatObservation {
    pub health: f32,
    pub food: f32,
    pub pos: (f64, f64, f64),
    pub nearest_hostile: Option<NearestHostile>,
    pub entities: Vec<String>,
    pub has_sword: bool,
    pub has_shield: bool,
    pub has_bow: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearestHostile {
    pub name: String,
    pub distance: f64,
    /// Relative angle in degrees, 0 = directly ahead, positive = clockwise.
    pub relative_angle_deg: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatAction {
    Attack,
    StrafeLeft,
    StrafeRight,
    Flee,
    UseItem,
    Idle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombatDecision {
    pub action: CombatAction,
    pub confidence: f32,
}

/// A length-prefixed (u32 big-endian) JSON frame over a persistent TCP
/// connection, matching the framing convention the game-protocol layer
/// already uses for its own packets.
pub struct CombatClient {
    addr: String,
    next_id: AtomicU64,
    stream: Mutex<Option<TcpStream>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CombatDecision>>>>,
}

impl CombatClient {
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            next_id: AtomicU64::new(1),
            stream: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .with_context(|| format!("connecting to combat coprocessor at {}", self.addr))?;
            *guard = Some(stream);
        }
        Ok(())
    }

    /// Sends an observation and awaits a decision. On any transport error,
    /// callers should fall back to the internal PvP routine (§4.3's
    /// `attack` primitive handles this).
    pub async fn decide(&self, observation: &CombatObservation) -> Result<CombatDecision> {
        self.ensure_connected().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let envelope = serde_json::json!({ "id": id, "observation": observation });
        let payload = serde_json::to_vec(&envelope)?;
        let len = (payload.len() as u32).to_be_bytes();

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().context("combat stream not connected")?;
        stream.write_all(&len).await?;
        stream.write_all(&payload).await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let resp_len = u32::from_be_bytes(len_buf) as usize;
        let mut resp_buf = vec![0u8; resp_len];
        stream.read_exact(&mut resp_buf).await?;

        let decision: CombatDecision = serde_json::from_slice(&resp_buf)
            .context("decoding combat coprocessor response")?;
        Ok(decision)
    }

    pub async fn disconnect(&self) {
        *self.stream.lock().await = None;
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            drop(tx);
        }
        warn!("combat coprocessor connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn decide_round_trips_through_a_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            socket.read_exact(&mut buf).await.unwrap();

            let resp = serde_json::json!({"action": "attack", "confidence": 0.9});
            let resp_bytes = serde_json::to_vec(&resp).unwrap();
            socket.write_all(&(resp_bytes.len() as u32).to_be_bytes()).await.unwrap();
            socket.write_all(&resp_bytes).await.unwrap();
        });

        let client = CombatClient::new(addr.to_string());
        let obs = CombatObservation {
            health: 20.0,
            food: 20.0,
            pos: (0.0, 64.0, 0.0),
            nearest_hostile: None,
            entities: vec![],
            has_sword: true,
            has_shield: false,
            has_bow: false,
        };
        let decision = client.decide(&obs).await.unwrap();
        assert!(matches!(decision.action, CombatAction::Attack));
    }

    #[tokio::test]
    async fn unreachable_server_errors_for_fallback() {
        let client = CombatClient::new("127.0.0.1:1".to_string());
        let obs = CombatObservation {
            health: 10.0,
            food: 10.0,
            pos: (0.0, 0.0, 0.0),
            nearest_hostile: None,
            entities: vec![],
            has_sword: false,
            has_shield: false,
            has_bow: false,
        };
        assert!(client.decide(&obs).await.is_err());
    }
}
