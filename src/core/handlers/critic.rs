//! Critic handler: a post-action self-evaluation using the small/fast
//! model, which may directly chain into a next action without a full
//! strategic replan (§4.2).

use serde::Deserialize;

use crate::core::game::GameClient;
use crate::core::llm::{ChatMessage, GenerateOptions, LlmManager, ModelSlot};

#[derive(Debug, Clone, Deserialize)]
pub struct CriticVerdict {
    pub success: bool,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default)]
    pub next_params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub goal_complete: bool,
}

/// Actions the critic is never invoked for.
pub fn skips_critic(action: &str) -> bool {
    matches!(action, "idle" | "chat" | "respond_to_chat")
}

pub async fn run(
    game: &dyn GameClient,
    llm: &LlmManager,
    last_action: &str,
    result: &str,
    goal: Option<&str>,
    goal_steps_remaining: Option<u32>,
) -> CriticVerdict {
    let snap = game.snapshot().await;
    let inv: Vec<String> = snap.inventory.iter().map(|i| format!("{}x{}", i.name, i.count)).collect();

    let system = format!(
        "You just did: {last_action} -> {result}\nCurrent goal: {}\nSteps left: {}\nHealth {:.0}/20, food {:.0}/20\nInventory: {}\nReply with a single JSON object: {{\"success\": bool, \"thought\": str, \"next_action\": str|null, \"next_params\": object|null, \"goal_complete\": bool}}.",
        goal.unwrap_or("none"),
        goal_steps_remaining.map(|n| n.to_string()).unwrap_or_else(|| "n/a".to_string()),
        snap.health,
        snap.food,
        if inv.is_empty() { "(empty)".to_string() } else { inv.join(", ") },
    );

    let messages = vec![ChatMessage::system(system)];
    let options = GenerateOptions { temperature: 0.1, num_predict: 160 };

    match llm.generate(ModelSlot::Fast, &messages, options).await {
        Ok(output) => parse_verdict(&output.text),
        Err(_) => CriticVerdict {
            success: result_looks_successful(result),
            thought: "Could not reach critic model".to_string(),
            next_action: None,
            next_params: None,
            goal_complete: false,
        },
    }
}

fn result_looks_successful(result: &str) -> bool {
    !result.to_lowercase().contains("fail") && !result.to_lowercase().contains("block")
}

fn parse_verdict(raw: &str) -> CriticVerdict {
    match super::parse::extract_json_object(raw) {
        Some(value) => serde_json::from_value(value).unwrap_or(CriticVerdict {
            success: result_looks_successful(raw),
            thought: String::new(),
            next_action: None,
            next_params: None,
            goal_complete: false,
        }),
        None => CriticVerdict {
            success: result_looks_successful(raw),
            thought: String::new(),
            next_action: None,
            next_params: None,
            goal_complete: false,
        },
    }
}
