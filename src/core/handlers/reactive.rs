//! Reactive handler: uses the small/fast model with a short, situational
//! prompt (§4.2). Triggered by hostiles, low vitals, or damage.

use crate::core::event::{Decision, Payload};
use crate::core::game::GameClient;
use crate::core::llm::{ChatMessage, GenerateOptions, LlmManager, ModelSlot};

use super::parse_decision;

pub async fn run(game: &dyn GameClient, llm: &LlmManager, payload: &Payload, combat_available: bool) -> Decision {
    let snap = game.snapshot().await;

    let situation = match payload {
        Payload::Hostiles(names) => format!("Hostiles nearby: {}", names.join(", ")),
        Payload::TookDamage => "You just took damage!".to_string(),
        Payload::LowHealth(h) => format!("Your health is low: {h:.0}/20"),
        Payload::LowFood(f) => format!("Your food is low: {f:.0}/20"),
        _ => "Something needs your attention.".to_string(),
    };

    let food_items: Vec<&str> = snap
        .inventory
        .iter()
        .filter(|i| ["bread", "cooked_beef", "cooked_porkchop", "cooked_chicken", "apple", "carrot"].contains(&i.name.as_str()))
        .map(|i| i.name.as_str())
        .collect();

    let mut actions = vec!["attack", "flee", "eat", "idle"];
    if combat_available {
        actions.push("neural_combat");
    }

    let system = format!(
        "React fast. Health {:.0}/20, food {:.0}/20. Food available: {}. {situation}\nReply with a single JSON object: {{\"thought\": str, \"action\": one of [{}], \"params\": object}}.",
        snap.health,
        snap.food,
        if food_items.is_empty() { "none".to_string() } else { food_items.join(", ") },
        actions.join(", "),
    );

    let messages = vec![ChatMessage::system(system)];
    let options = GenerateOptions { temperature: 0.2, num_predict: 128 };

    match llm.generate(ModelSlot::Fast, &messages, options).await {
        Ok(output) => parse_decision(&output.text),
        Err(_) => Decision::idle("Brain buffering..."),
    }
}
