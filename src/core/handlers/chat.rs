//! Chat handler: uses the small/fast model to produce a raw utterance (no
//! JSON contract) in reply to a filtered viewer message (§4.2).

use crate::core::game::GameClient;
use crate::core::llm::{ChatMessage, GenerateOptions, LlmManager, ModelSlot};
use crate::core::safety::filter_chat_message;

pub async fn run(game: &dyn GameClient, llm: &LlmManager, agent_name: &str, current_activity: &str, viewer_message: &str) -> String {
    let _ = game.snapshot().await;
    let system = format!(
        "You are {agent_name}, currently {current_activity}. A viewer said: \"{viewer_message}\". Reply with a short, in-character utterance. No JSON, just the words you'd say."
    );
    let messages = vec![ChatMessage::system(system)];
    let options = GenerateOptions { temperature: 0.9, num_predict: 80 };

    let raw = match llm.generate(ModelSlot::Fast, &messages, options).await {
        Ok(output) => output.text,
        Err(_) => "...".to_string(),
    };

    filter_chat_message(&raw).cleaned
}
