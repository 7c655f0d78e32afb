//! Strategic handler: uses the large/slow model with the full world
//! context, role priorities, team bulletin, and blacklist summary (§4.2).

use crate::core::bulletin::TeamBulletin;
use crate::core::event::Decision;
use crate::core::failure_memory::FailureMemory;
use crate::core::game::GameClient;
use crate::core::llm::{ChatMessage, GenerateOptions, LlmManager, ModelSlot};
use crate::core::memory::MemorySystem;
use crate::core::role::RoleConfig;
use crate::core::world::format_world_context;

use super::parse_decision;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    role: &RoleConfig,
    game: &dyn GameClient,
    llm: &LlmManager,
    memory: &mut MemorySystem,
    bulletin: &TeamBulletin,
    failure_memory: &FailureMemory,
    pending_chat: Option<String>,
    last_result: Option<&str>,
    goal_steps_remaining: Option<u32>,
) -> Decision {
    let world_context = format_world_context(game, memory).await;
    let peers = bulletin.format_for_peers(&role.display_name).await;

    let snap = game.snapshot().await;
    let leash_warning = if let Some(home) = role.home {
        let dist = home.distance(snap.position.x, snap.position.y, snap.position.z);
        if dist >= role.leash_radius * 0.8 {
            format!("\nWarning: you are {dist:.0} blocks from home, leash radius is {}.", role.leash_radius)
        } else {
            String::new()
        }
    } else {
        String::new()
    };

    let stash_line = role
        .stash_pos
        .map(|s| format!("\nYour stash is at ({:.0}, {:.0}, {:.0}).", s.x, s.y, s.z))
        .unwrap_or_default();

    let blacklist_summary = failure_memory.summary_for_prompt();

    let system = format!(
        "You are {name}, an autonomous agent in a voxel world.\nPersonality: {personality}\nPriorities: {priorities}\nAllowed actions: {actions}\nAllowed skills: {skills}\nDo not retry these (recently failed):\n{blacklist}\n\nReply with a single JSON object: {{\"thought\": str, \"action\": str, \"params\": object, \"goal\": str|null, \"goal_steps\": int|null}}.",
        name = role.display_name,
        personality = role.personality,
        priorities = role.priorities,
        actions = role.allowed_actions.join(", "),
        skills = role.allowed_skills.join(", "),
        blacklist = blacklist_summary,
    );

    let mut user = format!(
        "World:\n{world_context}{leash_warning}{stash_line}\n\nTeammates:\n{peers}\n\ngoal_steps_remaining: {}",
        goal_steps_remaining.map(|n| n.to_string()).unwrap_or_else(|| "none".to_string())
    );
    if let Some(last) = last_result {
        user.push_str(&format!("\nLast action result: {last}"));
    }
    if let Some(chat) = pending_chat {
        user.push_str(&format!("\nViewer said: {chat}"));
    }

    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

    match llm.generate(ModelSlot::Strong, &messages, GenerateOptions::default()).await {
        Ok(output) => parse_decision(&output.text),
        Err(_) => Decision::idle("Brain buffering..."),
    }
}
