//! In-game chat command surface (§4.11/§6.5). Intercepted before an incoming
//! chat line reaches the filtered chat handler; runs synchronously against
//! the skill registry and persistent memory.

use tokio::sync::Mutex;

use crate::core::game::GameClient;
use crate::core::memory::MemorySystem;
use crate::core::skills::executor::SkillExecutor;
use crate::core::skills::SkillRegistry;

pub enum CommandOutcome {
    NotACommand,
    Handled(String),
}

/// Attempts to interpret `text` as a command. Returns `NotACommand` for any
/// line that doesn't match one of the §6.5 prefixes, in which case the
/// caller should fall through to normal chat ingestion.
pub async fn intercept(
    text: &str,
    game: &dyn GameClient,
    skills: &SkillRegistry,
    executor: &SkillExecutor,
    memory: &Mutex<MemorySystem>,
) -> CommandOutcome {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("/eval ") {
        return CommandOutcome::Handled(run_eval(rest.trim(), game, skills, executor, memory).await);
    }

    if let Some(rest) = trimmed.strip_prefix("!goal ") {
        return CommandOutcome::Handled(run_goal(rest.trim(), memory).await);
    }

    CommandOutcome::NotACommand
}

async fn run_eval(arg: &str, game: &dyn GameClient, skills: &SkillRegistry, executor: &SkillExecutor, memory: &Mutex<MemorySystem>) -> String {
    if let Some(filter) = arg.strip_prefix("all") {
        let filter = filter.trim();
        let names: Vec<String> = skills
            .catalog()
            .into_iter()
            .map(|(n, _)| n.to_string())
            .filter(|n| filter.is_empty() || n.contains(filter))
            .collect();
        if names.is_empty() {
            return format!("No skills match filter '{filter}'");
        }
        let mut results = Vec::new();
        for name in names {
            results.push(run_one_skill(&name, game, skills, executor, memory).await);
        }
        return results.join("; ");
    }

    run_one_skill(arg, game, skills, executor, memory).await
}

async fn run_one_skill(name: &str, game: &dyn GameClient, skills: &SkillRegistry, executor: &SkillExecutor, memory: &Mutex<MemorySystem>) -> String {
    match skills.get(name) {
        Some(skill) => {
            let result = executor.run_skill(skill, game, serde_json::Map::new(), memory).await;
            format!("{name}: {result}")
        }
        None => format!("{name}: no such skill"),
    }
}

async fn run_goal(arg: &str, memory: &Mutex<MemorySystem>) -> String {
    if arg == "show" {
        let mem = memory.lock().await;
        return match mem.season_goal() {
            Some(g) => format!("Current goal: {g}"),
            None => "No goal set.".to_string(),
        };
    }

    if arg == "clear" {
        let mut mem = memory.lock().await;
        return match mem.set_season_goal(None).await {
            Ok(()) => "Goal cleared.".to_string(),
            Err(e) => format!("Failed to clear goal: {e}"),
        };
    }

    if let Some(text) = arg.strip_prefix("set ") {
        let mut mem = memory.lock().await;
        return match mem.set_season_goal(Some(text.trim().to_string())).await {
            Ok(()) => format!("Goal set: {}", text.trim()),
            Err(e) => format!("Failed to set goal: {e}"),
        };
    }

    "Usage: !goal set <text> | !goal clear | !goal show".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::mock::MockGameClient;

    #[tokio::test]
    async fn goal_set_then_show_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());
        let game = MockGameClient::new();
        let skills = SkillRegistry::with_builtins();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = SkillExecutor::new(tx);

        let set = intercept("!goal set build a castle", &game, &skills, &executor, &memory).await;
        assert!(matches!(set, CommandOutcome::Handled(ref s) if s.contains("build a castle")));

        let show = intercept("!goal show", &game, &skills, &executor, &memory).await;
        assert!(matches!(show, CommandOutcome::Handled(ref s) if s.contains("build a castle")));
    }

    #[tokio::test]
    async fn non_command_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Mutex::new(MemorySystem::load(dir.path()).await.unwrap());
        let game = MockGameClient::new();
        let skills = SkillRegistry::with_builtins();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = SkillExecutor::new(tx);

        let outcome = intercept("hey how's it going", &game, &skills, &executor, &memory).await;
        assert!(matches!(outcome, CommandOutcome::NotACommand));
    }
}
