//! Short-term blacklist and the bridge into the persistent broken-skill
//! ledger. Grounded on the teacher's key-value memory tables
//! (`core/memory/stm.rs`), reshaped from an append-only log into a
//! canonical-key map with counters, since the failure-memory subsystem needs
//! point lookups and deletions that a log doesn't give for free.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::core::memory::MemorySystem;

const HARD_BLACKLIST_AFTER: u32 = 2;
const EXPIRY_AFTER_SUCCESSES: u32 = 8;
const PERSISTENT_PROMOTE_AFTER: u32 = 5;
const ROLLING_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct BlacklistEntry {
    pub message: String,
    pub consecutive_failures: u32,
}

fn precondition_keywords() -> &'static [&'static str] {
    &[
        "no trees found",
        "need wood",
        "need pickaxe",
        "no torches",
        "no crafting table",
        "no furnace",
        "missing materials",
        "no water found",
        "no tillable dirt",
        "no seeds",
        "can't craft a hoe",
        "chunk may not be loaded",
        "cannot find",
        "could not find",
        "nothing to smelt",
    ]
}

fn is_precondition_failure(result: &str) -> bool {
    let lower = result.to_lowercase();
    precondition_keywords().iter().any(|k| lower.contains(k))
}

/// Canonicalises an action/skill identifier into the blacklist key space of
/// §4.4.
pub fn canonical_key(action: &str, params: &serde_json::Map<String, serde_json::Value>) -> String {
    match action {
        "invoke_skill" | "generate_skill" => {
            let name = params
                .get("skill")
                .and_then(|v| v.as_str())
                .unwrap_or(action);
            format!("skill:{name}")
        }
        "craft" => {
            let item = params
                .get("item")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            format!("craft:{item}")
        }
        "go_to" => {
            let x = params.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let z = params.get("z").and_then(|v| v.as_f64()).unwrap_or(0.0);
            format!("go_to:{x:.0},{z:.0}")
        }
        other => other.to_string(),
    }
}

fn soft_entry_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^unknown action:").unwrap())
}

/// Builds the soft single-failure hint message for the fixed patterns of
/// §4.4's table, or `None` if this failure should go through the normal
/// 2-strike counter instead.
fn soft_entry_message(key: &str, result: &str) -> Option<String> {
    let lower = result.to_lowercase();
    if soft_entry_pattern().is_match(result) {
        return Some(result.to_string());
    }
    if (key.starts_with("skill:build_house") || key == "gather_wood") && lower.contains("no trees")
    {
        return Some("No trees found — explore then retry".to_string());
    }
    if key.starts_with("skill:build_farm") && lower.contains("no water") {
        return Some("No water within 96 blocks — explore then retry".to_string());
    }
    if lower.contains("no wool") {
        return Some("Need 3 wool same color — kill sheep".to_string());
    }
    if key == "light_area" && lower.contains("no torch") {
        return Some("No torches — mine coal and craft first".to_string());
    }
    if key.starts_with("craft:") {
        if let Some(idx) = lower.find("missing:") {
            return Some(format!("Missing materials: {}", result[idx..].trim()));
        }
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct FailureMemory {
    blacklist: HashMap<String, BlacklistEntry>,
    /// Consecutive non-soft failure counts below the hard-blacklist
    /// threshold, kept separately so the counter survives across calls
    /// instead of being wiped by the below-threshold cleanup in `record`.
    pending_failures: HashMap<String, u32>,
    successes_since_expiry: u32,
    /// rolling (key, success) history, most recent last, capped at 100.
    attempt_history: Vec<(String, bool)>,
}

impl FailureMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blacklisted(&self, key: &str) -> bool {
        self.blacklist.contains_key(key)
    }

    pub fn blacklist_message(&self, key: &str) -> Option<&str> {
        self.blacklist.get(key).map(|e| e.message.as_str())
    }

    /// Records a dispatch outcome and applies the blacklist/expiry rules of
    /// §4.4. Returns the set of skill names (if any) that should now be
    /// promoted to the persistent broken-skill ledger.
    pub fn record(&mut self, key: &str, success: bool, result: &str) -> Option<String> {
        self.attempt_history.push((key.to_string(), success));
        if self.attempt_history.len() > ROLLING_HISTORY {
            self.attempt_history.remove(0);
        }

        if success {
            self.blacklist.remove(key);
            self.pending_failures.remove(key);
            self.successes_since_expiry += 1;
            if self.successes_since_expiry >= EXPIRY_AFTER_SUCCESSES {
                self.expire_oldest();
                self.successes_since_expiry = 0;
            }
            return None;
        }

        if let Some(msg) = soft_entry_message(key, result) {
            self.pending_failures.remove(key);
            self.blacklist.insert(
                key.to_string(),
                BlacklistEntry { message: msg, consecutive_failures: 1 },
            );
        } else {
            let count = self.pending_failures.entry(key.to_string()).or_insert(0);
            *count += 1;
            if *count >= HARD_BLACKLIST_AFTER {
                self.blacklist.insert(
                    key.to_string(),
                    BlacklistEntry { message: result.to_string(), consecutive_failures: *count },
                );
            }
        }

        if key.starts_with("skill:") && !is_precondition_failure(result) {
            let non_precondition_failures = self
                .attempt_history
                .iter()
                .filter(|(k, ok)| k == key && !ok)
                .count() as u32;
            let any_success = self.attempt_history.iter().any(|(k, ok)| k == key && *ok);
            if non_precondition_failures >= PERSISTENT_PROMOTE_AFTER && !any_success {
                return Some(key.trim_start_matches("skill:").to_string());
            }
        }
        None
    }

    fn expire_oldest(&mut self) {
        let victim = self
            .blacklist
            .iter()
            .filter(|(_, e)| !e.message.contains("no water found") && !e.message.contains("need 3 wool"))
            .min_by_key(|(k, _)| k.clone())
            .map(|(k, _)| k.clone());
        if let Some(k) = victim {
            self.blacklist.remove(&k);
        }
    }

    /// Re-enables entries whose missing resource has since appeared in
    /// inventory.
    pub fn reenable_on_inventory(&mut self, inventory: &[String]) {
        let has = |needle: &str| inventory.iter().any(|i| i.to_lowercase().contains(needle));
        let resources = [("coal", "coal"), ("stick", "stick"), ("wood", "log"), ("plank", "plank"), ("torch", "torch")];
        let keys: Vec<String> = self
            .blacklist
            .iter()
            .filter(|(_, e)| {
                let m = e.message.to_lowercase();
                resources.iter().any(|(label, inv_needle)| m.contains(&format!("missing: {label}")) && has(inv_needle))
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            self.blacklist.remove(&k);
        }
        let wool_keys: Vec<String> = self
            .blacklist
            .iter()
            .filter(|(_, e)| e.message.contains("Need 3 wool"))
            .map(|(k, _)| k.clone())
            .collect();
        let wool_count: u32 = inventory
            .iter()
            .filter(|i| i.to_lowercase().contains("wool"))
            .count() as u32;
        if wool_count >= 3 {
            for k in wool_keys {
                self.blacklist.remove(&k);
            }
        }
    }

    /// At-dispatch reprieve: `build_farm`'s "no water" entry clears if water
    /// is now within range, independent of the background re-enable pass.
    pub fn reprieve_build_farm_if_water_near(&mut self, water_within_96: bool) {
        if !water_within_96 {
            return;
        }
        let keys: Vec<String> = self
            .blacklist
            .iter()
            .filter(|(k, e)| k.contains("build_farm") && e.message.contains("No water"))
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            self.blacklist.remove(&k);
        }
    }

    /// Human-readable rendering of the blacklist for inclusion in the
    /// strategic prompt's "do not retry" section.
    pub fn summary_for_prompt(&self) -> String {
        if self.blacklist.is_empty() {
            return "(none)".to_string();
        }
        let mut lines: Vec<String> = self
            .blacklist
            .iter()
            .map(|(k, e)| {
                if e.message.is_empty() {
                    format!("- {k}")
                } else {
                    format!("- {k}: {}", e.message)
                }
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }

    pub fn seed_blacklist(&mut self, key: String, message: String) {
        self.blacklist
            .entry(key)
            .or_insert(BlacklistEntry { message, consecutive_failures: 1 });
    }

    /// Session precondition carry-forward (§4.4/§9): on startup, for each
    /// named skill whose last two attempts were both precondition failures
    /// of the same stable subtype (water, wool, torches — never trees,
    /// since the agent may have relocated over a restart), pre-populate the
    /// short-term blacklist so the skill isn't immediately retried this
    /// session against an unresolved prerequisite.
    pub fn seed_from_memory(&mut self, memory: &MemorySystem, skill_names: &[String]) {
        for name in skill_names {
            let attempts = memory.recent_attempts(name);
            if attempts.len() < 2 {
                continue;
            }
            let last_two = &attempts[attempts.len() - 2..];
            if last_two.iter().any(|a| a.success) {
                continue;
            }
            let subtypes: Vec<Option<String>> = last_two.iter().map(|a| carry_forward_subtype(&a.notes)).collect();
            if let (Some(first), Some(second)) = (&subtypes[0], &subtypes[1]) {
                if first == second {
                    self.seed_blacklist(format!("skill:{name}"), first.clone());
                }
            }
        }
    }
}

/// Classifies a failure message into one of the carry-forward-eligible
/// precondition subtypes, or `None` if it isn't one of these (including
/// "no trees", which is deliberately excluded — see `seed_from_memory`).
fn carry_forward_subtype(result: &str) -> Option<String> {
    let lower = result.to_lowercase();
    if lower.contains("no water found") {
        Some("No water within 96 blocks — explore then retry".to_string())
    } else if lower.contains("no wool") {
        Some("Need 3 wool same color — kill sheep".to_string())
    } else if lower.contains("no torches") {
        Some("No torches — mine coal and craft first".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn two_consecutive_failures_hard_blacklists() {
        let mut fm = FailureMemory::new();
        assert!(fm.record("mine_block", false, "stuck pathing").is_none());
        assert!(!fm.is_blacklisted("mine_block"));
        fm.record("mine_block", false, "stuck pathing again").unwrap_or_default();
        assert!(fm.is_blacklisted("mine_block"));
    }

    #[test]
    fn success_resets_counter_and_clears_entry() {
        let mut fm = FailureMemory::new();
        fm.record("attack", false, "missed");
        fm.record("attack", false, "missed again");
        assert!(fm.is_blacklisted("attack"));
        fm.record("attack", true, "killed zombie");
        assert!(!fm.is_blacklisted("attack"));
    }

    #[test]
    fn eight_successes_expire_oldest_non_environmental_entry() {
        let mut fm = FailureMemory::new();
        fm.record("mine_block", false, "stuck");
        fm.record("mine_block", false, "stuck");
        assert!(fm.is_blacklisted("mine_block"));
        for _ in 0..8 {
            fm.record("go_to", true, "arrived");
        }
        assert!(!fm.is_blacklisted("mine_block"));
    }

    #[test]
    fn canonical_key_for_craft() {
        let mut params = serde_json::Map::new();
        params.insert("item".to_string(), json!("torch"));
        assert_eq!(canonical_key("craft", &params), "craft:torch");
    }

    #[test]
    fn skill_promoted_after_five_non_precondition_failures_with_no_success() {
        let mut fm = FailureMemory::new();
        let mut promoted = None;
        for _ in 0..5 {
            promoted = fm.record("skill:go_fish", false, "fishing rod broke");
        }
        assert_eq!(promoted, Some("go_fish".to_string()));
    }

    #[test]
    fn precondition_failures_never_promote() {
        let mut fm = FailureMemory::new();
        let mut promoted = None;
        for _ in 0..10 {
            promoted = fm.record("skill:farm_plot", false, "no water found nearby");
        }
        assert_eq!(promoted, None);
    }

    #[tokio::test]
    async fn carry_forward_seeds_blacklist_for_two_same_subtype_precondition_failures() {
        use crate::core::memory::types::SkillAttempt;

        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemorySystem::load(dir.path()).await.unwrap();
        for _ in 0..2 {
            memory
                .record_skill_attempt(SkillAttempt {
                    skill: "farm_plot".to_string(),
                    success: false,
                    duration_seconds: 1.0,
                    notes: "no water found nearby".to_string(),
                    timestamp: "2026-01-01T00:00:00Z".to_string(),
                })
                .await
                .unwrap();
        }

        let mut fm = FailureMemory::new();
        fm.seed_from_memory(&memory, &["farm_plot".to_string()]);
        assert!(fm.is_blacklisted("skill:farm_plot"));
    }

    #[tokio::test]
    async fn carry_forward_never_fires_for_no_trees() {
        use crate::core::memory::types::SkillAttempt;

        let dir = tempfile::tempdir().unwrap();
        let mut memory = MemorySystem::load(dir.path()).await.unwrap();
        for _ in 0..2 {
            memory
                .record_skill_attempt(SkillAttempt {
                    skill: "build_house".to_string(),
                    success: false,
                    duration_seconds: 1.0,
                    notes: "no trees found nearby".to_string(),
                    timestamp: "2026-01-01T00:00:00Z".to_string(),
                })
                .await
                .unwrap();
        }

        let mut fm = FailureMemory::new();
        fm.seed_from_memory(&memory, &["build_house".to_string()]);
        assert!(!fm.is_blacklisted("skill:build_house"));
    }
}
