//! Model-reply parsing pipeline shared by every decision handler (§4.2).
//! Grounded on the teacher's invoke-tag regex parsing in `core/brain.rs`
//! (`execute_react_loop`'s `<invoke name="...">` extraction) — the same
//! "tolerate a messy model reply, recover a structured call" posture, but
//! rebuilt around brace-matching JSON extraction since this system's
//! contract is a JSON object, not an XML-ish tag.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::core::event::Decision;

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\n?(.*?)```").unwrap())
}

fn build_house_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(manually(build|construct)|build.*(shelter|hut)|construct.*(shelter|house))").unwrap()
    })
}

/// Strips `<think>...</think>` blocks and unwraps a single fenced code
/// block, if present.
fn strip_wrappers(raw: &str) -> String {
    let without_think = think_block_re().replace_all(raw, "");
    if let Some(caps) = fenced_code_re().captures(&without_think) {
        caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| without_think.to_string())
    } else {
        without_think.to_string()
    }
}

/// Locates the first balanced `{...}` substring, respecting string quotes
/// and escapes. Returns `(json_text, was_truncated)`.
fn extract_braced_object(text: &str) -> Option<(String, bool)> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    match end {
        Some(e) => Some((text[start..=e].to_string(), false)),
        None => Some((text[start..].to_string(), true)),
    }
}

/// On truncation, strips the last partial field and appends the missing
/// closing braces.
fn repair_truncated(partial: &str) -> Option<Value> {
    let mut candidate = partial.trim_end().to_string();
    while let Some(idx) = candidate.rfind(',') {
        let attempt = format!("{}{}", &candidate[..idx], "}".repeat(candidate[..idx].matches('{').count().saturating_sub(candidate[..idx].matches('}').count())));
        if let Ok(value) = serde_json::from_str::<Value>(&attempt) {
            return Some(value);
        }
        candidate.truncate(idx);
    }
    let open = candidate.matches('{').count();
    let close = candidate.matches('}').count();
    if open > close {
        let patched = format!("{}{}", candidate, "}".repeat(open - close));
        serde_json::from_str::<Value>(&patched).ok()
    } else {
        None
    }
}

const ACTION_ALIASES: &[(&str, &str)] = &[
    ("go to", "go_to"),
    ("goto", "go_to"),
    ("move", "explore"),
    ("walk", "explore"),
    ("travel", "explore"),
    ("mine", "mine_block"),
    ("chop", "gather_wood"),
    ("cut_tree", "gather_wood"),
];

fn normalise_action_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    for (alias, canonical) in ACTION_ALIASES {
        if lower == *alias {
            return canonical.to_string();
        }
    }
    lower
}

const HOISTABLE_FIELDS: &[&str] = &[
    "direction", "item", "block", "blockType", "count", "skill", "task", "message", "x", "y", "z", "coordinates",
];

/// Repairs shorthand shapes (`{invoke_skill: "name"}`) into the canonical
/// `{action, params}` shape, in place.
fn repair_shape(obj: &mut Map<String, Value>) {
    for shorthand in ["invoke_skill", "generate_skill", "neural_combat"] {
        if let Some(value) = obj.remove(shorthand) {
            let mut params = Map::new();
            let key = if shorthand == "invoke_skill" || shorthand == "generate_skill" { "skill" } else { "mode" };
            params.insert(key.to_string(), value);
            obj.insert("action".to_string(), Value::String(shorthand.to_string()));
            obj.insert("params".to_string(), Value::Object(params));
            return;
        }
    }
}

fn hoist_fields(obj: &mut Map<String, Value>) {
    let mut params = match obj.remove("params") {
        Some(Value::Object(p)) => p,
        _ => Map::new(),
    };
    for field in HOISTABLE_FIELDS {
        if !params.contains_key(*field) {
            if let Some(v) = obj.remove(*field) {
                params.insert(field.to_string(), v);
            }
        }
    }
    obj.insert("params".to_string(), Value::Object(params));
}

/// Strips wrappers, extracts the first balanced JSON object, and repairs
/// truncation — the shared first half of the pipeline, reusable by handlers
/// (e.g. the critic) that need a raw `Value` rather than a full `Decision`.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let stripped = strip_wrappers(raw);
    let (json_text, truncated) = extract_braced_object(&stripped)?;

    if truncated {
        repair_truncated(&json_text)
    } else {
        serde_json::from_str::<Value>(&json_text).ok().or_else(|| repair_truncated(&json_text))
    }
}

/// Parses a raw model reply into a `Decision`, applying the full repair
/// pipeline of §4.2. Never fails: an unparsable reply yields a safe idle
/// decision.
pub fn parse_decision(raw: &str) -> Decision {
    let Some(mut value) = extract_json_object(raw) else {
        return Decision::idle("Brain buffering...");
    };

    let Some(obj) = value.as_object_mut() else {
        return Decision::idle("Brain buffering...");
    };

    repair_shape(obj);

    let thought = obj.get("thought").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let mut action = obj
        .get("action")
        .and_then(|v| v.as_str())
        .map(normalise_action_name)
        .unwrap_or_else(|| "idle".to_string());

    hoist_fields(obj);
    let mut params = match obj.remove("params") {
        Some(Value::Object(p)) => p,
        _ => Map::new(),
    };

    if let Some(stripped_block) = action.strip_prefix("mine_") {
        if stripped_block != "block" {
            params.insert("blockType".to_string(), Value::String(stripped_block.to_string()));
            action = "mine_block".to_string();
        }
    }

    if build_house_re().is_match(&action) {
        action = "build_house".to_string();
    }

    let goal = obj.get("goal").and_then(|v| v.as_str()).map(|s| s.to_string());
    let goal_steps = obj.get("goal_steps").and_then(|v| v.as_u64()).map(|n| n as u32);

    Decision { thought, action, params, goal, goal_steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let d = parse_decision(r#"{"thought": "let's gather wood", "action": "gather_wood"}"#);
        assert_eq!(d.action, "gather_wood");
        assert_eq!(d.thought, "let's gather wood");
    }

    #[test]
    fn strips_think_blocks_and_fences() {
        let raw = "<think>hmm let me plan</think>```json\n{\"thought\": \"ok\", \"action\": \"idle\"}\n```";
        let d = parse_decision(raw);
        assert_eq!(d.action, "idle");
    }

    #[test]
    fn repairs_truncated_object() {
        let raw = r#"{"thought": "gathering wood for a hou"#;
        let d = parse_decision(raw);
        assert_eq!(d.action, "idle");
    }

    #[test]
    fn repairs_invoke_skill_shorthand() {
        let d = parse_decision(r#"{"invoke_skill": "go_fish"}"#);
        assert_eq!(d.action, "invoke_skill");
        assert_eq!(d.params.get("skill").unwrap().as_str().unwrap(), "go_fish");
    }

    #[test]
    fn normalises_aliases_and_hoists_fields() {
        let d = parse_decision(r#"{"thought": "go", "action": "go to", "x": 10, "z": 20}"#);
        assert_eq!(d.action, "go_to");
        assert_eq!(d.params.get("x").unwrap().as_i64().unwrap(), 10);
    }

    #[test]
    fn mine_blockname_pattern_rewrites_to_mine_block() {
        let d = parse_decision(r#"{"action": "mine_iron_ore"}"#);
        assert_eq!(d.action, "mine_block");
        assert_eq!(d.params.get("blockType").unwrap().as_str().unwrap(), "iron_ore");
    }

    #[test]
    fn build_house_regex_catches_variants() {
        let d = parse_decision(r#"{"action": "manually_construct_a_shelter"}"#);
        assert_eq!(d.action, "build_house");
    }

    #[test]
    fn unparsable_garbage_yields_safe_idle() {
        let d = parse_decision("the quick brown fox");
        assert_eq!(d.action, "idle");
    }
}
