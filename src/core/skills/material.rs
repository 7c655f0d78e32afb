//! A small hard-coded crafting tree used by the skill executor's gathering
//! sub-phase to decompose a missing item into primitive gather/craft steps
//! (§4.5). Deliberately shallow — this is not a general crafting-recipe
//! engine, only enough depth to unblock the five built-in skills.

#[derive(Debug, Clone)]
pub enum Step {
    Gather { block: String, count: u32 },
    Craft { item: String, count: u32 },
}

/// Recursively decomposes `item` into a sequence of gather/craft steps that
/// would produce `count` of it, given nothing in inventory. Bottoms out at
/// raw blocks (logs, cobblestone, sand, wool) which become `Gather` steps.
pub fn decompose(item: &str, count: u32) -> Vec<Step> {
    let mut steps = Vec::new();
    decompose_into(item, count, &mut steps);
    steps
}

fn decompose_into(item: &str, count: u32, steps: &mut Vec<Step>) {
    match item {
        "oak_log" | "log" => steps.push(Step::Gather { block: "oak_log".to_string(), count }),
        "cobblestone" | "stone" => steps.push(Step::Gather { block: "stone".to_string(), count }),
        "oak_planks" | "planks" => {
            let logs_needed = count.div_ceil(4).max(1);
            decompose_into("oak_log", logs_needed, steps);
            steps.push(Step::Craft { item: "oak_planks".to_string(), count });
        }
        "stick" => {
            let planks_needed = count.div_ceil(2).max(1);
            decompose_into("oak_planks", planks_needed, steps);
            steps.push(Step::Craft { item: "stick".to_string(), count });
        }
        "crafting_table" => {
            decompose_into("oak_planks", 4, steps);
            steps.push(Step::Craft { item: "crafting_table".to_string(), count });
        }
        "wooden_pickaxe" => {
            decompose_into("oak_planks", 3, steps);
            decompose_into("stick", 2, steps);
            steps.push(Step::Craft { item: "wooden_pickaxe".to_string(), count });
        }
        "stone_pickaxe" => {
            decompose_into("cobblestone", 3, steps);
            decompose_into("stick", 2, steps);
            steps.push(Step::Craft { item: "stone_pickaxe".to_string(), count });
        }
        "furnace" => {
            decompose_into("cobblestone", 8, steps);
            steps.push(Step::Craft { item: "furnace".to_string(), count });
        }
        "chest" => {
            decompose_into("oak_planks", 8, steps);
            steps.push(Step::Craft { item: "chest".to_string(), count });
        }
        "torch" => {
            steps.push(Step::Gather { block: "coal_ore".to_string(), count: count.div_ceil(4).max(1) });
            decompose_into("stick", count.div_ceil(4).max(1), steps);
            steps.push(Step::Craft { item: "torch".to_string(), count });
        }
        other => steps.push(Step::Gather { block: other.to_string(), count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torch_decomposes_into_coal_and_sticks_then_craft() {
        let steps = decompose("torch", 4);
        assert!(matches!(steps.last(), Some(Step::Craft { item, .. }) if item == "torch"));
        assert!(steps.iter().any(|s| matches!(s, Step::Gather { block, .. } if block == "coal_ore")));
    }

    #[test]
    fn planks_require_logs_first() {
        let steps = decompose("oak_planks", 4);
        assert!(matches!(steps[0], Step::Gather { .. }));
    }
}
