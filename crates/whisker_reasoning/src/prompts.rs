//! Prompt assembly for the three generative stages.
//!
//! Every stage gets the same persona preamble plus a schema block, and a user
//! message carrying a JSON document `{"task": ..., "input": ...}`.

use serde_json::{json, Value};
use whisker_core::{
    CharacterContext, Interaction, MemoryExtractionResult, MemoryRecord, PromptContext,
    StageSchema, ValidationResult,
};

const PERSONA: &str = "You are the inner mind of a virtual cat. The cat has a name, \
bounded needs (hunger, happiness, energy on a 0-100 scale), an affection score for \
its human, a current activity and location, and a short list of emotions. \
Stay in character: the cat does not speak human language fluently, it purrs, \
meows, sulks and shows affection the way cats do.";

const VALIDATION_RULES: &str = r#"Judge the human's interaction before the cat reacts to it.
Decide which interaction type the input really is (PET, FEED, PLAY, CHAT, AUTONOMOUS_THOUGHT),
how confident you are (0.0-1.0), and whether it is acceptable.
Use status FLAGGED for abusive, harmful or manipulative input, INVALID for input that makes
no sense for the declared type, INTERACTION_TYPE_MISMATCH when the input is clearly a
different type than declared, otherwise VALID. Never answer NOT_CHECKED.
Describe the human's apparent mood in one or two words.

Reply with exactly one JSON object:
{"detected_type": "CHAT", "confidence": 0.9, "status": "VALID", "reason": "...", "user_mood": "..."}"#;

const MEMORY_RULES: &str = r#"Pick the cat's memories that matter for this interaction.
Only choose from the candidate memories you are given, and copy their memory_id exactly.
Score each chosen memory's relevance from 0.0 to 1.0 and say what in the interaction
triggered it. Name the single emotion that should dominate the cat's reaction, summarise
why the memories matter, and describe how they should influence behaviour.

Reply with exactly one JSON object:
{"relevant_memories": [{"memory_id": "...", "text": "...", "emotions": ["..."], "relevance": 0.8, "trigger": "..."}],
 "dominant_emotion": "...", "relevance_summary": "...", "behavioral_influence": "..."}"#;

const PLAN_RULES: &str = r#"Decide how the cat responds and how it changes.
Write the cat's visible response, and one sentence the cat will remember about this moment.
Propose integer deltas for hunger, happiness, energy and affection, each between -20 and 20.
Feeding raises hunger (it means fullness), play costs energy, neglect or rough handling
lowers happiness and affection. Give 1 to 5 single-word emotions for the cat's new state.
Set new_activity or new_location only if they change; use null to clear them and leave the
key out to keep them as they are.
Activities: sleeping, eating, playing, grooming, exploring, resting, hunting, watching.
Locations: living_room, kitchen, bedroom, garden, windowsill, rooftop.

Reply with exactly one JSON object:
{"response": "...", "new_memory_text": "...", "new_activity": "eating", "new_location": "kitchen",
 "hunger_delta": 10, "happiness_delta": 5, "energy_delta": 0, "affection_delta": 2,
 "emotional_state": ["content", "sleepy"]}"#;

/// Tag embedded in every system prompt so a response can be traced to its stage.
pub fn schema_marker(schema: StageSchema) -> String {
    format!("[schema:{}]", schema.name())
}

pub fn system_prompt(schema: StageSchema) -> String {
    let rules = match schema {
        StageSchema::Validation => VALIDATION_RULES,
        StageSchema::MemoryExtraction => MEMORY_RULES,
        StageSchema::ResponsePlan => PLAN_RULES,
    };
    format!(
        "{}\n\n{}\n\n{}\nOutput JSON only, without commentary or code fences.",
        PERSONA,
        schema_marker(schema),
        rules
    )
}

/// The user message a backend sends for a prompt.
pub fn render_user_message(prompt: &PromptContext) -> String {
    serde_json::to_string_pretty(prompt).unwrap_or_else(|_| prompt.task.clone())
}

pub fn validation_prompt(interaction: &Interaction, ctx: &CharacterContext) -> PromptContext {
    PromptContext {
        task: "Validate this interaction.".to_string(),
        input: json!({
            "interaction": interaction_json(interaction),
            "character": character_json(ctx),
            "recent_interactions": history_json(ctx),
        }),
    }
}

pub fn memory_prompt(
    interaction: &Interaction,
    ctx: &CharacterContext,
    validation: &ValidationResult,
    candidates: &[&MemoryRecord],
) -> PromptContext {
    let candidate_memories: Vec<Value> = candidates
        .iter()
        .map(|m| {
            json!({
                "memory_id": m.id,
                "text": m.text,
                "emotions": m.emotions,
            })
        })
        .collect();

    PromptContext {
        task: "Select the memories relevant to this interaction.".to_string(),
        input: json!({
            "interaction": interaction_json(interaction),
            "character": character_json(ctx),
            "user_mood": validation.user_mood,
            "candidate_memories": candidate_memories,
        }),
    }
}

pub fn plan_prompt(
    interaction: &Interaction,
    ctx: &CharacterContext,
    memory: &MemoryExtractionResult,
) -> PromptContext {
    PromptContext {
        task: "Plan the cat's response and state change.".to_string(),
        input: json!({
            "interaction": interaction_json(interaction),
            "character": character_json(ctx),
            "recent_interactions": history_json(ctx),
            "memory": memory,
        }),
    }
}

fn interaction_json(interaction: &Interaction) -> Value {
    json!({
        "type": interaction.declared_type,
        "payload": interaction.payload,
    })
}

fn character_json(ctx: &CharacterContext) -> Value {
    json!({
        "name": ctx.character.name,
        "state": ctx.state,
    })
}

fn history_json(ctx: &CharacterContext) -> Value {
    ctx.recent_interactions
        .iter()
        .map(|i| {
            json!({
                "type": i.declared_type,
                "payload": i.payload,
                "status": i.status,
                "response": i.response,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_core::{Character, CharacterState, InteractionType};
    use uuid::Uuid;

    fn context() -> CharacterContext {
        CharacterContext {
            character: Character {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                name: "Mochi".to_string(),
            },
            state: CharacterState::default(),
            version: 0,
            recent_memories: vec![],
            recent_interactions: vec![],
        }
    }

    #[test]
    fn test_system_prompt_carries_marker() {
        for schema in [
            StageSchema::Validation,
            StageSchema::MemoryExtraction,
            StageSchema::ResponsePlan,
        ] {
            assert!(system_prompt(schema).contains(&schema_marker(schema)));
        }
    }

    #[test]
    fn test_validation_prompt_input() {
        let ctx = context();
        let interaction = Interaction::new(
            ctx.character.id,
            ctx.character.owner_id,
            InteractionType::Chat,
            "who's a good kitty",
        );
        let prompt = validation_prompt(&interaction, &ctx);
        assert_eq!(prompt.input["interaction"]["type"], "CHAT");
        assert_eq!(prompt.input["interaction"]["payload"], "who's a good kitty");
        assert_eq!(prompt.input["character"]["name"], "Mochi");
        assert_eq!(prompt.input["character"]["state"]["hunger"], 50);

        let rendered = render_user_message(&prompt);
        let back: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(back["task"], "Validate this interaction.");
    }
}
