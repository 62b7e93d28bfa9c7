//! Mock LLM provider with deterministic, schema-conforming replies.
//!
//! Lets the whole pipeline run offline. The stage is recognised from the
//! schema marker in the system prompt and the reply is derived from the JSON
//! input in the user message.

use crate::api_types::{Message, MessagesResponse};
use crate::llm::{CompletionParams, LlmClient};
use crate::prompts::schema_marker;
use anyhow::Result;
use serde_json::{json, Value};
use whisker_core::StageSchema;

const HOSTILE_WORDS: [&str; 5] = ["kick", "hit", "hurt", "throw", "poison"];

#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        _params: CompletionParams,
    ) -> Result<MessagesResponse> {
        let schema = [
            StageSchema::Validation,
            StageSchema::MemoryExtraction,
            StageSchema::ResponsePlan,
        ]
        .into_iter()
        .find(|s| system.contains(&schema_marker(*s)));

        let input = messages
            .last()
            .and_then(|m| serde_json::from_str::<Value>(&m.text()).ok())
            .map(|doc| doc["input"].clone())
            .unwrap_or(Value::Null);

        let reply = match schema {
            Some(StageSchema::Validation) => validation_reply(&input),
            Some(StageSchema::MemoryExtraction) => memory_reply(&input),
            Some(StageSchema::ResponsePlan) => plan_reply(&input),
            None => {
                return Ok(MessagesResponse::text(format!(
                    "(Mock {} Response) I received your prompt.",
                    self.model
                )))
            }
        };
        Ok(MessagesResponse::text(reply.to_string()))
    }
}

fn declared_type(input: &Value) -> &str {
    input["interaction"]["type"].as_str().unwrap_or("CHAT")
}

fn payload(input: &Value) -> String {
    input["interaction"]["payload"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase()
}

fn validation_reply(input: &Value) -> Value {
    let kind = declared_type(input);
    let text = payload(input);

    if HOSTILE_WORDS.iter().any(|w| text.contains(w)) {
        return json!({
            "detected_type": kind,
            "confidence": 0.95,
            "status": "FLAGGED",
            "reason": "the input describes harming the cat",
            "user_mood": "hostile",
        });
    }

    let mood = if text.contains('!') {
        "excited"
    } else if text.contains('?') {
        "curious"
    } else {
        "relaxed"
    };
    json!({
        "detected_type": kind,
        "confidence": 0.9,
        "status": "VALID",
        "reason": format!("reads like a {} interaction", kind.to_lowercase()),
        "user_mood": mood,
    })
}

fn memory_reply(input: &Value) -> Value {
    let candidates = input["candidate_memories"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let chosen: Vec<Value> = candidates
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, m)| {
            json!({
                "memory_id": m["memory_id"],
                "text": m["text"],
                "emotions": m["emotions"],
                "relevance": 0.8 - 0.2 * i as f64,
                "trigger": format!("the {} reminded the cat", declared_type(input).to_lowercase()),
            })
        })
        .collect();

    let dominant = input["character"]["state"]["emotional_state"][0]
        .as_str()
        .unwrap_or("calm");
    json!({
        "relevant_memories": chosen,
        "dominant_emotion": dominant,
        "relevance_summary": format!("{} related memories came to mind", chosen.len()),
        "behavioral_influence": "the cat leans on what it remembers",
    })
}

fn plan_reply(input: &Value) -> Value {
    let name = input["character"]["name"].as_str().unwrap_or("The cat");
    let kind = declared_type(input);
    let text = payload(input);

    let (response, memory, activity, deltas, emotions) = match kind {
        "PET" => (
            format!("{} leans into your hand and purrs.", name),
            "The human petted me gently.".to_string(),
            Some("resting"),
            (0, 8, 0, 2),
            vec!["content", "affectionate"],
        ),
        "FEED" => (
            format!("{} devours the food, tail held high.", name),
            "The human fed me.".to_string(),
            Some("eating"),
            (15, 5, 3, 1),
            vec!["satisfied", "content"],
        ),
        "PLAY" => (
            format!("{} pounces on the toy and bats it across the floor.", name),
            "The human played with me.".to_string(),
            Some("playing"),
            (-5, 10, -10, 2),
            vec!["playful", "excited"],
        ),
        "AUTONOMOUS_THOUGHT" => (
            format!("{} stares out of the window, thinking about birds.", name),
            "I spent a while thinking about birds.".to_string(),
            Some("watching"),
            (-1, 0, -2, 0),
            vec!["curious", "calm"],
        ),
        _ => (
            format!("{} tilts its head at \"{}\" and meows.", name, text),
            format!("The human said: {}", text),
            None,
            (0, 2, 0, 1),
            vec!["curious"],
        ),
    };

    let mut plan = json!({
        "response": response,
        "new_memory_text": memory,
        "hunger_delta": deltas.0,
        "happiness_delta": deltas.1,
        "energy_delta": deltas.2,
        "affection_delta": deltas.3,
        "emotional_state": emotions,
    });
    if let Some(activity) = activity {
        plan["new_activity"] = json!(activity);
    }
    plan
}
