//! Stage schemas: the structured shapes exchanged with the generation backend.
//!
//! Each stage output is a variant of [`StageOutput`]; the coordinator matches
//! on it exhaustively instead of poking at loosely typed JSON.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::interaction::InteractionType;
use crate::state::{Activity, EmotionalState, Location};

/// Largest magnitude a single plan may move any one field.
pub const MAX_DELTA: i32 = 20;

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    NotChecked,
    Flagged,
    InteractionTypeMismatch,
}

impl ValidationStatus {
    pub fn passes(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::Invalid => "INVALID",
            ValidationStatus::NotChecked => "NOT_CHECKED",
            ValidationStatus::Flagged => "FLAGGED",
            ValidationStatus::InteractionTypeMismatch => "INTERACTION_TYPE_MISMATCH",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub detected_type: InteractionType,
    pub confidence: f32,
    pub status: ValidationStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub user_mood: String,
}

// ============================================================================
// Memory extraction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantMemory {
    /// Id of the stored memory this entry refers to, when the backend echoed it.
    #[serde(default)]
    pub memory_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub emotions: Vec<String>,
    pub relevance: f32,
    #[serde(default)]
    pub trigger: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryExtractionResult {
    #[serde(default)]
    pub relevant_memories: Vec<RelevantMemory>,
    #[serde(default)]
    pub dominant_emotion: String,
    #[serde(default)]
    pub relevance_summary: String,
    #[serde(default)]
    pub behavioral_influence: String,
}

impl MemoryExtractionResult {
    pub fn referenced_ids(&self) -> Vec<Uuid> {
        self.relevant_memories
            .iter()
            .filter_map(|m| m.memory_id)
            .collect()
    }
}

// ============================================================================
// Response planning
// ============================================================================

/// Three-way optional field: leave alone, clear, or set.
///
/// In JSON an absent key is `Unchanged`, an explicit `null` is `Clear`.
/// Fields of this type need `#[serde(default)]` for that to hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }
}

impl<T: Copy> Patch<T> {
    /// Resolve the patch against the current value.
    pub fn resolve(&self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Unchanged => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(*v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            // Callers skip `Unchanged` fields; if one slips through, null is the closest.
            Patch::Unchanged | Patch::Clear => serializer.serialize_none(),
            Patch::Set(v) => serializer.serialize_some(v),
        }
    }
}

/// Signed change per field, each within `[-MAX_DELTA, MAX_DELTA]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub hunger: i32,
    pub happiness: i32,
    pub energy: i32,
    pub affection: i32,
}

impl StateDelta {
    /// Clamp arbitrary proposals into the allowed delta range.
    pub fn bounded(hunger: i64, happiness: i64, energy: i64, affection: i64) -> Self {
        let b = |v: i64| v.clamp(-(MAX_DELTA as i64), MAX_DELTA as i64) as i32;
        Self {
            hunger: b(hunger),
            happiness: b(happiness),
            energy: b(energy),
            affection: b(affection),
        }
    }
}

/// Backend-facing shape of a response plan, before the planning stage has
/// bounded the deltas and normalised the emotion tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub response: String,
    pub new_memory_text: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub new_activity: Patch<Activity>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub new_location: Patch<Location>,
    #[serde(default)]
    pub hunger_delta: i64,
    #[serde(default)]
    pub happiness_delta: i64,
    #[serde(default)]
    pub energy_delta: i64,
    #[serde(default)]
    pub affection_delta: i64,
    #[serde(default)]
    pub emotional_state: Vec<String>,
}

/// The only artifact that mutates character state, and only through the
/// coordinator's clamp-and-commit step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub response: String,
    pub new_memory_text: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub new_activity: Patch<Activity>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub new_location: Patch<Location>,
    pub delta: StateDelta,
    pub emotional_state: EmotionalState,
}

// ============================================================================
// Backend envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageSchema {
    Validation,
    MemoryExtraction,
    ResponsePlan,
}

impl StageSchema {
    pub fn name(&self) -> &'static str {
        match self {
            StageSchema::Validation => "validation",
            StageSchema::MemoryExtraction => "memory_extraction",
            StageSchema::ResponsePlan => "response_plan",
        }
    }
}

impl fmt::Display for StageSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Validation(ValidationResult),
    MemoryExtraction(MemoryExtractionResult),
    ResponsePlan(PlanDraft),
}

impl StageOutput {
    pub fn schema(&self) -> StageSchema {
        match self {
            StageOutput::Validation(_) => StageSchema::Validation,
            StageOutput::MemoryExtraction(_) => StageSchema::MemoryExtraction,
            StageOutput::ResponsePlan(_) => StageSchema::ResponsePlan,
        }
    }
}

/// What a stage hands the backend: a task description plus structured input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    pub task: String,
    pub input: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_absent_null_and_value() {
        let absent: PlanDraft = serde_json::from_str(
            r#"{"response": "mrrp", "new_memory_text": "x"}"#,
        )
        .unwrap();
        assert_eq!(absent.new_activity, Patch::Unchanged);

        let cleared: PlanDraft = serde_json::from_str(
            r#"{"response": "mrrp", "new_memory_text": "x", "new_activity": null}"#,
        )
        .unwrap();
        assert_eq!(cleared.new_activity, Patch::Clear);

        let set: PlanDraft = serde_json::from_str(
            r#"{"response": "mrrp", "new_memory_text": "x", "new_location": "kitchen"}"#,
        )
        .unwrap();
        assert_eq!(set.new_location, Patch::Set(Location::Kitchen));
    }

    #[test]
    fn test_unchanged_patch_is_skipped_when_serialising() {
        let draft = PlanDraft {
            response: "mrrp".into(),
            new_memory_text: "x".into(),
            new_activity: Patch::Unchanged,
            new_location: Patch::Clear,
            hunger_delta: 0,
            happiness_delta: 0,
            energy_delta: 0,
            affection_delta: 0,
            emotional_state: vec!["calm".into()],
        };
        let v = serde_json::to_value(&draft).unwrap();
        assert!(v.get("new_activity").is_none());
        assert!(v["new_location"].is_null());
    }

    #[test]
    fn test_bounded_delta() {
        let d = StateDelta::bounded(45, -300, 7, -20);
        assert_eq!(d, StateDelta { hunger: 20, happiness: -20, energy: 7, affection: -20 });
    }

    #[test]
    fn test_validation_result_defaults() {
        let v: ValidationResult = serde_json::from_str(
            r#"{"detected_type": "PET", "confidence": 0.9, "status": "VALID"}"#,
        )
        .unwrap();
        assert_eq!(v.status, ValidationStatus::Valid);
        assert!(v.reason.is_empty());
        assert!(v.status.passes());
        assert!(!ValidationStatus::Flagged.passes());
    }

    #[test]
    fn test_output_schema_tag() {
        let out = StageOutput::MemoryExtraction(MemoryExtractionResult::default());
        assert_eq!(out.schema(), StageSchema::MemoryExtraction);
        assert_eq!(StageSchema::ResponsePlan.to_string(), "response_plan");
    }
}
