use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interaction::InteractionSummary;
use crate::stages::ValidationResult;
use crate::state::{Character, CharacterState};

/// A stored memory, written from the cat's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub character_id: Uuid,
    pub text: String,
    pub emotions: Vec<String>,
    pub source_interaction_id: Option<Uuid>,
    /// Unix timestamp
    pub created_at: i64,
}

/// Everything the stages may look at for one character, read in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterContext {
    pub character: Character,
    pub state: CharacterState,
    /// Optimistic concurrency token; bumped on every committed interaction.
    pub version: i64,
    /// Most recent first.
    pub recent_memories: Vec<MemoryRecord>,
    /// Most recent first.
    pub recent_interactions: Vec<InteractionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub id: Uuid,
    pub text: String,
    pub emotions: Vec<String>,
}

/// Everything a completed interaction writes, committed atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    pub interaction_id: Uuid,
    pub character_id: Uuid,
    /// The commit is refused unless the stored version still equals this.
    pub expected_version: i64,
    /// Already clamped.
    pub next_state: CharacterState,
    pub new_memory: NewMemory,
    pub response_text: String,
    pub validation: ValidationResult,
    pub referenced_memories: Vec<Uuid>,
}
