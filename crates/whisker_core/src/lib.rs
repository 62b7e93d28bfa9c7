pub mod config;
pub mod context;
pub mod error;
pub mod interaction;
pub mod stages;
pub mod state;

pub use config::WhiskerConfig;
pub use context::{CharacterContext, CommitRequest, MemoryRecord, NewMemory};
pub use error::{
    EmptyEmotionalState, ErrorLogEntry, ErrorType, GenerationError, LedgerError, PipelineError,
    PipelineStage, StoreError, TransitionError,
};
pub use interaction::{Interaction, InteractionStatus, InteractionSummary, InteractionType};
pub use stages::{
    MemoryExtractionResult, Patch, PlanDraft, PromptContext, RelevantMemory, ResponsePlan,
    StageOutput, StageSchema, StateDelta, ValidationResult, ValidationStatus,
};
pub use state::{Activity, Character, CharacterState, EmotionalState, Location};

use async_trait::async_trait;
use uuid::Uuid;

/// Persistence of characters, memories and interactions.
///
/// Implementations must make `commit_interaction_result` all-or-nothing and
/// refuse it with [`StoreError::Conflict`] when the character's version moved.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_character_context(
        &self,
        character_id: Uuid,
    ) -> Result<CharacterContext, StoreError>;

    async fn create_interaction(&self, interaction: &Interaction) -> Result<(), StoreError>;

    /// Record a non-completing status change, with the validation verdict
    /// when one exists.
    async fn update_interaction_status(
        &self,
        interaction_id: Uuid,
        status: InteractionStatus,
        validation: Option<&ValidationResult>,
    ) -> Result<(), StoreError>;

    /// Write state, memory and response, and mark the interaction COMPLETED.
    async fn commit_interaction_result(&self, commit: &CommitRequest) -> Result<(), StoreError>;
}

/// The generative backend each stage calls.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        schema: StageSchema,
        prompt: &PromptContext,
    ) -> Result<StageOutput, GenerationError>;
}

/// Durable, append-only failure record.
#[async_trait]
pub trait ErrorLogSink: Send + Sync {
    async fn append(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        error_type: ErrorType,
        error: serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// Per-user credit balance.
#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn debit(&self, user_id: Uuid, interaction_id: Uuid, amount: u64)
        -> Result<(), LedgerError>;
}
