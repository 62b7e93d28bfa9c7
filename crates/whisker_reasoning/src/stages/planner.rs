use super::{call_backend, unexpected_output};
use crate::prompts;
use std::sync::Arc;
use whisker_core::{
    CharacterContext, EmotionalState, GenerationBackend, Interaction, MemoryExtractionResult,
    PipelineError, PipelineStage, PlanDraft, ResponsePlan, StageOutput, StageSchema, StateDelta,
};

const STAGE: PipelineStage = PipelineStage::ResponsePlanning;

/// Produces the plan the coordinator applies. Proposes only; never commits.
pub struct ResponsePlanner {
    backend: Arc<dyn GenerationBackend>,
}

impl ResponsePlanner {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub async fn plan_response(
        &self,
        interaction: &Interaction,
        ctx: &CharacterContext,
        memory: &MemoryExtractionResult,
    ) -> Result<ResponsePlan, PipelineError> {
        let prompt = prompts::plan_prompt(interaction, ctx, memory);
        let output =
            call_backend(self.backend.as_ref(), STAGE, StageSchema::ResponsePlan, &prompt).await?;
        let draft = match output {
            StageOutput::ResponsePlan(draft) => draft,
            other => {
                return Err(unexpected_output(
                    STAGE,
                    StageSchema::ResponsePlan,
                    other.schema(),
                ))
            }
        };
        finalize(draft)
    }
}

/// Bound the deltas, normalise the emotion tags and reject empty text.
pub fn finalize(draft: PlanDraft) -> Result<ResponsePlan, PipelineError> {
    let response = draft.response.trim().to_string();
    if response.is_empty() {
        return Err(PipelineError::InvalidOutput {
            stage: STAGE,
            detail: "empty response".to_string(),
        });
    }
    let new_memory_text = draft.new_memory_text.trim().to_string();
    if new_memory_text.is_empty() {
        return Err(PipelineError::InvalidOutput {
            stage: STAGE,
            detail: "empty memory text".to_string(),
        });
    }

    let emotional_state = EmotionalState::from_tags(&draft.emotional_state)
        .map_err(|_| PipelineError::EmptyEmotionalState)?;

    if draft.emotional_state.len() > emotional_state.len() {
        tracing::debug!(
            "emotional state reduced from {} to {} tags",
            draft.emotional_state.len(),
            emotional_state.len()
        );
    }

    Ok(ResponsePlan {
        response,
        new_memory_text,
        new_activity: draft.new_activity,
        new_location: draft.new_location,
        delta: StateDelta::bounded(
            draft.hunger_delta,
            draft.happiness_delta,
            draft.energy_delta,
            draft.affection_delta,
        ),
        emotional_state,
    })
}
