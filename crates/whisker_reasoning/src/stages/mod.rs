//! The three generative stages of the interaction pipeline.
//!
//! Stages only read context and return values; nothing here writes to the
//! store.

pub mod planner;
pub mod retrieval;
pub mod validator;

pub use planner::ResponsePlanner;
pub use retrieval::MemoryRetriever;
pub use validator::Validator;

use whisker_core::{
    GenerationBackend, GenerationError, PipelineError, PipelineStage, PromptContext, StageOutput,
    StageSchema,
};

/// One backend call, with failures attributed to `stage`.
async fn call_backend(
    backend: &dyn GenerationBackend,
    stage: PipelineStage,
    schema: StageSchema,
    prompt: &PromptContext,
) -> Result<StageOutput, PipelineError> {
    backend
        .generate(schema, prompt)
        .await
        .map_err(|source| PipelineError::Generation { stage, source })
}

fn malformed(
    stage: PipelineStage,
    schema: StageSchema,
    detail: impl Into<String>,
) -> PipelineError {
    PipelineError::Generation {
        stage,
        source: GenerationError::Malformed {
            schema,
            detail: detail.into(),
        },
    }
}

fn unexpected_output(
    stage: PipelineStage,
    expected: StageSchema,
    got: StageSchema,
) -> PipelineError {
    malformed(stage, expected, format!("backend answered with {} output", got))
}
