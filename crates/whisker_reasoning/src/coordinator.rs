//! Drives one interaction from submission to a terminal state.
//!
//! The coordinator is the only writer of interaction status and character
//! state. Stages hand back values; everything they propose lands in a single
//! version-checked commit, or not at all.

use crate::locks::CharacterLocks;
use crate::stages::{MemoryRetriever, ResponsePlanner, Validator};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;
use whisker_core::config::{InteractionCosts, PipelineConfig};
use whisker_core::{
    CharacterState, CommitRequest, CostLedger, ErrorLogSink, ErrorType, GenerationBackend,
    Interaction, InteractionStatus, InteractionType, NewMemory, PipelineError, PipelineStage,
    StateStore, StoreError, ValidationResult, ValidationStatus, WhiskerConfig,
};

#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub character_id: Uuid,
    pub user_id: Uuid,
    pub kind: InteractionType,
    pub payload: String,
}

impl InteractionRequest {
    pub fn new(
        character_id: Uuid,
        user_id: Uuid,
        kind: InteractionType,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            character_id,
            user_id,
            kind,
            payload: payload.into(),
        }
    }

    /// A self-initiated thought, billed to the character's owner.
    pub fn thought(character_id: Uuid, owner_id: Uuid) -> Self {
        Self::new(character_id, owner_id, InteractionType::AutonomousThought, "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InsufficientFunds,
    Internal,
}

/// What the caller learns about a submitted interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    Completed {
        interaction_id: Uuid,
        response: String,
        state: CharacterState,
    },
    ValidationFailed {
        interaction_id: Uuid,
        status: ValidationStatus,
        reason: String,
    },
    Failed {
        interaction_id: Uuid,
        kind: FailureKind,
    },
}

impl InteractionOutcome {
    pub fn interaction_id(&self) -> Uuid {
        match self {
            InteractionOutcome::Completed { interaction_id, .. }
            | InteractionOutcome::ValidationFailed { interaction_id, .. }
            | InteractionOutcome::Failed { interaction_id, .. } => *interaction_id,
        }
    }

    pub fn status(&self) -> InteractionStatus {
        match self {
            InteractionOutcome::Completed { .. } => InteractionStatus::Completed,
            InteractionOutcome::ValidationFailed { .. } => InteractionStatus::ValidationFailed,
            InteractionOutcome::Failed { .. } => InteractionStatus::Failed,
        }
    }
}

enum Verdict {
    Completed {
        response: String,
        state: CharacterState,
    },
    Rejected(ValidationResult),
}

pub struct InteractionCoordinator {
    store: Arc<dyn StateStore>,
    ledger: Arc<dyn CostLedger>,
    error_log: Arc<dyn ErrorLogSink>,
    validator: Validator,
    retriever: MemoryRetriever,
    planner: ResponsePlanner,
    locks: CharacterLocks,
    pipeline: PipelineConfig,
    costs: InteractionCosts,
}

fn store_err(stage: PipelineStage) -> impl FnOnce(StoreError) -> PipelineError {
    move |source| PipelineError::Store { stage, source }
}

impl InteractionCoordinator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn StateStore>,
        ledger: Arc<dyn CostLedger>,
        error_log: Arc<dyn ErrorLogSink>,
        config: &WhiskerConfig,
    ) -> Self {
        Self {
            validator: Validator::new(backend.clone(), &config.pipeline),
            retriever: MemoryRetriever::new(backend.clone(), &config.pipeline),
            planner: ResponsePlanner::new(backend),
            store,
            ledger,
            error_log,
            locks: CharacterLocks::new(),
            pipeline: config.pipeline.clone(),
            costs: config.costs.clone(),
        }
    }

    /// Record the interaction as PENDING, wait for the character, then run
    /// the pipeline to a terminal state.
    ///
    /// Failing to record the interaction, or to move it to PROCESSING, is
    /// returned as an error: the row never left PENDING, so there is no
    /// FAILED outcome to report. Anything later ends in a FAILED outcome.
    #[tracing::instrument(
        skip(self, request),
        fields(character = %request.character_id, kind = %request.kind)
    )]
    pub async fn submit(
        &self,
        request: InteractionRequest,
    ) -> Result<InteractionOutcome, PipelineError> {
        let mut interaction = Interaction::new(
            request.character_id,
            request.user_id,
            request.kind,
            request.payload,
        );
        self.store
            .create_interaction(&interaction)
            .await
            .map_err(store_err(PipelineStage::Intake))?;
        tracing::debug!("interaction {} pending", interaction.id);

        let _lease = self.locks.acquire(interaction.character_id).await;

        self.store
            .update_interaction_status(interaction.id, InteractionStatus::Processing, None)
            .await
            .map_err(store_err(PipelineStage::Intake))?;
        interaction.advance(InteractionStatus::Processing)?;

        let outcome = match self.run(&mut interaction).await {
            Ok(Verdict::Completed { response, state }) => InteractionOutcome::Completed {
                interaction_id: interaction.id,
                response,
                state,
            },
            Ok(Verdict::Rejected(validation)) => self.reject(&mut interaction, validation).await,
            Err(e) => self.fail(&mut interaction, e).await,
        };

        tracing::info!(
            "interaction {} ({}) -> {}",
            interaction.id,
            interaction.declared_type,
            outcome.status()
        );
        Ok(outcome)
    }

    async fn run(&self, interaction: &mut Interaction) -> Result<Verdict, PipelineError> {
        let cost = self.costs.cost_of(interaction.declared_type);
        self.ledger
            .debit(interaction.user_id, interaction.id, cost)
            .await?;

        let ctx = self
            .store
            .load_character_context(interaction.character_id)
            .await
            .map_err(store_err(PipelineStage::Context))?;

        let validation = self
            .bounded(
                PipelineStage::Validator,
                self.validator.validate(interaction, &ctx),
            )
            .await?;
        if !validation.status.passes() {
            return Ok(Verdict::Rejected(validation));
        }

        let memories = self
            .bounded(
                PipelineStage::MemoryRetrieval,
                self.retriever.extract_memories(interaction, &ctx, &validation),
            )
            .await?;

        let plan = self
            .bounded(
                PipelineStage::ResponsePlanning,
                self.planner.plan_response(interaction, &ctx, &memories),
            )
            .await?;

        let next_state = ctx.state.apply(&plan);
        let commit = CommitRequest {
            interaction_id: interaction.id,
            character_id: interaction.character_id,
            expected_version: ctx.version,
            next_state: next_state.clone(),
            new_memory: NewMemory {
                id: Uuid::new_v4(),
                text: plan.new_memory_text.clone(),
                emotions: plan.emotional_state.tags().to_vec(),
            },
            response_text: plan.response.clone(),
            validation,
            referenced_memories: memories.referenced_ids(),
        };
        self.store
            .commit_interaction_result(&commit)
            .await
            .map_err(store_err(PipelineStage::Commit))?;
        interaction.advance(InteractionStatus::Completed)?;

        Ok(Verdict::Completed {
            response: plan.response,
            state: next_state,
        })
    }

    /// Run a stage under the configured deadline.
    async fn bounded<T, F>(&self, stage: PipelineStage, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let limit = self.pipeline.stage_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::StageTimeout { stage, after: limit }),
        }
    }

    async fn reject(
        &self,
        interaction: &mut Interaction,
        validation: ValidationResult,
    ) -> InteractionOutcome {
        if let Err(source) = self
            .store
            .update_interaction_status(
                interaction.id,
                InteractionStatus::ValidationFailed,
                Some(&validation),
            )
            .await
        {
            return self
                .fail(
                    interaction,
                    PipelineError::Store {
                        stage: PipelineStage::Validator,
                        source,
                    },
                )
                .await;
        }
        if let Err(e) = interaction.advance(InteractionStatus::ValidationFailed) {
            tracing::warn!("{}", e);
        }

        if validation.status == ValidationStatus::Flagged {
            self.log_error(
                interaction.id,
                ErrorType::InteractionValidationError,
                json!({
                    "status": validation.status,
                    "reason": validation.reason,
                    "detected_type": validation.detected_type,
                    "confidence": validation.confidence,
                }),
            )
            .await;
        }

        InteractionOutcome::ValidationFailed {
            interaction_id: interaction.id,
            status: validation.status,
            reason: validation.reason,
        }
    }

    async fn fail(
        &self,
        interaction: &mut Interaction,
        error: PipelineError,
    ) -> InteractionOutcome {
        tracing::warn!("interaction {} failed: {}", interaction.id, error);

        if interaction.status == InteractionStatus::Processing {
            match self
                .store
                .update_interaction_status(interaction.id, InteractionStatus::Failed, None)
                .await
            {
                Ok(()) => {
                    if let Err(e) = interaction.advance(InteractionStatus::Failed) {
                        tracing::warn!("{}", e);
                    }
                }
                Err(e) => tracing::warn!(
                    "could not mark interaction {} as failed: {}",
                    interaction.id,
                    e
                ),
            }
        }

        let kind = if error.is_insufficient_funds() {
            FailureKind::InsufficientFunds
        } else {
            self.log_error(
                interaction.id,
                ErrorType::for_failure(interaction.declared_type),
                error.to_payload(),
            )
            .await;
            FailureKind::Internal
        };

        InteractionOutcome::Failed {
            interaction_id: interaction.id,
            kind,
        }
    }

    /// Failures to log are reported but never change the outcome.
    async fn log_error(
        &self,
        interaction_id: Uuid,
        error_type: ErrorType,
        error: serde_json::Value,
    ) {
        if let Err(e) = self
            .error_log
            .append("interaction", interaction_id, error_type, error)
            .await
        {
            tracing::warn!(
                "failed to write {} entry for interaction {}: {:#}",
                error_type,
                interaction_id,
                e
            );
        }
    }
}
