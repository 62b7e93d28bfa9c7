//! Failure taxonomy for the interaction pipeline.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::interaction::{InteractionStatus, InteractionType};
use crate::stages::StageSchema;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("interaction {interaction_id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub interaction_id: Uuid,
    pub from: InteractionStatus,
    pub to: InteractionStatus,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("emotional state must contain at least one tag")]
pub struct EmptyEmotionalState;

/// Failure of a call to the generation backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("{schema} output does not conform to schema: {detail}")]
    Malformed { schema: StageSchema, detail: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(
        "character {character_id} was modified concurrently \
         (expected version {expected_version})"
    )]
    Conflict {
        character_id: Uuid,
        expected_version: i64,
    },

    #[error("storage error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("user {user_id} has {balance} credits, {required} required")]
    InsufficientFunds {
        user_id: Uuid,
        balance: u64,
        required: u64,
    },

    #[error("unknown user {0}")]
    UnknownUser(Uuid),

    #[error("ledger error: {0}")]
    Backend(String),
}

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Intake,
    Ledger,
    Context,
    Validator,
    MemoryRetrieval,
    ResponsePlanning,
    Commit,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Intake => "intake",
            PipelineStage::Ledger => "ledger",
            PipelineStage::Context => "context",
            PipelineStage::Validator => "validator",
            PipelineStage::MemoryRetrieval => "memory_retrieval",
            PipelineStage::ResponsePlanning => "response_planning",
            PipelineStage::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that drives an interaction to FAILED.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("{stage} stage: {source}")]
    Generation {
        stage: PipelineStage,
        #[source]
        source: GenerationError,
    },

    #[error("{stage} stage timed out after {after:?}")]
    StageTimeout { stage: PipelineStage, after: Duration },

    #[error("{stage} stage produced unusable output: {detail}")]
    InvalidOutput { stage: PipelineStage, detail: String },

    #[error("response planning produced no emotional state")]
    EmptyEmotionalState,

    #[error("{stage}: {source}")]
    Store {
        stage: PipelineStage,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl PipelineError {
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::Generation { stage, .. }
            | PipelineError::StageTimeout { stage, .. }
            | PipelineError::InvalidOutput { stage, .. }
            | PipelineError::Store { stage, .. } => Some(*stage),
            PipelineError::EmptyEmotionalState => Some(PipelineStage::ResponsePlanning),
            PipelineError::Ledger(_) => Some(PipelineStage::Ledger),
            PipelineError::Transition(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Generation {
                source: GenerationError::Unavailable(_),
                ..
            } => "generation_unavailable",
            PipelineError::Generation {
                source: GenerationError::Malformed { .. },
                ..
            } => "malformed_output",
            PipelineError::StageTimeout { .. } => "timeout",
            PipelineError::InvalidOutput { .. } => "invalid_output",
            PipelineError::EmptyEmotionalState => "empty_emotional_state",
            PipelineError::Store {
                source: StoreError::Conflict { .. },
                ..
            } => "persistence_conflict",
            PipelineError::Store { .. } => "persistence",
            PipelineError::Ledger(LedgerError::InsufficientFunds { .. }) => "insufficient_funds",
            PipelineError::Ledger(_) => "ledger",
            PipelineError::Transition(_) => "illegal_transition",
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, PipelineError::Ledger(LedgerError::InsufficientFunds { .. }))
    }

    /// Structured payload for the error log.
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "stage": self.stage().map(|s| s.as_str()),
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }
}

/// Error log category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    InteractionError,
    InteractionValidationError,
    ThoughtGenerationError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::InteractionError => "interaction-error",
            ErrorType::InteractionValidationError => "interaction-validation-error",
            ErrorType::ThoughtGenerationError => "thought-generation-error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            ErrorType::InteractionError,
            ErrorType::InteractionValidationError,
            ErrorType::ThoughtGenerationError,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
    }

    /// Category for an infrastructure failure, chosen by the declared type.
    pub fn for_failure(declared: InteractionType) -> Self {
        if declared.is_autonomous() {
            ErrorType::ThoughtGenerationError
        } else {
            ErrorType::InteractionError
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only error log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub error_type: ErrorType,
    pub error: serde_json::Value,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_category_follows_declared_type() {
        assert_eq!(
            ErrorType::for_failure(InteractionType::AutonomousThought),
            ErrorType::ThoughtGenerationError
        );
        for t in [
            InteractionType::Pet,
            InteractionType::Feed,
            InteractionType::Play,
            InteractionType::Chat,
        ] {
            assert_eq!(ErrorType::for_failure(t), ErrorType::InteractionError);
        }
    }

    #[test]
    fn test_error_type_names() {
        let json = serde_json::to_string(&ErrorType::InteractionValidationError).unwrap();
        assert_eq!(json, "\"interaction-validation-error\"");
        assert_eq!(
            ErrorType::parse("thought-generation-error"),
            Some(ErrorType::ThoughtGenerationError)
        );
    }

    #[test]
    fn test_payload_shape() {
        let err = PipelineError::Generation {
            stage: PipelineStage::Validator,
            source: GenerationError::Unavailable("connection refused".into()),
        };
        let payload = err.to_payload();
        assert_eq!(payload["stage"], "validator");
        assert_eq!(payload["kind"], "generation_unavailable");
        assert!(payload["message"].as_str().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_insufficient_funds_detection() {
        let err = PipelineError::from(LedgerError::InsufficientFunds {
            user_id: Uuid::nil(),
            balance: 1,
            required: 5,
        });
        assert!(err.is_insufficient_funds());
        assert_eq!(err.stage(), Some(PipelineStage::Ledger));
    }
}
