//! Interactions and their one-way status machine.
//!
//! ```text
//! PENDING ──▶ PROCESSING ──┬──▶ VALIDATION_FAILED
//!                          ├──▶ COMPLETED
//!                          └──▶ FAILED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::TransitionError;

/// What the user (or the scheduler) says the interaction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Pet,
    Feed,
    Play,
    Chat,
    AutonomousThought,
}

impl InteractionType {
    pub const ALL: [InteractionType; 5] = [
        InteractionType::Pet,
        InteractionType::Feed,
        InteractionType::Play,
        InteractionType::Chat,
        InteractionType::AutonomousThought,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Pet => "PET",
            InteractionType::Feed => "FEED",
            InteractionType::Play => "PLAY",
            InteractionType::Chat => "CHAT",
            InteractionType::AutonomousThought => "AUTONOMOUS_THOUGHT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn is_autonomous(&self) -> bool {
        matches!(self, InteractionType::AutonomousThought)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionStatus {
    Pending,
    Processing,
    ValidationFailed,
    Completed,
    Failed,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Pending => "PENDING",
            InteractionStatus::Processing => "PROCESSING",
            InteractionStatus::ValidationFailed => "VALIDATION_FAILED",
            InteractionStatus::Completed => "COMPLETED",
            InteractionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            InteractionStatus::Pending,
            InteractionStatus::Processing,
            InteractionStatus::ValidationFailed,
            InteractionStatus::Completed,
            InteractionStatus::Failed,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InteractionStatus::ValidationFailed
                | InteractionStatus::Completed
                | InteractionStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: InteractionStatus) -> bool {
        use InteractionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, ValidationFailed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub character_id: Uuid,
    pub user_id: Uuid,
    pub declared_type: InteractionType,
    pub payload: String,
    pub status: InteractionStatus,
    /// Unix timestamp
    pub created_at: i64,
}

impl Interaction {
    pub fn new(
        character_id: Uuid,
        user_id: Uuid,
        declared_type: InteractionType,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            character_id,
            user_id,
            declared_type,
            payload: payload.into(),
            status: InteractionStatus::Pending,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Move forward in the status machine. Backward or skipping edges are refused.
    pub fn advance(&mut self, next: InteractionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                interaction_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Condensed view of a past interaction, used as context for the stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSummary {
    pub id: Uuid,
    pub declared_type: InteractionType,
    pub payload: String,
    pub status: InteractionStatus,
    pub response: Option<String>,
    pub created_at: i64,
}
