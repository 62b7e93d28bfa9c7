use super::{call_backend, malformed, unexpected_output};
use crate::prompts;
use std::sync::Arc;
use whisker_core::config::PipelineConfig;
use whisker_core::{
    CharacterContext, GenerationBackend, Interaction, InteractionType, PipelineError,
    PipelineStage, StageOutput, StageSchema, ValidationResult, ValidationStatus,
};

const STAGE: PipelineStage = PipelineStage::Validator;

/// Judges whether an interaction is acceptable and matches its declared type.
pub struct Validator {
    backend: Arc<dyn GenerationBackend>,
    mismatch_threshold: f32,
    max_payload_chars: usize,
}

impl Validator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            mismatch_threshold: config.mismatch_threshold,
            max_payload_chars: config.max_payload_chars,
        }
    }

    /// Never writes anything; the coordinator records the verdict.
    pub async fn validate(
        &self,
        interaction: &Interaction,
        ctx: &CharacterContext,
    ) -> Result<ValidationResult, PipelineError> {
        if let Some(reason) = self.prefilter(interaction) {
            tracing::debug!("interaction {} not checked: {}", interaction.id, reason);
            return Ok(ValidationResult {
                detected_type: interaction.declared_type,
                confidence: 0.0,
                status: ValidationStatus::NotChecked,
                reason,
                user_mood: String::new(),
            });
        }

        let prompt = prompts::validation_prompt(interaction, ctx);
        let output =
            call_backend(self.backend.as_ref(), STAGE, StageSchema::Validation, &prompt).await?;
        let raw = match output {
            StageOutput::Validation(result) => result,
            other => {
                return Err(unexpected_output(
                    STAGE,
                    StageSchema::Validation,
                    other.schema(),
                ))
            }
        };
        self.judge(interaction.declared_type, raw)
    }

    /// Input that cannot be judged at all never reaches the backend.
    fn prefilter(&self, interaction: &Interaction) -> Option<String> {
        let chars = interaction.payload.chars().count();
        if interaction.declared_type == InteractionType::Chat
            && interaction.payload.trim().is_empty()
        {
            Some("empty chat message".to_string())
        } else if chars > self.max_payload_chars {
            Some(format!(
                "payload of {} characters exceeds the {} character limit",
                chars, self.max_payload_chars
            ))
        } else {
            None
        }
    }

    /// Turn the backend's raw verdict into the final one.
    ///
    /// FLAGGED and INVALID are kept as answered. A type disagreement only
    /// turns a VALID or mismatch answer into a mismatch at or above the
    /// confidence threshold; below it a mismatch claim is downgraded to VALID.
    fn judge(
        &self,
        declared: InteractionType,
        mut raw: ValidationResult,
    ) -> Result<ValidationResult, PipelineError> {
        if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
            return Err(malformed(
                STAGE,
                StageSchema::Validation,
                format!("confidence {} outside [0, 1]", raw.confidence),
            ));
        }

        let disagrees = raw.detected_type != declared
            && !declared.is_autonomous()
            && raw.confidence >= self.mismatch_threshold;

        raw.status = match raw.status {
            ValidationStatus::NotChecked => {
                return Err(malformed(
                    STAGE,
                    StageSchema::Validation,
                    "backend may not answer NOT_CHECKED",
                ))
            }
            ValidationStatus::Flagged => ValidationStatus::Flagged,
            ValidationStatus::Invalid => ValidationStatus::Invalid,
            _ if disagrees => ValidationStatus::InteractionTypeMismatch,
            ValidationStatus::InteractionTypeMismatch => ValidationStatus::Valid,
            other => other,
        };

        if raw.status == ValidationStatus::InteractionTypeMismatch
            && raw.reason.trim().is_empty()
        {
            raw.reason = format!(
                "declared {} but it looks like {}",
                declared, raw.detected_type
            );
        }
        Ok(raw)
    }
}
