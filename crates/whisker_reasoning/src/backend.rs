//! `GenerationBackend` on top of a chat-completion `LlmClient`.

use crate::api_types::Message;
use crate::llm::{CompletionParams, LlmClient};
use crate::prompts;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use whisker_core::{
    GenerationBackend, GenerationError, MemoryExtractionResult, PlanDraft, PromptContext,
    StageOutput, StageSchema, ValidationResult,
};

pub struct LlmBackend {
    client: Arc<dyn LlmClient>,
    params: CompletionParams,
}

impl LlmBackend {
    pub fn new(client: Arc<dyn LlmClient>, params: CompletionParams) -> Self {
        Self { client, params }
    }
}

#[async_trait]
impl GenerationBackend for LlmBackend {
    #[tracing::instrument(skip(self, schema, prompt), fields(schema = %schema))]
    async fn generate(
        &self,
        schema: StageSchema,
        prompt: &PromptContext,
    ) -> Result<StageOutput, GenerationError> {
        let system = prompts::system_prompt(schema);
        let messages = vec![Message::user(prompts::render_user_message(prompt))];

        let response = self
            .client
            .complete(&system, messages, self.params.clone())
            .await
            .map_err(|e| GenerationError::Unavailable(format!("{:#}", e)))?;

        let text = response.joined_text();
        tracing::debug!("{} output: {} chars", schema, text.len());
        parse_stage_output(schema, &text)
    }
}

/// Decode a model reply into the output for `schema`.
pub fn parse_stage_output(schema: StageSchema, text: &str) -> Result<StageOutput, GenerationError> {
    let parsed = match schema {
        StageSchema::Validation => {
            parse_lenient::<ValidationResult>(text).map(StageOutput::Validation)
        }
        StageSchema::MemoryExtraction => {
            parse_lenient::<MemoryExtractionResult>(text).map(StageOutput::MemoryExtraction)
        }
        StageSchema::ResponsePlan => {
            parse_lenient::<PlanDraft>(text).map(StageOutput::ResponsePlan)
        }
    };
    parsed.map_err(|detail| GenerationError::Malformed { schema, detail })
}

/// Direct parse first, then the outermost `{...}` span to get past code
/// fences and chatter around the object.
fn parse_lenient<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }

    let mut error = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            match serde_json::from_str::<T>(&trimmed[start..=end]) {
                Ok(value) => return Ok(value),
                Err(e) => error = e,
            }
        }
    }

    let preview: String = trimmed.chars().take(80).collect();
    Err(format!("{} (response began {:?})", error, preview))
}
