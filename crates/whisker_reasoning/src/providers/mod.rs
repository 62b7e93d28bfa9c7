pub mod anthropic;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use mock::MockProvider;
pub use openai::OpenAiClient;

use crate::llm::LlmClient;
use anyhow::Result;
use std::sync::Arc;
use whisker_core::config::LlmConfig;

/// Build the client named by `config.provider`.
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base_url = config.base_url.as_deref();
    let client: Arc<dyn LlmClient> = match config.provider.to_lowercase().as_str() {
        "anthropic" => Arc::new(AnthropicClient::new(&config.model, base_url)?),
        "openai" => Arc::new(OpenAiClient::new(&config.model, base_url)?),
        "mock" => Arc::new(MockProvider::new(&config.model)),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    };
    tracing::info!("LLM provider: {} ({})", config.provider, config.model);
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn test_mock_provider_needs_no_key() {
        assert!(from_config(&LlmConfig::default()).is_ok());
    }
}
