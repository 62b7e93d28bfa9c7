use crate::api_types::{Message, MessagesRequest, MessagesResponse};
use crate::llm::{CompletionParams, LlmClient};
use crate::retry::{with_retry, RetryPolicy};
use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    /// Reads `ANTHROPIC_API_KEY`; the base URL falls back to
    /// `ANTHROPIC_BASE_URL` and then the public endpoint.
    pub fn new(model: &str, base_url: Option<&str>) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY is not set")?;
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("ANTHROPIC_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryPolicy::default(),
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<MessagesResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let request_body = MessagesRequest {
            model: self.model.clone(),
            system: (!system.is_empty()).then(|| system.to_string()),
            messages,
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
        };

        tracing::debug!(
            "LLM params: max_tokens={}, temperature={:.2}",
            params.max_tokens,
            params.temperature
        );

        let client = &self.client;
        let api_key = &self.api_key;
        let response = with_retry(&self.retry, "Anthropic", || async {
            client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request_body)
                .send()
                .await
                .context("Failed to send request to Anthropic")
        })
        .await?;

        let resp_text = response.text().await?;
        tracing::debug!(
            "Anthropic raw response (first 500 chars): {}",
            resp_text.chars().take(500).collect::<String>()
        );
        serde_json::from_str(&resp_text).context("Failed to parse Anthropic response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::ContentBlock;

    #[test]
    fn test_parse_messages_response() {
        let raw = r#"{"id":"msg_1","type":"message","role":"assistant",
            "content":[{"type":"text","text":"{\"ok\":true}"}],
            "stop_reason":"end_turn","usage":{"input_tokens":3,"output_tokens":4}}"#;
        let resp: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
        let ContentBlock::Text { text } = &resp.content[0];
        assert_eq!(text, "{\"ok\":true}");
    }

    #[test]
    fn test_request_omits_empty_system() {
        let req = MessagesRequest {
            model: "m".to_string(),
            system: None,
            messages: vec![Message::user("hi")],
            max_tokens: 10,
            temperature: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
    }
}
