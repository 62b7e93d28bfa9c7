use crate::api_types::{Message, MessagesResponse, Role};
use crate::llm::{CompletionParams, LlmClient};
use crate::retry::{with_retry, RetryPolicy};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(model: &str, base_url: Option<&str>) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryPolicy::default(),
        })
    }
}

/// OpenAI puts the system prompt in the message list.
fn to_openai_messages(system: &str, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(json!({"role": "system", "content": system}));
    }
    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        out.push(json!({"role": role, "content": msg.text()}));
    }
    out
}

fn parse_chat_completion(resp: &Value) -> Result<MessagesResponse> {
    let choice = resp["choices"]
        .get(0)
        .context("OpenAI response has no choices")?;
    let text = choice["message"]["content"].as_str().unwrap_or_default();
    let mut parsed = MessagesResponse::text(text);
    parsed.stop_reason = choice["finish_reason"].as_str().map(str::to_string);
    Ok(parsed)
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    #[tracing::instrument(skip(self, system, messages, params), fields(model = %self.model))]
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<MessagesResponse> {
        let payload = json!({
            "model": self.model,
            "messages": to_openai_messages(system, &messages),
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });
        let url = format!("{}/chat/completions", self.base_url);

        let client = &self.client;
        let api_key = &self.api_key;
        let response = with_retry(&self.retry, "OpenAI", || async {
            client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&payload)
                .send()
                .await
                .context("Failed to send request to OpenAI")
        })
        .await?;

        let resp_json: Value = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        parse_chat_completion(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_becomes_first_message() {
        let msgs = to_openai_messages("be a cat", &[Message::user("hello")]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(msgs[1]["content"], "hello");
    }

    #[test]
    fn test_parse_chat_completion() {
        let raw = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"status\":\"VALID\"}"},
                "finish_reason": "stop"
            }]
        });
        let resp = parse_chat_completion(&raw).unwrap();
        assert_eq!(resp.joined_text(), "{\"status\":\"VALID\"}");
        assert_eq!(resp.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_chat_completion_without_choices() {
        assert!(parse_chat_completion(&json!({"choices": []})).is_err());
    }
}
