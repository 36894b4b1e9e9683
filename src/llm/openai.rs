use super::{LlmProvider, TokenCounter, estimate_tokens};
use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::Configuration("OPENAI_API_KEY not set".into()))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

impl TokenCounter for OpenAiClient {
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let start = std::time::Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ::log::warn!("LLM request failed: {}", e);
                PipelineError::TransientNetwork(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            ::log::warn!("LLM API returned {}: {}", status, body);
            return Err(if status.as_u16() == 429 {
                PipelineError::RateLimit(body)
            } else if status.is_server_error() {
                PipelineError::TransientNetwork(format!("{}: {}", status, body))
            } else {
                PipelineError::Api(format!("{}: {}", status, body))
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::MalformedResponse("no choices in reply".into()))?;

        ::log::debug!(
            "LLM completion from {} in {} ms ({} chars)",
            self.model,
            start.elapsed().as_millis(),
            content.len()
        );
        Ok(content)
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}
