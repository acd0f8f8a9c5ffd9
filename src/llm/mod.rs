//! Language model providers
//!
//! The orchestrator only sees the [`LlmProvider`] trait. [`GroqProvider`]
//! talks to Groq's OpenAI-compatible chat completions endpoint over blocking
//! HTTP; [`EchoProvider`] is a deterministic stand-in for offline smoke
//! runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::session::ChatMessage;

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("provider response missing text content")]
    MissingContent,
}

/// Request envelope shared by providers: a system instruction, a window of
/// role-tagged history, and the current user message.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub user: String,
}

/// Trait implemented by concrete LLM providers
pub trait LlmProvider: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// Build the provider named by the configuration.
pub fn provider_from_config(
    config: &LlmConfig,
) -> Result<std::sync::Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "groq" => Ok(std::sync::Arc::new(GroqProvider::from_config(config)?)),
        "echo" => Ok(std::sync::Arc::new(EchoProvider)),
        other => Err(LlmError::Config(format!(
            "unsupported LLM provider: {}",
            other
        ))),
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn wire_messages(request: &GenerationRequest) -> Vec<WireMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(WireMessage {
        role: "system",
        content: &request.system,
    });
    for msg in &request.history {
        messages.push(WireMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        });
    }
    messages.push(WireMessage {
        role: "user",
        content: &request.user,
    });
    messages
}

/// Groq chat completions provider
pub struct GroqProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GroqProvider {
    pub fn new(api_key: String, model: String, temperature: f32) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
            temperature,
        })
    }

    /// Resolve the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LlmError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        if api_key.trim().is_empty() {
            return Err(LlmError::Config(format!(
                "environment variable {} is empty",
                config.api_key_env
            )));
        }
        Self::new(api_key, config.model.clone(), config.temperature)
    }
}

impl LlmProvider for GroqProvider {
    fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: wire_messages(request),
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(GROQ_API_URL)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(LlmError::Api { status, body });
        }

        let parsed: ChatCompletionResponse = response.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::MissingContent)?;

        if content.trim().is_empty() {
            return Err(LlmError::MissingContent);
        }
        Ok(content)
    }
}

/// Deterministic provider that returns the user message unchanged
///
/// Reformulation becomes the identity and answering echoes the standalone
/// query, which is enough to exercise the pipeline without network access.
pub struct EchoProvider;

impl LlmProvider for EchoProvider {
    fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        Ok(request.user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_wire_messages_order_and_roles() {
        let request = GenerationRequest {
            system: "be helpful".to_string(),
            history: vec![
                ChatMessage::user("first question"),
                ChatMessage::assistant("first answer"),
            ],
            user: "follow-up".to_string(),
        };

        let messages = wire_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be helpful");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
        assert_eq!(messages[3].content, "follow-up");
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_echo_provider() {
        let request = GenerationRequest {
            system: String::new(),
            history: Vec::new(),
            user: "what is the answer?".to_string(),
        };
        assert_eq!(
            EchoProvider.generate(&request).unwrap(),
            "what is the answer?"
        );
    }

    #[test]
    fn test_chat_completion_request_serializes() {
        let request = GenerationRequest {
            system: "sys".to_string(),
            history: Vec::new(),
            user: "hi".to_string(),
        };
        let body = ChatCompletionRequest {
            model: "llama-3.3-70b-versatile",
            messages: wire_messages(&request),
            temperature: 0.1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_chat_completion_response_parses() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"an answer"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("an answer")
        );
    }
}
