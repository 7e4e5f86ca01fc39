//! Uniform LLM call surface over OpenAI-compatible providers.
//!
//! Every supported vendor (OpenAI, OpenRouter, Groq, DeepSeek, xAI, Ollama)
//! speaks the chat-completions protocol, so one `async-openai` client with a
//! per-provider base URL covers all of them.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{ConfigError, ProviderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Groq,
    DeepSeek,
    Xai,
    Ollama,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "groq" => Ok(Self::Groq),
            "deepseek" => Ok(Self::DeepSeek),
            "xai" => Ok(Self::Xai),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::InvalidLlmSetting {
                name: "provider".to_string(),
                reason: format!(
                    "unknown provider '{other}' (expected openai|openrouter|groq|deepseek|xai|ollama)"
                ),
            }),
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Xai => "https://api.x.ai/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn env_key(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::DeepSeek => "DEEPSEEK_KEY",
            Self::Xai => "XAI_API_KEY",
            Self::Ollama => "OLLAMA_KEY",
        }
    }

    /// Ollama runs locally and needs no credential.
    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

/// Reasoning models leak `<think>...</think>` blocks into content; strip
/// them, including an unclosed trailing block cut off by the token limit.
pub fn strip_reasoning_tags(content: &str) -> String {
    let mut out = String::new();
    let mut rest = content;
    loop {
        match rest.find("<think>") {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("</think>") {
                    Some(end) => rest = &rest[start + end + "</think>".len()..],
                    None => break, // unclosed block, drop the tail
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        content.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_request(
    model: &str,
    system_prompt: &str,
    user_content: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<CreateChatCompletionRequest, OpenAIError> {
    CreateChatCompletionRequestArgs::default()
        .model(model)
        .temperature(temperature)
        .max_tokens(max_tokens)
        .messages([
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_content)
                    .build()?,
            ),
        ])
        .build()
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let kind = ProviderKind::parse(&config.provider)?;

        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => match std::env::var(kind.env_key()) {
                Ok(key) => key,
                Err(_) if !kind.requires_key() => String::new(),
                Err(_) => {
                    return Err(ConfigError::MissingCredential {
                        env_var: kind.env_key().to_string(),
                    })
                }
            },
        };

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        })
    }

    /// Single uniform call: system prompt + user content in, text out.
    /// Temperature and token cap are per call so each agent can pick its
    /// own (the config values are the usual defaults). An empty-but-valid
    /// completion is `Ok("")`; provider failures are always surfaced as
    /// `ProviderError`.
    pub async fn generate_response(
        &self,
        system_prompt: &str,
        user_content: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        debug!(model = %self.model, temperature, max_tokens, "sending chat completion request");

        let request = build_request(&self.model, system_prompt, user_content, temperature, max_tokens)
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(strip_reasoning_tags(&content))
    }
}

fn map_openai_error(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => ProviderError::Timeout(e.to_string()),
        OpenAIError::Reqwest(e) => ProviderError::Api(e.to_string()),
        OpenAIError::ApiError(api) => {
            let message = api.message.clone();
            let code = api.code.as_ref().map(|c| c.to_string()).unwrap_or_default();
            if code.contains("429") || message.contains("rate limit") || message.contains("429") {
                ProviderError::RateLimited(message)
            } else if code.contains("401")
                || message.contains("invalid api key")
                || message.contains("authentication")
            {
                ProviderError::AuthFailed(message)
            } else {
                ProviderError::Api(message)
            }
        }
        OpenAIError::JSONDeserialize(e) => ProviderError::Malformed(e.to_string()),
        other => ProviderError::Api(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ProviderKind::parse("groq").unwrap(), ProviderKind::Groq);
        assert_eq!(ProviderKind::parse("OpenAI").unwrap(), ProviderKind::OpenAi);
        assert!(ProviderKind::parse("anthropic-direct").is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(!ProviderKind::Ollama.requires_key());
        assert!(ProviderKind::Groq.requires_key());
    }

    #[test]
    fn test_build_request_carries_per_call_settings() {
        let request = build_request("gpt-4o", "be terse", "rank these", 0.2, 512).unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn test_build_request_settings_vary_between_calls() {
        // Two callers of the same client can pick different settings.
        let cold = build_request("m", "s", "u", 0.0, 256).unwrap();
        let warm = build_request("m", "s", "u", 1.0, 2048).unwrap();
        assert_eq!(cold.temperature, Some(0.0));
        assert_eq!(warm.temperature, Some(1.0));
        assert_ne!(cold.max_tokens, warm.max_tokens);
    }

    #[test]
    fn test_strip_reasoning_tags_complete_block() {
        let raw = "<think>internal chain</think>BUY with high conviction";
        assert_eq!(strip_reasoning_tags(raw), "BUY with high conviction");
    }

    #[test]
    fn test_strip_reasoning_tags_unclosed_block() {
        let raw = "Final answer: SELL <think>got cut off by token limi";
        assert_eq!(strip_reasoning_tags(raw), "Final answer: SELL");
    }

    #[test]
    fn test_strip_reasoning_tags_plain_text() {
        assert_eq!(strip_reasoning_tags("NOTHING"), "NOTHING");
    }

    #[test]
    fn test_strip_reasoning_tags_all_thinking_keeps_original() {
        // If filtering would delete everything, keep the raw content.
        let raw = "<think>only thoughts</think>";
        assert_eq!(strip_reasoning_tags(raw), raw);
    }
}
