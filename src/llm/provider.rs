use async_trait::async_trait;
use std::time::Duration;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for building an LLM handle
#[derive(Debug, Clone)]
pub struct LLMProviderConfig {
    pub provider: LLMProvider,
    pub api_key: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LLMProviderConfig {
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let api_key = config.active_api_key().ok_or_else(|| {
            AppError::Config(format!("No API key configured for provider {}", config.provider))
        })?;
        Ok(Self {
            provider: config.provider,
            api_key,
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

/// HTTP client shared by the adapters; every request is bounded by `timeout`
pub(crate) fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(config: LLMProviderConfig) -> AppResult<Self> {
        let client = http_client(config.timeout)?;
        let base_url = config.base_url.as_deref();
        let adapter: Box<dyn LLMAdapter> = match config.provider {
            LLMProvider::Anthropic => Box::new(crate::llm::anthropic::AnthropicAdapter::with_client(
                client,
                &config.api_key,
                base_url,
            )),
            LLMProvider::OpenAI => Box::new(crate::llm::openai::OpenAIAdapter::with_client(
                client,
                &config.api_key,
                base_url.unwrap_or(crate::llm::openai::OPENAI_API_BASE),
            )),
            LLMProvider::Groq => Box::new(crate::llm::groq::GroqAdapter::with_client(
                client,
                &config.api_key,
                base_url,
            )),
            LLMProvider::OpenRouter => Box::new(crate::llm::openrouter::OpenRouterAdapter::with_client(
                client,
                &config.api_key,
                base_url,
            )),
        };

        Ok(Self {
            adapter,
            provider_name: config.provider.to_string(),
        })
    }

    /// Wrap an existing adapter (custom providers, scripted test doubles)
    pub fn from_adapter(name: impl Into<String>, adapter: Box<dyn LLMAdapter>) -> Self {
        Self {
            adapter,
            provider_name: name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}
