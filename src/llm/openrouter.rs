// OpenRouter speaks the OpenAI Chat Completions protocol

use crate::llm::openai::OpenAIAdapter;
use crate::llm::provider::LLMAdapter;
use crate::types::{AppResult, LLMRequest, LLMResponse};
use async_trait::async_trait;
use reqwest::Client;

pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterAdapter {
    inner: OpenAIAdapter,
}

impl OpenRouterAdapter {
    pub fn new(api_key: &str) -> Self {
        Self::with_client(Client::new(), api_key, None)
    }

    pub fn with_client(client: Client, api_key: &str, api_base: Option<&str>) -> Self {
        Self {
            inner: OpenAIAdapter::with_client(
                client,
                api_key,
                api_base.unwrap_or(OPENROUTER_API_BASE),
            ),
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenRouterAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.inner.create_chat_completion(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_override() {
        let adapter = OpenRouterAdapter::with_client(Client::new(), "key", Some("http://127.0.0.1:9000/v1"));
        assert_eq!(adapter.inner.api_base(), "http://127.0.0.1:9000/v1");
        assert_eq!(OpenRouterAdapter::new("key").inner.api_base(), OPENROUTER_API_BASE);
    }
}
