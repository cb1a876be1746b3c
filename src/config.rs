use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

use crate::agents::reflection::UpdateStrategy;
use crate::llm::anthropic;
use crate::store::StoreLocation;
use crate::types::LLMProvider;

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LLMConfig,
    pub store: StoreConfig,
    pub reflection: ReflectionConfig,
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub groq_api_key: String,
    pub openrouter_api_key: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl LLMConfig {
    /// API key for the configured provider, `None` when unset
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::Anthropic => &self.anthropic_api_key,
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::Groq => &self.groq_api_key,
            LLMProvider::OpenRouter => &self.openrouter_api_key,
        };
        if key.trim().is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File,
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(anyhow!("Unsupported store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    pub redis_url: String,
}

#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    pub strategy: UpdateStrategy,
    pub namespace: String,
    pub key: String,
}

impl ReflectionConfig {
    pub fn location(&self) -> StoreLocation {
        StoreLocation::new([self.namespace.clone()], self.key.clone())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider_id = env::var("LLM_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
        let provider = LLMProvider::from_id(&provider_id)
            .ok_or_else(|| anyhow!("Unsupported provider: {}", provider_id))?;

        Ok(Self {
            llm: LLMConfig {
                provider,
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| anthropic::models::DEFAULT.to_string()),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                base_url: env::var("LLM_BASE_URL").ok().filter(|s| !s.is_empty()),
                timeout_secs: env::var("LLM_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
                max_tokens: env::var("LLM_MAX_TOKENS")
                    .unwrap_or_else(|_| "2048".to_string())
                    .parse()?,
            },
            store: StoreConfig {
                backend: env::var("STORE_BACKEND")
                    .unwrap_or_else(|_| "memory".to_string())
                    .parse()?,
                path: env::var("STORE_PATH")
                    .unwrap_or_else(|_| "reflections.json".to_string())
                    .into(),
                redis_url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            reflection: ReflectionConfig {
                strategy: env::var("REFLECTION_STRATEGY")
                    .unwrap_or_else(|_| "regenerate".to_string())
                    .parse()?,
                namespace: env::var("REFLECTION_NAMESPACE")
                    .unwrap_or_else(|_| crate::store::REFLECTIONS_NAMESPACE.to_string()),
                key: env::var("REFLECTION_KEY")
                    .unwrap_or_else(|_| crate::store::REFLECTIONS_KEY.to_string()),
            },
        })
    }
}
