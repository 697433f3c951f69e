//! Centralized model definitions for all LLM providers

use super::anthropic::AnthropicModel;
use super::openai::OpenAIModel;
use super::{AnthropicService, LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
    Groq,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::OpenAI => "OpenAI",
            Provider::Groq => "Groq",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }
}

/// Factory that builds a service from an API key and optional gateway URL
pub type ServiceFactory = fn(&str, Option<&str>) -> Result<Arc<dyn LlmService>, String>;

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "llama-3.3-70b-groq")
    pub id: &'static str,
    pub provider: Provider,
    /// Human-readable description
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
    pub factory: ServiceFactory,
}

fn openai_factory(
    model: OpenAIModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires an API key or gateway", model.model_id()));
    }
    OpenAIService::new(api_key.to_string(), model, gateway)
        .map(|s| Arc::new(s) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

fn anthropic_factory(
    model: AnthropicModel,
    api_key: &str,
    gateway: Option<&str>,
) -> Result<Arc<dyn LlmService>, String> {
    if api_key.is_empty() {
        return Err(format!("{} requires ANTHROPIC_API_KEY or gateway", model.model_id()));
    }
    AnthropicService::new(api_key.to_string(), model, gateway)
        .map(|s| Arc::new(s) as Arc<dyn LlmService>)
        .map_err(|e| e.message)
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        // Groq models
        ModelDef {
            id: "llama-3.3-70b-groq",
            provider: Provider::Groq,
            description: "Llama 3.3 70B Versatile on Groq (fast, general purpose)",
            context_window: 131_072,
            factory: |api_key, gateway| {
                openai_factory(OpenAIModel::Llama33VersatileGroq, api_key, gateway)
            },
        },
        ModelDef {
            id: "llama-3.1-8b-groq",
            provider: Provider::Groq,
            description: "Llama 3.1 8B Instant on Groq (fastest, lightweight)",
            context_window: 131_072,
            factory: |api_key, gateway| {
                openai_factory(OpenAIModel::Llama31InstantGroq, api_key, gateway)
            },
        },
        // OpenAI models
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            description: "GPT-4o (capable, multimodal)",
            context_window: 128_000,
            factory: |api_key, gateway| openai_factory(OpenAIModel::GPT4o, api_key, gateway),
        },
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            description: "GPT-4o Mini (fast, inexpensive)",
            context_window: 128_000,
            factory: |api_key, gateway| openai_factory(OpenAIModel::GPT4oMini, api_key, gateway),
        },
        // Anthropic models
        ModelDef {
            id: "claude-4.5-sonnet",
            provider: Provider::Anthropic,
            description: "Claude Sonnet 4.5 (balanced quality and speed)",
            context_window: 200_000,
            factory: |api_key, gateway| {
                anthropic_factory(AnthropicModel::Claude45Sonnet, api_key, gateway)
            },
        },
        ModelDef {
            id: "claude-4.5-haiku",
            provider: Provider::Anthropic,
            description: "Claude Haiku 4.5 (fast, inexpensive)",
            context_window: 200_000,
            factory: |api_key, gateway| {
                anthropic_factory(AnthropicModel::Claude45Haiku, api_key, gateway)
            },
        },
    ]
}
