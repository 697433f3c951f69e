//! Model registry for managing available LLM providers

use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Preferred default, matching the model the chatbot was first built around
const PREFERRED_DEFAULT: &str = "llama-3.3-70b-groq";

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    /// Proxy base URL that fronts every provider (e.g., `http://localhost:9000`)
    pub gateway: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: non_empty_env("ANTHROPIC_API_KEY"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            groq_api_key: non_empty_env("GROQ_API_KEY"),
            gateway: non_empty_env("LLM_GATEWAY"),
            default_model: non_empty_env("DEFAULT_MODEL"),
        }
    }

    fn api_key_for(&self, provider: Provider) -> Option<&String> {
        match provider {
            Provider::Anthropic => self.anthropic_api_key.as_ref(),
            Provider::OpenAI => self.openai_api_key.as_ref(),
            Provider::Groq => self.groq_api_key.as_ref(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Model information with metadata
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Create an empty registry for testing purposes
    #[allow(dead_code)] // Used in tests
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: "test-model".to_string(),
        }
    }

    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        for model_def in all_models() {
            match Self::try_create_model(model_def, config) {
                Some(Ok(service)) => {
                    services.insert(model_def.id.to_string(), service);
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        model = model_def.id,
                        error = %e,
                        "Failed to create model service"
                    );
                }
                None => {}
            }
        }

        let default_model = config
            .default_model
            .clone()
            .filter(|id| {
                let known = services.contains_key(id);
                if !known {
                    tracing::warn!(model = %id, "DEFAULT_MODEL is not available, ignoring");
                }
                known
            })
            .or_else(|| {
                if services.contains_key(PREFERRED_DEFAULT) {
                    Some(PREFERRED_DEFAULT.to_string())
                } else {
                    // First available in definition order
                    all_models()
                        .iter()
                        .find(|m| services.contains_key(m.id))
                        .map(|m| m.id.to_string())
                }
            })
            .unwrap_or_else(|| PREFERRED_DEFAULT.to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Try to create a model service; `None` when its provider is not configured
    fn try_create_model(
        model_def: &ModelDef,
        config: &LlmConfig,
    ) -> Option<Result<Arc<dyn LlmService>, String>> {
        // The gateway handles authentication itself
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            config.api_key_for(model_def.provider)?.clone()
        };

        Some(
            (model_def.factory)(&api_key, config.gateway.as_deref())
                .map(|service| Arc::new(LoggingService::new(service)) as Arc<dyn LlmService>),
        )
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Get detailed information about available models
    pub fn available_model_info(&self) -> Vec<ModelInfo> {
        all_models()
            .iter()
            .filter(|m| self.services.contains_key(m.id))
            .map(|m| ModelInfo {
                id: m.id.to_string(),
                provider: m.provider.display_name().to_string(),
                description: m.description.to_string(),
                context_window: m.context_window,
            })
            .collect()
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}
