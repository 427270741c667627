//! LLM client abstraction and provider selection.
//!
//! The research workflow consumes language models through the small
//! [`LLMClient`] trait; each phase (planning, research, synthesis) may hold
//! a client for a different model. Concrete providers are gated behind
//! Cargo features and selected at runtime via [`Provider`].

use crate::types::Result;
use async_trait::async_trait;

/// Generic LLM client trait for provider abstraction.
///
/// All LLM providers implement this trait, allowing for easy swapping
/// between providers without changing application code.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with a system prompt.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name/identifier.
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection.
#[derive(Debug, Clone)]
pub enum Provider {
    /// Ollama local LLM provider.
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    #[cfg(feature = "ollama")]
    Ollama {
        /// Base URL of the Ollama server.
        base_url: String,
        /// Model name to request.
        model: String,
    },

    /// OpenAI API provider (including Azure OpenAI and compatible APIs).
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    #[cfg(feature = "openai")]
    OpenAI {
        /// API key.
        api_key: String,
        /// API base URL.
        api_base: String,
        /// Model name to request.
        model: String,
    },
}

impl Provider {
    /// Create a client instance for this provider.
    ///
    /// # Errors
    ///
    /// Returns an error if connection to the provider fails or the
    /// configuration is invalid.
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone()).await?,
            )),

            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Box::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            // With no provider feature the enum is uninhabited and no value
            // of it can ever be constructed.
            #[cfg(not(any(feature = "ollama", feature = "openai")))]
            _ => unreachable!("Provider has no variants without a provider feature"),
        }
    }

    /// Get a human-readable name for this provider.
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "ollama")]
            Provider::Ollama { .. } => "Ollama",
            #[cfg(feature = "openai")]
            Provider::OpenAI { .. } => "OpenAI",
            #[cfg(not(any(feature = "ollama", feature = "openai")))]
            _ => unreachable!("Provider has no variants without a provider feature"),
        }
    }

    /// The model this provider is configured for.
    pub fn model(&self) -> &str {
        match self {
            #[cfg(feature = "ollama")]
            Provider::Ollama { model, .. } => model,
            #[cfg(feature = "openai")]
            Provider::OpenAI { model, .. } => model,
            #[cfg(not(any(feature = "ollama", feature = "openai")))]
            _ => unreachable!("Provider has no variants without a provider feature"),
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "ollama")]
    #[test]
    fn test_provider_name_and_model() {
        use super::Provider;

        let ollama = Provider::Ollama {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        };
        assert_eq!(ollama.name(), "Ollama");
        assert_eq!(ollama.model(), "llama3.2");
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_openai_provider_name() {
        use super::Provider;

        let openai = Provider::OpenAI {
            api_key: "test".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(openai.name(), "OpenAI");
        assert_eq!(openai.model(), "gpt-4o-mini");
    }

    // Builds without any provider feature leave Provider uninhabited; its
    // methods must still compile in that configuration.
    #[cfg(not(any(feature = "ollama", feature = "openai")))]
    #[test]
    fn test_provider_is_uninhabited_without_provider_features() {
        assert_eq!(std::mem::size_of::<super::Provider>(), 0);
    }
}
