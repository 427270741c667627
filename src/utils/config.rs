//! Environment-based configuration with sensible local-first defaults.

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::research::workflow::WorkflowConfig;
use crate::types::{AppError, Result};

/// Top-level application configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// LLM provider settings per phase.
    pub llm: LLMConfig,
    /// Research workflow tunables.
    pub research: ResearchConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

/// LLM provider settings.
///
/// Each phase may use a different model; unset phase models fall back to
/// the default model.
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    /// Provider name: `ollama` (default) or `openai`.
    pub provider: String,
    /// Base URL of the Ollama server.
    pub ollama_url: String,
    /// OpenAI API key, when the `openai` provider is selected.
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible API base URL.
    pub openai_api_base: String,
    /// Default model for all phases.
    pub default_model: String,
    /// Model for the planning phase.
    pub planner_model: Option<String>,
    /// Model for the per-thread research phase.
    pub research_model: Option<String>,
    /// Model for the synthesis phase.
    pub synthesis_model: Option<String>,
}

impl LLMConfig {
    /// Model to use for planning.
    pub fn planner_model(&self) -> &str {
        self.planner_model.as_deref().unwrap_or(&self.default_model)
    }

    /// Model to use for research threads.
    pub fn research_model(&self) -> &str {
        self.research_model.as_deref().unwrap_or(&self.default_model)
    }

    /// Model to use for synthesis.
    pub fn synthesis_model(&self) -> &str {
        self.synthesis_model
            .as_deref()
            .unwrap_or(&self.default_model)
    }
}

/// Research workflow tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    /// Initial TTL on thread results, in seconds.
    pub result_ttl_secs: u64,
    /// TTL applied to results once synthesis has claimed them, in seconds.
    pub claimed_ttl_secs: u64,
    /// Interval between settle polls, in milliseconds.
    pub settle_poll_ms: u64,
    /// Maximum settle wait, in seconds.
    pub settle_max_wait_secs: u64,
    /// Per-thread findings character budget in the fallback digest.
    pub digest_budget: usize,
}

impl ResearchConfig {
    /// Convert into the workflow's tunables.
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            result_ttl: Duration::from_secs(self.result_ttl_secs),
            claimed_ttl: Duration::from_secs(self.claimed_ttl_secs),
            settle_poll_interval: Duration::from_millis(self.settle_poll_ms),
            settle_max_wait: Duration::from_secs(self.settle_max_wait_secs),
            digest_budget: self.digest_budget,
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parse_env("PORT", 3000)?,
            },
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
                ollama_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                openai_api_base: env::var("OPENAI_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                default_model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
                planner_model: env::var("PLANNER_MODEL").ok(),
                research_model: env::var("RESEARCH_MODEL").ok(),
                synthesis_model: env::var("SYNTHESIS_MODEL").ok(),
            },
            research: ResearchConfig {
                result_ttl_secs: parse_env("RESULT_TTL_SECS", 24 * 60 * 60)?,
                claimed_ttl_secs: parse_env("CLAIMED_TTL_SECS", 60 * 60)?,
                settle_poll_ms: parse_env("SETTLE_POLL_MS", 500)?,
                settle_max_wait_secs: parse_env("SETTLE_MAX_WAIT_SECS", 15 * 60)?,
                digest_budget: parse_env("DIGEST_BUDGET", 1500)?,
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Invalid value for {}: '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
