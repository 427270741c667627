//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for interacting with Large
//! Language Model providers. Provider-specific implementations sit behind
//! the [`LLMClient`] trait, so the research workflow can hold a different
//! model per phase without caring which provider serves it.
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Example
//!
//! ```ignore
//! use noesis::llm::Provider;
//!
//! let provider = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "llama3.2".to_string(),
//! };
//! let client = provider.create_client().await?;
//! let response = client.generate("What is 2+2?").await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, Provider};
