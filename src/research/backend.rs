//! External backend contracts for the research workflow.
//!
//! The coordinator consumes the planning, research, and synthesis backends
//! through [`ResearchBackend`], so any natural-language backend can be
//! plugged in. Caller identity travels in an explicit [`BackendContext`]
//! rather than ambient state.

use async_trait::async_trait;
use std::sync::Arc;

use crate::llm::LLMClient;
use crate::research::plan::{PlanResponse, ResearchPlan};
use crate::types::{AppError, Result};

/// Explicit per-call context passed through every backend invocation.
#[derive(Debug, Clone, Default)]
pub struct BackendContext {
    /// Identifier of the user on whose behalf the workflow runs.
    pub user_id: String,
    /// Names of capabilities available to the planner (search tools,
    /// knowledge bases), advertised in the planning prompt.
    pub capabilities: Vec<String>,
}

impl BackendContext {
    /// Context for a user with no advertised capabilities.
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            capabilities: Vec::new(),
        }
    }
}

/// The three external calls the workflow coordinator depends on.
///
/// `plan` resolves the backend's shape ambiguity into [`PlanResponse`] at
/// this boundary. `synthesize` distinguishes parsing-class errors
/// ([`AppError::ResponseParse`], fallback-eligible) from transport errors
/// ([`AppError::LLM`], fatal).
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Ask the planning backend to decompose a query.
    async fn plan(&self, query: &str, ctx: &BackendContext) -> Result<PlanResponse>;

    /// Research one sub-query, returning findings text.
    async fn research(&self, sub_query: &str) -> Result<String>;

    /// Synthesize a final answer from the assembled findings input.
    async fn synthesize(&self, input: &str) -> Result<String>;
}

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a research planning agent. Decompose the user's query into independent sub-queries that can be researched in parallel.

Respond with JSON only:
{
    "strategy": "simple" | "standard" | "complex",
    "sub_queries": ["...", "..."],
    "synthesis_instructions": "...",
    "estimated_duration_secs": 90
}

Use "simple" with exactly one sub-query for narrow questions, "standard" for 2-3 angles, "complex" for broad multi-part topics."#;

/// LLM-backed implementation of [`ResearchBackend`].
///
/// The three phases may use different models; each holds its own client.
pub struct LlmResearchBackend {
    planner: Arc<dyn LLMClient>,
    researcher: Arc<dyn LLMClient>,
    synthesizer: Arc<dyn LLMClient>,
}

impl LlmResearchBackend {
    /// Create a backend over three (possibly shared) LLM clients.
    pub fn new(
        planner: Arc<dyn LLMClient>,
        researcher: Arc<dyn LLMClient>,
        synthesizer: Arc<dyn LLMClient>,
    ) -> Self {
        Self {
            planner,
            researcher,
            synthesizer,
        }
    }

    /// Create a backend that uses one client for all three phases.
    pub fn with_single_client(client: Arc<dyn LLMClient>) -> Self {
        Self {
            planner: client.clone(),
            researcher: client.clone(),
            synthesizer: client,
        }
    }
}

#[async_trait]
impl ResearchBackend for LlmResearchBackend {
    async fn plan(&self, query: &str, ctx: &BackendContext) -> Result<PlanResponse> {
        let prompt = if ctx.capabilities.is_empty() {
            query.to_string()
        } else {
            format!(
                "{}\n\nAvailable capabilities: {}",
                query,
                ctx.capabilities.join(", ")
            )
        };

        let response = self
            .planner
            .generate_with_system(PLANNER_SYSTEM_PROMPT, &prompt)
            .await?;

        match parse_plan_json(&response, query) {
            Some(plan) => Ok(PlanResponse::Structured(plan)),
            None => {
                tracing::warn!(
                    model = self.planner.model_name(),
                    "Planner response was not structured; deferring to fallback parser"
                );
                Ok(PlanResponse::Raw(response))
            }
        }
    }

    async fn research(&self, sub_query: &str) -> Result<String> {
        let prompt = format!(
            "Research the following question thoroughly. Include concrete findings and cite \
             sources as URLs or markdown links where you know them.\n\nQuestion: {}",
            sub_query
        );
        self.researcher.generate(&prompt).await
    }

    async fn synthesize(&self, input: &str) -> Result<String> {
        let answer = self.synthesizer.generate(input).await?;
        if answer.trim().is_empty() {
            // Empty output is a parsing-class failure: the fallback digest
            // can still produce a usable answer.
            return Err(AppError::ResponseParse(
                "Synthesis backend returned an empty response".to_string(),
            ));
        }
        Ok(answer)
    }
}

/// Try to coerce a planner response into a structured plan.
///
/// Accepts bare JSON or JSON inside a fenced code block. Returns `None`
/// when the response cannot be used, which routes it to the fallback parser.
fn parse_plan_json(response: &str, query: &str) -> Option<ResearchPlan> {
    let body = strip_code_fence(response);

    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let obj = value.as_object()?;

    let strategy = match obj.get("strategy").and_then(|s| s.as_str())? {
        "simple" => crate::research::plan::PlanStrategy::Simple,
        "standard" => crate::research::plan::PlanStrategy::Standard,
        "complex" => crate::research::plan::PlanStrategy::Complex,
        _ => return None,
    };

    let sub_queries: Vec<String> = obj
        .get("sub_queries")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    let synthesis_instructions = obj
        .get("synthesis_instructions")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let estimated_duration_secs = obj
        .get("estimated_duration_secs")
        .and_then(|v| v.as_u64())
        .unwrap_or_else(|| strategy.duration_estimate());

    Some(
        ResearchPlan {
            query: query.to_string(),
            strategy,
            sub_queries,
            synthesis_instructions,
            estimated_duration_secs,
        }
        .normalized(),
    )
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
