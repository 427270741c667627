//! Mock implementations for testing.
//!
//! Provides a scriptable research backend so workflow and API tests can
//! exercise the full plan/execute/synthesize pipeline without a live LLM.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use noesis::research::backend::{BackendContext, ResearchBackend};
use noesis::research::plan::{PlanResponse, PlanStrategy, ResearchPlan};
use noesis::types::{AppError, Result};

/// How the mock answers a `plan` call.
#[derive(Clone)]
pub enum PlanBehavior {
    /// Return a structured plan.
    Structured(ResearchPlan),
    /// Return raw prose, forcing the fallback plan parser.
    Raw(String),
    /// Fail the planning call outright.
    Fail(String),
}

/// How the mock answers a `research` call for one sub-query.
#[derive(Clone)]
pub enum ResearchBehavior {
    /// Return the given findings.
    Findings(String),
    /// Fail the research call.
    Fail(String),
    /// Sleep past any reasonable test deadline, simulating a thread that
    /// never writes a result.
    Hang,
}

/// How the mock answers a `synthesize` call.
#[derive(Clone)]
pub enum SynthesizeBehavior {
    /// Return the given answer.
    Answer(String),
    /// Fail with the parsing-class error (fallback-digest eligible).
    ParseFail(String),
    /// Fail with a fatal transport-class error.
    Fail(String),
}

/// Scriptable [`ResearchBackend`] for integration tests.
///
/// # Examples
///
/// ```rust,ignore
/// let backend = MockResearchBackend::new()
///     .with_plan(PlanBehavior::Structured(standard_plan(&["a", "b"])))
///     .on_research("a", ResearchBehavior::Findings("found https://a.example".into()))
///     .on_research("b", ResearchBehavior::Hang)
///     .with_synthesis(SynthesizeBehavior::Answer("the answer".into()));
/// ```
pub struct MockResearchBackend {
    plan: PlanBehavior,
    research: HashMap<String, ResearchBehavior>,
    synthesize: SynthesizeBehavior,
}

impl MockResearchBackend {
    /// A backend that returns a one-thread structured plan and answers
    /// everything successfully.
    pub fn new() -> Self {
        Self {
            plan: PlanBehavior::Structured(standard_plan(&["default sub-query"])),
            research: HashMap::new(),
            synthesize: SynthesizeBehavior::Answer("Synthesized answer.".to_string()),
        }
    }

    /// Script the planning behavior.
    pub fn with_plan(mut self, plan: PlanBehavior) -> Self {
        self.plan = plan;
        self
    }

    /// Script the research behavior for one exact sub-query.
    pub fn on_research(mut self, sub_query: &str, behavior: ResearchBehavior) -> Self {
        self.research.insert(sub_query.to_string(), behavior);
        self
    }

    /// Script the synthesis behavior.
    pub fn with_synthesis(mut self, behavior: SynthesizeBehavior) -> Self {
        self.synthesize = behavior;
        self
    }

    /// Wrap into the trait object the workflow consumes.
    pub fn into_arc(self) -> Arc<dyn ResearchBackend> {
        Arc::new(self)
    }
}

impl Default for MockResearchBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchBackend for MockResearchBackend {
    async fn plan(&self, query: &str, _ctx: &BackendContext) -> Result<PlanResponse> {
        match &self.plan {
            PlanBehavior::Structured(plan) => {
                let mut plan = plan.clone();
                plan.query = query.to_string();
                Ok(PlanResponse::Structured(plan))
            }
            PlanBehavior::Raw(text) => Ok(PlanResponse::Raw(text.clone())),
            PlanBehavior::Fail(message) => Err(AppError::LLM(message.clone())),
        }
    }

    async fn research(&self, sub_query: &str) -> Result<String> {
        match self.research.get(sub_query) {
            Some(ResearchBehavior::Findings(findings)) => Ok(findings.clone()),
            Some(ResearchBehavior::Fail(message)) => Err(AppError::LLM(message.clone())),
            Some(ResearchBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(format!(
                "Findings for '{}'. Source: https://example.com/{}",
                sub_query,
                sub_query.len()
            )),
        }
    }

    async fn synthesize(&self, _input: &str) -> Result<String> {
        match &self.synthesize {
            SynthesizeBehavior::Answer(answer) => Ok(answer.clone()),
            SynthesizeBehavior::ParseFail(message) => Err(AppError::ResponseParse(message.clone())),
            SynthesizeBehavior::Fail(message) => Err(AppError::LLM(message.clone())),
        }
    }
}

/// A structured standard-strategy plan over the given sub-queries.
pub fn standard_plan(sub_queries: &[&str]) -> ResearchPlan {
    ResearchPlan {
        query: String::new(),
        strategy: PlanStrategy::Standard,
        sub_queries: sub_queries.iter().map(|s| s.to_string()).collect(),
        synthesis_instructions: "Combine the findings into one answer.".to_string(),
        estimated_duration_secs: 90,
    }
    .normalized()
}
