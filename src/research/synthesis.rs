//! Synthesis engine: fan-in, final answer generation, and fallback digest.
//!
//! Reads every expected thread result (tolerating absent ones), invokes the
//! synthesis backend, extracts and merges citations, and persists the final
//! answer. A parsing-class backend failure degrades to a deterministic
//! digest assembled from raw findings; the execution still completes, since
//! a degraded answer is preferred over no answer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::research::backend::ResearchBackend;
use crate::research::execution::ExecutionState;
use crate::research::plan::ResearchPlan;
use crate::research::sources::{extract_source_links, SourceLink, SourceOrigin};
use crate::research::threads::ThreadResult;
use crate::store::executions::ExecutionStore;
use crate::store::results::{thread_result_key, ResultStore};
use crate::types::{AppError, Result};

/// Summary of one completed synthesis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// The final answer persisted to the execution.
    pub answer: String,
    /// Threads that completed successfully.
    pub completed_threads: usize,
    /// Threads that ran and reported a failure.
    pub failed_threads: usize,
    /// Threads that never wrote a result before the deadline.
    pub missing_threads: usize,
    /// Unique citation count across findings and the answer.
    pub total_sources: usize,
    /// Set whenever one or more threads never produced a result.
    pub partial_result: bool,
    /// The answer came from the deterministic fallback digest.
    pub fallback_synthesis: bool,
}

/// Fan-in reader and final-answer generator.
pub struct SynthesisEngine {
    executions: Arc<ExecutionStore>,
    results: Arc<dyn ResultStore>,
    backend: Arc<dyn ResearchBackend>,
    /// TTL applied to claimed results; shortened rather than deleted so a
    /// late inspection can still see them.
    keep_ttl: Duration,
    /// Per-thread findings character budget in the fallback digest.
    digest_budget: usize,
}

impl SynthesisEngine {
    /// Create an engine over shared store and backend handles.
    pub fn new(
        executions: Arc<ExecutionStore>,
        results: Arc<dyn ResultStore>,
        backend: Arc<dyn ResearchBackend>,
        keep_ttl: Duration,
        digest_budget: usize,
    ) -> Self {
        Self {
            executions,
            results,
            backend,
            keep_ttl,
            digest_budget,
        }
    }

    /// Run the synthesis phase for an execution.
    ///
    /// Returns `Ok(None)` when the execution is already terminal, or when
    /// it turns terminal before the answer commit (late thread writes stay
    /// in the store but are ignored). Only
    /// non-parsing-class backend failures propagate; they mark the
    /// execution `failed` first.
    pub async fn synthesize(&self, execution_id: &str) -> Result<Option<SynthesisReport>> {
        let execution = self.executions.get(execution_id).await?;
        if execution.state.is_terminal() {
            tracing::info!(
                execution_id,
                state = %execution.state,
                "Execution already terminal; skipping synthesis"
            );
            return Ok(None);
        }

        let plan: ResearchPlan = execution
            .metadata
            .get("plan")
            .cloned()
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Execution '{}' has no plan in metadata",
                    execution_id
                ))
            })
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| AppError::Internal(format!("Corrupt plan in metadata: {}", e)))
            })?;

        // If every thread skipped (or none was ever scheduled) the execution
        // may still sit in `planned`; walk it forward before synthesizing.
        if execution.state == ExecutionState::Planned {
            self.executions
                .transition(execution_id, ExecutionState::Executing)
                .await?;
        }
        self.executions
            .transition(execution_id, ExecutionState::Synthesizing)
            .await?;

        let thread_count = execution.thread_count().unwrap_or(plan.thread_count());
        let started = Instant::now();

        let mut thread_results = Vec::with_capacity(thread_count);
        let mut sources: Vec<SourceLink> = Vec::new();

        for index in 0..thread_count {
            let sub_query = plan
                .sub_queries
                .get(index)
                .map(|s| s.as_str())
                .unwrap_or(plan.query.as_str());

            let key = thread_result_key(execution_id, index);
            let result = match self.results.get(&key).await {
                Some(raw) => {
                    // Keep the record around for late inspection.
                    self.results.expire(&key, self.keep_ttl).await?;
                    match serde_json::from_str::<ThreadResult>(&raw) {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::warn!(execution_id, thread_index = index, error = %e, "Corrupt thread result record");
                            ThreadResult::failed(index, sub_query, "corrupt result record")
                        }
                    }
                }
                None => ThreadResult::missing(index, sub_query),
            };

            if result.is_usable() {
                sources.extend(extract_source_links(
                    &result.findings,
                    SourceOrigin::Thread { index },
                    Some(sub_query),
                ));
            }
            thread_results.push(result);
        }

        let completed_threads = thread_results.iter().filter(|r| r.is_usable()).count();
        let failed_threads = thread_results.iter().filter(|r| r.error).count();
        let missing_threads = thread_results.iter().filter(|r| r.missing).count();

        let input = build_synthesis_input(&plan, &thread_results);

        let (answer, fallback_synthesis) = match self.backend.synthesize(&input).await {
            Ok(answer) => (answer, false),
            Err(AppError::ResponseParse(msg)) => {
                tracing::warn!(
                    execution_id,
                    error = %msg,
                    "Synthesis backend output unusable; building fallback digest"
                );
                (
                    fallback_digest(&plan, &thread_results, self.digest_budget),
                    true,
                )
            }
            Err(e) => {
                self.executions
                    .mark_failed(execution_id, &e.to_string())
                    .await?;
                return Err(e);
            }
        };

        // Merge citations from the answer, deduplicating by URL with first
        // occurrence (the thread origin) winning.
        let mut seen: std::collections::HashSet<String> =
            sources.iter().map(|s| s.url.clone()).collect();
        for link in extract_source_links(&answer, SourceOrigin::FinalAnswer, None) {
            if seen.insert(link.url.clone()) {
                sources.push(link);
            }
        }

        let mut patch = serde_json::json!({
            "total_sources": sources.len(),
            "completed_threads": completed_threads,
            "failed_threads": failed_threads,
            "missing_threads": missing_threads,
            "partial_result": missing_threads > 0,
            "sources": serde_json::to_value(&sources)
                .map_err(|e| AppError::Internal(format!("Serialize sources: {}", e)))?,
            "synthesis_ms": started.elapsed().as_millis() as u64,
        });
        if fallback_synthesis {
            patch["fallback_synthesis"] = serde_json::Value::Bool(true);
        }

        // One compare-and-swap write: answer, metadata, and the move to
        // `completed` land together, or not at all when a cancel got in
        // between settling and here.
        let committed = self
            .executions
            .commit_synthesis(execution_id, &answer, &patch)
            .await?;
        if !committed {
            tracing::info!(
                execution_id,
                "Execution left synthesizing before commit; discarding answer"
            );
            return Ok(None);
        }

        tracing::info!(
            execution_id,
            completed_threads,
            failed_threads,
            missing_threads,
            total_sources = sources.len(),
            fallback_synthesis,
            "Synthesis complete"
        );

        Ok(Some(SynthesisReport {
            answer,
            completed_threads,
            failed_threads,
            missing_threads,
            total_sources: sources.len(),
            partial_result: missing_threads > 0,
            fallback_synthesis,
        }))
    }
}

/// Assemble the synthesis backend's input from the plan's instructions and
/// every thread's findings, placeholders included.
fn build_synthesis_input(plan: &ResearchPlan, results: &[ThreadResult]) -> String {
    let mut input = String::new();
    input.push_str(&plan.synthesis_instructions);
    input.push_str("\n\nOriginal query: ");
    input.push_str(&plan.query);
    input.push('\n');

    for result in results {
        input.push_str(&format!(
            "\n## Thread {}: {}\n",
            result.thread_index, result.sub_query
        ));
        if result.missing {
            input.push_str("[no result was produced before the deadline]\n");
        } else {
            input.push_str(&result.findings);
            input.push('\n');
        }
    }

    input
}

/// Deterministic textual digest built directly from raw thread findings.
///
/// One section per usable thread (sub-query heading, truncated findings,
/// source count), a summary paragraph, and an explicit note naming how many
/// threads failed to complete.
fn fallback_digest(plan: &ResearchPlan, results: &[ThreadResult], budget: usize) -> String {
    let mut digest = format!("# Research summary: {}\n", plan.query);

    let usable: Vec<&ThreadResult> = results.iter().filter(|r| r.is_usable()).collect();
    for result in &usable {
        digest.push_str(&format!("\n## {}\n\n", result.sub_query));
        digest.push_str(truncate_chars(&result.findings, budget));
        if result.findings.chars().count() > budget {
            digest.push_str("…");
        }
        digest.push_str(&format!("\n\nSources found: {}\n", result.source_count));
    }

    digest.push_str(&format!(
        "\nThis summary was assembled directly from {} completed research thread(s) because \
         automatic synthesis was unavailable.\n",
        usable.len()
    ));

    let unsettled = results.len() - usable.len();
    if unsettled > 0 {
        digest.push_str(&format!(
            "\nNote: {} of {} research threads did not complete.\n",
            unsettled,
            results.len()
        ));
    }

    digest
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
