use crate::{
    AppState,
    research::{backend::BackendContext, threads::ThreadResult},
    store::results::thread_result_key,
    types::{
        AppError, ResearchStatusResponse, Result, StartResearchRequest, StartResearchResponse,
        ThreadStatusResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Start a research execution for a query.
///
/// The workflow runs in the background; poll `GET /api/research/{id}` for
/// progress and the final answer.
#[utoipa::path(
    post,
    path = "/api/research",
    request_body = StartResearchRequest,
    responses(
        (status = 202, description = "Research accepted", body = StartResearchResponse),
        (status = 400, description = "Invalid input")
    ),
    tag = "research"
)]
pub async fn start_research(
    State(state): State<AppState>,
    Json(payload): Json<StartResearchRequest>,
) -> Result<(StatusCode, Json<StartResearchResponse>)> {
    let query = payload.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::InvalidInput(
            "Query must not be empty".to_string(),
        ));
    }
    if payload.user_id.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "user_id must not be empty".to_string(),
        ));
    }

    let execution = state.executions.create(&payload.user_id, None).await?;
    let ctx = BackendContext::for_user(&payload.user_id);
    state.workflow.start(execution.id.clone(), query, ctx);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartResearchResponse {
            execution_id: execution.id,
            state: execution.state.to_string(),
        }),
    ))
}

/// Get the status of a research execution.
#[utoipa::path(
    get,
    path = "/api/research/{id}",
    params(("id" = String, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution status", body = ResearchStatusResponse),
        (status = 404, description = "Execution not found")
    ),
    tag = "research"
)]
pub async fn get_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResearchStatusResponse>> {
    let execution = state.executions.get(&id).await?;
    let meta = &execution.metadata;

    let count = |key: &str| meta.get(key).and_then(|v| v.as_u64()).map(|n| n as usize);

    Ok(Json(ResearchStatusResponse {
        id: execution.id.clone(),
        state: execution.state.to_string(),
        answer: execution.output.clone(),
        partial_result: meta
            .get("partial_result")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        thread_count: execution.thread_count(),
        completed_threads: count("completed_threads"),
        failed_threads: count("failed_threads"),
        missing_threads: count("missing_threads"),
        total_sources: count("total_sources"),
        sources: meta.get("sources").cloned(),
        failure_reason: execution.metadata_str("failure_reason").map(String::from),
        created_at: execution.created_at.timestamp(),
        completed_at: execution.completed_at.map(|t| t.timestamp()),
    }))
}

/// Inspect the per-thread results of a research execution.
///
/// This is a non-consuming peek: reading here never shortens the TTL of a
/// thread result, so inspection cannot race synthesis.
#[utoipa::path(
    get,
    path = "/api/research/{id}/threads",
    params(("id" = String, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Per-thread status", body = [ThreadStatusResponse]),
        (status = 404, description = "Execution not found")
    ),
    tag = "research"
)]
pub async fn get_research_threads(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ThreadStatusResponse>>> {
    let execution = state.executions.get(&id).await?;

    let sub_queries: Vec<String> = execution
        .metadata
        .get("plan")
        .and_then(|plan| plan.get("sub_queries"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let mut threads = Vec::with_capacity(sub_queries.len());
    for (index, sub_query) in sub_queries.iter().enumerate() {
        let key = thread_result_key(&id, index);
        let result = match state.results.get(&key).await {
            Some(raw) => serde_json::from_str::<ThreadResult>(&raw).ok(),
            None => None,
        };

        threads.push(match result {
            Some(result) => ThreadStatusResponse {
                thread_index: index,
                sub_query: sub_query.clone(),
                present: true,
                error: result.error,
                source_count: result.source_count,
            },
            None => ThreadStatusResponse {
                thread_index: index,
                sub_query: sub_query.clone(),
                present: false,
                error: false,
                source_count: 0,
            },
        });
    }

    Ok(Json(threads))
}

/// Cancel a running research execution.
///
/// Cancellation is cooperative: in-flight threads notice the terminal state
/// at their next checkpoint and stop. Already-terminal executions return 409.
#[utoipa::path(
    post,
    path = "/api/research/{id}/cancel",
    params(("id" = String, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution cancelled", body = StartResearchResponse),
        (status = 404, description = "Execution not found"),
        (status = 409, description = "Execution already terminal")
    ),
    tag = "research"
)]
pub async fn cancel_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StartResearchResponse>> {
    let state_after = state.executions.mark_cancelled(&id).await?;

    Ok(Json(StartResearchResponse {
        execution_id: id,
        state: state_after.to_string(),
    }))
}
