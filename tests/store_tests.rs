//! Execution store integration tests: CRUD, the persisted state machine,
//! and metadata merge semantics.

use noesis::research::execution::ExecutionState;
use noesis::store::executions::ExecutionStore;
use noesis::types::AppError;
use serde_json::json;

async fn memory_store() -> ExecutionStore {
    ExecutionStore::new_memory()
        .await
        .expect("in-memory store should open")
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let store = memory_store().await;

    let created = store.create("user-1", None).await.unwrap();
    assert_eq!(created.state, ExecutionState::Pending);
    assert!(created.parent_id.is_none());
    assert!(created.output.is_none());
    assert!(created.completed_at.is_none());

    let loaded = store.get(&created.id).await.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.user_id, "user-1");
    assert_eq!(loaded.state, ExecutionState::Pending);
    assert_eq!(loaded.metadata, json!({}));
}

#[tokio::test]
async fn test_get_unknown_execution_is_not_found() {
    let store = memory_store().await;
    let err = store.get("no-such-id").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_create_with_missing_parent_is_rejected() {
    let store = memory_store().await;
    let err = store.create("user-1", Some("ghost")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_find_by_parent_lists_children_in_order() {
    let store = memory_store().await;
    let parent = store.create("user-1", None).await.unwrap();
    let a = store.create("user-1", Some(&parent.id)).await.unwrap();
    let b = store.create("user-1", Some(&parent.id)).await.unwrap();

    let children = store.find_by_parent(&parent.id).await.unwrap();
    assert_eq!(children.len(), 2);
    let ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
    assert!(ids.contains(&a.id.as_str()));
    assert!(ids.contains(&b.id.as_str()));
}

#[tokio::test]
async fn test_transition_walks_the_full_chain() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    for target in [
        ExecutionState::Planning,
        ExecutionState::Planned,
        ExecutionState::Executing,
        ExecutionState::Synthesizing,
        ExecutionState::Completed,
    ] {
        let state = store.transition(&execution.id, target).await.unwrap();
        assert_eq!(state, target);
    }

    let final_state = store.get(&execution.id).await.unwrap();
    assert_eq!(final_state.state, ExecutionState::Completed);
    assert!(final_state.completed_at.is_some());
}

#[tokio::test]
async fn test_transition_rejects_phase_skips() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    let err = store
        .transition(&execution.id, ExecutionState::Executing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    // The failed attempt must not have moved the record.
    let unchanged = store.get(&execution.id).await.unwrap();
    assert_eq!(unchanged.state, ExecutionState::Pending);
}

#[tokio::test]
async fn test_same_state_transition_is_a_noop_success() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();
    store
        .transition(&execution.id, ExecutionState::Planning)
        .await
        .unwrap();

    let state = store
        .transition(&execution.id, ExecutionState::Planning)
        .await
        .unwrap();
    assert_eq!(state, ExecutionState::Planning);
}

#[tokio::test]
async fn test_mark_failed_records_reason_and_timestamp() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();
    store
        .transition(&execution.id, ExecutionState::Planning)
        .await
        .unwrap();

    store
        .mark_failed(&execution.id, "backend exploded")
        .await
        .unwrap();

    let failed = store.get(&execution.id).await.unwrap();
    assert_eq!(failed.state, ExecutionState::Failed);
    assert_eq!(failed.metadata_str("failure_reason"), Some("backend exploded"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn test_cancel_terminal_execution_is_rejected() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();
    store.mark_failed(&execution.id, "boom").await.unwrap();

    let err = store.mark_cancelled(&execution.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_cancel_pending_execution() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    let state = store.mark_cancelled(&execution.id).await.unwrap();
    assert_eq!(state, ExecutionState::Cancelled);
    assert!(store.get(&execution.id).await.unwrap().completed_at.is_some());
}

#[tokio::test]
async fn test_merge_metadata_merges_keys() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    store
        .merge_metadata(&execution.id, &json!({ "a": 1 }))
        .await
        .unwrap();
    store
        .merge_metadata(&execution.id, &json!({ "b": "two" }))
        .await
        .unwrap();

    let loaded = store.get(&execution.id).await.unwrap();
    assert_eq!(loaded.metadata["a"], 1);
    assert_eq!(loaded.metadata["b"], "two");
}

#[tokio::test]
async fn test_merge_metadata_rejects_non_object_patch() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    let err = store
        .merge_metadata(&execution.id, &json!([1, 2, 3]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_thread_count_is_immutable_once_set() {
    let store = memory_store().await;
    let execution = store.create("user-1", None).await.unwrap();

    store
        .merge_metadata(&execution.id, &json!({ "thread_count": 3 }))
        .await
        .unwrap();

    // Re-asserting the same value is fine.
    store
        .merge_metadata(&execution.id, &json!({ "thread_count": 3 }))
        .await
        .unwrap();

    let err = store
        .merge_metadata(&execution.id, &json!({ "thread_count": 5 }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let loaded = store.get(&execution.id).await.unwrap();
    assert_eq!(loaded.thread_count(), Some(3));
}

#[tokio::test]
async fn test_complete_with_output_for_tracking_children() {
    let store = memory_store().await;
    let parent = store.create("user-1", None).await.unwrap();
    let child = store.create("user-1", Some(&parent.id)).await.unwrap();

    store
        .complete_with_output(&child.id, "raw backend output")
        .await
        .unwrap();

    let done = store.get(&child.id).await.unwrap();
    assert_eq!(done.state, ExecutionState::Completed);
    assert_eq!(done.output.as_deref(), Some("raw backend output"));

    // A second completion attempt hits the terminal guard.
    let err = store
        .complete_with_output(&child.id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

async fn synthesizing_execution(store: &ExecutionStore) -> String {
    let execution = store.create("user-1", None).await.unwrap();
    for target in [
        ExecutionState::Planning,
        ExecutionState::Planned,
        ExecutionState::Executing,
        ExecutionState::Synthesizing,
    ] {
        store.transition(&execution.id, target).await.unwrap();
    }
    execution.id
}

#[tokio::test]
async fn test_commit_synthesis_persists_answer_and_completes() {
    let store = memory_store().await;
    let id = synthesizing_execution(&store).await;

    let committed = store
        .commit_synthesis(&id, "the answer", &json!({ "total_sources": 2 }))
        .await
        .unwrap();
    assert!(committed);

    let done = store.get(&id).await.unwrap();
    assert_eq!(done.state, ExecutionState::Completed);
    assert_eq!(done.output.as_deref(), Some("the answer"));
    assert_eq!(done.metadata["total_sources"], 2);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_commit_synthesis_after_cancel_writes_nothing() {
    let store = memory_store().await;
    let id = synthesizing_execution(&store).await;
    store.mark_cancelled(&id).await.unwrap();

    let committed = store
        .commit_synthesis(&id, "late answer", &json!({ "total_sources": 2 }))
        .await
        .unwrap();
    assert!(!committed);

    // The cancelled record carries no answer and no synthesis metadata.
    let cancelled = store.get(&id).await.unwrap();
    assert_eq!(cancelled.state, ExecutionState::Cancelled);
    assert!(cancelled.output.is_none());
    assert!(cancelled.metadata.get("total_sources").is_none());
}

#[tokio::test]
async fn test_commit_synthesis_on_unknown_execution() {
    let store = memory_store().await;
    let err = store
        .commit_synthesis("ghost", "answer", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[cfg(feature = "local-db")]
#[tokio::test]
async fn test_local_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("executions.db");
    let path = path.to_str().unwrap();

    let id = {
        let store = ExecutionStore::new_local(path).await.unwrap();
        let execution = store.create("user-1", None).await.unwrap();
        store
            .merge_metadata(&execution.id, &json!({ "thread_count": 2 }))
            .await
            .unwrap();
        execution.id
    };

    let reopened = ExecutionStore::new_local(path).await.unwrap();
    let loaded = reopened.get(&id).await.unwrap();
    assert_eq!(loaded.state, ExecutionState::Pending);
    assert_eq!(loaded.thread_count(), Some(2));
}
