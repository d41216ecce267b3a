//! Task status state machine: transition validation, NL intent parsing,
//! and status analytics, layered on top of [`tm_store::TaskStore`].

pub mod analytics;
pub mod nlp;
pub mod transitions;

use tm_core::{Classify, ErrorKind};
use tm_store::{Memory, MemoryStore, StoreError, Task, TaskStatus, TaskStore};

pub use analytics::{analyze, Analytics};
pub use nlp::{parse_intent, IntentMatch};
pub use transitions::{allowed, validate, TransitionReport, ValidationContext};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no recognizable status intent in text")]
    NoIntent,
    #[error("transition blocked: {0:?}")]
    Blocked(Vec<String>),
}

impl Classify for WorkflowError {
    fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Store(e) => e.kind(),
            WorkflowError::NoIntent => ErrorKind::InvalidInput,
            WorkflowError::Blocked(_) => ErrorKind::Conflict,
        }
    }
}

/// Fetches the memories connected to `task`, skipping any connection whose
/// target has since been deleted.
pub async fn linked_memories(memory_store: &MemoryStore, task: &Task) -> Vec<Memory> {
    let mut memories = Vec::with_capacity(task.memory_connections.len());
    for conn in &task.memory_connections {
        if let Ok(memory) = memory_store.get(&conn.memory_id).await {
            memories.push(memory);
        }
    }
    memories
}

/// Validates, then applies, a direct status transition.
pub async fn apply_transition(
    task_store: &TaskStore,
    memory_store: &MemoryStore,
    task_id: &str,
    to: TaskStatus,
    reason: Option<String>,
    ctx: &ValidationContext,
) -> Result<Task, WorkflowError> {
    let task = task_store.get(task_id).await?;
    let memories = linked_memories(memory_store, &task).await;
    let report = validate(&task, to, &memories, ctx);
    if !report.valid {
        return Err(WorkflowError::Blocked(report.blocking_issues));
    }
    Ok(task_store.set_status(task_id, to, reason).await?)
}

/// Minimum confidence at which a detected intent triggers a transition on
/// its own; below this it is still reported to the caller but the task is
/// left unchanged.
pub const MIN_APPLY_CONFIDENCE: f64 = 0.4;

/// Parses a natural-language update (e.g. "just finished the migration") and
/// applies the inferred status transition if one is found and confident
/// enough. A low-confidence match is still returned alongside the
/// unmodified task so the caller can surface it without acting on it.
pub async fn smart_status_update(
    task_store: &TaskStore,
    memory_store: &MemoryStore,
    task_id: &str,
    text: &str,
    ctx: &ValidationContext,
) -> Result<(Task, IntentMatch), WorkflowError> {
    let intent = parse_intent(text).ok_or(WorkflowError::NoIntent)?;
    if intent.confidence < MIN_APPLY_CONFIDENCE {
        let task = task_store.get(task_id).await?;
        return Ok((task, intent));
    }
    let task = apply_transition(task_store, memory_store, task_id, intent.status, Some(text.to_string()), ctx).await?;
    Ok((task, intent))
}
