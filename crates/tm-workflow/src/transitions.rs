//! Finite-state transition table and validator for [`TaskStatus`].
//!
//! The allowed-transition table and self-validating constructor pattern
//! follow the `WorkflowSpec`/`Workflow::new` validation style in the
//! orchestrator workflow domain model (`orchestrator-core::domain::workflow`)
//! from the example pack, adapted to the fixed four-state task lifecycle
//! instead of a user-defined graph.

use serde::Serialize;
use tm_store::{ranking::has_unresolved_error_marker, Memory, Task, TaskStatus};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationContext {
    pub force_complete: bool,
    pub skip_validation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub valid: bool,
    pub blocking_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
}

/// Returns whether `to` is structurally reachable from `from`, ignoring
/// task-level blocking conditions (subtasks, context overrides).
pub fn allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Todo, InProgress) | (Todo, Blocked) | (Todo, Done)
            | (InProgress, Done) | (InProgress, Blocked) | (InProgress, Todo)
            | (Blocked, InProgress) | (Blocked, Todo) | (Blocked, Done)
            | (Done, InProgress) | (Done, Todo)
    )
}

/// Validates a proposed transition for `task`, returning blocking issues,
/// warnings, and suggestions rather than a single boolean. `linked_memories`
/// should be the memories connected to `task` (via `task.memory_connections`);
/// passing an empty slice simply skips the error-marker check below.
pub fn validate(task: &Task, to: TaskStatus, linked_memories: &[Memory], ctx: &ValidationContext) -> TransitionReport {
    let mut blocking_issues = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    if task.status == to {
        return TransitionReport {
            valid: true,
            blocking_issues,
            warnings: vec!["task is already in this status".to_string()],
            suggestions,
            confidence: 1.0,
        };
    }

    if !allowed(task.status, to) && !ctx.skip_validation {
        blocking_issues.push(format!("cannot transition from {:?} to {:?}", task.status, to));
    }

    if to == TaskStatus::Done && task.status == TaskStatus::Todo {
        warnings.push("marking done while skipping in_progress".to_string());
    }

    if to == TaskStatus::Done && !task.subtasks.is_empty() && !ctx.force_complete {
        blocking_issues.push(format!("{} subtask(s) are not yet done", task.subtasks.len()));
        suggestions.push("pass force_complete to finish anyway, or complete subtasks first".to_string());
    }

    if to == TaskStatus::Done && !ctx.skip_validation {
        let unresolved: Vec<&str> = linked_memories.iter().filter(|m| has_unresolved_error_marker(&m.content)).map(|m| m.id.as_str()).collect();
        if !unresolved.is_empty() {
            blocking_issues.push(format!("linked memories still carry unresolved error markers: {}", unresolved.join(", ")));
            suggestions.push("pass skip_validation to finish anyway, or resolve the referenced errors first".to_string());
        }
    }

    let confidence = if blocking_issues.is_empty() { 0.95 } else { 0.3 };

    TransitionReport { valid: blocking_issues.is_empty(), blocking_issues, warnings, suggestions, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use tm_store::{Category, Priority};

    fn sample_memory(content: &str) -> Memory {
        Memory {
            id: "m1".into(),
            content: content.into(),
            timestamp: Utc::now(),
            last_accessed: Utc::now(),
            access_count: 0,
            project: "default".into(),
            category: Category::default(),
            priority: Priority::default(),
            status: tm_store::MemoryStatus::Active,
            tags: vec![],
            related_memories: vec![],
            complexity: 1,
            metadata: tm_store::MemoryMetadata::default(),
            task_connections: vec![],
            extra: HashMap::new(),
        }
    }

    fn sample_task(status: TaskStatus, subtasks: Vec<String>) -> Task {
        Task {
            id: "t1".into(),
            serial: "TASK-0001".into(),
            title: "Sample".into(),
            description: "desc".into(),
            project: "default".into(),
            category: Category::default(),
            priority: Priority::default(),
            status,
            parent_task: None,
            subtasks,
            tags: vec![],
            memory_connections: vec![],
            created: Utc::now(),
            updated: Utc::now(),
            completed: None,
            status_history: vec![],
            extra: HashMap::new(),
        }
    }

    #[test]
    fn todo_to_in_progress_is_allowed() {
        assert!(allowed(TaskStatus::Todo, TaskStatus::InProgress));
    }

    #[test]
    fn done_to_blocked_is_not_allowed() {
        assert!(!allowed(TaskStatus::Done, TaskStatus::Blocked));
    }

    #[test]
    fn done_with_open_subtasks_blocks_without_force() {
        let task = sample_task(TaskStatus::InProgress, vec!["child-1".into()]);
        let report = validate(&task, TaskStatus::Done, &[], &ValidationContext::default());
        assert!(!report.valid);
        assert!(!report.blocking_issues.is_empty());
    }

    #[test]
    fn force_complete_overrides_subtask_block() {
        let task = sample_task(TaskStatus::InProgress, vec!["child-1".into()]);
        let ctx = ValidationContext { force_complete: true, skip_validation: false };
        let report = validate(&task, TaskStatus::Done, &[], &ctx);
        assert!(report.valid);
    }

    #[test]
    fn done_with_unresolved_error_marker_in_linked_memory_blocks() {
        let task = sample_task(TaskStatus::InProgress, vec![]);
        let memories = vec![sample_memory("saw a panic: connection refused")];
        let report = validate(&task, TaskStatus::Done, &memories, &ValidationContext::default());
        assert!(!report.valid);
        assert!(report.blocking_issues.iter().any(|i| i.contains("unresolved error markers")));
    }

    #[test]
    fn skip_validation_overrides_unresolved_error_marker_block() {
        let task = sample_task(TaskStatus::InProgress, vec![]);
        let memories = vec![sample_memory("saw a panic: connection refused")];
        let ctx = ValidationContext { force_complete: false, skip_validation: true };
        let report = validate(&task, TaskStatus::Done, &memories, &ctx);
        assert!(report.valid);
    }

    #[test]
    fn resolved_error_marker_in_linked_memory_does_not_block() {
        let task = sample_task(TaskStatus::InProgress, vec![]);
        let memories = vec![sample_memory("saw a panic earlier, now fixed")];
        let report = validate(&task, TaskStatus::Done, &memories, &ValidationContext::default());
        assert!(report.valid);
    }

    #[test]
    fn same_status_is_a_no_op() {
        let task = sample_task(TaskStatus::Done, vec![]);
        let report = validate(&task, TaskStatus::Done, &[], &ValidationContext::default());
        assert!(report.valid);
    }
}
