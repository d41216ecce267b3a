//! Auto-linker: scores a task against candidate memories and maintains the
//! bidirectional `(task, memory)` connection on both sides.
//!
//! The write ordering — task first, then each memory, with rollback of the
//! task write on partial failure — removes stale backlinks before
//! installing new ones, so the two sides of a relation never diverge even
//! though they live in two independent on-disk stores.

pub mod scoring;

use tm_core::{Classify, ErrorKind};
use tm_store::{ConnectionType, MemoryConnection, MemoryStore, StoreError, Task, TaskConnection};

pub use scoring::{relevance, DEFAULT_THRESHOLD, DEFAULT_TOP_K};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for LinkError {
    fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Store(e) => e.kind(),
        }
    }
}

/// Scores every memory in the task's project (falling back to all projects
/// if none are found) and links everything at or above `threshold`, capped
/// at `top_k`. Existing manual connections are preserved untouched.
pub async fn auto_link(
    memory_store: &MemoryStore,
    task_store: &tm_store::TaskStore,
    task_id: &str,
    threshold: f64,
    top_k: usize,
) -> Result<Task, LinkError> {
    let task = task_store.get(task_id).await?;

    let mut candidates = memory_store.list(Some(&task.project), None).await?;
    if candidates.is_empty() {
        candidates = memory_store.list(None, None).await?;
    }

    let mut scored: Vec<(f64, Vec<String>, tm_store::Memory)> = candidates
        .into_iter()
        .map(|memory| {
            let (score, matched) = relevance(&task, &memory);
            (score, matched, memory)
        })
        .filter(|(score, _, _)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.2.timestamp.cmp(&a.2.timestamp))
    });
    scored.truncate(top_k);

    let manual: Vec<MemoryConnection> =
        task.memory_connections.iter().filter(|c| c.connection_type == ConnectionType::Manual).cloned().collect();
    let manual_ids: std::collections::HashSet<&str> = manual.iter().map(|c| c.memory_id.as_str()).collect();

    let mut new_auto = Vec::new();
    for (score, matched, memory) in &scored {
        if manual_ids.contains(memory.id.as_str()) {
            continue;
        }
        new_auto.push((
            MemoryConnection {
                memory_id: memory.id.clone(),
                memory_serial: None,
                connection_type: ConnectionType::Auto,
                relevance: *score,
                matched_terms: matched.clone(),
            },
            memory.id.clone(),
        ));
    }

    let previous_task = task.clone();
    let updated_task = task_store
        .update(task_id, |t| {
            let mut connections = manual.clone();
            connections.extend(new_auto.iter().map(|(c, _)| c.clone()));
            t.memory_connections = connections;
        })
        .await?;

    let mut applied = Vec::new();
    for (_, memory_id) in &new_auto {
        let result = memory_store
            .update(memory_id, |m| {
                m.task_connections.retain(|c| c.task_id != updated_task.id);
                m.task_connections.push(TaskConnection {
                    task_id: updated_task.id.clone(),
                    task_serial: updated_task.serial.clone(),
                    connection_type: ConnectionType::Auto,
                });
            })
            .await;

        match result {
            Ok(_) => applied.push(memory_id.clone()),
            Err(err) => {
                tracing::warn!(memory_id = %memory_id, error = %err, "rolling back auto-link after partial failure");
                for rollback_id in &applied {
                    let _ = memory_store
                        .update(rollback_id, |m| m.task_connections.retain(|c| c.task_id != updated_task.id))
                        .await;
                }
                task_store
                    .update(task_id, |t| t.memory_connections = previous_task.memory_connections.clone())
                    .await?;
                return Err(LinkError::Store(err));
            }
        }
    }

    Ok(updated_task)
}

/// Manual link: bypasses scoring, tagged `manual`, survives future
/// `auto_link` runs.
pub async fn link_manual(
    memory_store: &MemoryStore,
    task_store: &tm_store::TaskStore,
    task_id: &str,
    memory_id: &str,
) -> Result<Task, LinkError> {
    memory_store.get(memory_id).await?;
    let updated_task = task_store
        .update(task_id, |t| {
            t.memory_connections.retain(|c| c.memory_id != memory_id);
            t.memory_connections.push(MemoryConnection {
                memory_id: memory_id.to_string(),
                memory_serial: None,
                connection_type: ConnectionType::Manual,
                relevance: 1.0,
                matched_terms: vec![],
            });
        })
        .await?;

    memory_store
        .update(memory_id, |m| {
            m.task_connections.retain(|c| c.task_id != updated_task.id);
            m.task_connections.push(TaskConnection {
                task_id: updated_task.id.clone(),
                task_serial: updated_task.serial.clone(),
                connection_type: ConnectionType::Manual,
            });
        })
        .await?;

    Ok(updated_task)
}

/// Removes every connection referencing `task_id` from the memory side.
/// Called when a task is deleted (orphan cleanup).
pub async fn unlink_task(memory_store: &MemoryStore, task: &Task) -> Result<(), LinkError> {
    for connection in &task.memory_connections {
        let _ = memory_store.update(&connection.memory_id, |m| m.task_connections.retain(|c| c.task_id != task.id)).await;
    }
    Ok(())
}

/// Removes every connection referencing `memory_id` from the task side.
/// Called when a memory is deleted (orphan cleanup).
pub async fn unlink_memory(
    task_store: &tm_store::TaskStore,
    memory_id: &str,
    referencing_task_ids: &[String],
) -> Result<(), LinkError> {
    for task_id in referencing_task_ids {
        let _ = task_store.update(task_id, |t| t.memory_connections.retain(|c| c.memory_id != memory_id)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_store::{NewMemory, NewTask, TaskStore};

    async fn stores() -> (tempfile::TempDir, MemoryStore, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::new(dir.path().to_path_buf());
        let tasks = TaskStore::new(dir.path().to_path_buf());
        (dir, memories, tasks)
    }

    #[tokio::test]
    async fn auto_link_creates_bidirectional_connection() {
        let (_dir, memories, tasks) = stores().await;
        let memory = memories
            .add(NewMemory {
                content: "Use exponential backoff on 429 rate limit errors".into(),
                project: Some("api".into()),
                tags: vec!["rate-limit".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        let task = tasks
            .create(NewTask {
                title: "Handle rate limiting in client".into(),
                project: Some("api".into()),
                tags: vec!["rate-limit".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let updated = auto_link(&memories, &tasks, &task.id, DEFAULT_THRESHOLD, DEFAULT_TOP_K).await.unwrap();
        assert_eq!(updated.memory_connections.len(), 1);
        assert_eq!(updated.memory_connections[0].memory_id, memory.id);

        let reloaded_memory = memories.get(&memory.id).await.unwrap();
        assert_eq!(reloaded_memory.task_connections.len(), 1);
        assert_eq!(reloaded_memory.task_connections[0].task_id, task.id);
    }

    #[tokio::test]
    async fn manual_link_survives_auto_link_rerun() {
        let (_dir, memories, tasks) = stores().await;
        let memory = memories
            .add(NewMemory { content: "Totally unrelated grandmother lasagna notes".into(), ..Default::default() })
            .await
            .unwrap();
        let task = tasks.create(NewTask { title: "Ship feature".into(), ..Default::default() }).await.unwrap();

        link_manual(&memories, &tasks, &task.id, &memory.id).await.unwrap();
        let reran = auto_link(&memories, &tasks, &task.id, DEFAULT_THRESHOLD, DEFAULT_TOP_K).await.unwrap();

        assert!(reran.memory_connections.iter().any(|c| c.memory_id == memory.id && c.connection_type == ConnectionType::Manual));
    }

    #[tokio::test]
    async fn unlink_task_removes_memory_side_reference() {
        let (_dir, memories, tasks) = stores().await;
        let memory = memories
            .add(NewMemory { content: "Use exponential backoff on 429 rate limit errors".into(), project: Some("api".into()), ..Default::default() })
            .await
            .unwrap();
        let task = tasks.create(NewTask { title: "Handle rate limiting".into(), project: Some("api".into()), ..Default::default() }).await.unwrap();
        let updated = auto_link(&memories, &tasks, &task.id, DEFAULT_THRESHOLD, DEFAULT_TOP_K).await.unwrap();

        unlink_task(&memories, &updated).await.unwrap();
        let reloaded_memory = memories.get(&memory.id).await.unwrap();
        assert!(reloaded_memory.task_connections.is_empty());
    }
}
