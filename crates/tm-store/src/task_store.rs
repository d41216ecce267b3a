//! Record Store instance for tasks.
//!
//! Shares the atomic-write/path-guard machinery in [`crate::raw::RawStore`]
//! with the memory store, but additionally manages the
//! `active`/`completed`/`blocked` shard move on status transitions and the
//! `parent_task`/`subtasks` inverse relation.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;

use tm_core::ids::{new_id, new_serial};
use tm_core::path_guard::sanitize_project;

use crate::error::StoreError;
use crate::lock::LockRegistry;
use crate::raw::RawStore;
use crate::types::{Category, Priority, Task, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub project: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub parent_task: Option<String>,
}

pub struct TaskStore {
    raw: RawStore,
    locks: LockRegistry,
}

impl TaskStore {
    pub fn new(store_root: PathBuf) -> Self {
        Self { raw: RawStore::new(store_root.join("tasks")), locks: LockRegistry::new() }
    }

    pub fn root(&self) -> PathBuf {
        self.raw.root().to_path_buf()
    }

    pub async fn create(&self, input: NewTask) -> Result<Task, StoreError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("title must not be empty".into()));
        }
        let project = sanitize_project(input.project.as_deref().unwrap_or("default"));

        if let Some(parent_id) = &input.parent_task {
            self.locate(parent_id).await?;
        }

        let now = Utc::now();
        let task = Task {
            id: new_id(),
            serial: self.unique_serial().await,
            title,
            description: input.description,
            project: project.clone(),
            category: input.category.unwrap_or_default(),
            priority: input.priority.unwrap_or_default(),
            status: TaskStatus::Todo,
            parent_task: input.parent_task.clone(),
            subtasks: Vec::new(),
            tags: input.tags,
            memory_connections: Vec::new(),
            created: now,
            updated: now,
            completed: None,
            status_history: Vec::new(),
            extra: Default::default(),
        };

        let relative = relative_path(&project, TaskStatus::Todo, &task.id);
        self.write_task(&relative, &task).await?;

        if let Some(parent_id) = &input.parent_task {
            self.update(parent_id, |parent| parent.subtasks.push(task.id.clone())).await?;
        }

        Ok(task)
    }

    pub async fn get(&self, id: &str) -> Result<Task, StoreError> {
        let (_, task) = self.locate(id).await?;
        Ok(task)
    }

    pub async fn list(
        &self,
        project: Option<&str>,
        status: Option<TaskStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Task>, StoreError> {
        let prefix = match (project, status) {
            (Some(p), Some(s)) => format!("{}/{}", sanitize_project(p), s.as_shard()),
            (Some(p), None) => sanitize_project(p),
            (None, _) => String::new(),
        };
        let files = self.raw.list_markdown(&prefix).await?;
        let mut tasks = Vec::new();
        for relative in files {
            if let Some(task) = self.read_task(&relative).await {
                if status.map(|s| task.status == s).unwrap_or(true) {
                    tasks.push(task);
                }
            }
        }
        tasks.sort_by(|a, b| b.updated.cmp(&a.updated));
        if let Some(limit) = limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    pub async fn update(&self, id: &str, mutate: impl FnOnce(&mut Task)) -> Result<Task, StoreError> {
        let (relative, mut task) = self.locate(id).await?;
        let _guard = self.locks.lock_file(&relative).await;
        mutate(&mut task);
        task.updated = Utc::now();
        let rendered = render(&task);
        self.raw.write(&relative, &rendered, None).await?;
        Ok(task)
    }

    /// Moves the task between status shards, recording a bounded transition
    /// history entry. Does not validate the transition itself — that is the
    /// workflow engine's job before it calls this.
    pub async fn set_status(
        &self,
        id: &str,
        new_status: TaskStatus,
        reason: Option<String>,
    ) -> Result<Task, StoreError> {
        let (relative, mut task) = self.locate(id).await?;
        let old_status = task.status;
        if old_status == new_status {
            return Ok(task);
        }

        task.push_history(old_status, new_status, reason);
        task.status = new_status;
        task.updated = Utc::now();
        task.completed = if new_status == TaskStatus::Done { Some(task.updated) } else { None };

        let new_relative = relative_path(&task.project, new_status, &task.id);
        let rendered = render(&task);

        let _old_guard = self.locks.lock_file(&relative).await;
        let _new_guard = self.locks.lock_file(&new_relative).await;
        self.raw.write(&new_relative, &rendered, None).await?;
        if new_relative != relative {
            self.raw.delete(&relative).await?;
        }
        Ok(task)
    }

    /// Deletes a task and its whole subtask subtree, returning every deleted
    /// id so callers (e.g. the auto-linker) can clean up inbound references.
    pub async fn delete(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let (relative, task) = self.locate(id).await?;
        let mut deleted = vec![task.id.clone()];

        for child_id in task.subtasks.clone() {
            if let Ok(mut grandchildren) = Box::pin(self.delete(&child_id)).await {
                deleted.append(&mut grandchildren);
            }
        }

        if let Some(parent_id) = &task.parent_task {
            let _ = self.update(parent_id, |parent| parent.subtasks.retain(|s| s != id)).await;
        }

        let _guard = self.locks.lock_file(&relative).await;
        self.raw.delete(&relative).await?;
        Ok(deleted)
    }

    async fn unique_serial(&self) -> String {
        loop {
            let candidate = new_serial("TASK");
            if self.locate_by_serial(&candidate).await.is_none() {
                return candidate;
            }
        }
    }

    async fn locate_by_serial(&self, serial: &str) -> Option<Task> {
        let files = self.raw.list_markdown("").await.ok()?;
        for relative in files {
            if let Some(task) = self.read_task(&relative).await {
                if task.serial == serial {
                    return Some(task);
                }
            }
        }
        None
    }

    async fn locate(&self, id: &str) -> Result<(String, Task), StoreError> {
        let files = self.raw.list_markdown("").await?;
        for relative in files {
            if let Some(task) = self.read_task(&relative).await {
                if task.id == id {
                    return Ok((relative, task));
                }
            }
        }
        Err(StoreError::NotFound { id: id.to_string() })
    }

    async fn read_task(&self, relative: &str) -> Option<Task> {
        let (raw, _meta) = self.raw.read(relative).await.ok()?;
        parse_task(&raw, relative)
    }

    async fn write_task(&self, relative: &str, task: &Task) -> Result<(), StoreError> {
        let _guard = self.locks.lock_file(relative).await;
        let rendered = render(task);
        self.raw.write(relative, &rendered, None).await?;
        Ok(())
    }
}

fn relative_path(project: &str, status: TaskStatus, id: &str) -> String {
    format!("{project}/{}/{id}.md", status.as_shard())
}

fn render(task: &Task) -> String {
    let mut value = serde_json::to_value(task).expect("Task always serializes");
    let body = task.description.clone();
    if let Value::Object(ref mut map) = value {
        map.remove("description");
    }
    let Value::Object(map) = value else { unreachable!() };
    tm_core::frontmatter::render(&map, &body)
}

fn parse_task(raw: &str, relative_path: &str) -> Option<Task> {
    let parsed = tm_core::frontmatter::parse(raw);
    let mut fm = parsed.front_matter?;
    if !fm.contains_key("id") || !fm.contains_key("title") {
        tracing::warn!(path = relative_path, "skipping malformed task record");
        return None;
    }
    fm.insert("description".into(), Value::String(parsed.body.trim().to_string()));
    match serde_json::from_value::<Task>(Value::Object(fm)) {
        Ok(task) => Some(task),
        Err(err) => {
            tracing::warn!(path = relative_path, error = %err, "skipping malformed task record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_dir, store) = store().await;
        let task = store
            .create(NewTask { title: "Handle rate limiting".into(), ..Default::default() })
            .await
            .unwrap();
        let fetched = store.get(&task.id).await.unwrap();
        assert_eq!(fetched.title, "Handle rate limiting");
        assert_eq!(fetched.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn rejects_empty_title() {
        let (_dir, store) = store().await;
        let result = store.create(NewTask { title: "   ".into(), ..Default::default() }).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn set_status_moves_shard_and_stamps_completed() {
        let (_dir, store) = store().await;
        let task = store.create(NewTask { title: "Ship feature".into(), ..Default::default() }).await.unwrap();
        let done = store.set_status(&task.id, TaskStatus::Done, Some("finished".into())).await.unwrap();
        assert_eq!(done.status, TaskStatus::Done);
        assert!(done.completed.is_some());
        assert_eq!(done.status_history.len(), 1);

        let path = store.root().join(relative_path(&done.project, TaskStatus::Done, &done.id));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn subtask_creation_updates_parent() {
        let (_dir, store) = store().await;
        let parent = store.create(NewTask { title: "Parent".into(), ..Default::default() }).await.unwrap();
        let child = store
            .create(NewTask { title: "Child".into(), parent_task: Some(parent.id.clone()), ..Default::default() })
            .await
            .unwrap();
        let reloaded_parent = store.get(&parent.id).await.unwrap();
        assert_eq!(reloaded_parent.subtasks, vec![child.id.clone()]);
    }

    #[tokio::test]
    async fn delete_cascades_to_subtasks() {
        let (_dir, store) = store().await;
        let parent = store.create(NewTask { title: "Parent".into(), ..Default::default() }).await.unwrap();
        let child = store
            .create(NewTask { title: "Child".into(), parent_task: Some(parent.id.clone()), ..Default::default() })
            .await
            .unwrap();
        let deleted = store.delete(&parent.id).await.unwrap();
        assert!(deleted.contains(&parent.id));
        assert!(deleted.contains(&child.id));
        assert!(matches!(store.get(&child.id).await, Err(StoreError::NotFound { .. })));
    }
}
