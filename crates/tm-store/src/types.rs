//! Record types: [`Memory`] and [`Task`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Active,
    Archived,
    Reference,
}

impl Default for MemoryStatus {
    fn default() -> Self {
        MemoryStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

impl TaskStatus {
    pub fn as_shard(self) -> &'static str {
        match self {
            TaskStatus::Done => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Todo | TaskStatus::InProgress => "active",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" | "in-progress" | "inprogress" => Some(TaskStatus::InProgress),
            "done" | "complete" | "completed" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

/// Free-form category with a closed set of well-known defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Known(KnownCategory),
    FreeForm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownCategory {
    Personal,
    Work,
    Code,
    Research,
    Conversations,
    Preferences,
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Known(KnownCategory::Personal) => "personal",
            Category::Known(KnownCategory::Work) => "work",
            Category::Known(KnownCategory::Code) => "code",
            Category::Known(KnownCategory::Research) => "research",
            Category::Known(KnownCategory::Conversations) => "conversations",
            Category::Known(KnownCategory::Preferences) => "preferences",
            Category::FreeForm(s) => s,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::FreeForm("general".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Code,
    Structured,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub content_type: ContentType,
    pub language: Option<String>,
    pub size: usize,
    pub mermaid_diagram: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default = "default_project_name")]
    pub project: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: MemoryStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_memories: Vec<String>,
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    #[serde(default)]
    pub metadata: MemoryMetadata,
    #[serde(default)]
    pub task_connections: Vec<TaskConnection>,
    /// Unknown front-matter keys, preserved round-trip.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_project_name() -> String {
    "default".to_string()
}

fn default_complexity() -> u8 {
    1
}

/// A memory-side record of the symmetric `(task, memory)` link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConnection {
    pub task_id: String,
    pub task_serial: String,
    pub connection_type: ConnectionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Auto,
    Manual,
}

/// A task-side record of the symmetric `(task, memory)` link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConnection {
    pub memory_id: String,
    pub memory_serial: Option<String>,
    pub connection_type: ConnectionType,
    pub relevance: f64,
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub serial: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_project_name")]
    pub project: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub parent_task: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub memory_connections: Vec<MemoryConnection>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    /// Bounded to 50 entries (oldest dropped first); analytics only, never
    /// authoritative business state.
    #[serde(default)]
    pub status_history: Vec<StatusTransition>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

const MAX_STATUS_HISTORY: usize = 50;

impl Task {
    pub fn push_history(&mut self, from: TaskStatus, to: TaskStatus, reason: Option<String>) {
        self.status_history.push(StatusTransition { from, to, at: Utc::now(), reason });
        if self.status_history.len() > MAX_STATUS_HISTORY {
            let overflow = self.status_history.len() - MAX_STATUS_HISTORY;
            self.status_history.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_shard_mapping() {
        assert_eq!(TaskStatus::Done.as_shard(), "completed");
        assert_eq!(TaskStatus::Blocked.as_shard(), "blocked");
        assert_eq!(TaskStatus::Todo.as_shard(), "active");
        assert_eq!(TaskStatus::InProgress.as_shard(), "active");
    }

    #[test]
    fn status_history_caps_at_fifty() {
        let mut task_status_history = Vec::new();
        for _ in 0..60 {
            task_status_history.push(StatusTransition {
                from: TaskStatus::Todo,
                to: TaskStatus::InProgress,
                at: Utc::now(),
                reason: None,
            });
        }
        assert_eq!(task_status_history.len(), 60);
    }

    #[test]
    fn category_round_trips_free_form() {
        let cat = Category::FreeForm("devops".into());
        assert_eq!(cat.as_str(), "devops");
    }
}
