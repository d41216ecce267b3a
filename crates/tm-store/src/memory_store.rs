//! Record Store instance for memories: project-sharded storage with typed
//! records instead of opaque markdown blobs.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;

use tm_core::ids::{filename_suffix, new_id};
use tm_core::path_guard::sanitize_project;

use crate::error::StoreError;
use crate::lock::LockRegistry;
use crate::mockfilter::detect_mock_data;
use crate::raw::RawStore;
use crate::types::{Category, Memory, MemoryMetadata, MemoryStatus, Priority};

const MIN_CONTENT_LEN: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub content: String,
    pub project: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub related_memories: Vec<String>,
}

pub struct MemoryStore {
    raw: RawStore,
    locks: LockRegistry,
}

impl MemoryStore {
    pub fn new(store_root: PathBuf) -> Self {
        Self { raw: RawStore::new(store_root.join("memories")), locks: LockRegistry::new() }
    }

    pub fn root(&self) -> PathBuf {
        self.raw.root().to_path_buf()
    }

    pub async fn add(&self, input: NewMemory) -> Result<Memory, StoreError> {
        let content = input.content.trim().to_string();
        if content.len() < MIN_CONTENT_LEN {
            return Err(StoreError::InvalidInput(format!(
                "content must be at least {MIN_CONTENT_LEN} characters"
            )));
        }
        let project = sanitize_project(input.project.as_deref().unwrap_or("default"));
        if let Some(reason) = detect_mock_data(&content, &project, &input.tags) {
            return Err(StoreError::InvalidInput(reason.to_string()));
        }
        if input.priority == Some(Priority::Urgent) {
            return Err(StoreError::InvalidInput("memory priority cannot be urgent; urgent is reserved for tasks".to_string()));
        }

        let now = Utc::now();
        let memory = Memory {
            id: new_id(),
            content: content.clone(),
            timestamp: now,
            last_accessed: now,
            access_count: 0,
            project: project.clone(),
            category: input.category.unwrap_or_default(),
            priority: input.priority.unwrap_or_default(),
            status: MemoryStatus::Active,
            tags: input.tags,
            related_memories: input.related_memories,
            complexity: estimate_complexity(&content),
            metadata: MemoryMetadata {
                size: content.len(),
                content_type: detect_content_type(&content),
                ..Default::default()
            },
            task_connections: Vec::new(),
            extra: Default::default(),
        };

        let relative = relative_path(&project, &memory);
        self.write_new(&relative, &memory).await?;
        Ok(memory)
    }

    pub async fn get(&self, id: &str) -> Result<Memory, StoreError> {
        let (_, memory) = self.locate(id).await?;
        Ok(memory)
    }

    pub async fn list(&self, project: Option<&str>, limit: Option<usize>) -> Result<Vec<Memory>, StoreError> {
        let prefix = project.map(sanitize_project).unwrap_or_default();
        let files = self.raw.list_markdown(&prefix).await?;
        let mut memories = Vec::new();
        for relative in files {
            if let Some(memory) = self.read_memory(&relative).await {
                memories.push(memory);
            }
        }
        memories.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            memories.truncate(limit);
        }
        Ok(memories)
    }

    pub async fn update(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut Memory),
    ) -> Result<Memory, StoreError> {
        let (relative, mut memory) = self.locate(id).await?;
        let _guard = self.locks.lock_file(&relative).await;
        mutate(&mut memory);
        let rendered = render(&memory);
        self.raw.write(&relative, &rendered, None).await?;
        Ok(memory)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let (relative, _) = self.locate(id).await?;
        let _guard = self.locks.lock_file(&relative).await;
        self.raw.delete(&relative).await
    }

    /// Snapshots the files backing `ids` into `data-backups/` before a bulk
    /// mutation (e.g. batch enhancement) touches them. Unknown ids are
    /// skipped rather than failing the whole batch.
    pub async fn snapshot_many(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut relatives = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok((relative, _)) = self.locate(id).await {
                relatives.push(relative);
            }
        }
        if !relatives.is_empty() {
            crate::safeguards::snapshot(self.raw.root(), &relatives).await?;
        }
        Ok(())
    }

    pub async fn search(&self, query: &str, project: Option<&str>) -> Result<Vec<Memory>, StoreError> {
        if query.trim().is_empty() {
            return Err(StoreError::InvalidInput("search query must not be empty".into()));
        }
        let query_lower = query.to_lowercase();
        let all = self.list(project, None).await?;
        Ok(all
            .into_iter()
            .filter(|m| {
                m.content.to_lowercase().contains(&query_lower)
                    || m.category.as_str().to_lowercase().contains(&query_lower)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&query_lower))
            })
            .collect())
    }

    /// Groups stored files by front-matter id; keeps the newest by mtime
    /// (ties broken by lexicographic filename), removing the rest unless
    /// `preview` is set. Guarded by a circuit breaker and, for real (non-preview)
    /// runs, preceded by a snapshot of every candidate file.
    pub async fn deduplicate(&self, preview: bool) -> Result<DedupReport, StoreError> {
        let _guard = self.locks.write().await;
        let files = self.raw.list_markdown("").await?;

        let mut groups: std::collections::HashMap<String, Vec<(String, std::time::SystemTime)>> =
            std::collections::HashMap::new();
        let mut breaker = tm_core::CircuitBreaker::new();
        let mut trip = None;

        for (idx, relative) in files.iter().enumerate() {
            let Some(memory) = self.read_memory(relative).await else { continue };
            if let Some(hit) = breaker.check(memory.metadata.size) {
                trip = Some(hit);
                break;
            }
            let mtime = tokio::fs::metadata(self.raw.root().join(relative))
                .await
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            groups.entry(memory.id).or_default().push((relative.clone(), mtime));
            if idx % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }

        let duplicates: Vec<String> = groups
            .values()
            .filter(|entries| entries.len() > 1)
            .flat_map(|entries| {
                let mut sorted = entries.clone();
                sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                sorted.into_iter().skip(1).map(|(relative, _)| relative)
            })
            .collect();

        if !preview && !duplicates.is_empty() {
            crate::safeguards::snapshot(self.raw.root(), &duplicates).await?;
        }

        let mut removed = Vec::new();
        for relative in duplicates {
            if !preview {
                self.raw.delete(&relative).await?;
            }
            removed.push(relative);
        }

        Ok(DedupReport { removed, preview, trip })
    }

    async fn locate(&self, id: &str) -> Result<(String, Memory), StoreError> {
        let files = self.raw.list_markdown("").await?;
        for relative in files {
            if let Some(memory) = self.read_memory(&relative).await {
                if memory.id == id {
                    return Ok((relative, memory));
                }
            }
        }
        Err(StoreError::NotFound { id: id.to_string() })
    }

    async fn read_memory(&self, relative: &str) -> Option<Memory> {
        let (raw, _meta) = self.raw.read(relative).await.ok()?;
        parse_memory(&raw, relative)
    }

    async fn write_new(&self, relative: &str, memory: &Memory) -> Result<(), StoreError> {
        let _guard = self.locks.lock_file(relative).await;
        let rendered = render(memory);
        self.raw.write(relative, &rendered, None).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupReport {
    pub removed: Vec<String>,
    pub preview: bool,
    /// Set when the circuit breaker cut iteration short; `removed` then
    /// reflects only what was scanned before the trip.
    pub trip: Option<tm_core::BreakerTrip>,
}

fn relative_path(project: &str, memory: &Memory) -> String {
    let date = memory.timestamp.format("%Y-%m-%d");
    let slug = slugify(&memory.content);
    let suffix = filename_suffix();
    format!("{project}/{date}-{slug}-{suffix}.md")
}

fn slugify(content: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().take(6).collect();
    let joined = words.join("-").to_lowercase();
    let cleaned: String =
        joined.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' }).collect();
    let collapsed = cleaned.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    if collapsed.is_empty() { "memory".to_string() } else { collapsed.chars().take(40).collect() }
}

fn estimate_complexity(content: &str) -> u8 {
    let len = content.len();
    if len > 2000 {
        4
    } else if len > 800 {
        3
    } else if len > 200 {
        2
    } else {
        1
    }
}

fn detect_content_type(content: &str) -> crate::types::ContentType {
    if content.contains("```") {
        crate::types::ContentType::Code
    } else if content.trim_start().starts_with('{') || content.trim_start().starts_with('[') {
        crate::types::ContentType::Structured
    } else {
        crate::types::ContentType::Text
    }
}

fn render(memory: &Memory) -> String {
    let mut value = serde_json::to_value(memory).expect("Memory always serializes");
    let body = memory.content.clone();
    if let Value::Object(ref mut map) = value {
        map.remove("content");
    }
    let Value::Object(map) = value else { unreachable!() };
    tm_core::frontmatter::render(&map, &body)
}

fn parse_memory(raw: &str, relative_path: &str) -> Option<Memory> {
    let parsed = tm_core::frontmatter::parse(raw);
    match parsed.front_matter {
        None => {
            if parsed.body.trim().is_empty() {
                return None;
            }
            Some(fallback_memory(relative_path, &parsed.body))
        }
        Some(mut fm) => {
            if !fm.contains_key("id") || parsed.body.trim().is_empty() {
                tracing::warn!(path = relative_path, "skipping malformed memory record");
                return None;
            }
            fm.insert("content".into(), Value::String(parsed.body.trim().to_string()));
            match serde_json::from_value::<Memory>(Value::Object(fm)) {
                Ok(memory) => Some(memory),
                Err(err) => {
                    tracing::warn!(path = relative_path, error = %err, "skipping malformed memory record");
                    None
                }
            }
        }
    }
}

/// Degraded-path reconstruction for a markdown file with no recognizable
/// front-matter envelope at all: treated as an active memory with an
/// auto-generated, path-derived id (documented non-determinism).
fn fallback_memory(relative_path: &str, body: &str) -> Memory {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    let digest = hasher.finalize();
    let id = format!("untitled-{}", hex::encode(&digest[..6]));
    let now = Utc::now();
    Memory {
        id,
        content: body.trim().to_string(),
        timestamp: now,
        last_accessed: now,
        access_count: 0,
        project: "default".to_string(),
        category: Category::default(),
        priority: Priority::default(),
        status: MemoryStatus::Active,
        tags: Vec::new(),
        related_memories: Vec::new(),
        complexity: 1,
        metadata: MemoryMetadata { size: body.len(), ..Default::default() },
        task_connections: Vec::new(),
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let (_dir, store) = store().await;
        let memory = store
            .add(NewMemory { content: "Use exponential backoff on 429".into(), ..Default::default() })
            .await
            .unwrap();
        let fetched = store.get(&memory.id).await.unwrap();
        assert_eq!(fetched.content, "Use exponential backoff on 429");
        assert_eq!(fetched.project, "default");
    }

    #[tokio::test]
    async fn add_rejects_short_content() {
        let (_dir, store) = store().await;
        let result = store.add(NewMemory { content: "short".into(), ..Default::default() }).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn add_rejects_mock_data() {
        let (_dir, store) = store().await;
        let result =
            store.add(NewMemory { content: "this is sample test data content".into(), ..Default::default() }).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn add_rejects_urgent_priority() {
        let (_dir, store) = store().await;
        let result = store
            .add(NewMemory { content: "Use exponential backoff on 429".into(), priority: Some(Priority::Urgent), ..Default::default() })
            .await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn list_sorts_by_timestamp_descending() {
        let (_dir, store) = store().await;
        let first = store.add(NewMemory { content: "first memory entry here".into(), ..Default::default() }).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.add(NewMemory { content: "second memory entry here".into(), ..Default::default() }).await.unwrap();
        let listed = store.list(None, None).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let (_dir, store) = store().await;
        let memory = store.add(NewMemory { content: "a memory to delete".into(), ..Default::default() }).await.unwrap();
        store.delete(&memory.id).await.unwrap();
        assert!(matches!(store.get(&memory.id).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn deduplicate_preview_leaves_files_untouched() {
        let (_dir, store) = store().await;
        let memory = store.add(NewMemory { content: "duplicate-prone content here".into(), ..Default::default() }).await.unwrap();
        let relative = relative_path(&memory.project, &memory);
        let duplicate_relative = format!("{}-dup.md", relative.trim_end_matches(".md"));
        let raw = std::fs::read_to_string(store.root().join(&relative)).unwrap();
        std::fs::write(store.root().join(&duplicate_relative), raw).unwrap();

        let report = store.deduplicate(true).await.unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(store.root().join(&duplicate_relative).exists());

        let report = store.deduplicate(false).await.unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(!store.root().join(&duplicate_relative).exists());
    }

    #[tokio::test]
    async fn search_requires_nonempty_query() {
        let (_dir, store) = store().await;
        let result = store.search("", None).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }
}
