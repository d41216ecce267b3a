//! Startup integrity and opportunistic backups. The bulk-iteration circuit
//! breaker itself lives in `tm_core::circuit_breaker` since `tm-enhance`
//! needs it too; re-exported here for callers that only know this store.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::StoreError;

pub use tm_core::circuit_breaker::{BreakerTrip, CircuitBreaker};

const MIGRATION_SENTINEL: &str = ".migration-complete";

/// Ensures the store root's subdirectories exist. Safe to call on every
/// startup.
pub async fn ensure_layout(root: &Path) -> Result<(), StoreError> {
    for sub in ["memories", "tasks", "data", "data-backups"] {
        fs::create_dir_all(root.join(sub)).await?;
    }
    Ok(())
}

pub fn migration_sentinel_path(root: &Path) -> PathBuf {
    root.join("data").join(MIGRATION_SENTINEL)
}

pub async fn migration_already_ran(root: &Path) -> bool {
    fs::metadata(migration_sentinel_path(root)).await.is_ok()
}

pub async fn mark_migration_complete(root: &Path) -> Result<(), StoreError> {
    fs::write(migration_sentinel_path(root), chrono::Utc::now().to_rfc3339()).await?;
    Ok(())
}

/// Snapshots the given files into `data-backups/<timestamp>/` before a bulk
/// operation runs.
pub async fn snapshot(root: &Path, relative_files: &[String]) -> Result<PathBuf, StoreError> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let backup_dir = root.join("data-backups").join(stamp);
    fs::create_dir_all(&backup_dir).await?;

    for relative in relative_files {
        let source = root.join(relative);
        if !source.exists() {
            continue;
        }
        let dest = backup_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source, &dest).await?;
    }

    Ok(backup_dir)
}

const LEGACY_EXPORT_FILENAME: &str = "legacy-export.json";

#[derive(Debug, Default, serde::Deserialize)]
struct LegacyExport {
    #[serde(default)]
    memories: Vec<LegacyMemory>,
    #[serde(default)]
    tasks: Vec<LegacyTask>,
}

#[derive(Debug, serde::Deserialize)]
struct LegacyMemory {
    content: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct LegacyTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

fn parse_legacy_priority(raw: &str) -> Option<crate::types::Priority> {
    use crate::types::Priority;
    match raw.to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    }
}

fn parse_legacy_category(raw: &str) -> crate::types::Category {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or_else(|_| crate::types::Category::FreeForm(raw.to_string()))
}

/// One-shot migration of a legacy single-JSON export (`data/legacy-export.json`)
/// into individual markdown records. A no-op once the sentinel is present, and
/// a no-op (but still sentinel-marking) if no legacy file exists at all.
pub async fn migrate_legacy_json(
    root: &Path,
    memories: &crate::memory_store::MemoryStore,
    tasks: &crate::task_store::TaskStore,
) -> Result<usize, StoreError> {
    if migration_already_ran(root).await {
        return Ok(0);
    }

    let legacy_path = root.join("data").join(LEGACY_EXPORT_FILENAME);
    let Ok(raw) = fs::read_to_string(&legacy_path).await else {
        mark_migration_complete(root).await?;
        return Ok(0);
    };

    let export: LegacyExport = serde_json::from_str(&raw)
        .map_err(|e| StoreError::InvalidInput(format!("malformed legacy export at {}: {e}", legacy_path.display())))?;
    snapshot(root, &[format!("data/{LEGACY_EXPORT_FILENAME}")]).await?;

    let mut migrated = 0;
    for entry in export.memories {
        memories
            .add(crate::memory_store::NewMemory {
                content: entry.content,
                project: entry.project,
                category: entry.category.as_deref().map(parse_legacy_category),
                priority: entry.priority.as_deref().and_then(parse_legacy_priority),
                tags: entry.tags,
                related_memories: Vec::new(),
            })
            .await?;
        migrated += 1;
    }
    for entry in export.tasks {
        tasks
            .create(crate::task_store::NewTask {
                title: entry.title,
                description: entry.description,
                project: entry.project,
                category: entry.category.as_deref().map(parse_legacy_category),
                priority: entry.priority.as_deref().and_then(parse_legacy_priority),
                tags: entry.tags,
                parent_task: None,
            })
            .await?;
        migrated += 1;
    }

    mark_migration_complete(root).await?;
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_layout_creates_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).await.unwrap();
        assert!(dir.path().join("memories").is_dir());
        assert!(dir.path().join("tasks").is_dir());
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("data-backups").is_dir());
    }

    #[tokio::test]
    async fn migration_sentinel_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).await.unwrap();
        assert!(!migration_already_ran(dir.path()).await);
        mark_migration_complete(dir.path()).await.unwrap();
        assert!(migration_already_ran(dir.path()).await);
    }

    #[tokio::test]
    async fn migrate_legacy_json_is_a_no_op_without_a_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).await.unwrap();
        let memories = crate::memory_store::MemoryStore::new(dir.path().to_path_buf());
        let tasks = crate::task_store::TaskStore::new(dir.path().to_path_buf());
        let migrated = migrate_legacy_json(dir.path(), &memories, &tasks).await.unwrap();
        assert_eq!(migrated, 0);
        assert!(migration_already_ran(dir.path()).await);
    }

    #[tokio::test]
    async fn migrate_legacy_json_imports_memories_and_tasks_once() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).await.unwrap();
        let legacy = serde_json::json!({
            "memories": [{"content": "a migrated memory with enough length", "project": "demo"}],
            "tasks": [{"title": "a migrated task", "project": "demo"}],
        });
        fs::write(dir.path().join("data").join(LEGACY_EXPORT_FILENAME), legacy.to_string()).await.unwrap();

        let memories = crate::memory_store::MemoryStore::new(dir.path().to_path_buf());
        let tasks = crate::task_store::TaskStore::new(dir.path().to_path_buf());
        let migrated = migrate_legacy_json(dir.path(), &memories, &tasks).await.unwrap();
        assert_eq!(migrated, 2);
        assert_eq!(memories.list(Some("demo"), None).await.unwrap().len(), 1);
        assert_eq!(tasks.list(Some("demo"), None, None).await.unwrap().len(), 1);

        let second_run = migrate_legacy_json(dir.path(), &memories, &tasks).await.unwrap();
        assert_eq!(second_run, 0, "migration must be idempotent once the sentinel is written");
    }
}
