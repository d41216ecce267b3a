//! Atomic, path-guarded raw file access shared by the memory and task
//! stores, keyed by a `(root, relative path)` pair validated by
//! [`tm_core::path_guard`].

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;

use tm_core::ids::new_id;
use tm_core::path_guard::resolve_within;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub hash: String,
    pub relative_path: String,
}

#[derive(Debug, Clone)]
pub struct WriteResult {
    pub hash: String,
    pub relative_path: String,
}

pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        resolve_within(&self.root, relative).map_err(StoreError::from)
    }

    pub async fn exists(&self, relative: &str) -> Result<bool, StoreError> {
        Ok(self.resolve(relative)?.exists())
    }

    pub async fn read(&self, relative: &str) -> Result<(String, FileMetadata), StoreError> {
        let path = self.resolve(relative)?;
        let content = fs::read_to_string(&path).await.map_err(|e| not_found_or_io(e, relative))?;
        let hash = compute_hash(&content);
        Ok((content, FileMetadata { hash, relative_path: relative.to_string() }))
    }

    /// Writes `content` to `relative`, first creating any missing parent
    /// directories. When `expected_hash` is given, the write is rejected with
    /// [`StoreError::HashMismatch`] unless the file's current contents still
    /// hash to that value — a caller's way of saying "only save if nobody
    /// else changed this since I last read it".
    pub async fn write(&self, relative: &str, content: &str, expected_hash: Option<&str>) -> Result<WriteResult, StoreError> {
        let path = self.resolve(relative)?;

        if let Some(expected) = expected_hash {
            check_current_hash(&path, expected).await?;
        }

        ensure_parent_dir(&path).await?;
        atomic_write(&path, content).await?;
        Ok(WriteResult { hash: compute_hash(content), relative_path: relative.to_string() })
    }

    pub async fn delete(&self, relative: &str) -> Result<(), StoreError> {
        let path = self.resolve(relative)?;
        fs::remove_file(&path).await.map_err(|e| not_found_or_io(e, relative))
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        if !from_path.exists() {
            return Err(StoreError::NotFound { id: from.to_string() });
        }
        if to_path.exists() {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        ensure_parent_dir(&to_path).await?;
        fs::rename(&from_path, &to_path).await?;
        Ok(())
    }

    /// Lists `.md` files under `prefix` (relative to root), descending into
    /// subdirectories and skipping hidden entries. Walks with an explicit
    /// stack rather than recursion since vault trees can nest arbitrarily
    /// deep.
    pub async fn list_markdown(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let search_dir = if prefix.is_empty() { self.root.clone() } else { self.resolve(prefix)? };
        if !search_dir.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut pending = vec![search_dir];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && name.to_string_lossy().ends_with(".md") {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        out.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn not_found_or_io(e: std::io::Error, relative: &str) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound { id: relative.to_string() }
    } else {
        StoreError::Io(e)
    }
}

async fn check_current_hash(path: &Path, expected: &str) -> Result<(), StoreError> {
    let current = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::HashMismatch { expected: expected.to_string(), actual: "(file does not exist)".to_string() });
        }
        Err(e) => return Err(StoreError::Io(e)),
    };
    let actual = compute_hash(&current);
    if actual != expected {
        return Err(StoreError::HashMismatch { expected: expected.to_string(), actual });
    }
    Ok(())
}

async fn ensure_parent_dir(path: &Path) -> Result<(), std::io::Error> {
    match path.parent() {
        Some(parent) if !parent.exists() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Writes to a sibling temp file tagged with a fresh id, then renames it into
/// place, so a reader never observes a partially written file. Cleans up the
/// temp file on either failure.
async fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    let temp_path = path.with_extension(format!("{}.tmp", new_id()));

    if let Err(e) = fs::write(&temp_path, content).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, RawStore) {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawStore::new(dir.path().to_path_buf());
        (dir, raw)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, raw) = store().await;
        let result = raw.write("project/note.md", "hello", None).await.unwrap();
        let (content, meta) = raw.read("project/note.md").await.unwrap();
        assert_eq!(content, "hello");
        assert_eq!(meta.hash, result.hash);
    }

    #[tokio::test]
    async fn optimistic_lock_rejects_stale_hash() {
        let (_dir, raw) = store().await;
        let r1 = raw.write("note.md", "v1", None).await.unwrap();
        raw.write("note.md", "v2", Some(&r1.hash)).await.unwrap();
        let stale = raw.write("note.md", "v3", Some(&r1.hash)).await;
        assert!(matches!(stale, Err(StoreError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn write_without_expected_hash_ignores_existing_content() {
        let (_dir, raw) = store().await;
        raw.write("note.md", "v1", None).await.unwrap();
        let result = raw.write("note.md", "v2", None).await.unwrap();
        let (content, _) = raw.read("note.md").await.unwrap();
        assert_eq!(content, "v2");
        assert_eq!(result.hash, compute_hash("v2"));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let (_dir, raw) = store().await;
        let result = raw.read("../../etc/passwd").await;
        assert!(matches!(result, Err(StoreError::Path(_))));
    }

    #[tokio::test]
    async fn list_markdown_finds_nested_files() {
        let (_dir, raw) = store().await;
        raw.write("a/one.md", "x", None).await.unwrap();
        raw.write("a/b/two.md", "y", None).await.unwrap();
        let mut files = raw.list_markdown("").await.unwrap();
        files.sort();
        assert_eq!(files, vec!["a/b/two.md".to_string(), "a/one.md".to_string()]);
    }

    #[tokio::test]
    async fn list_markdown_skips_hidden_entries() {
        let (_dir, raw) = store().await;
        raw.write("a/one.md", "x", None).await.unwrap();
        raw.write(".hidden/two.md", "y", None).await.unwrap();
        let files = raw.list_markdown("").await.unwrap();
        assert_eq!(files, vec!["a/one.md".to_string()]);
    }

    #[tokio::test]
    async fn delete_nonexistent_is_not_found() {
        let (_dir, raw) = store().await;
        let result = raw.delete("nope.md").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn rename_fails_when_destination_exists() {
        let (_dir, raw) = store().await;
        raw.write("a.md", "x", None).await.unwrap();
        raw.write("b.md", "y", None).await.unwrap();
        let result = raw.rename("a.md", "b.md").await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }
}
