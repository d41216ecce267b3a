//! Path safety envelope.
//!
//! Every store-facing function passes untrusted strings (project names,
//! filenames) through [`sanitize_project`] and [`resolve_within`] before they
//! touch the filesystem, so a traversal attempt fails before any I/O happens.
//!
//! Adapted from `obsidian-fs::validate_relative_path`, generalized from a
//! single-vault relative-path check into a `(root, project, filename)`
//! three-part guard since this store shards by project rather than by a
//! single vault.

use std::path::{Component, Path, PathBuf};

use crate::error::CoreError;

const MAX_PROJECT_LEN: usize = 50;

/// Strips characters outside `[A-Za-z0-9_-]` and caps length at 50.
/// An empty result (or fully-invalid input) falls back to `"default"`.
pub fn sanitize_project(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_PROJECT_LEN)
        .collect();
    if cleaned.is_empty() { "default".to_string() } else { cleaned }
}

/// Resolves `relative` against `root`, guaranteeing the result is a
/// descendant of `root` after lexical normalization. Does not touch the
/// filesystem, so it works for paths that do not exist yet.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, CoreError> {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("empty relative path".into()));
    }

    let root_abs = normalize_lexical(&absolutize(root));
    let candidate_abs = normalize_lexical(&absolutize(&root.join(trimmed)));

    if candidate_abs.starts_with(&root_abs) && candidate_abs != root_abs {
        Ok(candidate_abs)
    } else {
        Err(CoreError::PathEscape {
            root: root_abs.display().to_string(),
            path: relative.to_string(),
        })
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

/// Lexically collapses `.`/`..` components without touching the filesystem
/// (so it works for not-yet-created paths, unlike `fs::canonicalize`).
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize_project("my/project..name"), "myprojectname");
        assert_eq!(sanitize_project("../../etc"), "etc");
        assert_eq!(sanitize_project(""), "default");
        assert_eq!(sanitize_project("   "), "default");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_project(&long).len(), MAX_PROJECT_LEN);
    }

    #[test]
    fn resolve_within_accepts_nested_path() {
        let root = PathBuf::from("/store/root");
        let resolved = resolve_within(&root, "api/2026-01-01-note-ab12.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/store/root/api/2026-01-01-note-ab12.md"));
    }

    #[test]
    fn resolve_within_rejects_traversal() {
        let root = PathBuf::from("/store/root");
        let err = resolve_within(&root, "../etc/passwd").unwrap_err();
        assert!(matches!(err, CoreError::PathEscape { .. }));
    }

    #[test]
    fn resolve_within_rejects_embedded_traversal() {
        let root = PathBuf::from("/store/root");
        let err = resolve_within(&root, "api/../../etc/passwd").unwrap_err();
        assert!(matches!(err, CoreError::PathEscape { .. }));
    }

    #[test]
    fn resolve_within_rejects_root_itself() {
        let root = PathBuf::from("/store/root");
        let err = resolve_within(&root, ".").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_) | CoreError::PathEscape { .. }));
    }
}
