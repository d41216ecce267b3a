//! Change Bus: a debounced recursive watcher over the store root that emits
//! typed change events to every subscriber of a broadcast channel, with no
//! downstream consumer baked in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecommendedWatcher;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

const DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Memory,
    Task,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub domain: Domain,
    pub project: Option<String>,
    pub id: Option<String>,
    pub path: String,
}

/// Holds the debouncer alive for the lifetime of the watcher; dropping it
/// stops the background watch.
pub struct Watcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    sender: broadcast::Sender<ChangeEvent>,
}

impl Watcher {
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Starts watching `root` recursively, coalescing same-path events within
    /// a 250ms window to a single `modified` (or `deleted`, if the path no
    /// longer exists once the debounce window closes).
    pub fn start(root: PathBuf, capacity: usize) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel(100);
        let (broadcast_tx, _) = broadcast::channel(capacity);
        let broadcast_tx_clone = broadcast_tx.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(DEBOUNCE_MS),
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                if let Ok(events) = result {
                    let md_events: Vec<_> = events
                        .into_iter()
                        .filter(|e| e.path.extension().map(|ext| ext == "md").unwrap_or(false))
                        .collect();
                    if !md_events.is_empty() {
                        let _ = tx.blocking_send(md_events);
                    }
                }
            },
        )?;

        debouncer.watcher().watch(&root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "started change bus watcher");

        tokio::spawn(process_events(rx, root, broadcast_tx_clone));

        Ok(Self { _debouncer: debouncer, sender: broadcast_tx })
    }
}

async fn process_events(
    mut rx: mpsc::Receiver<Vec<notify_debouncer_mini::DebouncedEvent>>,
    root: PathBuf,
    sender: broadcast::Sender<ChangeEvent>,
) {
    while let Some(events) = rx.recv().await {
        for event in events {
            let path = &event.path;
            if path.components().any(|c| c.as_os_str().to_string_lossy().starts_with('.')) {
                continue;
            }

            match event.kind {
                DebouncedEventKind::Any => {
                    let change_kind = if path.exists() { ChangeKind::Modified } else { ChangeKind::Deleted };
                    let event = build_event(&root, path, change_kind);
                    let _ = sender.send(event);
                }
                DebouncedEventKind::AnyContinuous => {}
                _ => {}
            }
        }
    }
}

fn build_event(root: &Path, path: &Path, kind: ChangeKind) -> ChangeEvent {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let components: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();

    let domain = match components.first().map(|s| s.as_str()) {
        Some("memories") => Domain::Memory,
        Some("tasks") => Domain::Task,
        _ => Domain::Other,
    };
    let project = components.get(1).cloned();
    let id = if domain == Domain::Task {
        path.file_stem().map(|s| s.to_string_lossy().to_string())
    } else {
        None
    };

    ChangeEvent { kind, domain, project, id, path: relative.to_string_lossy().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_event_classifies_task_domain_and_id() {
        let root = Path::new("/store");
        let path = Path::new("/store/tasks/default/active/abc-123.md");
        let event = build_event(root, path, ChangeKind::Modified);
        assert_eq!(event.domain, Domain::Task);
        assert_eq!(event.project.as_deref(), Some("default"));
        assert_eq!(event.id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn build_event_classifies_memory_domain_without_id() {
        let root = Path::new("/store");
        let path = Path::new("/store/memories/api/2026-01-01-slug-ab12.md");
        let event = build_event(root, path, ChangeKind::Created);
        assert_eq!(event.domain, Domain::Memory);
        assert_eq!(event.project.as_deref(), Some("api"));
        assert!(event.id.is_none());
    }

    #[tokio::test]
    async fn watcher_starts_and_can_be_subscribed() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Watcher::start(dir.path().to_path_buf(), DEFAULT_CHANNEL_CAPACITY).unwrap();
        let _rx = watcher.subscribe();
    }
}
