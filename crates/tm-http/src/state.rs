//! Shared application state, built once in `main` and cloned per request.

use std::sync::Arc;

use tm_enhance::RuleBasedEnhancer;
use tm_store::{MemoryStore, TaskStore};
use tm_watch::Watcher;

#[derive(Clone)]
pub struct AppState {
    pub memories: Arc<MemoryStore>,
    pub tasks: Arc<TaskStore>,
    pub rule_enhancer: Arc<RuleBasedEnhancer>,
    #[cfg(feature = "http")]
    pub http_enhancer: Option<Arc<tm_enhance::http::HttpEnhancer>>,
    pub watcher: Arc<Watcher>,
}
