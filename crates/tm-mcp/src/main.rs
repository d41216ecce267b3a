//! Stdio JSON-RPC tool dispatcher.
//!
//! A `#[tool_router]`/`#[tool_handler]` pair generates frame parsing and
//! dispatch over `rmcp::transport::stdio`; handlers never terminate the
//! process on failure, they convert errors into `ErrorData` instead.

mod error;
mod envelope;

use std::sync::Arc;

use chrono::Utc;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tm_core::config::Settings;
use tm_enhance::{Enhancer, RuleBasedEnhancer};
use tm_store::{Category, MemoryStore, NewMemory, NewTask, Priority, TaskStatus, TaskStore};
use tm_workflow::ValidationContext;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::envelope::dispatch;
use crate::error::ToolError;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    pub content: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_memories: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListMemoriesParams {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteMemoryParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    pub query: String,
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent_task: Option<String>,
    /// Run the auto-linker against the new task immediately after creation.
    #[serde(default)]
    pub auto_link: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTaskParams {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTasksParams {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskContextParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteTaskParams {
    pub id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SmartStatusUpdateParams {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub force_complete: bool,
    #[serde(default)]
    pub skip_validation: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskStatusAnalyticsParams {
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidateTaskWorkflowParams {
    pub id: String,
    pub to_status: String,
    #[serde(default)]
    pub force_complete: bool,
    #[serde(default)]
    pub skip_validation: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetAutomationSuggestionsParams {
    pub id: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnhanceMemoryMetadataParams {
    pub id: String,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchEnhanceMemoriesParams {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeduplicateMemoriesParams {
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateDropoffParams {
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct TestToolParams {}

fn parse_priority(raw: &Option<String>) -> Option<Priority> {
    raw.as_deref().and_then(|s| match s.to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    })
}

fn parse_category(raw: &Option<String>) -> Option<Category> {
    raw.as_deref().map(|s| serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(Category::FreeForm(s.to_string())))
}

fn parse_status(raw: &str) -> Result<TaskStatus, ToolError> {
    TaskStatus::from_str_loose(raw).ok_or_else(|| ToolError::InvalidInput(format!("unrecognized status '{raw}'")))
}

const TITLE_TAG_PREFIX: &str = "title:";
const SUMMARY_TAG_PREFIX: &str = "summary:";

fn already_enhanced(tags: &[String]) -> bool {
    tags.iter().any(|t| t.starts_with(TITLE_TAG_PREFIX)) && tags.iter().any(|t| t.starts_with(SUMMARY_TAG_PREFIX))
}

fn apply_enhancement_tags(tags: &mut Vec<String>, enhancement: &tm_enhance::Enhancement) {
    tags.retain(|t| !t.starts_with(TITLE_TAG_PREFIX) && !t.starts_with(SUMMARY_TAG_PREFIX));
    tags.push(format!("{TITLE_TAG_PREFIX}{}", enhancement.title));
    tags.push(format!("{SUMMARY_TAG_PREFIX}{}", enhancement.summary));
}

#[derive(Clone)]
pub struct AppState {
    memories: Arc<MemoryStore>,
    tasks: Arc<TaskStore>,
    rule_enhancer: Arc<RuleBasedEnhancer>,
    #[cfg(feature = "http")]
    http_enhancer: Option<Arc<tm_enhance::http::HttpEnhancer>>,
    enhance_configured: bool,
}

#[derive(Clone)]
pub struct TaskMemoryServer {
    state: AppState,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TaskMemoryServer {
    fn new(state: AppState) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(description = "Store a new memory. Content must be non-trivial (>=10 chars) and not look like placeholder/mock data.")]
    async fn add_memory(&self, params: Parameters<AddMemoryParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let memory = self
                .state
                .memories
                .add(NewMemory {
                    content: p.content,
                    project: p.project,
                    category: parse_category(&p.category),
                    priority: parse_priority(&p.priority),
                    tags: p.tags,
                    related_memories: p.related_memories,
                })
                .await?;
            Ok::<_, ToolError>(memory)
        })
        .await
    }

    #[tool(description = "Fetch a single memory by id.")]
    async fn get_memory(&self, params: Parameters<GetMemoryParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async { Ok::<_, ToolError>(self.state.memories.get(&p.id).await?) }).await
    }

    #[tool(description = "List memories, optionally filtered by project.")]
    async fn list_memories(&self, params: Parameters<ListMemoriesParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async { Ok::<_, ToolError>(self.state.memories.list(p.project.as_deref(), p.limit).await?) }).await
    }

    #[tool(description = "Permanently delete a memory and remove inbound task references.")]
    async fn delete_memory(&self, params: Parameters<DeleteMemoryParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let memory = self.state.memories.get(&p.id).await?;
            let referencing: Vec<String> = memory.task_connections.iter().map(|c| c.task_id.clone()).collect();
            self.state.memories.delete(&p.id).await?;
            tm_linker::unlink_memory(&self.state.tasks, &p.id, &referencing).await?;
            Ok::<_, ToolError>(serde_json::json!({ "deleted": p.id }))
        })
        .await
    }

    #[tool(description = "Substring search over memory content, category, and tags within a project.")]
    async fn search_memories(&self, params: Parameters<SearchMemoriesParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async { Ok::<_, ToolError>(self.state.memories.search(&p.query, p.project.as_deref()).await?) }).await
    }

    #[tool(description = "Create a new task, optionally as a subtask of an existing one.")]
    async fn create_task(&self, params: Parameters<CreateTaskParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        let auto_link = p.auto_link;
        dispatch(async {
            let task = self
                .state
                .tasks
                .create(NewTask {
                    title: p.title,
                    description: p.description,
                    project: p.project,
                    category: parse_category(&p.category),
                    priority: parse_priority(&p.priority),
                    tags: p.tags,
                    parent_task: p.parent_task,
                })
                .await?;
            if auto_link {
                let linked =
                    tm_linker::auto_link(&self.state.memories, &self.state.tasks, &task.id, tm_linker::DEFAULT_THRESHOLD, tm_linker::DEFAULT_TOP_K)
                        .await?;
                return Ok::<_, ToolError>(linked);
            }
            Ok::<_, ToolError>(task)
        })
        .await
    }

    #[tool(description = "Update a task's title, description, tags, priority, or category. Status changes go through smart_status_update or validate_task_workflow.")]
    async fn update_task(&self, params: Parameters<UpdateTaskParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let priority = parse_priority(&p.priority);
            let category = parse_category(&p.category);
            let task = self
                .state
                .tasks
                .update(&p.id, |t| {
                    if let Some(title) = p.title {
                        t.title = title;
                    }
                    if let Some(description) = p.description {
                        t.description = description;
                    }
                    if let Some(tags) = p.tags {
                        t.tags = tags;
                    }
                    if let Some(priority) = priority {
                        t.priority = priority;
                    }
                    if let Some(category) = category {
                        t.category = category;
                    }
                })
                .await?;
            Ok::<_, ToolError>(task)
        })
        .await
    }

    #[tool(description = "List tasks, optionally filtered by project and/or status.")]
    async fn list_tasks(&self, params: Parameters<ListTasksParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let status = p.status.as_deref().map(parse_status).transpose()?;
            Ok::<_, ToolError>(self.state.tasks.list(p.project.as_deref(), status, p.limit).await?)
        })
        .await
    }

    #[tool(description = "Fetch a task along with its linked memories.")]
    async fn get_task_context(&self, params: Parameters<GetTaskContextParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let task = self.state.tasks.get(&p.id).await?;
            let mut memories = Vec::new();
            for connection in &task.memory_connections {
                if let Ok(memory) = self.state.memories.get(&connection.memory_id).await {
                    memories.push(memory);
                }
            }
            Ok::<_, ToolError>(serde_json::json!({ "task": task, "memories": memories }))
        })
        .await
    }

    #[tool(description = "Delete a task and its subtask subtree, removing inbound memory references.")]
    async fn delete_task(&self, params: Parameters<DeleteTaskParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let task = self.state.tasks.get(&p.id).await?;
            tm_linker::unlink_task(&self.state.memories, &task).await?;
            let deleted = self.state.tasks.delete(&p.id).await?;
            Ok::<_, ToolError>(serde_json::json!({ "deleted": deleted }))
        })
        .await
    }

    #[tool(description = "Parse a natural-language status update (e.g. 'just finished this') and apply the inferred transition if valid. Completing a task also writes a completion memory.")]
    async fn smart_status_update(&self, params: Parameters<SmartStatusUpdateParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let ctx = ValidationContext { force_complete: p.force_complete, skip_validation: p.skip_validation };
            let (task, intent) = tm_workflow::smart_status_update(&self.state.tasks, &self.state.memories, &p.id, &p.text, &ctx).await?;
            let completion_memory = if task.status == TaskStatus::Done {
                Some(self.write_completion_memory(&task, &p.text).await?)
            } else {
                None
            };
            Ok::<_, ToolError>(serde_json::json!({ "task": task, "intent": intent, "completion_memory": completion_memory }))
        })
        .await
    }

    #[tool(description = "Compute status analytics (completion rate, WIP, stale/blocked counts, throughput) over a project's tasks.")]
    async fn get_task_status_analytics(&self, params: Parameters<GetTaskStatusAnalyticsParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let tasks = self.state.tasks.list(p.project.as_deref(), None, None).await?;
            Ok::<_, ToolError>(tm_workflow::analyze(&tasks, Utc::now()))
        })
        .await
    }

    #[tool(description = "Validate a proposed status transition without applying it, returning blocking issues, warnings, and suggestions.")]
    async fn validate_task_workflow(&self, params: Parameters<ValidateTaskWorkflowParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let task = self.state.tasks.get(&p.id).await?;
            let to = parse_status(&p.to_status)?;
            let ctx = ValidationContext { force_complete: p.force_complete, skip_validation: p.skip_validation };
            let memories = tm_workflow::linked_memories(&self.state.memories, &task).await;
            Ok::<_, ToolError>(tm_workflow::validate(&task, to, &memories, &ctx))
        })
        .await
    }

    #[tool(description = "Preview which memories would be auto-linked to a task, without writing the connections.")]
    async fn get_automation_suggestions(&self, params: Parameters<GetAutomationSuggestionsParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let task = self.state.tasks.get(&p.id).await?;
            let threshold = p.threshold.unwrap_or(tm_linker::DEFAULT_THRESHOLD);
            let top_k = p.top_k.unwrap_or(tm_linker::DEFAULT_TOP_K);
            let mut candidates = self.state.memories.list(Some(&task.project), None).await?;
            if candidates.is_empty() {
                candidates = self.state.memories.list(None, None).await?;
            }
            let mut scored: Vec<serde_json::Value> = candidates
                .into_iter()
                .filter_map(|memory| {
                    let (score, matched) = tm_linker::relevance(&task, &memory);
                    (score >= threshold)
                        .then(|| serde_json::json!({ "memory_id": memory.id, "score": score, "matched_terms": matched }))
                })
                .collect();
            scored.sort_by(|a, b| {
                b["score"].as_f64().unwrap_or(0.0).partial_cmp(&a["score"].as_f64().unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(top_k);
            Ok::<_, ToolError>(serde_json::json!({ "suggestions": scored }))
        })
        .await
    }

    #[tool(description = "Generate a rule-based title/summary for a memory and store them as title:/summary: tags. Skips memories already enhanced unless force_update is set.")]
    async fn enhance_memory_metadata(&self, params: Parameters<EnhanceMemoryMetadataParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let memory = self.state.memories.get(&p.id).await?;
            if !p.force_update && already_enhanced(&memory.tags) {
                return Ok::<_, ToolError>(memory);
            }
            let enhancement = self.state.rule_enhancer.enhance(&memory.content).await?;
            let updated = self
                .state
                .memories
                .update(&p.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement))
                .await?;
            Ok::<_, ToolError>(updated)
        })
        .await
    }

    #[tool(description = "Rule-based enhance every memory in a project (or all projects), skipping already-enhanced ones unless force_update is set.")]
    async fn batch_enhance_memories(&self, params: Parameters<BatchEnhanceMemoriesParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let memories = self.state.memories.list(p.project.as_deref(), None).await?;
            let candidate_ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
            self.state.memories.snapshot_many(&candidate_ids).await?;
            let (outcomes, trip) = tm_enhance::batch_enhance(
                &*self.state.rule_enhancer,
                memories,
                |m: &tm_store::Memory| already_enhanced(&m.tags),
                |m: &tm_store::Memory| m.content.clone(),
                p.force_update,
                |_, _| {},
            )
            .await;
            let mut enhanced = Vec::new();
            for (memory, outcome) in outcomes {
                let enhancement = outcome?;
                let updated = self.state.memories.update(&memory.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement)).await?;
                enhanced.push(updated.id);
            }
            Ok::<_, ToolError>(serde_json::json!({ "enhanced": enhanced, "trip": trip }))
        })
        .await
    }

    #[tool(description = "Enhance a single memory via the configured local inference endpoint (requires TM_ENHANCE_URL).")]
    async fn enhance_memory_ai(&self, params: Parameters<EnhanceMemoryMetadataParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            #[cfg(feature = "http")]
            {
                let memory = self.state.memories.get(&p.id).await?;
                let enhancer = self
                    .state
                    .http_enhancer
                    .as_ref()
                    .ok_or_else(|| ToolError::InvalidInput("TM_ENHANCE_URL is not configured".into()))?;
                let enhancement = enhancer.enhance(&memory.content).await?;
                let updated = self.state.memories.update(&p.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement)).await?;
                Ok::<_, ToolError>(updated)
            }
            #[cfg(not(feature = "http"))]
            {
                Err(ToolError::InvalidInput("this build was compiled without AI enhancement support".into()))
            }
        })
        .await
    }

    #[tool(description = "Enhance every memory in a project via the configured local inference endpoint.")]
    async fn batch_enhance_memories_ai(&self, params: Parameters<BatchEnhanceMemoriesParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            #[cfg(feature = "http")]
            {
                let enhancer = self
                    .state
                    .http_enhancer
                    .as_ref()
                    .ok_or_else(|| ToolError::InvalidInput("TM_ENHANCE_URL is not configured".into()))?;
                let memories = self.state.memories.list(p.project.as_deref(), None).await?;
                let candidate_ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
                self.state.memories.snapshot_many(&candidate_ids).await?;
                let (outcomes, trip) = tm_enhance::batch_enhance(
                    enhancer.as_ref(),
                    memories,
                    |m: &tm_store::Memory| already_enhanced(&m.tags),
                    |m: &tm_store::Memory| m.content.clone(),
                    p.force_update,
                    |_, _| {},
                )
                .await;
                let mut enhanced = Vec::new();
                for (memory, outcome) in outcomes {
                    let enhancement = outcome?;
                    let updated = self.state.memories.update(&memory.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement)).await?;
                    enhanced.push(updated.id);
                }
                Ok::<_, ToolError>(serde_json::json!({ "enhanced": enhanced, "trip": trip }))
            }
            #[cfg(not(feature = "http"))]
            {
                Err(ToolError::InvalidInput("this build was compiled without AI enhancement support".into()))
            }
        })
        .await
    }

    #[tool(description = "Report whether an AI enhancement endpoint is configured and reachable.")]
    async fn check_ai_status(&self, _params: Parameters<TestToolParams>) -> Result<CallToolResult, ErrorData> {
        dispatch(async { Ok::<_, ToolError>(serde_json::json!({ "configured": self.state.enhance_configured })) }).await
    }

    #[tool(description = "Find and remove duplicate memory files sharing the same front-matter id, keeping the newest. Pass preview to report without deleting.")]
    async fn deduplicate_memories(&self, params: Parameters<DeduplicateMemoriesParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async { Ok::<_, ToolError>(self.state.memories.deduplicate(p.preview).await?) }).await
    }

    #[tool(description = "Build a session handoff digest: active/blocked tasks and recently touched memories for a project.")]
    async fn generate_dropoff(&self, params: Parameters<GenerateDropoffParams>) -> Result<CallToolResult, ErrorData> {
        let p = params.0;
        dispatch(async {
            let active = self.state.tasks.list(p.project.as_deref(), Some(TaskStatus::InProgress), Some(10)).await?;
            let blocked = self.state.tasks.list(p.project.as_deref(), Some(TaskStatus::Blocked), Some(10)).await?;
            let recent_memories = self.state.memories.list(p.project.as_deref(), Some(10)).await?;
            Ok::<_, ToolError>(serde_json::json!({
                "active_tasks": active,
                "blocked_tasks": blocked,
                "recent_memories": recent_memories,
            }))
        })
        .await
    }

    #[tool(description = "Health check: echoes back a timestamp, confirming the dispatcher is alive.")]
    async fn test_tool(&self, _params: Parameters<TestToolParams>) -> Result<CallToolResult, ErrorData> {
        dispatch(async { Ok::<_, ToolError>(serde_json::json!({ "ok": true, "timestamp": Utc::now() })) }).await
    }
}

impl TaskMemoryServer {
    /// Writes the completion memory a `done` transition leaves behind
    /// and links it back to the task that produced it.
    async fn write_completion_memory(&self, task: &tm_store::Task, reason: &str) -> Result<tm_store::Memory, ToolError> {
        let content = format!(
            "Completed task {} ({}): {}\n\n{}\n\nContext: {}",
            task.serial, task.id, task.title, task.description, reason
        );
        let memory = self
            .state
            .memories
            .add(NewMemory {
                content,
                project: Some(task.project.clone()),
                category: Some(tm_store::Category::Known(tm_store::KnownCategory::Work)),
                tags: vec!["completion".to_string()],
                ..Default::default()
            })
            .await?;
        tm_linker::link_manual(&self.state.memories, &self.state.tasks, &task.id, &memory.id).await?;
        Ok(memory)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for TaskMemoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation { name: "tm-mcp".into(), version: env!("CARGO_PKG_VERSION").into(), ..Default::default() },
            instructions: Some("Project-scoped memory and task store: markdown-backed records, auto-linking, and a task workflow engine.".into()),
        }
    }
}

/// CLI exit codes: 0 success, 1 user input error, 2 filesystem error,
/// 3 environment precondition failure.
const EXIT_FS_ERROR: i32 = 2;
const EXIT_CONFIG_ERROR: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(EnvFilter::from_default_env()).init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(e) = tm_store::safeguards::ensure_layout(&settings.store_root).await {
        tracing::error!(error = %e, "store root is not usable");
        std::process::exit(EXIT_FS_ERROR);
    }

    let memories = Arc::new(MemoryStore::new(settings.store_root.clone()));
    let tasks = Arc::new(TaskStore::new(settings.store_root.clone()));

    match tm_store::safeguards::migrate_legacy_json(&settings.store_root, &memories, &tasks).await {
        Ok(0) => {}
        Ok(migrated) => tracing::info!(migrated, "migrated legacy JSON export"),
        Err(e) => {
            tracing::error!(error = %e, "legacy migration failed");
            std::process::exit(EXIT_FS_ERROR);
        }
    }

    let enhance_configured = settings.enhance_url.is_some();

    #[cfg(feature = "http")]
    let http_enhancer = settings
        .enhance_url
        .clone()
        .map(|url| Arc::new(tm_enhance::http::HttpEnhancer::new(url, settings.enhance_model.clone().unwrap_or_else(|| "default".to_string()))));

    let state = AppState {
        memories,
        tasks,
        rule_enhancer: Arc::new(RuleBasedEnhancer),
        #[cfg(feature = "http")]
        http_enhancer,
        enhance_configured,
    };

    let server = TaskMemoryServer::new(state);
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("error starting server: {}", e);
    })?;

    tracing::info!("tm-mcp started (stdio)");
    service.waiting().await?;

    Ok(())
}
