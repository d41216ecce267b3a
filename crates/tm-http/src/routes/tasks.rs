//! `/api/tasks` — mirrors the task and workflow tools over REST.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{paginate, PageParams, Paginated};
use crate::state::AppState;
use tm_store::{Category, NewMemory, NewTask, Priority, Task, TaskStatus};
use tm_workflow::ValidationContext;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/analytics", get(analytics))
        .route("/{id}", get(one).patch(update).delete(remove))
        .route("/{id}/status", axum::routing::post(update_status))
        .route("/{id}/validate", get(validate))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageParams,
    project: Option<String>,
    status: Option<String>,
}

async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Paginated<Task>>> {
    let status = q.status.as_deref().map(TaskStatus::from_str_loose).map(|s| s.ok_or_else(|| ApiError::InvalidInput("unrecognized status".into()))).transpose()?;
    let tasks = state.tasks.list(q.project.as_deref(), status, None).await.map_err(ApiError::from)?;
    Ok(Json(paginate(tasks, &q.page)))
}

#[derive(Debug, Deserialize)]
struct CreateBody {
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
    #[serde(default)]
    parent_task: Option<String>,
    #[serde(default)]
    auto_link: bool,
}

async fn create(State(state): State<AppState>, Json(body): Json<CreateBody>) -> ApiResult<Json<Task>> {
    let task = state
        .tasks
        .create(NewTask {
            title: body.title,
            description: body.description,
            project: body.project,
            category: parse_category(body.category),
            priority: body.priority.as_deref().and_then(parse_priority),
            tags: body.tags,
            parent_task: body.parent_task,
        })
        .await
        .map_err(ApiError::from)?;
    if body.auto_link {
        let linked = tm_linker::auto_link(&state.memories, &state.tasks, &task.id, tm_linker::DEFAULT_THRESHOLD, tm_linker::DEFAULT_TOP_K)
            .await
            .map_err(ApiError::from)?;
        return Ok(Json(linked));
    }
    Ok(Json(task))
}

async fn one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.get(&id).await.map_err(ApiError::from)?))
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

async fn update(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<UpdateBody>) -> ApiResult<Json<Task>> {
    let priority = body.priority.as_deref().and_then(parse_priority);
    let category = parse_category(body.category);
    let task = state
        .tasks
        .update(&id, |t| {
            if let Some(title) = body.title {
                t.title = title;
            }
            if let Some(description) = body.description {
                t.description = description;
            }
            if let Some(tags) = body.tags {
                t.tags = tags;
            }
            if let Some(priority) = priority {
                t.priority = priority;
            }
            if let Some(category) = category {
                t.category = category;
            }
        })
        .await
        .map_err(ApiError::from)?;
    Ok(Json(task))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let task = state.tasks.get(&id).await.map_err(ApiError::from)?;
    tm_linker::unlink_task(&state.memories, &task).await.map_err(ApiError::from)?;
    let deleted = state.tasks.delete(&id).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    text: String,
    #[serde(default)]
    force_complete: bool,
    #[serde(default)]
    skip_validation: bool,
}

async fn update_status(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<StatusBody>) -> ApiResult<Json<serde_json::Value>> {
    let ctx = ValidationContext { force_complete: body.force_complete, skip_validation: body.skip_validation };
    let (task, intent) = tm_workflow::smart_status_update(&state.tasks, &state.memories, &id, &body.text, &ctx).await.map_err(ApiError::from)?;
    let completion_memory = if task.status == TaskStatus::Done {
        Some(write_completion_memory(&state, &task, &body.text).await?)
    } else {
        None
    };
    Ok(Json(serde_json::json!({ "task": task, "intent": intent, "completion_memory": completion_memory })))
}

async fn write_completion_memory(state: &AppState, task: &Task, reason: &str) -> ApiResult<tm_store::Memory> {
    let content = format!("Completed task {} ({}): {}\n\n{}\n\nContext: {}", task.serial, task.id, task.title, task.description, reason);
    let memory = state
        .memories
        .add(NewMemory {
            content,
            project: Some(task.project.clone()),
            category: Some(Category::Known(tm_store::KnownCategory::Work)),
            priority: None,
            tags: vec!["completion".to_string()],
            related_memories: Vec::new(),
        })
        .await
        .map_err(ApiError::from)?;
    tm_linker::link_manual(&state.memories, &state.tasks, &task.id, &memory.id).await.map_err(ApiError::from)?;
    Ok(memory)
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    to_status: String,
    #[serde(default)]
    force_complete: bool,
    #[serde(default)]
    skip_validation: bool,
}

async fn validate(State(state): State<AppState>, Path(id): Path<String>, Query(q): Query<ValidateQuery>) -> ApiResult<Json<tm_workflow::TransitionReport>> {
    let task = state.tasks.get(&id).await.map_err(ApiError::from)?;
    let to = TaskStatus::from_str_loose(&q.to_status).ok_or_else(|| ApiError::InvalidInput("unrecognized status".into()))?;
    let ctx = ValidationContext { force_complete: q.force_complete, skip_validation: q.skip_validation };
    let memories = tm_workflow::linked_memories(&state.memories, &task).await;
    Ok(Json(tm_workflow::validate(&task, to, &memories, &ctx)))
}

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    project: Option<String>,
}

async fn analytics(State(state): State<AppState>, Query(q): Query<AnalyticsQuery>) -> ApiResult<Json<tm_workflow::Analytics>> {
    let tasks = state.tasks.list(q.project.as_deref(), None, None).await.map_err(ApiError::from)?;
    Ok(Json(tm_workflow::analyze(&tasks, Utc::now())))
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s.to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    }
}

fn parse_category(raw: Option<String>) -> Option<Category> {
    raw.map(|s| serde_json::from_value(serde_json::Value::String(s.clone())).unwrap_or(Category::FreeForm(s)))
}
