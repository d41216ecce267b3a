//! `/api/memories` — mirrors the `*_memory` tools over REST.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{paginate, PageParams, Paginated};
use crate::state::AppState;
use tm_store::{Category, Memory, NewMemory, Priority};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/search", get(search))
        .route("/{id}", get(one).delete(remove))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageParams,
    project: Option<String>,
}

async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> ApiResult<Json<Paginated<Memory>>> {
    let memories = state.memories.list(q.project.as_deref(), None).await.map_err(ApiError::from)?;
    Ok(Json(paginate(memories, &q.page)))
}

#[derive(Debug, Deserialize)]
struct AddBody {
    content: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    related_memories: Vec<String>,
}

async fn add(State(state): State<AppState>, Json(body): Json<AddBody>) -> ApiResult<Json<Memory>> {
    let memory = state
        .memories
        .add(NewMemory {
            content: body.content,
            project: body.project,
            category: parse_category(body.category),
            priority: body.priority.as_deref().and_then(parse_priority),
            tags: body.tags,
            related_memories: body.related_memories,
        })
        .await
        .map_err(ApiError::from)?;
    Ok(Json(memory))
}

async fn one(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Memory>> {
    Ok(Json(state.memories.get(&id).await.map_err(ApiError::from)?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let memory = state.memories.get(&id).await.map_err(ApiError::from)?;
    let referencing: Vec<String> = memory.task_connections.iter().map(|c| c.task_id.clone()).collect();
    state.memories.delete(&id).await.map_err(ApiError::from)?;
    tm_linker::unlink_memory(&state.tasks, &id, &referencing).await.map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    project: Option<String>,
}

async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> ApiResult<Json<Vec<Memory>>> {
    Ok(Json(state.memories.search(&q.q, q.project.as_deref()).await.map_err(ApiError::from)?))
}

fn parse_category(raw: Option<String>) -> Option<Category> {
    raw.map(|s| serde_json::from_value(serde_json::Value::String(s.clone())).unwrap_or(Category::FreeForm(s)))
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
