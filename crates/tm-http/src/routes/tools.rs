//! `/api/mcp-tools/<name>` — a thin passthrough so the HTTP surface accepts
//! the same request shape as the stdio tool dispatcher for tools that have
//! no dedicated REST resource (the enhancement and maintenance tools).

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use tm_enhance::{Enhancement, Enhancer};

pub fn router() -> Router<AppState> {
    Router::new().route("/{name}", post(invoke))
}

fn already_enhanced(tags: &[String]) -> bool {
    tags.iter().any(|t| t.starts_with("title:") || t.starts_with("summary:"))
}

fn apply_enhancement_tags(tags: &mut Vec<String>, enhancement: &Enhancement) {
    tags.retain(|t| !t.starts_with("title:") && !t.starts_with("summary:"));
    tags.push(format!("title:{}", enhancement.title));
    tags.push(format!("summary:{}", enhancement.summary));
}

async fn invoke(State(state): State<AppState>, Path(name): Path<String>, body: Option<Json<Value>>) -> ApiResult<Json<Value>> {
    let args = body.map(|Json(v)| v).unwrap_or(Value::Null);
    match name.as_str() {
        "deduplicate_memories" => {
            let preview = args.get("preview").and_then(Value::as_bool).unwrap_or(false);
            let report = state.memories.deduplicate(preview).await.map_err(ApiError::from)?;
            Ok(Json(serde_json::to_value(report).unwrap_or(Value::Null)))
        }
        "enhance_memory_metadata" => {
            let id = args.get("id").and_then(Value::as_str).ok_or_else(|| ApiError::InvalidInput("missing 'id'".into()))?;
            let memory = state.memories.get(id).await.map_err(ApiError::from)?;
            let enhancement = state.rule_enhancer.enhance(&memory.content).await.map_err(ApiError::from)?;
            let updated = state
                .memories
                .update(id, |m| apply_enhancement_tags(&mut m.tags, &enhancement))
                .await
                .map_err(ApiError::from)?;
            Ok(Json(serde_json::to_value(updated).unwrap_or(Value::Null)))
        }
        "get_automation_suggestions" => {
            let id = args.get("id").and_then(Value::as_str).ok_or_else(|| ApiError::InvalidInput("missing 'id'".into()))?;
            let task = state.tasks.get(id).await.map_err(ApiError::from)?;
            let threshold = args.get("threshold").and_then(Value::as_f64).unwrap_or(tm_linker::DEFAULT_THRESHOLD);
            let top_k = args.get("top_k").and_then(Value::as_u64).map(|n| n as usize).unwrap_or(tm_linker::DEFAULT_TOP_K);
            let mut candidates = state.memories.list(Some(&task.project), None).await.map_err(ApiError::from)?;
            if candidates.is_empty() {
                candidates = state.memories.list(None, None).await.map_err(ApiError::from)?;
            }
            let mut scored: Vec<Value> = candidates
                .into_iter()
                .filter_map(|memory| {
                    let (score, matched) = tm_linker::relevance(&task, &memory);
                    (score >= threshold).then(|| serde_json::json!({ "memory_id": memory.id, "score": score, "matched_terms": matched }))
                })
                .collect();
            scored.sort_by(|a, b| b["score"].as_f64().unwrap_or(0.0).partial_cmp(&a["score"].as_f64().unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);
            Ok(Json(serde_json::json!({ "suggestions": scored })))
        }
        "batch_enhance_memories" => {
            let project = args.get("project").and_then(Value::as_str);
            let force_update = args.get("force_update").and_then(Value::as_bool).unwrap_or(false);
            let memories = state.memories.list(project, None).await.map_err(ApiError::from)?;
            let candidate_ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
            state.memories.snapshot_many(&candidate_ids).await.map_err(ApiError::from)?;
            let (outcomes, trip) = tm_enhance::batch_enhance(
                state.rule_enhancer.as_ref(),
                memories,
                |m: &tm_store::Memory| already_enhanced(&m.tags),
                |m: &tm_store::Memory| m.content.clone(),
                force_update,
                |_, _| {},
            )
            .await;
            let mut enhanced = Vec::new();
            for (memory, outcome) in outcomes {
                let enhancement = outcome.map_err(ApiError::from)?;
                let updated = state
                    .memories
                    .update(&memory.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement))
                    .await
                    .map_err(ApiError::from)?;
                enhanced.push(updated.id);
            }
            Ok(Json(serde_json::json!({ "enhanced": enhanced, "trip": trip })))
        }
        "enhance_memory_ai" => {
            #[cfg(feature = "http")]
            {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| ApiError::InvalidInput("missing 'id'".into()))?;
                let enhancer = state.http_enhancer.as_ref().ok_or_else(|| ApiError::InvalidInput("TM_ENHANCE_URL is not configured".into()))?;
                let memory = state.memories.get(id).await.map_err(ApiError::from)?;
                let enhancement = enhancer.enhance(&memory.content).await.map_err(ApiError::from)?;
                let updated = state
                    .memories
                    .update(id, |m| apply_enhancement_tags(&mut m.tags, &enhancement))
                    .await
                    .map_err(ApiError::from)?;
                Ok(Json(serde_json::to_value(updated).unwrap_or(Value::Null)))
            }
            #[cfg(not(feature = "http"))]
            {
                Err(ApiError::InvalidInput("this build was compiled without AI enhancement support".into()))
            }
        }
        "batch_enhance_memories_ai" => {
            #[cfg(feature = "http")]
            {
                let enhancer = state.http_enhancer.as_ref().ok_or_else(|| ApiError::InvalidInput("TM_ENHANCE_URL is not configured".into()))?;
                let project = args.get("project").and_then(Value::as_str);
                let force_update = args.get("force_update").and_then(Value::as_bool).unwrap_or(false);
                let memories = state.memories.list(project, None).await.map_err(ApiError::from)?;
                let candidate_ids: Vec<String> = memories.iter().map(|m| m.id.clone()).collect();
                state.memories.snapshot_many(&candidate_ids).await.map_err(ApiError::from)?;
                let (outcomes, trip) = tm_enhance::batch_enhance(
                    enhancer.as_ref(),
                    memories,
                    |m: &tm_store::Memory| already_enhanced(&m.tags),
                    |m: &tm_store::Memory| m.content.clone(),
                    force_update,
                    |_, _| {},
                )
                .await;
                let mut enhanced = Vec::new();
                for (memory, outcome) in outcomes {
                    let enhancement = outcome.map_err(ApiError::from)?;
                    let updated = state
                        .memories
                        .update(&memory.id, |m| apply_enhancement_tags(&mut m.tags, &enhancement))
                        .await
                        .map_err(ApiError::from)?;
                    enhanced.push(updated.id);
                }
                Ok(Json(serde_json::json!({ "enhanced": enhanced, "trip": trip })))
            }
            #[cfg(not(feature = "http"))]
            {
                Err(ApiError::InvalidInput("this build was compiled without AI enhancement support".into()))
            }
        }
        "check_ai_status" => {
            #[cfg(feature = "http")]
            let configured = state.http_enhancer.is_some();
            #[cfg(not(feature = "http"))]
            let configured = false;
            Ok(Json(serde_json::json!({ "configured": configured })))
        }
        "generate_dropoff" => {
            let project = args.get("project").and_then(Value::as_str);
            let active = state.tasks.list(project, Some(tm_store::TaskStatus::InProgress), Some(10)).await.map_err(ApiError::from)?;
            let blocked = state.tasks.list(project, Some(tm_store::TaskStatus::Blocked), Some(10)).await.map_err(ApiError::from)?;
            let recent_memories = state.memories.list(project, Some(10)).await.map_err(ApiError::from)?;
            Ok(Json(serde_json::json!({ "active_tasks": active, "blocked_tasks": blocked, "recent_memories": recent_memories })))
        }
        "test_tool" => Ok(Json(serde_json::json!({ "ok": true, "timestamp": chrono::Utc::now() }))),
        other => Err(ApiError::InvalidInput(format!("unknown tool '{other}'"))),
    }
}
