//! Result-envelope helpers shared by every tool handler.
//!
//! Handlers return `Result<CallToolResult, ErrorData>`; `ErrorData` is
//! rendered by `rmcp` as a JSON-RPC error response without unwinding the
//! process, so the dispatcher never exits on a tool failure.

use std::future::Future;
use std::time::Duration;

use rmcp::model::{CallToolResult, Content, ErrorData};
use serde::Serialize;
use tm_core::{Classify, ErrorKind};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

pub fn ok_json<T: Serialize>(value: &T) -> CallToolResult {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
    CallToolResult::success(vec![Content::text(text)])
}

pub fn to_error_data<E: Classify + std::fmt::Display>(err: &E) -> ErrorData {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::NotFound | ErrorKind::Forbidden => {
            ErrorData::invalid_params(message, None)
        }
        ErrorKind::Conflict | ErrorKind::Timeout | ErrorKind::External | ErrorKind::Internal => {
            ErrorData::internal_error(message, None)
        }
    }
}

/// Runs `fut` under the default per-tool deadline, converting a domain
/// error or a timeout into the same `ErrorData` shape `rmcp` expects.
pub async fn dispatch<T, E, F>(fut: F) -> Result<CallToolResult, ErrorData>
where
    T: Serialize,
    E: Classify + std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(DEFAULT_DEADLINE, fut).await {
        Ok(Ok(value)) => Ok(ok_json(&value)),
        Ok(Err(err)) => Err(to_error_data(&err)),
        Err(_) => Err(ErrorData::internal_error("tool handler exceeded its deadline", None)),
    }
}
