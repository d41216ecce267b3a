//! Unifies subsystem errors into one type and renders them as the same
//! `ErrorEnvelope` JSON body the tool dispatcher emits, with a matching
//! HTTP status derived from `ErrorKind`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tm_core::{Classify, ErrorEnvelope, ErrorKind};
use tm_enhance::EnhanceError;
use tm_linker::LinkError;
use tm_store::StoreError;
use tm_workflow::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Enhance(#[from] EnhanceError),
    #[error("{0}")]
    InvalidInput(String),
}

impl Classify for ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Store(e) => e.kind(),
            ApiError::Link(e) => e.kind(),
            ApiError::Workflow(e) => e.kind(),
            ApiError::Enhance(e) => e.kind(),
            ApiError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::External => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::from(&self);
        (status_for(self.kind()), Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
