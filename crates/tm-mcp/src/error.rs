//! Unifies every subsystem's error enum into one type so a single handler
//! body can call across `tm-store`/`tm-linker`/`tm-workflow`/`tm-enhance`
//! and still hand `dispatch` one concrete error type.

use tm_core::{Classify, ErrorKind};
use tm_enhance::EnhanceError;
use tm_linker::LinkError;
use tm_store::StoreError;
use tm_workflow::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
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

impl Classify for ToolError {
    fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Store(e) => e.kind(),
            ToolError::Link(e) => e.kind(),
            ToolError::Workflow(e) => e.kind(),
            ToolError::Enhance(e) => e.kind(),
            ToolError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}
