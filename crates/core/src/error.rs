use crate::task::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task not found: {0}")]
    TaskNotFound(crate::types::TaskId),

    #[error("Internal error: {0}")]
    Internal(String),
}
