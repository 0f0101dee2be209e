/// Locally generated task identifier, stable for the lifetime of a run.
pub type TaskId = uuid::Uuid;

/// Identifier of a batch of tasks created by one user action.
pub type BatchId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
