use storyforge_core::error::CoreError;
use storyforge_core::task::TaskKind;
use storyforge_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No job client configured for kind {0}")]
    MissingClient(TaskKind),
}
