use fusion_common::error::{ErrorKind, FusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("sync queue is full")]
    SyncQueueFull,
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    pub fn into_fusion_error(self) -> FusionError {
        match &self {
            OrchestratorError::SyncQueueFull => FusionError::new(ErrorKind::SyncQueueFull, self.to_string()),
            OrchestratorError::ShuttingDown => FusionError::new(ErrorKind::IntegrationError, self.to_string()),
        }
    }
}
