use fusion_common::error::{ErrorKind, FusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown integration named in action parameters: {0}")]
    UnknownIntegration(String),
    #[error("adapter for integration {0} does not implement ticketing")]
    NotTicketable(String),
    #[error("playbook invocation failed: {0}")]
    PlaybookFailed(String),
    #[error("alert delivery failed: {0}")]
    AlertFailed(String),
}

impl ActionError {
    pub fn into_fusion_error(self) -> FusionError {
        match &self {
            ActionError::UnknownIntegration(_) => FusionError::new(ErrorKind::NotFound, self.to_string()),
            ActionError::NotTicketable(_) => FusionError::new(ErrorKind::ValidationError, self.to_string()),
            ActionError::PlaybookFailed(_) => FusionError::new(ErrorKind::IntegrationError, self.to_string()),
            ActionError::AlertFailed(_) => FusionError::new(ErrorKind::IntegrationError, self.to_string()),
        }
    }
}
