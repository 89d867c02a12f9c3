use fusion_common::error::{ErrorContext, ErrorKind, FusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("integration not found: {0}")]
    NotFound(String),
    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
    #[error("unsupported platform: ({tool_type}, {platform})")]
    UnsupportedPlatform { tool_type: String, platform: String },
}

impl RegistryError {
    pub fn into_fusion_error(self) -> FusionError {
        match &self {
            RegistryError::NotFound(id) => {
                FusionError::new(ErrorKind::NotFound, self.to_string()).with_context(ErrorContext::new().with_integration(id))
            }
            RegistryError::RequiredFieldMissing(_) => FusionError::new(ErrorKind::ValidationError, self.to_string()),
            RegistryError::UnsupportedPlatform { tool_type, platform } => {
                FusionError::new(ErrorKind::UnsupportedPlatform, self.to_string()).with_context(ErrorContext::new().with_tool(tool_type, platform))
            }
        }
    }
}
