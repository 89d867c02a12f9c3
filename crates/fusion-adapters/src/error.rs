//! Adapter-level failure mapping (spec §4.1 "Failure mapping").

use fusion_common::error::{ErrorContext, ErrorKind, FusionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection timed out")]
    ConnectionTimeout,
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("rate limit exceeded, retry after {retry_after_secs:?}s")]
    RateLimitExceeded { retry_after_secs: Option<u64> },
    /// A 5xx vendor response or a transport failure that isn't a plain
    /// connect/timeout (spec.md:65 "transient-network") — `status` is
    /// `None` for the latter. Retryable.
    #[error("integration error ({status:?}): {message}")]
    IntegrationError { status: Option<u16>, message: String },
    /// A non-5xx vendor response outside the dedicated variants above
    /// (400, 404, 418, ...) — a deterministically-failing request that
    /// backoff cannot fix. Not retryable.
    #[error("client error ({status}): {message}")]
    ClientError { status: u16, message: String },
    #[error("unsupported integration: ({tool_type}, {platform})")]
    UnsupportedIntegration { tool_type: String, platform: String },
    #[error("required field missing: {0}")]
    RequiredFieldMissing(String),
}

impl AdapterError {
    /// Whether a raw transport failure of this shape should be retried
    /// under the backoff policy (spec §4.1 "Retry/rate-limit discipline").
    /// Scoped to exactly spec.md:65's set: connection-refused, timeout,
    /// 5xx, transient-network.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionRefused | AdapterError::ConnectionTimeout | AdapterError::IntegrationError { .. }
        )
    }

    pub fn into_fusion_error(self, context: ErrorContext) -> FusionError {
        let kind = match &self {
            AdapterError::ConnectionRefused => ErrorKind::ConnectionRefused,
            AdapterError::ConnectionTimeout => ErrorKind::ConnectionTimeout,
            AdapterError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            AdapterError::AccessDenied(_) => ErrorKind::AccessDenied,
            AdapterError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AdapterError::UnsupportedIntegration { .. } => ErrorKind::UnsupportedPlatform,
            AdapterError::RequiredFieldMissing(_) => ErrorKind::ValidationError,
            AdapterError::IntegrationError { .. } => ErrorKind::IntegrationError,
            AdapterError::ClientError { .. } => ErrorKind::ValidationError,
        };
        let message = self.to_string();
        FusionError::new(kind, message).with_context(context)
    }
}

/// Classify a raw transport outcome into the canonical adapter error
/// (spec §4.1 "Failure mapping" table). Adapters funnel every vendor
/// call result through this before surfacing an error.
pub fn classify_http_status(status: u16, vendor_message: &str) -> Option<AdapterError> {
    match status {
        200..=299 => None,
        401 => Some(AdapterError::AuthenticationFailed(vendor_message.to_string())),
        403 => Some(AdapterError::AccessDenied(vendor_message.to_string())),
        429 => Some(AdapterError::RateLimitExceeded { retry_after_secs: None }),
        500..=599 => Some(AdapterError::IntegrationError {
            status: Some(status),
            message: vendor_message.to_string(),
        }),
        _ => Some(AdapterError::ClientError {
            status,
            message: vendor_message.to_string(),
        }),
    }
}

pub fn classify_transport_error(err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::ConnectionTimeout
    } else if err.is_connect() {
        AdapterError::ConnectionRefused
    } else {
        AdapterError::IntegrationError {
            status: None,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_5xx_as_retryable_integration_error() {
        let err = classify_http_status(503, "unavailable").unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_429_as_rate_limited_not_retryable_by_default_policy() {
        let err = classify_http_status(429, "slow down").unwrap();
        assert!(matches!(err, AdapterError::RateLimitExceeded { .. }));
    }

    #[test]
    fn classifies_401_as_auth_failure() {
        let err = classify_http_status(401, "bad token").unwrap();
        assert!(matches!(err, AdapterError::AuthenticationFailed(_)));
    }

    #[test]
    fn classifies_400_as_client_error_not_retryable() {
        let err = classify_http_status(400, "malformed request").unwrap();
        assert!(matches!(err, AdapterError::ClientError { status: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn classifies_404_as_client_error_not_retryable() {
        let err = classify_http_status(404, "not found").unwrap();
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_network_transport_error_is_retryable() {
        let err = AdapterError::IntegrationError {
            status: None,
            message: "reset by peer".to_string(),
        };
        assert!(err.is_retryable());
    }
}
