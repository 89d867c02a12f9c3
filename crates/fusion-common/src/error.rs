//! Error taxonomy for the fusion engine.
//!
//! Every error carries a wire-neutral `kind` plus context that identifies
//! which integration/tool/platform produced it, so callers at the RPC
//! boundary can render a stable code without inspecting the message.

use thiserror::Error;

/// Wire-neutral error codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    ValidationError,
    Unauthorized,
    AccessDenied,
    NotFound,
    DuplicateEntry,
    ConstraintViolation,
    ConnectionRefused,
    ConnectionTimeout,
    AuthenticationFailed,
    RateLimitExceeded,
    IntegrationError,
    CorrelationError,
    DatabaseError,
    SyncQueueFull,
    UnsupportedPlatform,
}

/// Context attached to every [`FusionError`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ErrorContext {
    pub integration_id: Option<String>,
    pub tool_type: Option<String>,
    pub platform: Option<String>,
    pub detail: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integration(mut self, id: impl Into<String>) -> Self {
        self.integration_id = Some(id.into());
        self
    }

    pub fn with_tool(mut self, tool_type: impl Into<String>, platform: impl Into<String>) -> Self {
        self.tool_type = Some(tool_type.into());
        self.platform = Some(platform.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(redact::redact_str(&detail.into()));
        self
    }
}

/// Top-level error type. Every recoverable failure in the engine is a
/// `FusionError`; only startup connectivity failures to the persistent
/// or side store are allowed to propagate as process-fatal (spec §7).
#[derive(Debug, Error)]
#[error("{kind:?}: {message} ({context:?})")]
pub struct FusionError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FusionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: redact::redact_str(&message.into()),
            context: ErrorContext::default(),
            source: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, what)
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, what)
    }

    pub fn unsupported_platform(tool_type: &str, platform: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedPlatform,
            format!("unsupported (type, platform) pair: ({tool_type}, {platform})"),
        )
        .with_context(ErrorContext::new().with_tool(tool_type, platform))
    }
}

pub type FusionResult<T> = Result<T, FusionError>;

/// Redaction of secret fields wherever errors or payloads are logged or
/// returned (spec §7). Field names are matched case-insensitively.
pub mod redact {
    const SECRET_FIELDS: &[&str] = &[
        "credentials",
        "credential",
        "token",
        "apikey",
        "api_key",
        "privatekey",
        "private_key",
        "password",
        "secret",
    ];

    /// Redact a free-form string: this is a best-effort scrub for log
    /// lines/detail messages, not a parser — it masks `key=value` and
    /// `"key": "value"` shapes for any known secret field name.
    pub fn redact_str(input: &str) -> String {
        let mut out = input.to_string();
        for field in SECRET_FIELDS {
            out = redact_pattern(&out, field);
        }
        out
    }

    fn redact_pattern(input: &str, field: &str) -> String {
        let lower = input.to_lowercase();
        let mut result = String::with_capacity(input.len());
        let mut rest = input;
        let mut lower_rest = lower.as_str();
        loop {
            match lower_rest.find(field) {
                Some(idx) => {
                    result.push_str(&rest[..idx]);
                    result.push_str("[REDACTED]");
                    // Skip past the field name and up to the next
                    // separator (",", "}", whitespace) to drop the value.
                    let after_field = idx + field.len();
                    let tail = &rest[after_field..];
                    let skip = tail
                        .find(|c: char| c == ',' || c == '}' || c == '\n')
                        .unwrap_or(tail.len());
                    rest = &tail[skip..];
                    lower_rest = &lower_rest[after_field + skip..];
                }
                None => {
                    result.push_str(rest);
                    break;
                }
            }
        }
        result
    }

    /// Redact the known secret keys of a JSON value in place, recursing
    /// into objects and arrays. Used before a payload is returned at the
    /// API boundary or written to a log.
    pub fn redact_json(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map.iter_mut() {
                    let lower = k.to_lowercase();
                    if SECRET_FIELDS.iter().any(|f| lower.contains(f)) {
                        *v = serde_json::Value::String("[REDACTED]".to_string());
                    } else {
                        redact_json(v);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    redact_json(item);
                }
            }
            _ => {}
        }
    }

}
