//! Adapter construction and capability lookup (spec §4.1, §4.2).
//!
//! `build_adapter` is the fail-fast `(tool_type, platform)` constructor:
//! unsupported pairs never produce an adapter. `ConcreteAdapter` is the
//! closed enum the REDESIGN FLAGS in `adapter.rs` call for — callers
//! that need a capability (`Scannable`, `Ticketable`, `SiemSearchable`,
//! `Remediable`) match on it instead of downcasting a trait object.

use crate::adapter::{Adapter, Remediable, Scannable, SiemSearchable, Ticketable};
use crate::connectors::cloud::CloudSecurityAdapter;
use crate::connectors::scanner::{GenericScannerAdapter, NessusAdapter};
use crate::connectors::siem::{GenericSiemAdapter, SplunkAdapter};
use crate::connectors::ticketing::{GenericTicketingAdapter, JiraAdapter};
use crate::error::AdapterError;
use crate::events::EventSink;
use fusion_common::error::{ErrorContext, FusionResult};
use fusion_common::integration::{is_supported, ConnectionConfig, SeverityMapping};
use std::sync::Arc;

pub enum ConcreteAdapter {
    Splunk(Arc<SplunkAdapter>),
    GenericSiem(Arc<GenericSiemAdapter>),
    Nessus(Arc<NessusAdapter>),
    GenericScanner(Arc<GenericScannerAdapter>),
    Cloud(Arc<CloudSecurityAdapter>),
    Jira(Arc<JiraAdapter>),
    GenericTicketing(Arc<GenericTicketingAdapter>),
}

impl ConcreteAdapter {
    pub fn as_adapter(&self) -> Arc<dyn Adapter> {
        match self {
            ConcreteAdapter::Splunk(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::GenericSiem(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::Nessus(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::GenericScanner(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::Cloud(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::Jira(a) => a.clone() as Arc<dyn Adapter>,
            ConcreteAdapter::GenericTicketing(a) => a.clone() as Arc<dyn Adapter>,
        }
    }

    pub fn as_scannable(&self) -> Option<Arc<dyn Scannable>> {
        match self {
            ConcreteAdapter::Nessus(a) => Some(a.clone() as Arc<dyn Scannable>),
            ConcreteAdapter::GenericScanner(a) => Some(a.clone() as Arc<dyn Scannable>),
            _ => None,
        }
    }

    pub fn as_ticketable(&self) -> Option<Arc<dyn Ticketable>> {
        match self {
            ConcreteAdapter::Jira(a) => Some(a.clone() as Arc<dyn Ticketable>),
            ConcreteAdapter::GenericTicketing(a) => Some(a.clone() as Arc<dyn Ticketable>),
            _ => None,
        }
    }

    pub fn as_siem_searchable(&self) -> Option<Arc<dyn SiemSearchable>> {
        match self {
            ConcreteAdapter::Splunk(a) => Some(a.clone() as Arc<dyn SiemSearchable>),
            ConcreteAdapter::GenericSiem(a) => Some(a.clone() as Arc<dyn SiemSearchable>),
            _ => None,
        }
    }

    pub fn as_remediable(&self) -> Option<Arc<dyn Remediable>> {
        match self {
            ConcreteAdapter::Cloud(a) => Some(a.clone() as Arc<dyn Remediable>),
            _ => None,
        }
    }
}

/// Construct the concrete adapter for a `(tool_type, platform)` pair.
/// Fails fast with `UnsupportedIntegration` for any pair outside the
/// whitelist (spec §4.2), before any connection attempt is made.
pub fn build_adapter(
    integration_id: String,
    tool_type: &str,
    platform: &str,
    config: ConnectionConfig,
    severity_mapping: SeverityMapping,
    sink: EventSink,
) -> FusionResult<ConcreteAdapter> {
    if !is_supported(tool_type, platform) {
        return Err(AdapterError::UnsupportedIntegration {
            tool_type: tool_type.to_string(),
            platform: platform.to_string(),
        }
        .into_fusion_error(ErrorContext::new().with_tool(tool_type, platform)));
    }

    let adapter = match (tool_type, platform) {
        ("siem", "splunk") => ConcreteAdapter::Splunk(Arc::new(SplunkAdapter::new(integration_id, config, severity_mapping, sink))),
        ("siem", other) => {
            ConcreteAdapter::GenericSiem(Arc::new(GenericSiemAdapter::new(integration_id, leak_platform(other), config, severity_mapping, sink)))
        }
        ("vulnerability-scanner", "nessus") => {
            ConcreteAdapter::Nessus(Arc::new(NessusAdapter::new(integration_id, config, severity_mapping, sink)))
        }
        ("vulnerability-scanner", other) => ConcreteAdapter::GenericScanner(Arc::new(GenericScannerAdapter::new(
            integration_id,
            leak_platform(other),
            config,
            severity_mapping,
            sink,
        ))),
        ("cloud-security", other) => {
            ConcreteAdapter::Cloud(Arc::new(CloudSecurityAdapter::new(integration_id, leak_platform(other), config, severity_mapping, sink)))
        }
        ("ticketing", "jira") => ConcreteAdapter::Jira(Arc::new(JiraAdapter::new(integration_id, config, sink))),
        ("ticketing", other) => {
            ConcreteAdapter::GenericTicketing(Arc::new(GenericTicketingAdapter::new(integration_id, leak_platform(other), config, sink)))
        }
        _ => {
            return Err(AdapterError::UnsupportedIntegration {
                tool_type: tool_type.to_string(),
                platform: platform.to_string(),
            }
            .into_fusion_error(ErrorContext::new().with_tool(tool_type, platform)))
        }
    };
    Ok(adapter)
}

/// Generic adapters take a `&'static str` platform tag; the whitelist is
/// closed and small, so leaking the (bounded, finite) set of platform
/// strings is preferable to threading an owned `String` through every
/// generic adapter's fields.
fn leak_platform(platform: &str) -> &'static str {
    Box::leak(platform.to_string().into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_common::integration::AuthType;
    use std::collections::HashMap;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            endpoint: "https://x".to_string(),
            auth_type: AuthType::Token,
            credentials: serde_json::Value::Null,
            timeout_secs: 5,
            retry_attempts: 1,
            ssl_verify: true,
            proxy: None,
            custom_headers: HashMap::new(),
        }
    }

    #[test]
    fn unsupported_pair_fails_fast() {
        let (sink, _rx) = crate::events::event_channel(1);
        let result = build_adapter("i1".into(), "siem", "datadog", config(), SeverityMapping::default(), sink);
        assert!(result.is_err());
    }

    #[test]
    fn splunk_resolves_to_siem_searchable_capability() {
        let (sink, _rx) = crate::events::event_channel(1);
        let adapter = build_adapter("i1".into(), "siem", "splunk", config(), SeverityMapping::default(), sink).unwrap();
        assert!(adapter.as_siem_searchable().is_some());
        assert!(adapter.as_scannable().is_none());
    }

    #[test]
    fn jira_resolves_to_ticketable_capability() {
        let (sink, _rx) = crate::events::event_channel(1);
        let adapter = build_adapter("i1".into(), "ticketing", "jira", config(), SeverityMapping::default(), sink).unwrap();
        assert!(adapter.as_ticketable().is_some());
    }
}
