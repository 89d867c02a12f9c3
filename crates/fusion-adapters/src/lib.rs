//! Integration adapters: the universal lifecycle contract, capability
//! traits, concrete vendor connectors, and the construction/resilience
//! machinery shared across all of them (spec §4.1, §4.2).

pub mod adapter;
pub mod connectors;
pub mod error;
pub mod events;
pub mod factory;
pub mod mapping;
pub mod resilience;

pub use adapter::{Adapter, AdapterState, AdapterStateCell, Remediable, Scannable, SiemSearchable, SyncFilter, Ticketable};
pub use error::AdapterError;
pub use events::{AdapterEvent, EventSink, SyncCounts};
pub use factory::{build_adapter, ConcreteAdapter};
pub use mapping::{apply_field_mappings, map_severity, FieldMapError};
pub use resilience::{retry_with_backoff, RateLimiter};
