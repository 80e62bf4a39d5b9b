//! Service layer: upstream resilience, the document store and the
//! calendar scheduling engine.
//!
//! The upstream client composes the retry executor and the circuit
//! breaker; handlers only ever talk to [`UpstreamClient`] and the
//! [`DocumentStore`] and [`CalendarStore`] traits.

pub mod calendar_store;
pub mod circuit_breaker;
pub mod document_store;
pub mod retry;
pub mod scheduling;
pub mod upstream_client;

// Re-export commonly used types
pub use calendar_store::{
    CalendarConfig, CalendarEvent, CalendarProvider, CalendarStore, EventStatus,
    InMemoryCalendarStore,
};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use document_store::{DocumentError, DocumentStore, InMemoryDocumentStore, StoredDocument};
pub use retry::{RetryExecutor, RetryPolicy};
pub use scheduling::SchedulingError;
pub use upstream_client::{create_http_client, UpstreamClient};
