//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Per-replicable counters
//! - Typed replication events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. Failures to log never fail the caller
//! 3. No background threads
//! 4. Deterministic key ordering
//!
//! # Usage
//!
//! ```ignore
//! use regatta_replication::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::ReplicationStarted, &[("master", "m1:8888")]);
//!
//! let scope = ObservationScope::new(Event::InitialLoad);
//! // ... read the stream ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, ReplicationMetrics};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
