//! Observability for the telemetry agent
//!
//! Structured logging through `tracing`; see [`logging`] for the
//! environment variables that control it.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{cycle_span, lifecycle_span, mqtt_span};
