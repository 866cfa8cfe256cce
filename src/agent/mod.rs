//! Telemetry agent lifecycle
//!
//! [`AgentLoop`] ties a sensor source, the payload builder and a publisher
//! together and runs the poll cycle until shutdown.

pub mod agent_loop;

pub use agent_loop::{AgentLoop, AgentState, CycleOutcome};
