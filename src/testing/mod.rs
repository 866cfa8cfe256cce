//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the telemetry agent
//! without an MQTT broker or sensor hardware.

pub mod mocks;

pub use mocks::*;
