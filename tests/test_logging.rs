//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing and configuration from environment variables.

use telemetry_agent::observability::logging::{
    build_filter, parse_level, parse_spans_flag, LogFormat,
};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty_and_compact() {
    assert!(matches!(LogFormat::parse("Pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("COMPACT"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    // unattended devices ship logs off-box, JSON is the safe default
    for input in ["invalid", "", "xml", "  pretty  "] {
        assert!(
            matches!(LogFormat::parse(input), LogFormat::Json),
            "Failed for input: '{input}'"
        );
    }
}

#[test]
fn test_log_level_defaults_to_info() {
    assert_eq!(parse_level("bogus"), Level::INFO);
    assert_eq!(parse_level("debug"), Level::DEBUG);
}

#[test]
fn test_spans_flag_only_accepts_true() {
    assert!(parse_spans_flag("True"));
    assert!(!parse_spans_flag("on"));
}

#[test]
fn test_filter_keeps_mqtt_stack_quiet() {
    let filter = build_filter(Level::TRACE).to_string();
    assert!(filter.contains("rumqttc=warn"));
    assert!(filter.contains("tokio=warn"));
    assert!(filter.contains("trace"));
}
