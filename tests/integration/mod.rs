//! Integration tests for fleet-probe.

pub mod http_test;
pub mod websocket_test;
