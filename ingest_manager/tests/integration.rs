//! Integration Tests
//!
//! Aggregates every integration test module for the ingest manager so they
//! share one compiled test binary and one `support` module.

#[path = "support.rs"]
mod support;

#[path = "integration/coordinator_scenarios_test.rs"]
mod coordinator_scenarios_test;

#[path = "integration/change_decider_properties_test.rs"]
mod change_decider_properties_test;
