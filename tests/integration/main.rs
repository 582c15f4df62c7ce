//! Integration tests for Sumi-Gather
//!
//! Adapter and directive tests run against wiremock servers. Orchestration
//! tests use scripted in-process adapters so that outcomes are deterministic.

mod limiter_tests;
mod orchestrator_tests;
mod pipeline_tests;
