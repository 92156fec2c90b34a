//! End-to-end test support for the Trellis memory graph
//!
//! - `harness`: isolated graphs on temporary databases
//! - `mocks`: deterministic node and edge fixtures

pub mod harness;
pub mod mocks;
