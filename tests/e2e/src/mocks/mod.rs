//! Fixtures and data factories

mod fixtures;

pub use fixtures::{BatchConfig, TestDataFactory, TestScenario};
