//! Shared harness for the lead router's integration tests.

pub mod containers;
pub mod fixtures;
pub mod mocks;
