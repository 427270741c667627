//! Shared test fixtures.

pub mod mocks;
