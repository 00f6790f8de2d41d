//! Test doubles for the provider traits.

pub mod mocks;

pub use mocks::{MockDistributedCache, MockGeoProvider, MockRateSource};
