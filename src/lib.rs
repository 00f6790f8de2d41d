//! Chain-data normalization and presentation engine for an RPC block explorer.
//!
//! Lossless numeric decoding, coin-unit and exchange-rate formatting, magnitude
//! scaling, IP geolocation caching, miner attribution and chain economics.

pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
