//! Distributed cache implementations.

pub mod redis;

pub use self::redis::{CacheStats, RedisCache};
