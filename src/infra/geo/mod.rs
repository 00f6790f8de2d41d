//! Geolocation provider implementations.

pub mod ipstack;

pub use ipstack::{DEFAULT_IPSTACK_URL, IpStackClient};
