//! Skycache - Versioned Shared Lookup Cache
//!
//! Caches location, weather-station and forecast-zone lookups shared by
//! many concurrent invocations, using per-record optimistic concurrency so
//! racing writers never lose each other's updates.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod user;

pub use error::{SkycacheError, SkycacheResult};
