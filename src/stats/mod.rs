//! Counters for connections, the registry and the server

pub mod metrics;

pub use metrics::{ConnectionCounters, ConnectionStats, RegistryStats, ServerCounters, ServerStats};
