//! tryon-tracker — the hybrid tracking scheduler.
//!
//! Coordinates a low-latency local provider and a slower remote provider on
//! independent polling cadences, arbitrates between their cached results,
//! and keeps running latency statistics per provider.

pub mod config;
pub mod scheduler;
pub mod stats;

pub use config::{TrackerConfig, TrackingMode};
pub use scheduler::HybridScheduler;
pub use stats::{PerformanceStats, ProviderStats};
