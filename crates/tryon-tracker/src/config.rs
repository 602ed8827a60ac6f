//! Tracker configuration, loaded from environment variables with defaults.
//!
//! The confidence threshold and cadence factors were undocumented constants
//! in the system this replaces; they are knobs here, defaulting to the
//! original behavior.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Which provider(s) the scheduler polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingMode {
    LocalOnly,
    RemoteOnly,
    Hybrid,
}

impl FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-only" | "local" => Ok(TrackingMode::LocalOnly),
            "remote-only" | "remote" => Ok(TrackingMode::RemoteOnly),
            "hybrid" => Ok(TrackingMode::Hybrid),
            other => Err(format!("unknown tracking mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub mode: TrackingMode,
    /// Local polling period; also the base the remote cadences derive from.
    pub local_interval: Duration,
    /// In hybrid mode the remote provider polls every
    /// `local_interval * hybrid_remote_factor`.
    pub hybrid_remote_factor: u32,
    /// In remote-only mode the remote provider polls every
    /// `interval * remote_only_factor` (halved cadence).
    pub remote_only_factor: u32,
    /// A local result must exceed this confidence for `best_result` to
    /// prefer it over the remote result. Strictly greater-than.
    pub confidence_threshold: f64,
    /// Result channel capacity handed out by `start`.
    pub channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Hybrid,
            local_interval: Duration::from_millis(100),
            hybrid_remote_factor: 4,
            remote_only_factor: 2,
            confidence_threshold: 0.7,
            channel_capacity: 4,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from `TRYON_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mode: std::env::var("TRYON_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.mode),
            local_interval: Duration::from_millis(env_u64(
                "TRYON_LOCAL_INTERVAL_MS",
                defaults.local_interval.as_millis() as u64,
            )),
            hybrid_remote_factor: env_u32("TRYON_HYBRID_REMOTE_FACTOR", defaults.hybrid_remote_factor),
            remote_only_factor: env_u32("TRYON_REMOTE_ONLY_FACTOR", defaults.remote_only_factor),
            confidence_threshold: env_f64("TRYON_CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            channel_capacity: env_u64("TRYON_CHANNEL_CAPACITY", defaults.channel_capacity as u64)
                as usize,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
