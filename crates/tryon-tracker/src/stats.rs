//! Per-provider latency statistics.

use serde::Serialize;

/// Running latency statistics for one provider. Monotonically updated,
/// never reset within a session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProviderStats {
    pub sample_count: u64,
    pub average_latency_ms: f64,
}

impl ProviderStats {
    /// Fold one completed detection's latency into the running mean using
    /// the incremental-mean formula, so the value always equals the exact
    /// arithmetic mean of every recorded sample.
    pub fn record(&mut self, latency_ms: f64) {
        self.average_latency_ms +=
            (latency_ms - self.average_latency_ms) / (self.sample_count as f64 + 1.0);
        self.sample_count += 1;
    }
}

/// Snapshot of both providers' statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerformanceStats {
    pub local: ProviderStats,
    pub remote: ProviderStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_mean_matches_direct_mean() {
        let samples = [5.0, 7.5, 12.0, 100.0, 0.25, 33.3, 8.0];
        let mut stats = ProviderStats::default();
        for s in samples {
            stats.record(s);
        }
        let direct: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert_eq!(stats.sample_count, samples.len() as u64);
        assert!((stats.average_latency_ms - direct).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_is_its_own_mean() {
        let mut stats = ProviderStats::default();
        stats.record(42.0);
        assert_eq!(stats.sample_count, 1);
        assert!((stats.average_latency_ms - 42.0).abs() < 1e-12);
    }
}
