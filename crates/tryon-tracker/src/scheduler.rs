//! Hybrid scheduler — polls the local and remote providers on independent
//! cadences, arbitrates between their results, and delivers the winner to
//! the subscriber over a channel.
//!
//! Providers are injected at construction; the scheduler owns nothing
//! global. Each `start` period carries an epoch: a detection that completes
//! after `stop()` (or a restart) finds the epoch stale and its result is
//! dropped rather than delivered.

use crate::config::{TrackerConfig, TrackingMode};
use crate::stats::{PerformanceStats, ProviderStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tryon_core::DetectionResult;
use tryon_providers::{DetectionProvider, FrameSource, RawFrame};

/// Recover the guard from a poisoned lock; all guarded values here are
/// plain data that stays consistent under whole-value replacement.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type ResultSlot = Arc<Mutex<Option<DetectionResult>>>;
type StatsSlot = Arc<Mutex<ProviderStats>>;

pub struct HybridScheduler {
    local: Arc<dyn DetectionProvider>,
    remote: Arc<dyn DetectionProvider>,
    config: TrackerConfig,
    mode: Mutex<TrackingMode>,
    last_local: ResultSlot,
    last_remote: ResultSlot,
    local_stats: StatsSlot,
    remote_stats: StatsSlot,
    /// Bumped by every `start` and `stop`; loop tasks deliver only while
    /// their start-period epoch is current.
    epoch: Arc<AtomicU64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HybridScheduler {
    pub fn new(
        local: Arc<dyn DetectionProvider>,
        remote: Arc<dyn DetectionProvider>,
        config: TrackerConfig,
    ) -> Self {
        let mode = config.mode;
        Self {
            local,
            remote,
            config,
            mode: Mutex::new(mode),
            last_local: Arc::new(Mutex::new(None)),
            last_remote: Arc::new(Mutex::new(None)),
            local_stats: Arc::new(Mutex::new(ProviderStats::default())),
            remote_stats: Arc::new(Mutex::new(ProviderStats::default())),
            epoch: Arc::new(AtomicU64::new(0)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> TrackingMode {
        *lock(&self.mode)
    }

    /// Start the polling loops for the current mode, stopping any existing
    /// ones first. Chosen results arrive on the returned channel.
    ///
    /// In hybrid mode the local provider drives the channel (fast path)
    /// while the remote provider polls at `interval × hybrid_remote_factor`
    /// purely to refresh its cached result and statistics.
    pub fn start(
        &self,
        frames: Arc<dyn FrameSource>,
        interval: Duration,
    ) -> mpsc::Receiver<DetectionResult> {
        self.stop();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let mode = self.mode();
        tracing::info!(?mode, interval_ms = interval.as_millis() as u64, "tracking started");

        let mut tasks = Vec::new();
        match mode {
            TrackingMode::Hybrid => {
                tasks.push(self.spawn_loop(
                    Arc::clone(&self.local),
                    Arc::clone(&frames),
                    interval,
                    Arc::clone(&self.last_local),
                    Arc::clone(&self.local_stats),
                    Some(tx),
                    epoch,
                ));
                tasks.push(self.spawn_loop(
                    Arc::clone(&self.remote),
                    frames,
                    interval * self.config.hybrid_remote_factor,
                    Arc::clone(&self.last_remote),
                    Arc::clone(&self.remote_stats),
                    None,
                    epoch,
                ));
            }
            TrackingMode::LocalOnly => {
                tasks.push(self.spawn_loop(
                    Arc::clone(&self.local),
                    frames,
                    interval,
                    Arc::clone(&self.last_local),
                    Arc::clone(&self.local_stats),
                    Some(tx),
                    epoch,
                ));
            }
            TrackingMode::RemoteOnly => {
                tasks.push(self.spawn_loop(
                    Arc::clone(&self.remote),
                    frames,
                    interval * self.config.remote_only_factor,
                    Arc::clone(&self.last_remote),
                    Arc::clone(&self.remote_stats),
                    Some(tx),
                    epoch,
                ));
            }
        }

        *lock(&self.tasks) = tasks;
        rx
    }

    /// Cancel the polling loops. Idempotent and safe to call at any time,
    /// including while a detection is in flight: the epoch bump guarantees
    /// that detection's completion is never delivered.
    pub fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }

    /// Switch tracking mode. Stops the loops; the caller restarts with
    /// `start` when ready.
    pub fn set_mode(&self, mode: TrackingMode) {
        self.stop();
        *lock(&self.mode) = mode;
        tracing::info!(?mode, "tracking mode changed; loops stopped");
    }

    /// One-shot detection outside the polling loops. In hybrid mode the
    /// local provider is tried first and the remote provider is the
    /// fallback.
    pub async fn detect_once(&self, frame: &RawFrame) -> Option<DetectionResult> {
        match self.mode() {
            TrackingMode::LocalOnly => self.detect_with_local(frame).await,
            TrackingMode::RemoteOnly => self.detect_with_remote(frame).await,
            TrackingMode::Hybrid => {
                if self.local.is_initialized() {
                    if let Some(result) = self.detect_with_local(frame).await {
                        return Some(result);
                    }
                } else {
                    tracing::debug!("local provider unavailable; falling back to remote");
                }
                self.detect_with_remote(frame).await
            }
        }
    }

    /// Point-in-time arbitration: the last local result when its confidence
    /// exceeds the threshold, otherwise the last remote result.
    pub fn best_result(&self) -> Option<DetectionResult> {
        let local = lock(&self.last_local).clone();
        if let Some(result) = local {
            if result.confidence > self.config.confidence_threshold {
                return Some(result);
            }
        }
        lock(&self.last_remote).clone()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            local: *lock(&self.local_stats),
            remote: *lock(&self.remote_stats),
        }
    }

    async fn detect_with_local(&self, frame: &RawFrame) -> Option<DetectionResult> {
        Self::timed_detect(&*self.local, frame, &self.last_local, &self.local_stats).await
    }

    async fn detect_with_remote(&self, frame: &RawFrame) -> Option<DetectionResult> {
        Self::timed_detect(&*self.remote, frame, &self.last_remote, &self.remote_stats).await
    }

    async fn timed_detect(
        provider: &dyn DetectionProvider,
        frame: &RawFrame,
        slot: &ResultSlot,
        stats: &StatsSlot,
    ) -> Option<DetectionResult> {
        // A busy provider answers from its cache immediately; that is not a
        // detection, so it must not count toward the latency average.
        if provider.is_busy() {
            return provider.detect(frame).await;
        }
        let started = Instant::now();
        let result = provider.detect(frame).await?;
        lock(stats).record(started.elapsed().as_secs_f64() * 1000.0);
        *lock(slot) = Some(result.clone());
        Some(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_loop(
        &self,
        provider: Arc<dyn DetectionProvider>,
        frames: Arc<dyn FrameSource>,
        period: Duration,
        slot: ResultSlot,
        stats: StatsSlot,
        tx: Option<mpsc::Sender<DetectionResult>>,
        started_epoch: u64,
    ) -> JoinHandle<()> {
        let epoch = Arc::clone(&self.epoch);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if epoch.load(Ordering::SeqCst) != started_epoch {
                    break;
                }
                // A tick that lands while a call is outstanding is skipped,
                // never queued.
                if provider.is_busy() {
                    continue;
                }
                let Some(frame) = frames.frame() else {
                    continue;
                };

                let started = Instant::now();
                let Some(result) = provider.detect(&frame).await else {
                    continue;
                };
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                lock(&stats).record(latency_ms);
                *lock(&slot) = Some(result.clone());

                tracing::debug!(
                    source = ?result.source,
                    latency_ms,
                    confidence = result.confidence,
                    "detection complete"
                );

                // Delivery is guarded by the epoch: a result completing
                // after stop() is dropped here.
                if epoch.load(Ordering::SeqCst) != started_epoch {
                    break;
                }
                if let Some(tx) = &tx {
                    if tx.send(result).await.is_err() {
                        tracing::debug!("subscriber dropped; loop exiting");
                        break;
                    }
                }
            }
        })
    }
}
