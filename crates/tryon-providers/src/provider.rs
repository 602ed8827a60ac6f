//! The `DetectionProvider` seam and its shared busy-guard state.
//!
//! All provider variants implement one trait; callers select between them
//! through the tracking mode rather than probing provider capabilities.

use crate::frame::RawFrame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tryon_core::{DetectionResult, DetectionSource, NormalizeError};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("provider not initialized")]
    Unavailable,
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("malformed landmarks: {0}")]
    Malformed(#[from] NormalizeError),
    #[error("no face detected")]
    NoFace,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error("transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image encode: {0}")]
    Image(#[from] image::ImageError),
}

/// A source of raw face detections.
///
/// `detect` is non-reentrant: a call arriving while a prior call on the
/// same provider is outstanding does not issue a second request — it
/// returns the provider's cached last result instead. Failures never
/// propagate; they are logged and yield `None` for that tick.
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    fn source(&self) -> DetectionSource;

    async fn detect(&self, frame: &RawFrame) -> Option<DetectionResult>;

    /// Last successful result, if any.
    fn last_result(&self) -> Option<DetectionResult>;

    /// Whether a detection call is currently outstanding.
    fn is_busy(&self) -> bool;

    /// Whether the provider is ready to serve detections at all.
    fn is_initialized(&self) -> bool {
        true
    }
}

/// Busy-guard and last-result cache shared by every provider variant.
pub(crate) struct ProviderState {
    busy: AtomicBool,
    last: Mutex<Option<DetectionResult>>,
}

impl ProviderState {
    pub(crate) fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            last: Mutex::new(None),
        }
    }

    /// Try to mark the provider busy. `None` means a call is already
    /// outstanding. The returned token releases the guard on drop, so the
    /// flag clears on every exit path.
    pub(crate) fn try_begin(&self) -> Option<BusyToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyToken { flag: &self.busy })
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Replace the cached result as a whole value.
    pub(crate) fn store(&self, result: DetectionResult) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(result);
        }
    }

    pub(crate) fn last(&self) -> Option<DetectionResult> {
        self.last.lock().ok().and_then(|l| l.clone())
    }
}

pub(crate) struct BusyToken<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyToken<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Shared completion path: cache and return on success, degrade to `None`
/// on any failure, logging at a severity matching the condition.
pub(crate) fn settle(
    state: &ProviderState,
    source: DetectionSource,
    outcome: Result<DetectionResult, ProviderError>,
) -> Option<DetectionResult> {
    match outcome {
        Ok(result) => {
            state.store(result.clone());
            Some(result)
        }
        Err(ProviderError::NoFace) => {
            tracing::debug!(source = ?source, "no face detected this tick");
            None
        }
        Err(ProviderError::Malformed(err)) => {
            tracing::warn!(source = ?source, error = %err, "malformed landmark payload; frame skipped");
            None
        }
        Err(err) => {
            tracing::warn!(source = ?source, error = %err, "detection failed");
            None
        }
    }
}
