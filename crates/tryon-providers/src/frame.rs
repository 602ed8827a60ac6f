//! Frame contracts — the core never owns capture; frames arrive per call
//! from an external source.

use std::sync::Arc;

/// One captured video frame, RGB8 interleaved.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel data, `width * height * 3` bytes. Shared, never copied per tick.
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Whether the capture side reports enough data to use this frame.
    pub ready: bool,
}

impl RawFrame {
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            ready: true,
        }
    }

    /// Ready flag set, nonzero dimensions, and pixel buffer consistent with
    /// the dimensions. A 0x0 frame has a vacuously consistent empty buffer
    /// but nothing to sample from, so it is never ready.
    pub fn is_ready(&self) -> bool {
        self.ready
            && self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize * self.height as usize * 3)
    }
}

/// Supplies the most recent frame on demand. Returns `None` while the
/// capture side is not ready; the tracking loop treats that as a skipped
/// tick.
pub trait FrameSource: Send + Sync {
    fn frame(&self) -> Option<RawFrame>;
}

/// Frame source that always hands out the same frame. Used by the CLI for
/// still-image diagnostics and by tests.
pub struct StaticFrameSource {
    frame: RawFrame,
}

impl StaticFrameSource {
    pub fn new(frame: RawFrame) -> Self {
        Self { frame }
    }
}

impl FrameSource for StaticFrameSource {
    fn frame(&self) -> Option<RawFrame> {
        self.frame.is_ready().then(|| self.frame.clone())
    }
}
