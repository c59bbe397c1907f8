use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Encoder settings passed to the platform recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderOptions {
    pub mime_type: String,
    pub audio_bits_per_second: Option<u32>,
    pub video_bits_per_second: Option<u32>,
}

/// Signals delivered by a platform recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded chunk. Delivered per timeslice and once more on stop.
    DataAvailable(Vec<u8>),
    /// Recording finished; no more chunks follow.
    Stopped,
    Error(String),
}

/// Callback receiving recorder events. May fire on any thread, including
/// synchronously from within `start`/`stop`.
pub type RecorderEventCallback = Arc<dyn Fn(RecorderEvent) + Send + Sync + 'static>;

/// Chunked media recorder (encoding is the platform's business).
///
/// State transitions:
/// ```text
/// inactive → recording ⇄ paused → inactive
/// ```
pub trait MediaRecorder: Send {
    /// Begin recording. With a `timeslice`, chunks are delivered
    /// periodically; otherwise a single chunk arrives on stop.
    fn start(&mut self, timeslice: Option<Duration>, on_event: RecorderEventCallback) -> Result<(), CaptureError>;

    fn pause(&mut self) -> Result<(), CaptureError>;

    fn resume(&mut self) -> Result<(), CaptureError>;

    /// Finish recording. Remaining data is flushed, then `Stopped` fires.
    fn stop(&mut self) -> Result<(), CaptureError>;
}
