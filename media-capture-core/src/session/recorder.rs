use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::artifact::Blob;
use crate::models::error::CaptureError;
use crate::traits::media_recorder::{MediaRecorder, RecorderEventCallback};

/// Pausable stopwatch for recording duration.
///
/// Elapsed time is the frozen total plus the time since the last start or
/// resume. Pausing folds the running span into the frozen total.
#[derive(Debug, Clone, Copy)]
pub struct DurationClock {
    frozen: Duration,
    resumed_at: Option<Instant>,
}

impl DurationClock {
    pub fn started(now: Instant) -> Self {
        Self {
            frozen: Duration::ZERO,
            resumed_at: Some(now),
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(resumed_at) = self.resumed_at.take() {
            self.frozen += now.saturating_duration_since(resumed_at);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(now);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .resumed_at
            .map_or(Duration::ZERO, |resumed_at| now.saturating_duration_since(resumed_at));
        self.frozen + running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Recording,
    Paused,
    /// `stop` was requested; waiting for the platform to flush.
    Stopping,
}

impl RecorderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for RecorderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a stopped recorder that buffered at least one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRecording {
    pub blob: Blob,
    pub duration: Duration,
    pub dimensions: Option<(u32, u32)>,
}

/// A platform recorder plus the chunk buffer and duration clock around it.
///
/// Transitions: recording ⇄ paused → stopping. Chunks are kept whatever
/// the phase is when they are processed; the platform recorder stops
/// producing while paused.
pub struct Recorder {
    inner: Box<dyn MediaRecorder>,
    phase: RecorderPhase,
    clock: DurationClock,
    chunks: Vec<Vec<u8>>,
    mime_type: String,
    dimensions: Option<(u32, u32)>,
}

impl Recorder {
    /// Start `inner` and begin counting.
    pub fn start(
        mut inner: Box<dyn MediaRecorder>,
        timeslice: Option<Duration>,
        mime_type: impl Into<String>,
        dimensions: Option<(u32, u32)>,
        on_event: RecorderEventCallback,
    ) -> Result<Self, CaptureError> {
        inner.start(timeslice, on_event)?;
        Ok(Self {
            inner,
            phase: RecorderPhase::Recording,
            clock: DurationClock::started(Instant::now()),
            chunks: Vec::new(),
            mime_type: mime_type.into(),
            dimensions,
        })
    }

    pub fn phase(&self) -> RecorderPhase {
        self.phase
    }

    pub fn pause(&mut self) -> Result<(), CaptureError> {
        if self.phase != RecorderPhase::Recording {
            return Err(CaptureError::invalid("pause", self.phase));
        }
        self.inner.pause()?;
        self.clock.pause(Instant::now());
        self.phase = RecorderPhase::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CaptureError> {
        if self.phase != RecorderPhase::Paused {
            return Err(CaptureError::invalid("resume", self.phase));
        }
        self.inner.resume()?;
        self.clock.resume(Instant::now());
        self.phase = RecorderPhase::Recording;
        Ok(())
    }

    /// Freeze the clock and ask the platform to flush. The final chunk and
    /// the stop signal arrive as recorder events.
    ///
    /// Returns `InvalidTransition` if already stopping, or the platform's
    /// error if it failed to stop (the recorder is stopping either way).
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if self.phase == RecorderPhase::Stopping {
            return Err(CaptureError::invalid("stop", self.phase));
        }
        self.clock.pause(Instant::now());
        self.phase = RecorderPhase::Stopping;
        self.inner.stop()
    }

    /// Stop the platform recorder and discard everything buffered.
    pub fn abort(mut self) {
        if self.phase != RecorderPhase::Stopping {
            if let Err(e) = self.inner.stop() {
                log::warn!("failed to stop discarded recorder: {}", e);
            }
        }
    }

    /// Buffer an encoded chunk. Returns false if it was empty.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.chunks.push(chunk);
        true
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed(Instant::now())
    }

    /// Concatenate the buffered chunks. `None` if nothing was buffered.
    pub fn finish(self) -> Option<FinishedRecording> {
        if self.chunks.is_empty() {
            return None;
        }
        Some(FinishedRecording {
            blob: Blob::concat(&self.chunks, self.mime_type.as_str()),
            duration: self.clock.elapsed(Instant::now()),
            dimensions: self.dimensions,
        })
    }
}
