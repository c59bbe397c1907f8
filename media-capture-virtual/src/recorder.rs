//! Chunking recorder over a virtual stream.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use media_capture_core::{CaptureError, MediaRecorder, RecorderEvent, RecorderEventCallback, RecorderOptions};

use crate::signal::{ToneGenerator, SAMPLE_RATE};
use crate::wav_format;

/// How recorders created by a `VirtualPlatform` behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderScript {
    /// Encoder cadence; data accumulates once per interval while recording.
    pub chunk_interval: Duration,
    /// Produce no data at all, as an encoder that never got a frame.
    pub silent: bool,
    /// Refuse to start.
    pub fail_on_start: bool,
}

impl Default for RecorderScript {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_millis(50),
            silent: false,
            fail_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Inactive,
    Recording,
    Paused,
    Finished,
}

/// Encoded payload generator.
enum ChunkSource {
    /// Mono 16-bit PCM tone behind a WAV header.
    Audio { tone: ToneGenerator, header_written: bool },
    /// Opaque frames sized from the video bitrate.
    Video { seq: u64, bytes_per_second: u64 },
}

impl ChunkSource {
    fn for_options(options: &RecorderOptions) -> Self {
        if options.mime_type.starts_with("audio/") {
            Self::Audio {
                tone: ToneGenerator::new(440.0, SAMPLE_RATE),
                header_written: false,
            }
        } else {
            let bits = options.video_bits_per_second.unwrap_or(1_000_000) as u64;
            Self::Video {
                seq: 0,
                bytes_per_second: (bits / 8).max(320),
            }
        }
    }

    fn is_audio(&self) -> bool {
        matches!(self, Self::Audio { .. })
    }

    fn produce(&mut self, span: Duration, out: &mut Vec<u8>) {
        let millis = span.as_millis() as u64;
        match self {
            Self::Audio { tone, header_written } => {
                if !*header_written {
                    out.extend_from_slice(&wav_format::generate_wav_header(SAMPLE_RATE, 16, 1, 0));
                    *header_written = true;
                }
                let frames = tone.frames_for(millis);
                out.extend(wav_format::encode_pcm16(&tone.next_buffer(frames, 1, 0.25)));
            }
            Self::Video { seq, bytes_per_second } => {
                let size = (*bytes_per_second * millis / 1000).max(16) as usize;
                out.extend_from_slice(b"VFRM");
                out.extend_from_slice(&seq.to_le_bytes());
                out.extend(std::iter::repeat((*seq % 251) as u8).take(size.saturating_sub(12)));
                *seq += 1;
            }
        }
    }
}

/// Buffered output shared with the producer task.
///
/// Events are emitted while this lock is held so a flush from the producer
/// can never land after `Stopped`.
struct Pending {
    source: ChunkSource,
    buffer: Vec<u8>,
    since_flush: Duration,
    flushed: bool,
    paused: bool,
    closed: bool,
    on_event: Option<RecorderEventCallback>,
}

impl Pending {
    fn take(&mut self) -> Vec<u8> {
        self.since_flush = Duration::ZERO;
        std::mem::take(&mut self.buffer)
    }

    fn emit(&self, event: RecorderEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }

    /// Deliver everything buffered so far as one chunk.
    fn flush(&mut self) -> bool {
        if self.closed || self.buffer.is_empty() {
            return false;
        }
        let chunk = self.take();
        self.flushed = true;
        self.emit(RecorderEvent::DataAvailable(chunk));
        true
    }
}

/// Weak handle to a recorder created by a `VirtualPlatform`.
#[derive(Clone)]
pub struct RecorderHandle(Weak<Mutex<Pending>>);

impl RecorderHandle {
    /// Flush buffered data immediately, as `requestData()` would.
    ///
    /// Returns false if the recorder is gone, stopped or has nothing buffered.
    pub fn request_data(&self) -> bool {
        self.0.upgrade().is_some_and(|pending| pending.lock().flush())
    }

    pub fn is_alive(&self) -> bool {
        self.0.upgrade().is_some_and(|pending| !pending.lock().closed)
    }
}

/// A `MediaRecorder` that synthesizes encoded data on a tokio task.
///
/// Delivers a chunk every `timeslice` when one is given, and whatever is
/// still buffered on `stop`, followed by `Stopped`.
pub struct VirtualRecorder {
    options: RecorderOptions,
    script: RecorderScript,
    state: RecorderState,
    pending: Arc<Mutex<Pending>>,
    producer: Option<JoinHandle<()>>,
}

impl VirtualRecorder {
    pub fn new(options: RecorderOptions, script: RecorderScript) -> Self {
        let pending = Arc::new(Mutex::new(Pending {
            source: ChunkSource::for_options(&options),
            buffer: Vec::new(),
            since_flush: Duration::ZERO,
            flushed: false,
            paused: false,
            closed: false,
            on_event: None,
        }));
        Self {
            options,
            script,
            state: RecorderState::Inactive,
            pending,
            producer: None,
        }
    }

    pub fn handle(&self) -> RecorderHandle {
        RecorderHandle(Arc::downgrade(&self.pending))
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    fn require(&self, expected: RecorderState, operation: &str) -> Result<(), CaptureError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::ConfigurationFailed(format!(
                "cannot {} a {:?} recorder",
                operation, self.state
            )))
        }
    }
}

impl MediaRecorder for VirtualRecorder {
    fn start(&mut self, timeslice: Option<Duration>, on_event: RecorderEventCallback) -> Result<(), CaptureError> {
        self.require(RecorderState::Inactive, "start")?;
        if self.script.fail_on_start {
            return Err(CaptureError::EncodingFailed("virtual encoder refused to start".into()));
        }

        let runtime = if self.script.silent {
            None
        } else {
            Some(Handle::try_current().map_err(|_| {
                CaptureError::ConfigurationFailed("virtual recorder requires a tokio runtime".into())
            })?)
        };
        self.pending.lock().on_event = Some(on_event);
        if let Some(runtime) = runtime {
            let interval = self.script.chunk_interval.max(Duration::from_millis(1));
            self.producer = Some(runtime.spawn(produce(Arc::clone(&self.pending), interval, timeslice)));
        }

        log::debug!(
            "virtual recorder started ({}, timeslice {:?})",
            self.options.mime_type,
            timeslice
        );
        self.state = RecorderState::Recording;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        self.require(RecorderState::Recording, "pause")?;
        self.pending.lock().paused = true;
        self.state = RecorderState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.require(RecorderState::Paused, "resume")?;
        self.pending.lock().paused = false;
        self.state = RecorderState::Recording;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "cannot stop a {:?} recorder",
                self.state
            )));
        }
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.state = RecorderState::Finished;

        let mut pending = self.pending.lock();
        pending.closed = true;
        let mut chunk = pending.take();
        if !chunk.is_empty() {
            if pending.source.is_audio() && !pending.flushed {
                let data_size = chunk.len().saturating_sub(wav_format::WAV_HEADER_SIZE);
                wav_format::patch_sizes(&mut chunk, data_size);
            }
            log::debug!("virtual recorder flushed {} byte(s) on stop", chunk.len());
            pending.emit(RecorderEvent::DataAvailable(chunk));
        }
        pending.emit(RecorderEvent::Stopped);
        Ok(())
    }
}

impl Drop for VirtualRecorder {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

async fn produce(pending: Arc<Mutex<Pending>>, interval: Duration, timeslice: Option<Duration>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut guard = pending.lock();
        let pending = &mut *guard;
        if pending.closed {
            break;
        }
        if pending.paused {
            continue;
        }
        pending.source.produce(interval, &mut pending.buffer);
        pending.since_flush += interval;

        if timeslice.is_some_and(|slice| pending.since_flush >= slice) {
            pending.flush();
        }
    }
}
