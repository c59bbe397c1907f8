use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::error::CaptureError;
use crate::processing::level_meter::LevelMeter;
use crate::processing::sample_window::SampleWindow;
use crate::traits::media_platform::{AudioBufferCallback, AudioTap, MediaPlatform};
use crate::traits::media_stream::MediaStream;

/// Suppresses repeated volume readings.
#[derive(Debug, Default)]
pub struct LevelTracker {
    last: Option<u8>,
}

impl LevelTracker {
    /// Normalized level for `peak`, or `None` if it equals the last one
    /// reported.
    pub fn observe(&mut self, peak: f32) -> Option<u8> {
        let level = LevelMeter::normalize_volume(peak);
        if self.last == Some(level) {
            return None;
        }
        self.last = Some(level);
        Some(level)
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Meters the peak input volume of an audio stream.
///
/// ```text
/// [audio tap] → downmix → [SampleWindow] ← sampler (every interval) → on_volume
/// ```
pub struct VolumeMonitor {
    tap: Option<Box<dyn AudioTap>>,
    sampler: Option<JoinHandle<()>>,
}

impl VolumeMonitor {
    /// Tap `stream` and report its 0–100 level on every change.
    ///
    /// `on_volume` runs on the sampler task.
    pub fn attach<P, F>(
        platform: &P,
        stream: &Arc<dyn MediaStream>,
        window: usize,
        interval: Duration,
        runtime: &Handle,
        on_volume: F,
    ) -> Result<Self, CaptureError>
    where
        P: MediaPlatform + ?Sized,
        F: Fn(u8) + Send + Sync + 'static,
    {
        let window = Arc::new(Mutex::new(SampleWindow::new(window)));
        let tap = platform.tap_audio(stream, Self::sink(Arc::clone(&window)))?;

        let sampler = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tracker = LevelTracker::default();
            loop {
                ticker.tick().await;
                let peak = window.lock().peak();
                if let Some(level) = tracker.observe(peak) {
                    on_volume(level);
                }
            }
        });

        log::debug!("volume monitor attached to stream {}", stream.id());
        Ok(Self {
            tap: Some(tap),
            sampler: Some(sampler),
        })
    }

    /// Audio callback feeding mono samples into `window`.
    pub fn sink(window: Arc<Mutex<SampleWindow>>) -> AudioBufferCallback {
        Arc::new(move |samples: &[f32], _sample_rate: f64, channels: u16| {
            let mono = LevelMeter::downmix_to_mono(samples, channels);
            window.lock().push(&mono);
        })
    }

    /// Disconnect the audio tap and stop sampling.
    pub fn detach(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.disconnect();
        }
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }
}

impl Drop for VolumeMonitor {
    fn drop(&mut self) {
        self.detach();
    }
}
