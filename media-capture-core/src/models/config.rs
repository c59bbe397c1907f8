use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::{DeviceKind, MediaConstraints};
use crate::processing::image_encoder;
use crate::traits::media_recorder::RecorderOptions;

/// Configuration fixed at engine construction.
///
/// Defaults follow the stock dialog setup: camera plus microphone, prefer a
/// front-facing device, follow newly plugged devices, meter the volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Acquire a camera.
    pub video: bool,

    /// Acquire a microphone (alone, or as the audio track of a video).
    pub audio: bool,

    /// Photo mode: a snapshot finalizes the capture.
    pub image_only: bool,

    /// Device id, or a case-insensitive fragment of its label.
    pub preferred_device: Option<String>,

    /// Switch to a device that appears while previewing.
    pub choose_new_device: bool,

    /// Publish the input volume while an audio track is live.
    pub watch_volume: bool,

    /// Grace period between `deactivate` and releasing the device.
    pub deactivation_delay: Duration,

    /// Recorder timeslice. `None` delivers a single chunk on stop.
    pub segment_duration: Option<Duration>,

    pub video_mime_type: String,
    pub audio_mime_type: String,

    /// `image/jpeg` or `image/png`.
    pub image_mime_type: String,

    /// JPEG quality, 1..=100.
    pub image_quality: u8,

    pub audio_bits_per_second: u32,
    pub video_bits_per_second: u32,

    /// How often the elapsed duration is republished while recording.
    pub duration_tick: Duration,

    /// Volume sampling cadence.
    pub volume_interval: Duration,

    /// Number of most recent samples the volume peak is taken over.
    pub volume_window: usize,

    /// Upper bound on waiting for a video stream's dimensions.
    pub metadata_timeout: Duration,
}

impl CaptureOptions {
    /// Camera only, finalized by a snapshot.
    pub fn photo() -> Self {
        Self {
            audio: false,
            image_only: true,
            ..Default::default()
        }
    }

    /// Camera and microphone recording.
    pub fn video() -> Self {
        Self::default()
    }

    /// Microphone recording with volume metering.
    pub fn audio() -> Self {
        Self {
            video: false,
            audio: true,
            watch_volume: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.video && !self.audio {
            return Err("at least one of video or audio must be requested".into());
        }
        if self.image_only && !self.video {
            return Err("image capture requires video".into());
        }
        if !image_encoder::is_supported(&self.image_mime_type) {
            return Err(format!("unsupported image type: {}", self.image_mime_type));
        }
        if !(1..=100).contains(&self.image_quality) {
            return Err(format!("image quality out of range: {}", self.image_quality));
        }
        if self.duration_tick.is_zero() || self.volume_interval.is_zero() {
            return Err("timer intervals must be positive".into());
        }
        if self.volume_window == 0 {
            return Err("volume window must hold at least one sample".into());
        }
        Ok(())
    }

    /// The kind whose device the directory lists and the user picks.
    pub fn primary_kind(&self) -> DeviceKind {
        if self.video {
            DeviceKind::Video
        } else {
            DeviceKind::Audio
        }
    }

    /// Constraints for a generic first acquisition.
    pub fn constraints(&self) -> MediaConstraints {
        MediaConstraints::new(self.video, self.audio)
    }

    pub fn recorder_options(&self) -> RecorderOptions {
        if self.video {
            RecorderOptions {
                mime_type: self.video_mime_type.clone(),
                video_bits_per_second: Some(self.video_bits_per_second),
                audio_bits_per_second: self.audio.then_some(self.audio_bits_per_second),
            }
        } else {
            RecorderOptions {
                mime_type: self.audio_mime_type.clone(),
                video_bits_per_second: None,
                audio_bits_per_second: Some(self.audio_bits_per_second),
            }
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            image_only: false,
            preferred_device: Some("front".into()),
            choose_new_device: true,
            watch_volume: true,
            deactivation_delay: Duration::ZERO,
            segment_duration: None,
            video_mime_type: "video/webm".into(),
            audio_mime_type: "audio/webm".into(),
            image_mime_type: "image/jpeg".into(),
            image_quality: 90,
            audio_bits_per_second: 128_000,
            video_bits_per_second: 2_500_000,
            duration_tick: Duration::from_millis(100),
            volume_interval: Duration::from_millis(100),
            volume_window: 4096,
            metadata_timeout: Duration::from_secs(5),
        }
    }
}
