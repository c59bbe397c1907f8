use std::fmt;

use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactKind, CapturedArtifact};
use super::device::DeviceDescriptor;
use super::error::CaptureError;
use super::live_input::LiveInput;

/// Capture engine status.
///
/// ```text
/// acquiring → initiating → previewing ⇄ capturing ⇄ paused
///     ↓            ↓  ↑         ↑            ↓         ↓
///   denied ←───────┘  └─ choose ┘         captured ←──┘
///                                           │ clear
///                                           └──→ previewing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Acquiring,
    Denied,
    Initiating,
    Previewing,
    Capturing,
    Paused,
    Captured,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquiring => "acquiring",
            Self::Denied => "denied",
            Self::Initiating => "initiating",
            Self::Previewing => "previewing",
            Self::Capturing => "capturing",
            Self::Paused => "paused",
            Self::Captured => "captured",
        }
    }

    /// A recorder exists.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Capturing | Self::Paused)
    }

    /// States in which a newly plugged device may take over.
    pub fn accepts_new_device(&self) -> bool {
        matches!(self, Self::Initiating | Self::Previewing)
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of everything a UI renders.
///
/// `status` is `None` before the first activation and after a deactivated
/// engine has released its devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineState {
    pub active: bool,
    pub status: Option<CaptureStatus>,
    pub devices: Vec<DeviceDescriptor>,
    pub chosen_device_id: Option<String>,
    pub live_video: Option<LiveInput>,
    pub live_audio: Option<LiveInput>,
    pub volume: Option<u8>,
    pub duration_ms: Option<u64>,
    pub captured_video: Option<CapturedArtifact>,
    pub captured_audio: Option<CapturedArtifact>,
    pub captured_image: Option<CapturedArtifact>,
    pub last_error: Option<CaptureError>,
    /// Incremented on every published change.
    pub revision: u64,
}

impl EngineState {
    pub fn is(&self, status: CaptureStatus) -> bool {
        self.status == Some(status)
    }

    pub fn live_input(&self) -> Option<&LiveInput> {
        self.live_video.as_ref().or(self.live_audio.as_ref())
    }

    pub fn captured(&self, kind: ArtifactKind) -> Option<&CapturedArtifact> {
        match kind {
            ArtifactKind::Video => self.captured_video.as_ref(),
            ArtifactKind::Audio => self.captured_audio.as_ref(),
            ArtifactKind::Image => self.captured_image.as_ref(),
        }
    }

    pub(crate) fn captured_mut(&mut self, kind: ArtifactKind) -> &mut Option<CapturedArtifact> {
        match kind {
            ArtifactKind::Video => &mut self.captured_video,
            ArtifactKind::Audio => &mut self.captured_audio,
            ArtifactKind::Image => &mut self.captured_image,
        }
    }

    pub fn captured_any(&self) -> bool {
        self.captured_video.is_some() || self.captured_audio.is_some() || self.captured_image.is_some()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &CapturedArtifact> {
        [&self.captured_video, &self.captured_audio, &self.captured_image]
            .into_iter()
            .flatten()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
