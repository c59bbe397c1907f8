use serde::{Deserialize, Serialize};

/// Kind of input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Video,
    Audio,
}

impl DeviceKind {
    /// Platform enumeration name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "videoinput",
            Self::Audio => "audioinput",
        }
    }
}

/// A raw entry from platform device enumeration.
///
/// `label` is empty until the user has granted access at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

/// A device as presented to the UI. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

impl From<MediaDeviceInfo> for DeviceDescriptor {
    fn from(info: MediaDeviceInfo) -> Self {
        Self {
            id: info.device_id,
            label: info.label,
        }
    }
}

/// Per-kind request passed to stream acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackConstraint {
    #[default]
    Disabled,
    Any,
    Device(String),
}

impl TrackConstraint {
    pub fn is_requested(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Device(id) => Some(id),
            _ => None,
        }
    }
}

/// Constraints for opening a live input stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaConstraints {
    pub video: TrackConstraint,
    pub audio: TrackConstraint,
}

impl MediaConstraints {
    /// Generic "any device" request for the given kinds.
    pub fn new(video: bool, audio: bool) -> Self {
        let pick = |wanted: bool| {
            if wanted {
                TrackConstraint::Any
            } else {
                TrackConstraint::Disabled
            }
        };
        Self {
            video: pick(video),
            audio: pick(audio),
        }
    }

    /// Pin the track of `kind` to a specific device. No-op if that kind
    /// was not requested.
    pub fn with_device(mut self, kind: DeviceKind, device_id: Option<&str>) -> Self {
        let Some(id) = device_id else {
            return self;
        };
        let slot = match kind {
            DeviceKind::Video => &mut self.video,
            DeviceKind::Audio => &mut self.audio,
        };
        if slot.is_requested() {
            *slot = TrackConstraint::Device(id.to_string());
        }
        self
    }

    pub fn get(&self, kind: DeviceKind) -> &TrackConstraint {
        match kind {
            DeviceKind::Video => &self.video,
            DeviceKind::Audio => &self.audio,
        }
    }

    pub fn requests(&self, kind: DeviceKind) -> bool {
        self.get(kind).is_requested()
    }
}
