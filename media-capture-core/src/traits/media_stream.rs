use std::sync::Arc;

use crate::models::device::DeviceKind;

/// Callback fired when a track ends on its own (device unplugged, revoked
/// permission). Not fired by `MediaTrack::stop`.
pub type TrackEndedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// A single camera or microphone track of a live stream.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Id of the device the track reads from.
    fn device_id(&self) -> &str;

    /// Stop the track and release the underlying device.
    fn stop(&self);

    fn is_ended(&self) -> bool;

    /// Install (or clear) the end-of-stream notification.
    fn set_on_ended(&self, callback: Option<TrackEndedCallback>);
}

/// A live input stream handed out by the platform.
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    fn has_kind(&self, kind: DeviceKind) -> bool {
        self.tracks().iter().any(|t| t.kind() == kind)
    }

    /// Whether every track has ended.
    fn is_ended(&self) -> bool {
        self.tracks().iter().all(|t| t.is_ended())
    }
}
