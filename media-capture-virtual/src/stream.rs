//! Virtual streams and tracks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use media_capture_core::{DeviceKind, MediaStream, MediaTrack, TrackEndedCallback};

/// One camera or microphone track.
///
/// `stop` ends the track quietly. `end` simulates the device going away
/// and fires the end-of-stream callback.
pub struct VirtualTrack {
    id: String,
    kind: DeviceKind,
    device_id: String,
    ended: AtomicBool,
    on_ended: Mutex<Option<TrackEndedCallback>>,
}

impl VirtualTrack {
    pub fn new(kind: DeviceKind, device_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            device_id: device_id.into(),
            ended: AtomicBool::new(false),
            on_ended: Mutex::new(None),
        }
    }

    /// End the track as if its device had been unplugged.
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.on_ended.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl MediaTrack for VirtualTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn set_on_ended(&self, callback: Option<TrackEndedCallback>) {
        *self.on_ended.lock() = callback;
    }
}

/// A stream of virtual tracks. Video streams carry their frame size.
pub struct VirtualStream {
    id: String,
    tracks: Vec<Arc<VirtualTrack>>,
    width: u32,
    height: u32,
}

impl VirtualStream {
    pub fn new(tracks: Vec<Arc<VirtualTrack>>, width: u32, height: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
            width,
            height,
        }
    }

    pub fn virtual_tracks(&self) -> &[Arc<VirtualTrack>] {
        &self.tracks
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether a live track reads from `device_id`.
    pub fn uses_device(&self, device_id: &str) -> bool {
        self.tracks.iter().any(|t| t.device_id() == device_id && !t.is_ended())
    }

    /// Whether a track of `kind` is still live.
    pub fn is_live(&self, kind: DeviceKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind && !t.is_ended())
    }
}

impl MediaStream for VirtualStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }
}
