use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::device::DeviceKind;
use crate::traits::media_stream::MediaStream;

/// An open camera or microphone stream owned by the engine.
///
/// `width`/`height` are the intrinsic frame dimensions of a video input and
/// zero for audio.
#[derive(Clone)]
pub struct LiveInput {
    pub stream: Arc<dyn MediaStream>,
    pub kind: DeviceKind,
    pub width: u32,
    pub height: u32,
}

impl LiveInput {
    pub fn video(stream: Arc<dyn MediaStream>, width: u32, height: u32) -> Self {
        Self {
            stream,
            kind: DeviceKind::Video,
            width,
            height,
        }
    }

    pub fn audio(stream: Arc<dyn MediaStream>) -> Self {
        Self {
            stream,
            kind: DeviceKind::Audio,
            width: 0,
            height: 0,
        }
    }

    /// Scale the intrinsic dimensions down to fit a viewport, keeping the
    /// aspect ratio. Never scales up.
    pub fn fit_within(&self, max_width: u32, max_height: u32) -> (u32, u32) {
        let (mut width, mut height) = (self.width, self.height);
        if width == 0 || height == 0 {
            return (width, height);
        }
        if width > max_width {
            height = (height as f64 * max_width as f64 / width as f64).round() as u32;
            width = max_width;
        }
        if height > max_height {
            width = (width as f64 * max_height as f64 / height as f64).round() as u32;
            height = max_height;
        }
        (width, height)
    }

    /// Stop every track without firing end-of-stream callbacks.
    pub fn release(&self) {
        for track in self.stream.tracks() {
            track.set_on_ended(None);
            track.stop();
        }
    }
}

impl PartialEq for LiveInput {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
            && self.kind == other.kind
            && self.width == other.width
            && self.height == other.height
    }
}

impl fmt::Debug for LiveInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveInput")
            .field("stream", &self.stream.id())
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Serialize for LiveInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LiveInput", 4)?;
        state.serialize_field("stream_id", self.stream.id())?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.end()
    }
}
