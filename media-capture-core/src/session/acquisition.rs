use std::sync::Arc;
use std::time::Duration;

use crate::models::device::{DeviceKind, MediaConstraints};
use crate::models::error::CaptureError;
use crate::models::live_input::LiveInput;
use crate::traits::media_platform::{MediaPlatform, SurfaceEvent};
use crate::traits::media_stream::{MediaStream, TrackEndedCallback};

/// Open a live input satisfying `constraints`.
///
/// Any platform failure is reported as `PermissionDenied`. Video inputs are
/// only handed out once their frame size is known; if it never resolves the
/// stream is stopped and `MetadataUnavailable` returned.
pub async fn acquire<P: MediaPlatform + ?Sized>(
    platform: &P,
    constraints: &MediaConstraints,
    metadata_timeout: Duration,
) -> Result<LiveInput, CaptureError> {
    let stream = platform
        .get_user_media(constraints)
        .await
        .map_err(CaptureError::into_denial)?;

    if !constraints.requests(DeviceKind::Video) {
        return Ok(LiveInput::audio(stream));
    }

    match probe_dimensions(platform, &stream, metadata_timeout).await {
        Ok((width, height)) => Ok(LiveInput::video(stream, width, height)),
        Err(e) => {
            for track in stream.tracks() {
                track.stop();
            }
            Err(e)
        }
    }
}

/// Feed `stream` through a decode surface until a readiness event reports a
/// non-empty frame size.
///
/// Several readiness events may race; the first with non-zero dimensions
/// wins and the surface is detached right after.
pub async fn probe_dimensions<P: MediaPlatform + ?Sized>(
    platform: &P,
    stream: &Arc<dyn MediaStream>,
    timeout: Duration,
) -> Result<(u32, u32), CaptureError> {
    let mut events = platform
        .open_decode_surface(stream)
        .map_err(|e| CaptureError::MetadataUnavailable(e.to_string()))?;

    let first_frame = async {
        while let Some(event) = events.recv().await {
            if let SurfaceEvent::Error(reason) = event {
                return Err(CaptureError::MetadataUnavailable(reason));
            }
            if let Some(dimensions) = event.dimensions() {
                return Ok(dimensions);
            }
        }
        Err(CaptureError::MetadataUnavailable("decode surface closed".into()))
    };

    match tokio::time::timeout(timeout, first_frame).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::MetadataUnavailable(format!(
            "no frame within {} ms",
            timeout.as_millis()
        ))),
    }
}

/// Install `on_ended` on every track of `input`.
pub fn watch_tracks(input: &LiveInput, on_ended: TrackEndedCallback) {
    for track in input.stream.tracks() {
        track.set_on_ended(Some(Arc::clone(&on_ended)));
    }
}
