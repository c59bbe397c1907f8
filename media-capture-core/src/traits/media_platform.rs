use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::media_recorder::{MediaRecorder, RecorderOptions};
use super::media_stream::MediaStream;
use crate::models::device::{MediaConstraints, MediaDeviceInfo};
use crate::models::error::CaptureError;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of channels (1 = mono, 2 = stereo interleaved).
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// Readiness signals of an off-screen decode surface fed with a video
/// stream. Each carries the frame size known at that point, which may still
/// be zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    LoadedMetadata { width: u32, height: u32 },
    LoadedData { width: u32, height: u32 },
    CanPlay { width: u32, height: u32 },
    Error(String),
}

impl SurfaceEvent {
    /// Frame size, if this event reports a non-empty one.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match *self {
            Self::LoadedMetadata { width, height }
            | Self::LoadedData { width, height }
            | Self::CanPlay { width, height }
                if width > 0 && height > 0 =>
            {
                Some((width, height))
            }
            _ => None,
        }
    }
}

/// An RGBA raster of one video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major, 4 bytes per pixel.
    pub rgba: Vec<u8>,
}

impl VideoFrame {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

/// Live connection between an audio stream and a sample callback.
pub trait AudioTap: Send {
    /// Tear down the audio graph. No callbacks fire afterwards.
    fn disconnect(&mut self);
}

/// Interface to the host's camera/microphone subsystem.
///
/// Implemented by:
/// - `VirtualPlatform` (in-process, scripted devices)
#[async_trait]
pub trait MediaPlatform: Send + Sync + 'static {
    /// Every input device, in platform order. Labels stay empty until the
    /// user has granted access once.
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, CaptureError>;

    /// Open a live stream satisfying `constraints`.
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<Arc<dyn MediaStream>, CaptureError>;

    /// Device-change signal. `None` if the platform cannot report changes.
    fn device_changes(&self) -> Option<broadcast::Receiver<()>>;

    /// Feed `stream` into an off-screen decode surface. Dropping the
    /// receiver detaches the surface.
    fn open_decode_surface(
        &self,
        stream: &Arc<dyn MediaStream>,
    ) -> Result<mpsc::UnboundedReceiver<SurfaceEvent>, CaptureError>;

    /// Route the stream's audio samples to `callback`.
    fn tap_audio(
        &self,
        stream: &Arc<dyn MediaStream>,
        callback: AudioBufferCallback,
    ) -> Result<Box<dyn AudioTap>, CaptureError>;

    fn create_recorder(
        &self,
        stream: &Arc<dyn MediaStream>,
        options: &RecorderOptions,
    ) -> Result<Box<dyn MediaRecorder>, CaptureError>;

    /// Rasterize the current frame of `stream` at `width` x `height`.
    async fn grab_frame(
        &self,
        stream: &Arc<dyn MediaStream>,
        width: u32,
        height: u32,
    ) -> Result<VideoFrame, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_events_report_no_dimensions() {
        assert_eq!(SurfaceEvent::LoadedMetadata { width: 0, height: 0 }.dimensions(), None);
        assert_eq!(SurfaceEvent::CanPlay { width: 640, height: 0 }.dimensions(), None);
        assert_eq!(SurfaceEvent::Error("decode".into()).dimensions(), None);
        assert_eq!(SurfaceEvent::LoadedData { width: 640, height: 480 }.dimensions(), Some((640, 480)));
    }

    #[test]
    fn frame_shape_check() {
        let frame = VideoFrame {
            width: 2,
            height: 2,
            rgba: vec![0; 16],
        };
        assert!(frame.is_well_formed());
        assert!(!VideoFrame { rgba: vec![0; 15], ..frame }.is_well_formed());
    }
}
