use crate::models::artifact::Blob;
use crate::models::device::DeviceKind;
use crate::models::error::CaptureError;
use crate::models::live_input::LiveInput;
use crate::processing::image_encoder;
use crate::traits::media_platform::MediaPlatform;

/// An encoded still frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Still {
    pub blob: Blob,
    pub width: u32,
    pub height: u32,
}

/// Rasterize the current frame of a live video input at its intrinsic size
/// and encode it as `mime_type`.
pub async fn capture_still<P: MediaPlatform + ?Sized>(
    platform: &P,
    input: &LiveInput,
    mime_type: &str,
    quality: u8,
) -> Result<Still, CaptureError> {
    if input.kind != DeviceKind::Video || input.width == 0 || input.height == 0 {
        return Err(CaptureError::NoActiveStream);
    }

    let frame = platform.grab_frame(&input.stream, input.width, input.height).await?;
    let data = image_encoder::encode_frame(&frame, mime_type, quality)?;
    log::debug!(
        "encoded {}x{} still as {} ({} bytes)",
        frame.width,
        frame.height,
        mime_type,
        data.len()
    );

    Ok(Still {
        blob: Blob::new(data, mime_type),
        width: frame.width,
        height: frame.height,
    })
}
