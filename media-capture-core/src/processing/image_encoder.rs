use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};

use crate::models::error::CaptureError;
use crate::traits::media_platform::VideoFrame;

pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";

/// Whether stills can be encoded to `mime_type`.
pub fn is_supported(mime_type: &str) -> bool {
    matches!(mime_type, JPEG | PNG)
}

/// Encode an RGBA frame into a still image.
///
/// `quality` applies to JPEG only. JPEG has no alpha channel, so the frame
/// is flattened to RGB first.
pub fn encode_frame(frame: &VideoFrame, mime_type: &str, quality: u8) -> Result<Vec<u8>, CaptureError> {
    if !frame.is_well_formed() {
        return Err(CaptureError::EncodingFailed(format!(
            "frame of {} bytes does not match {}x{}",
            frame.rgba.len(),
            frame.width,
            frame.height
        )));
    }

    let mut out = Vec::new();
    match mime_type {
        JPEG => {
            let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
                .ok_or_else(|| CaptureError::EncodingFailed("frame buffer too small".into()))?;
            let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .encode_image(&rgb)
                .map_err(|e| CaptureError::EncodingFailed(format!("JPEG: {}", e)))?;
        }
        PNG => {
            PngEncoder::new(&mut out)
                .write_image(&frame.rgba, frame.width, frame.height, ColorType::Rgba8)
                .map_err(|e| CaptureError::EncodingFailed(format!("PNG: {}", e)))?;
        }
        other => {
            return Err(CaptureError::EncodingFailed(format!("unsupported image type: {}", other)));
        }
    }
    Ok(out)
}
