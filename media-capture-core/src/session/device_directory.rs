use crate::models::device::{DeviceDescriptor, DeviceKind, MediaConstraints, MediaDeviceInfo};
use crate::models::error::CaptureError;
use crate::traits::media_platform::MediaPlatform;

/// List input devices of `kind`, in platform order.
///
/// Enumeration failures yield an empty list. Platforms hide labels until
/// access has been granted once, so when every device is unlabeled a
/// throwaway stream of `kind` is opened and released before listing again.
/// Only a refusal of that stream is reported as an error.
pub async fn list_devices<P: MediaPlatform + ?Sized>(
    platform: &P,
    kind: DeviceKind,
) -> Result<Vec<DeviceDescriptor>, CaptureError> {
    let devices = enumerate(platform, kind).await;
    let unlabeled = devices.iter().filter(|d| d.label.is_empty()).count();
    if unlabeled == 0 || unlabeled < devices.len() {
        return Ok(devices.into_iter().map(DeviceDescriptor::from).collect());
    }

    log::debug!("{} {} device(s) without labels, requesting access", unlabeled, kind.as_str());
    let probe = MediaConstraints::new(kind == DeviceKind::Video, kind == DeviceKind::Audio);
    let stream = platform
        .get_user_media(&probe)
        .await
        .map_err(CaptureError::into_denial)?;
    for track in stream.tracks() {
        track.stop();
    }

    Ok(enumerate(platform, kind)
        .await
        .into_iter()
        .map(DeviceDescriptor::from)
        .collect())
}

async fn enumerate<P: MediaPlatform + ?Sized>(platform: &P, kind: DeviceKind) -> Vec<MediaDeviceInfo> {
    match platform.enumerate_devices().await {
        Ok(devices) => devices.into_iter().filter(|d| d.kind == kind).collect(),
        Err(e) => {
            log::warn!("device enumeration unavailable: {}", e);
            Vec::new()
        }
    }
}

/// Resolve a preferred device.
///
/// An exact id match wins, then the first device whose label contains
/// `preferred` (case-insensitive), then the first device.
pub fn choose_device<'a>(devices: &'a [DeviceDescriptor], preferred: Option<&str>) -> Option<&'a DeviceDescriptor> {
    if let Some(preferred) = preferred.filter(|p| !p.is_empty()) {
        if let Some(device) = devices.iter().find(|d| d.id == preferred) {
            return Some(device);
        }
        let fragment = preferred.to_lowercase();
        if let Some(device) = devices.iter().find(|d| d.label.to_lowercase().contains(&fragment)) {
            return Some(device);
        }
    }
    devices.first()
}
