//! In-process camera/microphone subsystem.
//!
//! Devices, permission and hot-plug are scripted by the caller. Video tracks
//! render a moving gradient, audio tracks a sine tone, and recorders
//! synthesize encoded chunks on a timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use media_capture_core::{
    AudioBufferCallback, AudioTap, CaptureError, DeviceKind, MediaConstraints, MediaDeviceInfo, MediaPlatform,
    MediaRecorder, MediaStream, MediaTrack, RecorderOptions, SurfaceEvent, TrackConstraint, VideoFrame,
};

use crate::recorder::{RecorderHandle, RecorderScript, VirtualRecorder};
use crate::signal::{gradient_frame, ToneGenerator, SAMPLE_RATE};
use crate::stream::{VirtualStream, VirtualTrack};

/// Audio buffers are delivered at this cadence.
const TAP_PERIOD: Duration = Duration::from_millis(20);
const TAP_CHANNELS: u16 = 2;

/// Camera/microphone permission as the user left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not decided yet. Labels are hidden; the first stream request is
    /// granted.
    Prompt,
    Granted,
    Denied,
}

/// A scripted input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice {
    pub id: String,
    pub kind: DeviceKind,
    pub label: String,
    /// Frame size of a camera; zero for microphones.
    pub width: u32,
    pub height: u32,
}

impl VirtualDevice {
    pub fn camera(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Video,
            label: label.into(),
            width: 1280,
            height: 720,
        }
    }

    pub fn microphone(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Audio,
            label: label.into(),
            width: 0,
            height: 0,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Scripted `MediaPlatform`.
///
/// Every stream handed out is tracked so tests can check that the engine
/// released what it no longer uses.
pub struct VirtualPlatform {
    devices: Mutex<Vec<VirtualDevice>>,
    permission: Mutex<Permission>,
    enumeration_fails: AtomicBool,
    surface_stalled: AtomicBool,
    stalled_surfaces: Mutex<Vec<mpsc::UnboundedSender<SurfaceEvent>>>,
    acquire_delays: Mutex<HashMap<String, Duration>>,
    streams: Mutex<Vec<Arc<VirtualStream>>>,
    changes: broadcast::Sender<()>,
    recorder_script: Mutex<RecorderScript>,
    recorder_options: Mutex<Vec<RecorderOptions>>,
    recorders: Mutex<Vec<RecorderHandle>>,
    /// f32 bits of the tone amplitude, shared with running taps.
    tone_amplitude: Arc<AtomicU32>,
    media_requests: AtomicUsize,
    frames_grabbed: AtomicU64,
}

impl VirtualPlatform {
    pub fn new(devices: Vec<VirtualDevice>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            devices: Mutex::new(devices),
            permission: Mutex::new(Permission::Prompt),
            enumeration_fails: AtomicBool::new(false),
            surface_stalled: AtomicBool::new(false),
            stalled_surfaces: Mutex::new(Vec::new()),
            acquire_delays: Mutex::new(HashMap::new()),
            streams: Mutex::new(Vec::new()),
            changes,
            recorder_script: Mutex::new(RecorderScript::default()),
            recorder_options: Mutex::new(Vec::new()),
            recorders: Mutex::new(Vec::new()),
            tone_amplitude: Arc::new(AtomicU32::new(0.5f32.to_bits())),
            media_requests: AtomicUsize::new(0),
            frames_grabbed: AtomicU64::new(0),
        }
    }

    /// A front camera, a USB camera and a built-in microphone.
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            VirtualDevice::camera("cam-front", "Front Camera"),
            VirtualDevice::camera("cam-usb", "USB Camera").with_resolution(1920, 1080),
            VirtualDevice::microphone("mic-builtin", "Built-in Microphone"),
        ])
    }

    // --- Scripting ---

    pub fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock() = permission;
    }

    /// Make `enumerate_devices` fail.
    pub fn set_enumeration_failing(&self, failing: bool) {
        self.enumeration_fails.store(failing, Ordering::SeqCst);
    }

    /// Keep decode surfaces from ever reporting a frame size.
    pub fn set_surface_stalled(&self, stalled: bool) {
        self.surface_stalled.store(stalled, Ordering::SeqCst);
        if !stalled {
            self.stalled_surfaces.lock().clear();
        }
    }

    /// Delay stream requests that open `device_id`.
    pub fn set_acquire_delay(&self, device_id: &str, delay: Duration) {
        self.acquire_delays.lock().insert(device_id.to_string(), delay);
    }

    pub fn set_recorder_script(&self, script: RecorderScript) {
        *self.recorder_script.lock() = script;
    }

    /// Peak amplitude of the tone on audio tracks, 0.0..=1.0.
    pub fn set_tone_amplitude(&self, amplitude: f32) {
        self.tone_amplitude
            .store(amplitude.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    /// Add a device and signal the change.
    pub fn plug_in(&self, device: VirtualDevice) {
        log::info!("virtual device plugged in: {} ({})", device.id, device.label);
        self.devices.lock().push(device);
        let _ = self.changes.send(());
    }

    /// Remove a device, end every track reading from it, and signal the
    /// change.
    pub fn unplug(&self, device_id: &str) -> bool {
        let removed = {
            let mut devices = self.devices.lock();
            let before = devices.len();
            devices.retain(|d| d.id != device_id);
            devices.len() != before
        };
        if !removed {
            return false;
        }

        log::info!("virtual device unplugged: {}", device_id);
        let tracks: Vec<Arc<VirtualTrack>> = self
            .streams
            .lock()
            .iter()
            .flat_map(|s| s.virtual_tracks().iter().cloned())
            .filter(|t| t.device_id() == device_id)
            .collect();
        for track in tracks {
            track.end();
        }
        let _ = self.changes.send(());
        true
    }

    // --- Inspection ---

    /// Streams with at least one track still running.
    pub fn live_streams(&self) -> Vec<Arc<VirtualStream>> {
        let mut streams = self.streams.lock();
        streams.retain(|s| !s.is_ended());
        streams.clone()
    }

    /// Whether a live stream reads from `device_id`.
    pub fn is_device_in_use(&self, device_id: &str) -> bool {
        self.live_streams().iter().any(|s| s.uses_device(device_id))
    }

    /// Number of `get_user_media` calls so far, probes included.
    pub fn media_requests(&self) -> usize {
        self.media_requests.load(Ordering::SeqCst)
    }

    /// Options of every recorder created, oldest first.
    pub fn recorder_options(&self) -> Vec<RecorderOptions> {
        self.recorder_options.lock().clone()
    }

    /// Make every running recorder deliver what it has buffered right now.
    /// Returns how many delivered a chunk.
    pub fn request_data(&self) -> usize {
        let mut recorders = self.recorders.lock();
        recorders.retain(|r| r.is_alive());
        recorders.iter().filter(|r| r.request_data()).count()
    }

    pub fn frames_grabbed(&self) -> u64 {
        self.frames_grabbed.load(Ordering::SeqCst)
    }

    // --- Internals ---

    fn find_stream(&self, stream: &Arc<dyn MediaStream>) -> Result<Arc<VirtualStream>, CaptureError> {
        self.streams
            .lock()
            .iter()
            .find(|s| s.id() == stream.id())
            .cloned()
            .ok_or(CaptureError::DeviceNotAvailable)
    }

    fn pick_device(&self, kind: DeviceKind, constraint: &TrackConstraint) -> Result<VirtualDevice, CaptureError> {
        let devices = self.devices.lock();
        let mut candidates = devices.iter().filter(|d| d.kind == kind);
        let found = match constraint {
            TrackConstraint::Disabled => None,
            TrackConstraint::Any => candidates.next(),
            TrackConstraint::Device(id) => candidates.find(|d| &d.id == id),
        };
        found.cloned().ok_or(CaptureError::DeviceNotAvailable)
    }
}

impl Default for VirtualPlatform {
    fn default() -> Self {
        Self::with_default_devices()
    }
}

#[async_trait]
impl MediaPlatform for VirtualPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, CaptureError> {
        if self.enumeration_fails.load(Ordering::SeqCst) {
            return Err(CaptureError::Unknown("device enumeration unavailable".into()));
        }
        let reveal = self.permission() == Permission::Granted;
        Ok(self
            .devices
            .lock()
            .iter()
            .map(|d| MediaDeviceInfo {
                device_id: d.id.clone(),
                kind: d.kind,
                label: if reveal { d.label.clone() } else { String::new() },
            })
            .collect())
    }

    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<Arc<dyn MediaStream>, CaptureError> {
        self.media_requests.fetch_add(1, Ordering::SeqCst);
        if self.permission() == Permission::Denied {
            return Err(CaptureError::PermissionDenied("NotAllowedError: permission denied".into()));
        }

        let mut picked = Vec::new();
        for kind in [DeviceKind::Video, DeviceKind::Audio] {
            if constraints.requests(kind) {
                picked.push(self.pick_device(kind, constraints.get(kind))?);
            }
        }
        if picked.is_empty() {
            return Err(CaptureError::ConfigurationFailed("no track requested".into()));
        }

        let delay = {
            let delays = self.acquire_delays.lock();
            picked.iter().filter_map(|d| delays.get(&d.id).copied()).max()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // The device may have gone away while the request was pending.
        let still_present = {
            let devices = self.devices.lock();
            picked.iter().all(|p| devices.iter().any(|d| d.id == p.id))
        };
        if !still_present {
            return Err(CaptureError::DeviceNotAvailable);
        }

        {
            let mut permission = self.permission.lock();
            if *permission == Permission::Prompt {
                *permission = Permission::Granted;
            }
        }

        let (width, height) = picked
            .iter()
            .find(|d| d.kind == DeviceKind::Video)
            .map_or((0, 0), |d| (d.width, d.height));
        let tracks = picked
            .iter()
            .map(|d| Arc::new(VirtualTrack::new(d.kind, d.id.clone())))
            .collect();
        let stream = Arc::new(VirtualStream::new(tracks, width, height));
        log::debug!(
            "opened virtual stream {} on {:?}",
            stream.id(),
            picked.iter().map(|d| d.id.as_str()).collect::<Vec<_>>()
        );
        self.streams.lock().push(Arc::clone(&stream));
        Ok(stream)
    }

    fn device_changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }

    fn open_decode_surface(
        &self,
        stream: &Arc<dyn MediaStream>,
    ) -> Result<mpsc::UnboundedReceiver<SurfaceEvent>, CaptureError> {
        let stream = self.find_stream(stream)?;
        if !stream.is_live(DeviceKind::Video) {
            return Err(CaptureError::ConfigurationFailed("stream has no live video track".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (width, height) = stream.dimensions();
        // Metadata arrives before the frame size is known.
        let _ = tx.send(SurfaceEvent::LoadedMetadata { width: 0, height: 0 });
        if self.surface_stalled.load(Ordering::SeqCst) {
            self.stalled_surfaces.lock().push(tx);
            return Ok(rx);
        }
        let _ = tx.send(SurfaceEvent::LoadedData { width, height });
        let _ = tx.send(SurfaceEvent::CanPlay { width, height });
        Ok(rx)
    }

    fn tap_audio(
        &self,
        stream: &Arc<dyn MediaStream>,
        callback: AudioBufferCallback,
    ) -> Result<Box<dyn AudioTap>, CaptureError> {
        let stream = self.find_stream(stream)?;
        if !stream.is_live(DeviceKind::Audio) {
            return Err(CaptureError::ConfigurationFailed("stream has no live audio track".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|_| CaptureError::ConfigurationFailed("audio tap requires a tokio runtime".into()))?;

        let amplitude = Arc::clone(&self.tone_amplitude);
        let task = runtime.spawn(async move {
            let mut tone = ToneGenerator::new(440.0, SAMPLE_RATE);
            let frames = tone.frames_for(TAP_PERIOD.as_millis() as u64);
            let mut ticker = tokio::time::interval(TAP_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !stream.is_live(DeviceKind::Audio) {
                    break;
                }
                let level = f32::from_bits(amplitude.load(Ordering::SeqCst));
                let buffer = tone.next_buffer(frames, TAP_CHANNELS, level);
                callback(&buffer, tone.sample_rate() as f64, TAP_CHANNELS);
            }
        });
        Ok(Box::new(VirtualTap { task: Some(task) }))
    }

    fn create_recorder(
        &self,
        stream: &Arc<dyn MediaStream>,
        options: &RecorderOptions,
    ) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        let stream = self.find_stream(stream)?;
        if stream.is_ended() {
            return Err(CaptureError::DeviceNotAvailable);
        }
        self.recorder_options.lock().push(options.clone());
        let script = self.recorder_script.lock().clone();
        let recorder = VirtualRecorder::new(options.clone(), script);
        self.recorders.lock().push(recorder.handle());
        Ok(Box::new(recorder))
    }

    async fn grab_frame(
        &self,
        stream: &Arc<dyn MediaStream>,
        width: u32,
        height: u32,
    ) -> Result<VideoFrame, CaptureError> {
        let stream = self.find_stream(stream)?;
        if !stream.is_live(DeviceKind::Video) {
            return Err(CaptureError::DeviceNotAvailable);
        }
        let seq = self.frames_grabbed.fetch_add(1, Ordering::SeqCst);
        Ok(gradient_frame(width, height, seq))
    }
}

/// Tone feed of one audio tap.
struct VirtualTap {
    task: Option<JoinHandle<()>>,
}

impl AudioTap for VirtualTap {
    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for VirtualTap {
    fn drop(&mut self) {
        self.disconnect();
    }
}
