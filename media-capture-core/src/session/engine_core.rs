use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::acquisition;
use super::device_directory::choose_device;
use super::events::EngineEvent;
use super::recorder::{Recorder, RecorderPhase};
use super::snapshot::Still;
use super::volume_monitor::VolumeMonitor;
use crate::models::artifact::{ArtifactKind, CapturedArtifact, ExtractedMedia};
use crate::models::config::CaptureOptions;
use crate::models::device::{DeviceDescriptor, DeviceKind, MediaConstraints};
use crate::models::error::CaptureError;
use crate::models::live_input::LiveInput;
use crate::models::state::{CaptureStatus, EngineState};
use crate::storage::object_urls::ObjectUrlRegistry;
use crate::traits::media_platform::MediaPlatform;
use crate::traits::media_recorder::{RecorderEvent, RecorderEventCallback};

const ARTIFACT_KINDS: [ArtifactKind; 3] = [ArtifactKind::Video, ArtifactKind::Audio, ArtifactKind::Image];

/// Work a transition schedules once the engine lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    Acquire { generation: u64 },
    WatchDevices,
    StartTicker { recording_id: u64 },
    ScheduleTeardown { token: u64, delay: Duration },
}

/// Collaborators available to a transition.
pub(crate) struct Cx<'a> {
    pub platform: &'a dyn MediaPlatform,
    pub options: &'a CaptureOptions,
    pub urls: &'a ObjectUrlRegistry,
    pub events: &'a mpsc::UnboundedSender<EngineEvent>,
    pub runtime: &'a Handle,
    pub effects: Vec<Effect>,
}

/// Mutable engine state. Only touched inside `EngineShared::transition`.
///
/// Counters used for supersession:
/// - `generation`: bumped by every acquisition request, deactivation included
/// - `input_id`: bumped whenever the live input is installed or released
/// - `recording_id`: bumped per recorder, and when one is discarded
/// - `teardown_token`: bumped by every activate/deactivate
#[derive(Default)]
pub(crate) struct EngineCore {
    pub state: EngineState,
    generation: u64,
    input_id: u64,
    recording_id: u64,
    teardown_token: u64,
    teardown_pending: bool,
    requested_device: Option<String>,
    recorder: Option<Recorder>,
    monitor: Option<VolumeMonitor>,
    pub device_watch: Option<JoinHandle<()>>,
    pub pump: Option<JoinHandle<()>>,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl EngineCore {
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn status_name(&self) -> &'static str {
        self.state.status.map_or("inactive", |s| s.as_str())
    }

    fn has_live_input(&self) -> bool {
        self.state.live_input().is_some_and(|input| !input.stream.is_ended())
    }

    // --- Public operations ---

    pub fn activate(&mut self, cx: &mut Cx<'_>) -> Result<(), CaptureError> {
        if self.state.active {
            return Ok(());
        }
        if self.state.captured_any() {
            return Err(CaptureError::CapturePending);
        }

        self.state.active = true;
        cx.effects.push(Effect::WatchDevices);

        let reuse = std::mem::take(&mut self.teardown_pending) && self.has_live_input();
        self.teardown_token += 1;
        if reuse {
            log::info!("reactivated within grace period, keeping live input");
            self.watch_volume(cx);
            return Ok(());
        }

        self.release_input();
        self.state.status = Some(CaptureStatus::Acquiring);
        self.state.duration_ms = None;
        self.begin_acquire(cx);
        Ok(())
    }

    pub fn deactivate(&mut self, cx: &mut Cx<'_>) {
        if !self.state.active {
            return;
        }
        self.state.active = false;
        self.generation += 1;

        if let Some(recorder) = self.recorder.take() {
            log::info!("discarding recording in progress");
            recorder.abort();
            self.recording_id += 1;
            self.state.duration_ms = None;
            self.state.status = self.has_live_input().then_some(CaptureStatus::Previewing);
        }
        if let Some(watch) = self.device_watch.take() {
            watch.abort();
        }

        self.teardown_token += 1;
        self.teardown_pending = true;
        cx.effects.push(Effect::ScheduleTeardown {
            token: self.teardown_token,
            delay: cx.options.deactivation_delay,
        });
    }

    pub fn choose_device(&mut self, cx: &mut Cx<'_>, device_id: &str) -> Result<(), CaptureError> {
        if !self.state.active {
            return Err(CaptureError::NotActive);
        }
        if self.recorder.is_some() {
            return Err(CaptureError::invalid("choose a device", self.status_name()));
        }

        log::info!("switching to device {}", device_id);
        self.drop_artifacts(cx.urls, false);
        self.state.duration_ms = None;
        self.requested_device = Some(device_id.to_string());
        self.release_input();
        self.state.status = Some(CaptureStatus::Initiating);
        self.begin_acquire(cx);
        Ok(())
    }

    pub fn start(&mut self, cx: &mut Cx<'_>) -> Result<(), CaptureError> {
        if !self.state.active {
            return Err(CaptureError::NotActive);
        }
        if self.recorder.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        let input = self.state.live_input().cloned().ok_or(CaptureError::NoActiveStream)?;
        if !self.state.is(CaptureStatus::Previewing) {
            return Err(CaptureError::invalid("start", self.status_name()));
        }

        let options = cx.options.recorder_options();
        let inner = cx.platform.create_recorder(&input.stream, &options)?;

        self.recording_id += 1;
        let recording_id = self.recording_id;
        let events = cx.events.clone();
        let on_event: RecorderEventCallback = Arc::new(move |event: RecorderEvent| {
            let _ = events.send(EngineEvent::Recorder { recording_id, event });
        });
        let dimensions = (input.kind == DeviceKind::Video).then_some((input.width, input.height));

        let recorder = Recorder::start(inner, cx.options.segment_duration, options.mime_type.as_str(), dimensions, on_event)?;
        self.recorder = Some(recorder);
        self.state.status = Some(CaptureStatus::Capturing);
        self.state.duration_ms = Some(0);
        cx.effects.push(Effect::StartTicker { recording_id });
        log::info!("recording started as {}", options.mime_type);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), CaptureError> {
        let recorder = self.recorder.as_mut().ok_or(CaptureError::NoRecorder)?;
        recorder.pause()?;
        self.state.duration_ms = Some(millis(recorder.elapsed()));
        self.state.status = Some(CaptureStatus::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CaptureError> {
        let recorder = self.recorder.as_mut().ok_or(CaptureError::NoRecorder)?;
        recorder.resume()?;
        self.state.status = Some(CaptureStatus::Capturing);
        Ok(())
    }

    pub fn stop(&mut self, cx: &mut Cx<'_>) -> Result<(), CaptureError> {
        let recorder = self.recorder.as_mut().ok_or(CaptureError::NoRecorder)?;
        let outcome = recorder.stop();
        self.state.duration_ms = Some(millis(recorder.elapsed()));
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_programmer_error() => Err(e),
            Err(e) => {
                log::error!("recorder failed to stop: {}", e);
                self.state.last_error = Some(e);
                self.finalize_recording(cx);
                Ok(())
            }
        }
    }

    pub fn snapshot_source(&self) -> Result<(LiveInput, u64), CaptureError> {
        if !self.state.active {
            return Err(CaptureError::NotActive);
        }
        let input = self.state.live_video.clone().ok_or(CaptureError::NoActiveStream)?;
        Ok((input, self.input_id))
    }

    pub fn on_snapshot(
        &mut self,
        cx: &mut Cx<'_>,
        input_id: u64,
        still: Result<Still, CaptureError>,
    ) -> Result<CapturedArtifact, CaptureError> {
        let still = match still {
            Ok(still) => still,
            Err(e) => {
                log::error!("snapshot failed: {}", e);
                self.state.last_error = Some(e.clone());
                return Err(e);
            }
        };
        if input_id != self.input_id || !self.state.active {
            log::debug!("discarding snapshot of a released input");
            return Err(CaptureError::NoActiveStream);
        }

        let url = cx.urls.create(&still.blob);
        let artifact =
            CapturedArtifact::new(ArtifactKind::Image, url, still.blob).with_dimensions(still.width, still.height);
        self.replace_artifact(cx.urls, artifact.clone());
        if cx.options.image_only && self.recorder.is_none() {
            self.state.status = Some(CaptureStatus::Captured);
        }
        log::info!("captured {}x{} still", still.width, still.height);
        Ok(artifact)
    }

    pub fn clear(&mut self, cx: &mut Cx<'_>) -> Result<(), CaptureError> {
        if self.recorder.is_some() {
            return Err(CaptureError::invalid("clear", self.status_name()));
        }
        self.drop_artifacts(cx.urls, true);
        self.state.duration_ms = None;
        if !self.state.is(CaptureStatus::Captured) {
            return Ok(());
        }

        if self.has_live_input() {
            self.state.status = Some(CaptureStatus::Previewing);
            if self.state.active {
                self.watch_volume(cx);
            }
        } else if self.state.active {
            self.release_input();
            self.state.status = Some(CaptureStatus::Initiating);
            self.begin_acquire(cx);
        }
        Ok(())
    }

    /// Hand the captured media over to the caller. Their URLs are no longer
    /// revoked by deactivation.
    pub fn extract(&mut self) -> ExtractedMedia {
        let mut media = ExtractedMedia::default();
        for kind in ARTIFACT_KINDS {
            if let Some(artifact) = self.state.captured_mut(kind) {
                artifact.extracted = true;
                let extracted = Some(artifact.to_extracted());
                match kind {
                    ArtifactKind::Video => media.video = extracted,
                    ArtifactKind::Audio => media.audio = extracted,
                    ArtifactKind::Image => media.image = extracted,
                }
            }
        }
        media
    }

    // --- Asynchronous completions ---

    /// Apply a device listing. Returns the constraints to acquire with, or
    /// `None` if the request was superseded or access was refused.
    pub fn on_listed(
        &mut self,
        cx: &mut Cx<'_>,
        generation: u64,
        listed: Result<Vec<DeviceDescriptor>, CaptureError>,
    ) -> Option<MediaConstraints> {
        if !self.is_current(generation) {
            log::debug!("discarding stale device listing");
            return None;
        }
        let devices = match listed {
            Ok(devices) => devices,
            Err(e) => {
                self.deny(e);
                return None;
            }
        };

        let preferred = self.requested_device.clone().or_else(|| cx.options.preferred_device.clone());
        let chosen = choose_device(&devices, preferred.as_deref()).map(|d| d.id.clone());
        log::debug!("{} device(s) listed, chose {:?}", devices.len(), chosen);

        self.state.devices = devices;
        self.state.chosen_device_id = chosen.clone();
        if chosen.is_some() {
            self.requested_device = chosen.clone();
        }
        self.state.status = Some(CaptureStatus::Initiating);

        Some(
            cx.options
                .constraints()
                .with_device(cx.options.primary_kind(), chosen.as_deref()),
        )
    }

    pub fn on_acquired(&mut self, cx: &mut Cx<'_>, generation: u64, acquired: Result<LiveInput, CaptureError>) {
        if !self.is_current(generation) {
            if let Ok(input) = acquired {
                log::debug!("releasing superseded stream {}", input.stream.id());
                input.release();
            }
            return;
        }
        match acquired {
            Ok(input) => self.install_input(cx, input),
            Err(e) => self.deny(e),
        }
    }

    pub fn on_devices_changed(&mut self, cx: &mut Cx<'_>, devices: Vec<DeviceDescriptor>) {
        let previous = std::mem::replace(&mut self.state.devices, devices);

        let chosen_gone = self
            .state
            .chosen_device_id
            .as_ref()
            .is_some_and(|id| !self.state.devices.iter().any(|d| &d.id == id));
        if chosen_gone {
            log::info!("chosen device disappeared");
            self.state.chosen_device_id = None;
        }

        if !self.state.active || !cx.options.choose_new_device {
            return;
        }
        if !self.state.status.is_some_and(|s| s.accepts_new_device()) {
            return;
        }
        let added = self
            .state
            .devices
            .iter()
            .find(|d| !previous.iter().any(|p| p.id == d.id))
            .map(|d| d.id.clone());
        if let Some(id) = added {
            log::info!("new device {} plugged in", id);
            if let Err(e) = self.choose_device(cx, &id) {
                log::warn!("could not switch to new device: {}", e);
            }
        }
    }

    pub fn on_event(&mut self, cx: &mut Cx<'_>, event: EngineEvent) {
        match event {
            EngineEvent::TrackEnded { input_id } => self.on_track_ended(cx, input_id),
            EngineEvent::Volume { input_id, level } => {
                if input_id == self.input_id && self.monitor.is_some() {
                    self.state.volume = Some(level);
                }
            }
            EngineEvent::Recorder { recording_id, event } => self.on_recorder_event(cx, recording_id, event),
        }
    }

    /// Republish the elapsed duration. Returns false once the recording is
    /// gone so the ticker can exit.
    pub fn on_tick(&mut self, recording_id: u64) -> bool {
        match &self.recorder {
            Some(recorder) if self.recording_id == recording_id => {
                if recorder.phase() == RecorderPhase::Recording {
                    self.state.duration_ms = Some(millis(recorder.elapsed()));
                }
                true
            }
            _ => false,
        }
    }

    pub fn teardown(&mut self, cx: &mut Cx<'_>, token: u64) {
        if token != self.teardown_token || !self.teardown_pending || self.state.active {
            return;
        }
        self.teardown_pending = false;
        self.release_input();
        self.drop_artifacts(cx.urls, false);
        self.state.status = None;
        self.state.duration_ms = None;
        log::debug!("released capture devices");
    }

    /// Release everything; the engine is going away.
    pub fn shutdown(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.abort();
        }
        self.release_input();
        for task in [self.device_watch.take(), self.pump.take()].into_iter().flatten() {
            task.abort();
        }
    }

    // --- Internal helpers ---

    fn begin_acquire(&mut self, cx: &mut Cx<'_>) {
        self.generation += 1;
        cx.effects.push(Effect::Acquire {
            generation: self.generation,
        });
    }

    fn deny(&mut self, error: CaptureError) {
        log::warn!("device access failed: {}", error);
        self.state.status = Some(CaptureStatus::Denied);
        self.state.last_error = Some(error);
    }

    fn install_input(&mut self, cx: &mut Cx<'_>, input: LiveInput) {
        self.release_input();
        self.input_id += 1;
        let input_id = self.input_id;
        let events = cx.events.clone();
        acquisition::watch_tracks(
            &input,
            Arc::new(move || {
                let _ = events.send(EngineEvent::TrackEnded { input_id });
            }),
        );

        log::info!(
            "acquired {} stream {} ({}x{})",
            input.kind.as_str(),
            input.stream.id(),
            input.width,
            input.height
        );
        match input.kind {
            DeviceKind::Video => self.state.live_video = Some(input),
            DeviceKind::Audio => self.state.live_audio = Some(input),
        }
        self.state.status = Some(CaptureStatus::Previewing);
        self.state.last_error = None;
        self.watch_volume(cx);
    }

    fn release_input(&mut self) {
        self.detach_volume();
        for input in [self.state.live_video.take(), self.state.live_audio.take()]
            .into_iter()
            .flatten()
        {
            log::debug!("releasing stream {}", input.stream.id());
            input.release();
        }
        self.input_id += 1;
    }

    fn watch_volume(&mut self, cx: &mut Cx<'_>) {
        if !cx.options.watch_volume || !cx.options.audio || self.monitor.is_some() {
            return;
        }
        let Some(input) = self.state.live_input() else {
            return;
        };
        if !input.stream.has_kind(DeviceKind::Audio) {
            return;
        }

        let input_id = self.input_id;
        let events = cx.events.clone();
        let attached = VolumeMonitor::attach(
            cx.platform,
            &input.stream,
            cx.options.volume_window,
            cx.options.volume_interval,
            cx.runtime,
            move |level| {
                let _ = events.send(EngineEvent::Volume { input_id, level });
            },
        );
        match attached {
            Ok(monitor) => self.monitor = Some(monitor),
            Err(e) => log::warn!("volume monitoring unavailable: {}", e),
        }
    }

    fn detach_volume(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.detach();
        }
        self.state.volume = None;
    }

    fn on_track_ended(&mut self, cx: &mut Cx<'_>, input_id: u64) {
        if input_id != self.input_id || !self.state.active {
            return;
        }
        match self.state.status {
            Some(CaptureStatus::Previewing) => {
                log::warn!("input ended while previewing, reacquiring");
                self.release_input();
                self.drop_artifacts(cx.urls, false);
                self.state.status = Some(CaptureStatus::Initiating);
                self.begin_acquire(cx);
            }
            Some(CaptureStatus::Capturing) | Some(CaptureStatus::Paused) => {
                log::warn!("input ended while recording, keeping what was buffered");
                self.release_input();
                if let Some(recorder) = self.recorder.as_mut() {
                    if recorder.phase() != RecorderPhase::Stopping {
                        let outcome = recorder.stop();
                        self.state.duration_ms = Some(millis(recorder.elapsed()));
                        if let Err(e) = outcome {
                            log::error!("recorder failed to stop: {}", e);
                            self.finalize_recording(cx);
                        }
                    }
                }
            }
            _ => self.release_input(),
        }
    }

    fn on_recorder_event(&mut self, cx: &mut Cx<'_>, recording_id: u64, event: RecorderEvent) {
        if recording_id != self.recording_id {
            log::debug!("ignoring event from a discarded recorder");
            return;
        }
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        match event {
            RecorderEvent::DataAvailable(chunk) => {
                if !recorder.push_chunk(chunk) {
                    log::debug!("ignored empty chunk while {}", recorder.phase());
                }
            }
            RecorderEvent::Stopped => self.finalize_recording(cx),
            RecorderEvent::Error(reason) => {
                log::error!("recorder error: {}", reason);
                self.state.last_error = Some(CaptureError::EncodingFailed(reason));
                let stopping = recorder.phase() == RecorderPhase::Stopping || recorder.stop().is_ok();
                if !stopping {
                    self.finalize_recording(cx);
                }
            }
        }
    }

    fn finalize_recording(&mut self, cx: &mut Cx<'_>) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };

        let Some(finished) = recorder.finish() else {
            log::warn!("recording produced no data");
            self.state.duration_ms = None;
            if self.has_live_input() {
                self.state.status = Some(CaptureStatus::Previewing);
            } else if self.state.active {
                self.release_input();
                self.drop_artifacts(cx.urls, false);
                self.state.status = Some(CaptureStatus::Initiating);
                self.begin_acquire(cx);
            }
            return;
        };

        let kind = if cx.options.video {
            ArtifactKind::Video
        } else {
            ArtifactKind::Audio
        };
        let url = cx.urls.create(&finished.blob);
        let mut artifact = CapturedArtifact::new(kind, url, finished.blob).with_duration(finished.duration);
        if let Some((width, height)) = finished.dimensions {
            artifact = artifact.with_dimensions(width, height);
        }
        log::info!(
            "captured {:?}: {} bytes, {} ms",
            kind,
            artifact.blob.len(),
            millis(finished.duration)
        );

        self.replace_artifact(cx.urls, artifact);
        self.state.duration_ms = Some(millis(finished.duration));
        self.state.status = Some(CaptureStatus::Captured);
        self.detach_volume();
    }

    fn replace_artifact(&mut self, urls: &ObjectUrlRegistry, artifact: CapturedArtifact) {
        if let Some(previous) = self.state.captured_mut(artifact.kind).replace(artifact) {
            if !previous.extracted {
                urls.revoke(&previous.url);
            }
        }
    }

    /// Drop every artifact, revoking URLs of those still owned by the
    /// engine (and of extracted ones too if `include_extracted`).
    fn drop_artifacts(&mut self, urls: &ObjectUrlRegistry, include_extracted: bool) {
        for kind in ARTIFACT_KINDS {
            if let Some(artifact) = self.state.captured_mut(kind).take() {
                if include_extracted || !artifact.extracted {
                    urls.revoke(&artifact.url);
                }
            }
        }
    }
}
