use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;
use tokio::time::Instant;

use media_capture_core::{
    ArtifactKind, CaptureDelegate, CaptureEngine, CaptureError, CaptureOptions, CaptureStatus, CapturedArtifact,
    DeviceDescriptor, EngineState, MediaStream, MediaTrack,
};
use media_capture_virtual::{Permission, RecorderScript, VirtualDevice, VirtualPlatform};

const WAIT: Duration = Duration::from_secs(30);

// -- Helpers --

fn granted(devices: Vec<VirtualDevice>) -> Arc<VirtualPlatform> {
    let platform = VirtualPlatform::new(devices);
    platform.set_permission(Permission::Granted);
    Arc::new(platform)
}

fn two_cameras() -> Vec<VirtualDevice> {
    vec![
        VirtualDevice::camera("cam-a", "Camera A"),
        VirtualDevice::camera("cam-b", "Camera B").with_resolution(640, 480),
    ]
}

fn video_only() -> CaptureOptions {
    CaptureOptions {
        audio: false,
        ..CaptureOptions::default()
    }
}

fn engine_with(platform: &Arc<VirtualPlatform>, options: CaptureOptions) -> (CaptureEngine<VirtualPlatform>, Arc<StatusLog>) {
    let engine = CaptureEngine::new(Arc::clone(platform), options).unwrap();
    let log = Arc::new(StatusLog::default());
    engine.set_delegate(log.clone());
    (engine, log)
}

/// Device the live input reads its primary track from.
fn live_device(state: &EngineState) -> Option<String> {
    let input = state.live_input()?;
    input
        .stream
        .tracks()
        .iter()
        .find(|t| t.kind() == input.kind)
        .map(|t| t.device_id().to_string())
}

fn live_stream_id(state: &EngineState) -> Option<String> {
    state.live_input().map(|input| input.stream.id().to_string())
}

async fn wait_until<F>(engine: &CaptureEngine<VirtualPlatform>, what: &str, pred: F) -> EngineState
where
    F: Fn(&EngineState) -> bool,
{
    let mut rx = engine.subscribe();
    let waited = tokio::time::timeout(WAIT, async {
        loop {
            let state = rx.borrow_and_update().clone();
            if pred(&state) {
                return state;
            }
            if rx.changed().await.is_err() {
                return state;
            }
        }
    })
    .await;
    match waited {
        Ok(state) => state,
        Err(_) => panic!("timed out waiting for {}: {:?}", what, engine.snapshot()),
    }
}

async fn wait_for(engine: &CaptureEngine<VirtualPlatform>, status: CaptureStatus) -> EngineState {
    wait_until(engine, status.as_str(), |s| s.is(status)).await
}

async fn previewing(engine: &CaptureEngine<VirtualPlatform>) -> EngineState {
    engine.activate().unwrap();
    wait_for(engine, CaptureStatus::Previewing).await
}

#[derive(Default)]
struct Observed {
    statuses: Vec<CaptureStatus>,
    durations: Vec<u64>,
    live_devices: Vec<String>,
    volumes: Vec<u8>,
    errors: Vec<CaptureError>,
    finished: Vec<String>,
}

/// Delegate recording what a UI would have been told.
#[derive(Default)]
struct StatusLog(Mutex<Observed>);

impl StatusLog {
    fn statuses(&self) -> Vec<CaptureStatus> {
        self.0.lock().statuses.clone()
    }

    fn count(&self, status: CaptureStatus) -> usize {
        self.0.lock().statuses.iter().filter(|s| **s == status).count()
    }
}

impl CaptureDelegate for StatusLog {
    fn on_state_changed(&self, state: &EngineState) {
        let mut seen = self.0.lock();
        if let Some(status) = state.status {
            if seen.statuses.last() != Some(&status) {
                seen.statuses.push(status);
            }
        }
        if let Some(ms) = state.duration_ms {
            seen.durations.push(ms);
        }
        if let Some(device) = live_device(state) {
            if seen.live_devices.last() != Some(&device) {
                seen.live_devices.push(device);
            }
        }
    }

    fn on_volume_changed(&self, volume: u8) {
        self.0.lock().volumes.push(volume);
    }

    fn on_error(&self, error: &CaptureError) {
        self.0.lock().errors.push(error.clone());
    }

    fn on_capture_finished(&self, artifact: &CapturedArtifact) {
        self.0.lock().finished.push(artifact.url.clone());
    }
}

// -- Activation --

#[tokio::test(start_paused = true)]
async fn usb_camera_activation_reaches_previewing() {
    let platform = Arc::new(VirtualPlatform::new(vec![VirtualDevice::camera("usb-1", "USB Camera")]));
    let (engine, log) = engine_with(&platform, video_only());

    let state = previewing(&engine).await;

    assert_eq!(
        log.statuses(),
        vec![CaptureStatus::Acquiring, CaptureStatus::Initiating, CaptureStatus::Previewing]
    );
    assert_eq!(state.chosen_device_id.as_deref(), Some("usb-1"));
    assert_eq!(
        state.devices,
        vec![DeviceDescriptor {
            id: "usb-1".into(),
            label: "USB Camera".into(),
        }]
    );
    let input = state.live_video.as_ref().unwrap();
    assert!(input.width > 0 && input.height > 0);
    assert!(state.live_audio.is_none());

    // The label probe is released; only the preview stream stays open.
    assert_eq!(platform.media_requests(), 2);
    assert_eq!(platform.live_streams().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn denied_access_is_terminal() {
    let platform = Arc::new(VirtualPlatform::with_default_devices());
    platform.set_permission(Permission::Denied);
    let (engine, log) = engine_with(&platform, CaptureOptions::video());

    engine.activate().unwrap();
    let state = wait_for(&engine, CaptureStatus::Denied).await;

    assert!(state.devices.is_empty());
    assert!(matches!(state.last_error, Some(CaptureError::PermissionDenied(_))));
    assert!(state.live_input().is_none());
    assert_eq!(log.statuses(), vec![CaptureStatus::Acquiring, CaptureStatus::Denied]);
    assert_eq!(log.0.lock().errors.len(), 1);
    assert!(platform.live_streams().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_metadata_fails_acquisition() {
    let platform = granted(two_cameras());
    platform.set_surface_stalled(true);
    let options = CaptureOptions {
        metadata_timeout: Duration::from_secs(2),
        ..video_only()
    };
    let (engine, _log) = engine_with(&platform, options);

    engine.activate().unwrap();
    let state = wait_for(&engine, CaptureStatus::Denied).await;

    assert!(matches!(state.last_error, Some(CaptureError::MetadataUnavailable(_))));
    assert!(platform.live_streams().is_empty());
}

#[tokio::test(start_paused = true)]
async fn enumeration_failure_still_previews() {
    let platform = granted(two_cameras());
    platform.set_enumeration_failing(true);
    let (engine, _log) = engine_with(&platform, video_only());

    let state = previewing(&engine).await;

    assert!(state.devices.is_empty());
    assert!(state.chosen_device_id.is_none());
    assert_eq!(live_device(&state).as_deref(), Some("cam-a"));
}

#[tokio::test(start_paused = true)]
async fn preferred_label_fragment_picks_device() {
    let platform = Arc::new(VirtualPlatform::with_default_devices());
    let (engine, _log) = engine_with(&platform, CaptureOptions::video());

    let state = previewing(&engine).await;

    assert_eq!(state.chosen_device_id.as_deref(), Some("cam-front"));
    assert!(state.live_video.as_ref().unwrap().stream.has_kind(media_capture_core::DeviceKind::Audio));
}

#[tokio::test(start_paused = true)]
async fn every_observer_sees_the_same_change() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());

    let mut first = engine.subscribe();
    let mut second = engine.subscribe();
    engine.activate().unwrap();

    first.changed().await.unwrap();
    second.changed().await.unwrap();
    assert_eq!(first.borrow().revision, second.borrow().revision);
    assert!(first.borrow().active);

    let state = engine.await_change_since(0).await;
    assert!(state.revision > 0);
}

// -- Device selection --

#[tokio::test(start_paused = true)]
async fn latest_device_choice_wins() {
    let platform = granted(vec![
        VirtualDevice::camera("cam-a", "Camera A"),
        VirtualDevice::camera("cam-b", "Camera B"),
        VirtualDevice::camera("cam-c", "Camera C"),
    ]);
    let (engine, log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    platform.set_acquire_delay("cam-b", Duration::from_millis(500));
    engine.choose_device("cam-b").unwrap();
    // Let the slow request reach the platform before superseding it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.snapshot().is(CaptureStatus::Initiating));
    engine.choose_device("cam-c").unwrap();

    wait_until(&engine, "cam-c preview", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-c")
    })
    .await;

    // The superseded request completes afterwards and must not land.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let state = engine.snapshot();
    assert_eq!(state.chosen_device_id.as_deref(), Some("cam-c"));
    assert_eq!(live_device(&state).as_deref(), Some("cam-c"));
    assert!(!platform.is_device_in_use("cam-b"));
    assert_eq!(platform.live_streams().len(), 1);
    assert!(!log.0.lock().live_devices.iter().any(|d| d == "cam-b"));
}

#[tokio::test(start_paused = true)]
async fn rapid_choices_settle_on_the_last() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    for id in ["cam-b", "cam-a", "cam-b", "cam-a", "cam-b"] {
        engine.choose_device(id).unwrap();
    }
    let state = wait_for(&engine, CaptureStatus::Previewing).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(live_device(&state).as_deref(), Some("cam-b"));
    assert_eq!(engine.snapshot().chosen_device_id.as_deref(), Some("cam-b"));
    assert_eq!(platform.live_streams().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn new_device_is_adopted_while_previewing() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    platform.plug_in(VirtualDevice::camera("cam-new", "Brand New Camera"));
    let state = wait_until(&engine, "switch to new camera", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-new")
    })
    .await;

    assert_eq!(state.chosen_device_id.as_deref(), Some("cam-new"));
    assert_eq!(state.devices.len(), 3);
    assert!(!platform.is_device_in_use("cam-a"));
}

#[tokio::test(start_paused = true)]
async fn new_device_is_only_listed_when_auto_switch_is_off() {
    let platform = granted(two_cameras());
    let options = CaptureOptions {
        choose_new_device: false,
        ..video_only()
    };
    let (engine, _log) = engine_with(&platform, options);
    previewing(&engine).await;

    platform.plug_in(VirtualDevice::camera("cam-new", "Brand New Camera"));
    let state = wait_until(&engine, "relisted devices", |s| s.devices.len() == 3).await;

    assert_eq!(live_device(&state).as_deref(), Some("cam-a"));
    assert_eq!(state.chosen_device_id.as_deref(), Some("cam-a"));
}

#[tokio::test(start_paused = true)]
async fn new_device_does_not_interrupt_recording() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;
    engine.start().unwrap();

    platform.plug_in(VirtualDevice::camera("cam-new", "Brand New Camera"));
    let state = wait_until(&engine, "relisted devices", |s| s.devices.len() == 3).await;

    assert!(state.is(CaptureStatus::Capturing));
    assert_eq!(live_device(&state).as_deref(), Some("cam-a"));
}

#[tokio::test(start_paused = true)]
async fn unplugged_preview_reacquires_another_device() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    platform.unplug("cam-a");
    let state = wait_until(&engine, "fallback camera", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-b")
    })
    .await;

    assert_eq!(state.chosen_device_id.as_deref(), Some("cam-b"));
    let input = state.live_video.unwrap();
    assert_eq!((input.width, input.height), (640, 480));
}

#[tokio::test(start_paused = true)]
async fn unplugged_preview_drops_stills_before_reacquiring() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;
    let still = engine.snap().await.unwrap();
    assert!(engine.snapshot().is(CaptureStatus::Previewing));

    platform.unplug("cam-a");
    let state = wait_until(&engine, "fallback camera", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-b")
    })
    .await;

    assert!(state.captured_image.is_none());
    assert!(engine.resolve_url(&still.url).is_none());
}

#[tokio::test(start_paused = true)]
async fn empty_recording_after_unplug_drops_stills_before_reacquiring() {
    let platform = granted(two_cameras());
    platform.set_recorder_script(RecorderScript {
        silent: true,
        ..RecorderScript::default()
    });
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;
    let still = engine.snap().await.unwrap();

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    platform.unplug("cam-a");
    let state = wait_until(&engine, "fallback camera", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-b")
    })
    .await;

    assert!(!state.captured_any());
    assert!(engine.resolve_url(&still.url).is_none());
}

// -- Recording --

#[tokio::test(start_paused = true)]
async fn recording_round_trip_matches_wall_clock() {
    let platform = granted(vec![
        VirtualDevice::camera("cam-front", "Front Camera"),
        VirtualDevice::microphone("mic-1", "Microphone"),
    ]);
    let (engine, log) = engine_with(&platform, CaptureOptions::video());
    previewing(&engine).await;

    engine.start().unwrap();
    let started = Instant::now();
    assert!(engine.snapshot().is(CaptureStatus::Capturing));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    engine.stop().unwrap();
    let wall = started.elapsed();

    let state = wait_for(&engine, CaptureStatus::Captured).await;
    let media = engine.extract();
    let video = media.video.expect("video artifact");

    let duration = video.duration_ms.unwrap();
    assert_abs_diff_eq!(duration as f64, wall.as_millis() as f64, epsilon = 100.0);
    assert_eq!(video.blob.mime_type(), "video/webm");
    assert!(!video.blob.is_empty());
    assert_eq!(video.checksum.len(), 64);
    assert_eq!((video.width, video.height), (Some(1280), Some(720)));
    assert!(media.audio.is_none() && media.image.is_none());

    assert!(state.volume.is_none());
    assert_eq!(log.0.lock().finished, vec![state.captured_video.unwrap().url]);

    let options = platform.recorder_options();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].video_bits_per_second, Some(2_500_000));
    assert_eq!(options[0].audio_bits_per_second, Some(128_000));
}

#[tokio::test(start_paused = true)]
async fn pause_resume_keeps_duration_continuous() {
    let platform = granted(two_cameras());
    let (engine, log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    engine.pause().unwrap();
    let at_pause = engine.snapshot().duration_ms.unwrap();
    assert!((390..=410).contains(&at_pause), "paused at {} ms", at_pause);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.snapshot().duration_ms, Some(at_pause));

    // An immediate pause after resume adds nothing.
    engine.resume().unwrap();
    engine.pause().unwrap();
    assert_eq!(engine.snapshot().duration_ms, Some(at_pause));

    engine.resume().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop().unwrap();

    let state = wait_for(&engine, CaptureStatus::Captured).await;
    let duration = state.captured_video.as_ref().unwrap().duration_ms.unwrap();
    assert_abs_diff_eq!(duration as f64, 700.0, epsilon = 20.0);
    assert!(duration >= at_pause);

    let durations = log.0.lock().durations.clone();
    assert!(durations.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", durations);
    assert!(log.count(CaptureStatus::Paused) >= 1);
}

#[tokio::test(start_paused = true)]
async fn chunk_delivered_before_pause_is_kept() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    // The chunk is still queued for the engine when the pause lands.
    assert_eq!(platform.request_data(), 1);
    engine.pause().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.snapshot().is(CaptureStatus::Paused));
    engine.stop().unwrap();

    let state = wait_for(&engine, CaptureStatus::Captured).await;
    let video = state.captured_video.as_ref().unwrap();
    assert!(video.blob.as_bytes().starts_with(b"VFRM"));
    assert_abs_diff_eq!(video.duration_ms.unwrap() as f64, 200.0, epsilon = 20.0);
}

#[tokio::test(start_paused = true)]
async fn empty_recording_returns_to_previewing() {
    let platform = granted(two_cameras());
    platform.set_recorder_script(RecorderScript {
        silent: true,
        ..RecorderScript::default()
    });
    let (engine, log) = engine_with(&platform, video_only());
    let before = previewing(&engine).await;

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop().unwrap();
    let state = wait_for(&engine, CaptureStatus::Previewing).await;

    assert!(!state.captured_any());
    assert!(state.duration_ms.is_none());
    assert_eq!(live_stream_id(&state), live_stream_id(&before));
    assert!(log.0.lock().finished.is_empty());
    assert!(log.statuses().ends_with(&[CaptureStatus::Capturing, CaptureStatus::Previewing]));
}

#[tokio::test(start_paused = true)]
async fn clear_revokes_and_previews_again() {
    let platform = granted(two_cameras());
    let (engine, log) = engine_with(&platform, video_only());
    let before = previewing(&engine).await;

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop().unwrap();
    let captured = wait_for(&engine, CaptureStatus::Captured).await;
    let url = captured.captured_video.as_ref().unwrap().url.clone();
    assert!(engine.resolve_url(&url).is_some());

    engine.clear().unwrap();
    let state = engine.snapshot();

    assert!(state.is(CaptureStatus::Previewing));
    assert!(!state.captured_any());
    assert!(engine.resolve_url(&url).is_none());
    assert_eq!(live_stream_id(&state), live_stream_id(&before));
    assert!(log
        .statuses()
        .ends_with(&[CaptureStatus::Capturing, CaptureStatus::Captured, CaptureStatus::Previewing]));
    assert_eq!(log.count(CaptureStatus::Acquiring), 1);
}

#[tokio::test(start_paused = true)]
async fn unplug_during_recording_keeps_buffered_media() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    platform.unplug("cam-a");

    let state = wait_for(&engine, CaptureStatus::Captured).await;
    let video = state.captured_video.as_ref().unwrap();
    assert!(!video.blob.is_empty());
    assert_abs_diff_eq!(video.duration_ms.unwrap() as f64, 300.0, epsilon = 20.0);
    assert!(state.live_video.is_none());

    engine.clear().unwrap();
    let state = wait_until(&engine, "fallback camera", |s| {
        s.is(CaptureStatus::Previewing) && live_device(s).as_deref() == Some("cam-b")
    })
    .await;
    assert!(!state.captured_any());
}

#[tokio::test(start_paused = true)]
async fn audio_recording_produces_audio_artifact() {
    let platform = granted(vec![VirtualDevice::microphone("mic-1", "USB Microphone")]);
    let (engine, _log) = engine_with(&platform, CaptureOptions::audio());
    let state = previewing(&engine).await;
    assert!(state.live_audio.is_some() && state.live_video.is_none());

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    engine.stop().unwrap();
    let state = wait_for(&engine, CaptureStatus::Captured).await;

    let audio = state.captured_audio.as_ref().unwrap();
    assert_eq!(audio.kind, ArtifactKind::Audio);
    assert_eq!(audio.blob.mime_type(), "audio/webm");
    assert!(audio.width.is_none());
    assert!(state.captured_video.is_none());
    assert!(state.volume.is_none());

    let options = platform.recorder_options();
    assert_eq!(options[0].video_bits_per_second, None);
    assert_eq!(options[0].audio_bits_per_second, Some(128_000));
}

#[tokio::test(start_paused = true)]
async fn recorder_refusal_keeps_previewing() {
    let platform = granted(two_cameras());
    platform.set_recorder_script(RecorderScript {
        fail_on_start: true,
        ..RecorderScript::default()
    });
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    assert!(matches!(engine.start(), Err(CaptureError::EncodingFailed(_))));
    assert!(engine.snapshot().is(CaptureStatus::Previewing));
    assert!(matches!(engine.stop(), Err(CaptureError::NoRecorder)));
}

// -- Volume --

#[tokio::test(start_paused = true)]
async fn volume_follows_input_level() {
    let platform = granted(vec![VirtualDevice::microphone("mic-1", "Microphone")]);
    platform.set_tone_amplitude(0.5);
    let (engine, log) = engine_with(&platform, CaptureOptions::audio());
    previewing(&engine).await;

    wait_until(&engine, "volume 50", |s| s.volume == Some(50)).await;
    assert!(log.0.lock().volumes.contains(&50));

    platform.set_tone_amplitude(0.0);
    wait_until(&engine, "silence", |s| s.volume == Some(0)).await;
}

#[tokio::test(start_paused = true)]
async fn volume_is_not_watched_without_audio() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());
    previewing(&engine).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(engine.snapshot().volume.is_none());
}

// -- Snapshots --

#[tokio::test(start_paused = true)]
async fn photo_snap_finalizes_capture() {
    let platform = Arc::new(VirtualPlatform::with_default_devices());
    let (engine, log) = engine_with(&platform, CaptureOptions::photo());
    previewing(&engine).await;

    let still = engine.snap().await.unwrap();

    assert_eq!(still.kind, ArtifactKind::Image);
    assert_eq!(still.blob.mime_type(), "image/jpeg");
    assert_eq!(&still.blob.as_bytes()[..2], &[0xFF, 0xD8]);
    assert_eq!((still.width, still.height), (Some(1280), Some(720)));

    let state = engine.snapshot();
    assert!(state.is(CaptureStatus::Captured));
    assert_eq!(state.captured_image.as_ref(), Some(&still));
    assert!(engine.resolve_url(&still.url).is_some());
    assert_eq!(log.0.lock().finished, vec![still.url.clone()]);
    assert_eq!(platform.frames_grabbed(), 1);
}

#[tokio::test(start_paused = true)]
async fn snap_during_video_preview_keeps_previewing() {
    let platform = granted(two_cameras());
    let options = CaptureOptions {
        image_mime_type: "image/png".into(),
        ..video_only()
    };
    let (engine, _log) = engine_with(&platform, options);
    previewing(&engine).await;

    let first = engine.snap().await.unwrap();
    let second = engine.snap().await.unwrap();

    let state = engine.snapshot();
    assert!(state.is(CaptureStatus::Previewing));
    assert_eq!(state.captured_image.as_ref().map(|a| &a.url), Some(&second.url));
    assert!(engine.resolve_url(&first.url).is_none());
    assert_eq!(&second.blob.as_bytes()[1..4], b"PNG");
}

// -- Deactivation --

#[tokio::test(start_paused = true)]
async fn reactivation_within_grace_reuses_input() {
    let platform = granted(two_cameras());
    let options = CaptureOptions {
        deactivation_delay: Duration::from_secs(1),
        ..video_only()
    };
    let (engine, _log) = engine_with(&platform, options);
    let before = previewing(&engine).await;
    let requests = platform.media_requests();

    engine.deactivate();
    let state = engine.snapshot();
    assert!(!state.active);
    assert!(state.live_video.is_some());

    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.activate().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = engine.snapshot();
    assert!(state.active);
    assert!(state.is(CaptureStatus::Previewing));
    assert_eq!(live_stream_id(&state), live_stream_id(&before));
    assert_eq!(platform.media_requests(), requests);

    engine.deactivate();
    let state = wait_until(&engine, "teardown", |s| s.status.is_none()).await;
    assert!(state.live_input().is_none());
    assert!(platform.live_streams().is_empty());
}

#[tokio::test(start_paused = true)]
async fn extracted_media_outlives_deactivation() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, CaptureOptions::photo());
    previewing(&engine).await;

    let kept = engine.snap().await.unwrap();
    assert!(engine.extract().image.is_some());
    engine.deactivate();
    wait_until(&engine, "teardown", |s| s.status.is_none()).await;

    assert!(engine.resolve_url(&kept.url).is_some());
    assert!(engine.revoke_url(&kept.url));
    assert!(engine.resolve_url(&kept.url).is_none());

    previewing(&engine).await;
    let dropped = engine.snap().await.unwrap();
    engine.deactivate();
    wait_until(&engine, "teardown", |s| s.status.is_none()).await;
    assert!(engine.resolve_url(&dropped.url).is_none());
}

#[tokio::test(start_paused = true)]
async fn captured_media_blocks_reactivation_until_cleared() {
    let platform = granted(two_cameras());
    let options = CaptureOptions {
        deactivation_delay: Duration::from_secs(1),
        ..CaptureOptions::photo()
    };
    let (engine, _log) = engine_with(&platform, options);
    previewing(&engine).await;
    engine.snap().await.unwrap();

    engine.deactivate();
    assert_eq!(engine.activate(), Err(CaptureError::CapturePending));

    engine.clear().unwrap();
    engine.activate().unwrap();
    let state = engine.snapshot();
    assert!(state.active);
    assert!(state.is(CaptureStatus::Previewing));
}

#[tokio::test(start_paused = true)]
async fn deactivation_discards_recording_in_progress() {
    let platform = granted(two_cameras());
    let (engine, log) = engine_with(&platform, video_only());
    previewing(&engine).await;
    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    engine.deactivate();
    let state = wait_until(&engine, "teardown", |s| s.status.is_none()).await;

    assert!(!state.captured_any());
    assert!(log.0.lock().finished.is_empty());
    assert!(platform.live_streams().is_empty());
}

// -- Misuse --

#[tokio::test(start_paused = true)]
async fn misuse_is_reported_to_the_caller() {
    let platform = granted(two_cameras());
    let (engine, _log) = engine_with(&platform, video_only());

    assert_eq!(engine.start(), Err(CaptureError::NotActive));
    assert_eq!(engine.choose_device("cam-b"), Err(CaptureError::NotActive));
    assert_eq!(engine.pause(), Err(CaptureError::NoRecorder));
    assert_eq!(engine.stop(), Err(CaptureError::NoRecorder));
    assert_eq!(engine.snap().await, Err(CaptureError::NotActive));

    previewing(&engine).await;
    assert_eq!(engine.resume(), Err(CaptureError::NoRecorder));
    engine.start().unwrap();
    assert_eq!(engine.start(), Err(CaptureError::AlreadyRecording));

    for result in [engine.resume(), engine.choose_device("cam-b"), engine.clear()] {
        let err = result.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTransition { .. }), "{:?}", err);
        assert!(err.is_programmer_error());
    }

    engine.pause().unwrap();
    assert!(matches!(engine.pause(), Err(CaptureError::InvalidTransition { .. })));
    engine.stop().unwrap();
    assert!(engine.snapshot().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn snap_without_camera_is_refused() {
    let platform = granted(vec![VirtualDevice::microphone("mic-1", "Microphone")]);
    let (engine, _log) = engine_with(&platform, CaptureOptions::audio());
    previewing(&engine).await;

    assert_eq!(engine.snap().await, Err(CaptureError::NoActiveStream));
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let platform = granted(two_cameras());
    let options = CaptureOptions {
        video: false,
        audio: false,
        ..CaptureOptions::default()
    };
    assert!(matches!(
        CaptureEngine::new(platform, options),
        Err(CaptureError::ConfigurationFailed(_))
    ));
}
