use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::acquisition;
use super::device_directory;
use super::engine_core::{Cx, Effect, EngineCore};
use super::events::EngineEvent;
use super::snapshot;
use crate::models::artifact::{Blob, CapturedArtifact, ExtractedMedia};
use crate::models::config::CaptureOptions;
use crate::models::error::CaptureError;
use crate::models::state::EngineState;
use crate::storage::object_urls::ObjectUrlRegistry;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::media_platform::MediaPlatform;

/// State shared between the engine handle and its background tasks.
struct EngineShared<P: MediaPlatform> {
    platform: Arc<P>,
    options: CaptureOptions,
    core: Mutex<EngineCore>,
    state_tx: watch::Sender<EngineState>,
    events: mpsc::UnboundedSender<EngineEvent>,
    urls: ObjectUrlRegistry,
    /// One device listing at a time.
    directory_lock: tokio::sync::Mutex<()>,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    runtime: Handle,
}

impl<P: MediaPlatform> EngineShared<P> {
    /// Run one state transition.
    ///
    /// Every mutation goes through here: public operations, acquisition
    /// results and platform callbacks alike. The new state is published if
    /// anything observable changed, the delegate is told outside the lock,
    /// and scheduled effects are started last.
    fn transition<R>(self: &Arc<Self>, apply: impl FnOnce(&mut EngineCore, &mut Cx<'_>) -> R) -> R {
        let mut cx = Cx {
            platform: self.platform.as_ref(),
            options: &self.options,
            urls: &self.urls,
            events: &self.events,
            runtime: &self.runtime,
            effects: Vec::new(),
        };

        let (result, published) = {
            let mut core = self.core.lock();
            let result = apply(&mut *core, &mut cx);
            (result, self.publish(&mut core))
        };

        if let Some((previous, current)) = published {
            self.notify(&previous, &current);
        }
        let effects = std::mem::take(&mut cx.effects);
        self.run_effects(effects);
        result
    }

    fn publish(&self, core: &mut EngineCore) -> Option<(EngineState, EngineState)> {
        if *self.state_tx.borrow() == core.state {
            return None;
        }
        core.state.revision += 1;
        let current = core.state.clone();
        let previous = self.state_tx.send_replace(current.clone());
        log::debug!(
            "state r{}: {} (active: {})",
            current.revision,
            current.status.map_or("-", |s| s.as_str()),
            current.active
        );
        Some((previous, current))
    }

    fn notify(&self, previous: &EngineState, current: &EngineState) {
        let Some(delegate) = self.delegate.lock().clone() else {
            return;
        };

        delegate.on_state_changed(current);
        if current.volume != previous.volume {
            if let Some(volume) = current.volume {
                delegate.on_volume_changed(volume);
            }
        }
        if current.last_error != previous.last_error {
            if let Some(error) = &current.last_error {
                delegate.on_error(error);
            }
        }
        for artifact in current.artifacts() {
            if !previous.artifacts().any(|p| p.url == artifact.url) {
                delegate.on_capture_finished(artifact);
            }
        }
    }

    fn run_effects(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Acquire { generation } => {
                    self.runtime.spawn(acquire_task(Arc::clone(self), generation));
                }
                Effect::WatchDevices => self.watch_devices(),
                Effect::StartTicker { recording_id } => {
                    let period = self.options.duration_tick;
                    self.runtime.spawn(tick_task(Arc::downgrade(self), recording_id, period));
                }
                Effect::ScheduleTeardown { token, delay } => {
                    self.runtime.spawn(teardown_task(Arc::downgrade(self), token, delay));
                }
            }
        }
    }

    fn watch_devices(self: &Arc<Self>) {
        let Some(changes) = self.platform.device_changes() else {
            log::debug!("platform does not report device changes");
            return;
        };
        let mut core = self.core.lock();
        if !core.state.active || core.device_watch.is_some() {
            return;
        }
        core.device_watch = Some(self.runtime.spawn(device_watch_task(Arc::downgrade(self), changes)));
    }
}

impl<P: MediaPlatform> Drop for EngineShared<P> {
    fn drop(&mut self) {
        self.core.get_mut().shutdown();
        let revoked = self.urls.revoke_all();
        log::debug!("capture engine dropped, {} URL(s) revoked", revoked);
    }
}

/// List devices, pick one, then open it.
async fn acquire_task<P: MediaPlatform>(shared: Arc<EngineShared<P>>, generation: u64) {
    let kind = shared.options.primary_kind();
    let listed = {
        let _refresh = shared.directory_lock.lock().await;
        let current = shared.core.lock().is_current(generation);
        if !current {
            log::debug!("acquisition superseded before listing");
            return;
        }
        device_directory::list_devices(shared.platform.as_ref(), kind).await
    };

    let Some(constraints) = shared.transition(|core, cx| core.on_listed(cx, generation, listed)) else {
        return;
    };
    let acquired =
        acquisition::acquire(shared.platform.as_ref(), &constraints, shared.options.metadata_timeout).await;
    shared.transition(|core, cx| core.on_acquired(cx, generation, acquired));
}

/// Republish the elapsed duration until the recording is finalized.
async fn tick_task<P: MediaPlatform>(engine: Weak<EngineShared<P>>, recording_id: u64, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = engine.upgrade() else {
            break;
        };
        if !shared.transition(|core, _| core.on_tick(recording_id)) {
            break;
        }
    }
}

async fn teardown_task<P: MediaPlatform>(engine: Weak<EngineShared<P>>, token: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    if let Some(shared) = engine.upgrade() {
        shared.transition(|core, cx| core.teardown(cx, token));
    }
}

/// Re-list devices on every device-change signal.
async fn device_watch_task<P: MediaPlatform>(engine: Weak<EngineShared<P>>, mut changes: broadcast::Receiver<()>) {
    loop {
        match changes.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
        // A burst of signals needs one refresh.
        while matches!(changes.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_))) {}

        let Some(shared) = engine.upgrade() else {
            break;
        };
        let listed = {
            let _refresh = shared.directory_lock.lock().await;
            device_directory::list_devices(shared.platform.as_ref(), shared.options.primary_kind()).await
        };
        match listed {
            Ok(devices) => shared.transition(|core, cx| core.on_devices_changed(cx, devices)),
            Err(e) => log::warn!("device refresh failed: {}", e),
        }
    }
}

/// Feed platform callbacks into the transition path, in arrival order.
async fn pump_events<P: MediaPlatform>(engine: Weak<EngineShared<P>>, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = engine.upgrade() else {
            break;
        };
        shared.transition(|core, cx| core.on_event(cx, event));
    }
}

/// Media capture engine: device selection, live preview, recording and
/// snapshots behind one observable state.
///
/// All operations funnel into a single transition path that publishes an
/// `EngineState` snapshot after every observable change. Observers either
/// await changes (`await_change`, `subscribe`) or register a
/// `CaptureDelegate`.
///
/// Must be created inside a tokio runtime; background work (acquisition,
/// timers, platform callbacks) runs on it.
///
/// ```text
/// activate → acquiring → initiating → previewing ⇄ capturing ⇄ paused
///                                         │                    │
///                                         └─ snap      stop → captured ─ clear → previewing
/// ```
pub struct CaptureEngine<P: MediaPlatform> {
    shared: Arc<EngineShared<P>>,
}

impl<P: MediaPlatform> Clone for CaptureEngine<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: MediaPlatform> CaptureEngine<P> {
    pub fn new(platform: Arc<P>, options: CaptureOptions) -> Result<Self, CaptureError> {
        options.validate().map_err(CaptureError::ConfigurationFailed)?;
        let runtime = Handle::try_current()
            .map_err(|_| CaptureError::ConfigurationFailed("capture engine requires a tokio runtime".into()))?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(EngineState::default());
        let shared = Arc::new(EngineShared {
            platform,
            options,
            core: Mutex::new(EngineCore::default()),
            state_tx,
            events,
            urls: ObjectUrlRegistry::default(),
            directory_lock: tokio::sync::Mutex::new(()),
            delegate: Mutex::new(None),
            runtime,
        });

        let pump = shared.runtime.spawn(pump_events(Arc::downgrade(&shared), events_rx));
        shared.core.lock().pump = Some(pump);
        Ok(Self { shared })
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.shared.options
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.shared.platform
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    /// Begin acquiring a device. No-op if already active.
    ///
    /// Refused with `CapturePending` while captured media is held; `clear`
    /// first.
    pub fn activate(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, cx| core.activate(cx))
    }

    /// Flip to inactive immediately. Devices are released and unextracted
    /// media revoked after the configured grace delay unless `activate` is
    /// called again first.
    pub fn deactivate(&self) {
        self.shared.transition(|core, cx| core.deactivate(cx))
    }

    /// Switch to another device. The most recent choice wins.
    pub fn choose_device(&self, device_id: &str) -> Result<(), CaptureError> {
        self.shared.transition(|core, cx| core.choose_device(cx, device_id))
    }

    /// Start recording the live input. Transitions: previewing → capturing.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, cx| core.start(cx))
    }

    /// Transitions: capturing → paused.
    pub fn pause(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, _| core.pause())
    }

    /// Transitions: paused → capturing.
    pub fn resume(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, _| core.resume())
    }

    /// Stop recording. The artifact is published once the platform has
    /// flushed: capturing/paused → captured, or → previewing if nothing
    /// was recorded.
    pub fn stop(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, cx| core.stop(cx))
    }

    /// Capture a still from the live video input.
    ///
    /// In image-only mode this finalizes the capture.
    pub async fn snap(&self) -> Result<CapturedArtifact, CaptureError> {
        let source = {
            let core = self.shared.core.lock();
            core.snapshot_source()
        };
        let (input, input_id) = source?;
        let options = &self.shared.options;
        let still = snapshot::capture_still(
            self.shared.platform.as_ref(),
            &input,
            &options.image_mime_type,
            options.image_quality,
        )
        .await;
        self.shared.transition(|core, cx| core.on_snapshot(cx, input_id, still))
    }

    /// Discard captured media, revoking every access URL, and return to
    /// previewing.
    pub fn clear(&self) -> Result<(), CaptureError> {
        self.shared.transition(|core, cx| core.clear(cx))
    }

    /// Hand captured media to the caller. The engine stops revoking their
    /// URLs on its own.
    pub fn extract(&self) -> ExtractedMedia {
        self.shared.transition(|core, _| core.extract())
    }

    /// Current state.
    pub fn snapshot(&self) -> EngineState {
        self.shared.state_tx.borrow().clone()
    }

    /// A receiver that sees every published state, latest-wins.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait for the next change and return the state as of then.
    ///
    /// Every waiter wakes on the same change. Intermediate states may be
    /// skipped; the returned state is always the latest.
    pub async fn await_change(&self) -> EngineState {
        let mut rx = self.shared.state_tx.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.changed().await;
        let state = rx.borrow_and_update().clone();
        state
    }

    /// Like `await_change`, but returns at once if the state has already
    /// moved past `revision`.
    pub async fn await_change_since(&self, revision: u64) -> EngineState {
        let mut rx = self.shared.state_tx.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.revision > revision {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Blob behind a live access URL.
    pub fn resolve_url(&self, url: &str) -> Option<Blob> {
        self.shared.urls.resolve(url)
    }

    /// Revoke an access URL of extracted media once the caller is done
    /// with it.
    pub fn revoke_url(&self, url: &str) -> bool {
        self.shared.urls.revoke(url)
    }
}
