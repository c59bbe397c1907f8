use crate::models::artifact::CapturedArtifact;
use crate::models::error::CaptureError;
use crate::models::state::EngineState;

/// Push-style observer for capture engine changes.
///
/// An alternative to looping on `CaptureEngine::await_change`. Methods are
/// called after the change has been published, outside the engine lock, on
/// whichever task performed the transition. Implementations should marshal
/// to the UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every published change.
    fn on_state_changed(&self, state: &EngineState);

    /// Called when the metered input volume changes.
    fn on_volume_changed(&self, _volume: u8) {}

    /// Called when a new runtime error is recorded in the state.
    fn on_error(&self, _error: &CaptureError) {}

    /// Called when a recording or snapshot has been finalized.
    fn on_capture_finished(&self, _artifact: &CapturedArtifact) {}
}
