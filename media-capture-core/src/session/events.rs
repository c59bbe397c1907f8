use crate::traits::media_recorder::RecorderEvent;

/// Platform callbacks, funneled into the engine's single transition path.
///
/// Each event carries the id of the input or recording it belongs to so
/// that events from a released input or discarded recorder are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineEvent {
    TrackEnded { input_id: u64 },
    Volume { input_id: u64, level: u8 },
    Recorder { recording_id: u64, event: RecorderEvent },
}
