//! # media-capture-core
//!
//! Platform-agnostic media capture engine.
//!
//! Acquires cameras and microphones, negotiates live previews, drives a
//! record/pause/resume/stop lifecycle, meters input volume and produces
//! captured video, audio and still-image artifacts behind revocable access
//! URLs. Platform backends implement the `MediaPlatform` trait and plug into
//! the generic `CaptureEngine`.
//!
//! ## Architecture
//!
//! ```text
//! media-capture-core (this crate)
//! ├── traits/       ← MediaPlatform, MediaStream, MediaRecorder, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureOptions, EngineState, CapturedArtifact, devices
//! ├── processing/   ← SampleWindow, LevelMeter, still-image encoding
//! ├── session/      ← CaptureEngine (orchestrator), device directory, acquisition,
//! │                   volume monitor, recorder, snapshot extractor
//! └── storage/      ← ObjectUrlRegistry (revocable blob: URLs)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::artifact::{ArtifactKind, Blob, CapturedArtifact, ExtractedArtifact, ExtractedMedia};
pub use models::config::CaptureOptions;
pub use models::device::{DeviceDescriptor, DeviceKind, MediaConstraints, MediaDeviceInfo, TrackConstraint};
pub use models::error::CaptureError;
pub use models::live_input::LiveInput;
pub use models::state::{CaptureStatus, EngineState};
pub use processing::level_meter::LevelMeter;
pub use processing::sample_window::SampleWindow;
pub use session::engine::CaptureEngine;
pub use storage::object_urls::ObjectUrlRegistry;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::media_platform::{AudioBufferCallback, AudioTap, MediaPlatform, SurfaceEvent, VideoFrame};
pub use traits::media_recorder::{MediaRecorder, RecorderEvent, RecorderEventCallback, RecorderOptions};
pub use traits::media_stream::{MediaStream, MediaTrack, TrackEndedCallback};
