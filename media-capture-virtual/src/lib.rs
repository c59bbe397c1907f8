//! # media-capture-virtual
//!
//! In-process backend for media-capture-core.
//!
//! Provides:
//! - `VirtualPlatform`: scripted cameras and microphones implementing `MediaPlatform`
//! - `VirtualStream` / `VirtualTrack`: live streams that can be unplugged
//! - `VirtualRecorder`: timer-driven chunking recorder
//! - `signal`: synthetic tone and gradient frame generators
//!
//! Used by the engine integration tests and the `capture-demo` binary.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use media_capture_core::{CaptureEngine, CaptureOptions};
//! use media_capture_virtual::VirtualPlatform;
//!
//! let platform = Arc::new(VirtualPlatform::with_default_devices());
//! let engine = CaptureEngine::new(platform, CaptureOptions::photo())?;
//! engine.activate()?;
//! ```

pub mod platform;
pub mod recorder;
pub mod signal;
pub mod stream;
pub mod wav_format;

pub use platform::{Permission, VirtualDevice, VirtualPlatform};
pub use recorder::{RecorderHandle, RecorderScript, VirtualRecorder};
pub use stream::{VirtualStream, VirtualTrack};
