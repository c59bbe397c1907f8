pub mod acquisition;
pub mod device_directory;
pub mod engine;
mod engine_core;
mod events;
pub mod recorder;
pub mod snapshot;
pub mod volume_monitor;
