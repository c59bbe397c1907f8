pub mod artifact;
pub mod config;
pub mod device;
pub mod error;
pub mod live_input;
pub mod state;
