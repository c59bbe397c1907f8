pub mod capture_delegate;
pub mod media_platform;
pub mod media_recorder;
pub mod media_stream;
