pub mod image_encoder;
pub mod level_meter;
pub mod sample_window;
