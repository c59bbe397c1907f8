//! Synthetic signals standing in for real sensors.

use std::f64::consts::TAU;

use media_capture_core::VideoFrame;

/// Sample rate of every virtual microphone.
pub const SAMPLE_RATE: u32 = 48_000;

/// Phase-continuous sine generator.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    frequency: f64,
    sample_rate: u32,
    phase: f64,
}

impl ToneGenerator {
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            frequency,
            sample_rate: sample_rate.max(1),
            phase: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Next `frames` frames, the same value on every channel, interleaved.
    pub fn next_buffer(&mut self, frames: usize, channels: u16, amplitude: f32) -> Vec<f32> {
        let channels = channels.max(1) as usize;
        let step = TAU * self.frequency / self.sample_rate as f64;
        let mut out = Vec::with_capacity(frames * channels);
        for _ in 0..frames {
            let value = (self.phase.sin() as f32) * amplitude;
            out.extend(std::iter::repeat(value).take(channels));
            self.phase = (self.phase + step) % TAU;
        }
        out
    }

    /// Frames covering `millis` of audio.
    pub fn frames_for(&self, millis: u64) -> usize {
        (self.sample_rate as u64 * millis / 1000) as usize
    }
}

/// Diagonal RGBA gradient, shifted by `seq` so consecutive frames differ.
pub fn gradient_frame(width: u32, height: u32, seq: u64) -> VideoFrame {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    let shift = (seq % 256) as u32;
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1) + shift) % 256;
            let g = (y * 255 / height.max(1)) % 256;
            let b = ((x + y) / 2 + shift) % 256;
            rgba.extend_from_slice(&[r as u8, g as u8, b as u8, 255]);
        }
    }
    VideoFrame { width, height, rgba }
}
