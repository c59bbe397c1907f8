/// Pure-math helpers for input level metering.
///
/// All operations work on `&[f32]` buffers with no platform dependencies.
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter;

impl LevelMeter {
    /// Average interleaved frames down to one channel.
    ///
    /// A trailing partial frame is dropped.
    pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
        let channels = channels.max(1) as usize;
        if channels == 1 {
            return samples.to_vec();
        }
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Scale a peak amplitude to a 0–100 volume, rounded to nearest.
    pub fn normalize_volume(peak: f32) -> u8 {
        if !peak.is_finite() {
            return 0;
        }
        (peak.abs() * 100.0).round().clamp(0.0, 100.0) as u8
    }
}
