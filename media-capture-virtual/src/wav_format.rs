/// WAV container helpers for the virtual audio recorder.
///
/// The recorder emits a 44-byte RIFF header followed by 16-bit PCM. When the
/// whole recording is flushed at once the size fields are patched before the
/// chunk leaves the recorder; streamed recordings keep the placeholder
/// header, like any live WAV writer.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bytes per sample for 16-bit PCM.
pub const PCM16_BYTES: usize = 2;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Patch both size fields once the payload length is known.
///
/// `buffer` must start with a header produced by `generate_wav_header`.
pub fn patch_sizes(buffer: &mut [u8], data_size: usize) {
    if buffer.len() < WAV_HEADER_SIZE {
        return;
    }
    let data_size = data_size as u32;
    buffer[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    buffer[40..44].copy_from_slice(&data_size.to_le_bytes());
}

/// Convert f32 samples in [-1, 1] to little-endian signed 16-bit PCM.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * PCM16_BYTES);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}
