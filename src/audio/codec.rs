//! Sample format conversions.
//!
//! Pure, stateless helpers shared by the capture path (float32 frames from
//! the device) and the transcription path (PCM16LE windows wrapped as WAV
//! for the remote service).

/// Size of the canonical RIFF/WAVE header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

/// Convert float32 samples in [-1, 1] to 16-bit little-endian PCM bytes.
///
/// Out-of-range samples are clipped. Output length is `2 * samples.len()`.
pub fn pcm16le_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clipped = sample.clamp(-1.0, 1.0);
        let value = (clipped * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode 16-bit little-endian PCM bytes back to float32 samples.
///
/// A trailing odd byte is ignored.
pub fn f32_from_pcm16le(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            value as f32 / i16::MAX as f32
        })
        .collect()
}

/// Prepend the canonical 44-byte RIFF/WAVE header to PCM16LE data.
///
/// All multibyte fields are little-endian:
/// `RIFF | 36 + len | WAVE | fmt  | 16 | 1 | channels | rate | byte_rate |
/// block_align | bits | data | len | pcm`.
pub fn wav_from_pcm16le(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

/// Calculate the Root Mean Square (RMS) of float32 samples.
///
/// Returns 0.0 for an empty frame. A full-scale square wave scores 1.0,
/// a full-scale sine wave ~0.707.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| sample as f64 * sample as f64)
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}
