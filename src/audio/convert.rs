//! PCM format conversion for outbound device audio
//!
//! Synthesis chunks arrive as little-endian float32 PCM at the provider's
//! rate; devices consume little-endian signed 16-bit PCM at a fixed rate.
//! Conversion never fails outward: any internal error degrades to an empty
//! buffer, which callers treat as "skip this chunk".

use rubato::{FftFixedIn, Resampler};

/// Resampler input block size in samples
const CHUNK_SIZE: usize = 1024;

/// FFT sub-chunks per input block
const SUB_CHUNKS: usize = 2;

/// Convert a float32-LE PCM chunk to signed 16-bit LE PCM at the target rate.
///
/// The output holds exactly `round(n * target_rate / source_rate)` samples
/// for `n` input samples. An empty input, a zero-length output, or a
/// resampler failure all yield an empty buffer. A trailing partial sample
/// (fewer than 4 bytes) is ignored. Same input and rates always produce the
/// same output.
#[must_use]
pub fn convert_chunk(input: &[u8], source_rate: u32, target_rate: u32) -> Vec<u8> {
    let samples: Vec<f32> = input
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if samples.is_empty() {
        return Vec::new();
    }

    let resampled = if source_rate == target_rate {
        samples
    } else {
        match resample(&samples, source_rate, target_rate) {
            Ok(resampled) => resampled,
            Err(e) => {
                tracing::error!(
                    source_rate,
                    target_rate,
                    error = %e,
                    "resampling failed, dropping chunk"
                );
                return Vec::new();
            }
        }
    };

    let mut out = Vec::with_capacity(resampled.len() * 2);
    for sample in resampled {
        #[allow(clippy::cast_possible_truncation)]
        let value = (f64::from(sample) * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Exact output sample count for a resampled block
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn expected_output_len(input_samples: usize, source_rate: u32, target_rate: u32) -> usize {
    (input_samples as f64 * f64::from(target_rate) / f64::from(source_rate)).round() as usize
}

/// Band-limited resampling in fixed blocks with a zero-padded tail.
///
/// The padded tail and the FFT latency leave the raw output off by a few
/// samples, so it is pinned to the exact expected count.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> crate::Result<Vec<f32>> {
    let expected = expected_output_len(samples.len(), source_rate, target_rate);
    if expected == 0 {
        return Ok(Vec::new());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| crate::Error::Audio(format!("resampler init failed: {e}")))?;

    let mut out = Vec::with_capacity(expected + CHUNK_SIZE);
    for chunk in samples.chunks(CHUNK_SIZE) {
        let mut block = vec![0.0_f32; CHUNK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        let frames = resampler
            .process(&[block], None)
            .map_err(|e| crate::Error::Audio(format!("resample failed: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }

    out.resize(expected, 0.0);
    Ok(out)
}
