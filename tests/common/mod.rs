//! Shared test utilities

/// Little-endian f32 PCM bytes for a slice of samples
#[must_use]
pub fn f32le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Generate sine wave audio samples
#[must_use]
pub fn sine(frequency: f32, sample_rate: u32, count: usize, amplitude: f32) -> Vec<f32> {
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
