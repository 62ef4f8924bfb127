/// RMS level below which a window is treated as silence.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

pub fn is_silent(samples: &[f32], threshold: f32) -> bool {
    rms(samples) < threshold
}
