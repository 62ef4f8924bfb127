use murmur::infrastructure::audio::voice_activity::{DEFAULT_SILENCE_THRESHOLD, is_silent, rms};

#[test]
fn given_empty_window_when_measuring_then_zero() {
    assert_eq!(rms(&[]), 0.0);
    assert!(is_silent(&[], DEFAULT_SILENCE_THRESHOLD));
}

#[test]
fn given_constant_signal_when_measuring_then_rms_is_amplitude() {
    let level = rms(&[0.5, -0.5, 0.5, -0.5]);

    assert!((level - 0.5).abs() < 1e-6);
    assert!(!is_silent(&[0.5, -0.5], DEFAULT_SILENCE_THRESHOLD));
}

#[test]
fn given_faint_noise_when_checking_then_silent() {
    let noise = vec![0.001f32; 1600];

    assert!(is_silent(&noise, DEFAULT_SILENCE_THRESHOLD));
}
