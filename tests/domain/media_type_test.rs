use murmur::domain::{file_extension, is_accepted_content_type, is_supported_extension};

#[test]
fn given_audio_and_video_mimes_when_classifying_then_accepted() {
    assert!(is_accepted_content_type("audio/mpeg"));
    assert!(is_accepted_content_type("video/mp4; codecs=avc1"));
    assert!(is_accepted_content_type("Application/Octet-Stream"));
}

#[test]
fn given_text_mime_when_classifying_then_rejected() {
    assert!(!is_accepted_content_type("text/plain"));
    assert!(!is_accepted_content_type("application/json"));
}

#[test]
fn given_uppercase_extension_when_checking_then_supported() {
    assert_eq!(file_extension("Lecture.WAV"), Some(".wav".to_string()));
    assert!(is_supported_extension("Lecture.WAV"));
    assert!(is_supported_extension("clip.webm"));
}

#[test]
fn given_unknown_or_missing_extension_when_checking_then_unsupported() {
    assert!(!is_supported_extension("notes.txt"));
    assert!(!is_supported_extension("recording"));
}
