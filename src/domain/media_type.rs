use std::path::Path;

/// File extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: [&str; 9] = [
    ".mp3", ".wav", ".m4a", ".mp4", ".mpeg", ".mpga", ".webm", ".ogg", ".flac",
];

/// Whether a raw upload's `Content-Type` may carry audio: `audio/*`, `video/*`
/// or opaque `application/octet-stream`, which the normalizer inspects.
pub fn is_accepted_content_type(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
    essence.starts_with("audio/")
        || essence.starts_with("video/")
        || essence == "application/octet-stream"
}

/// Lowercased extension including the leading dot, e.g. `.wav`.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

pub fn is_supported_extension(file_name: &str) -> bool {
    file_extension(file_name)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
