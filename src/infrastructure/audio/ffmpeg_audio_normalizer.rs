use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::application::ports::{AudioNormalizer, NormalizationError};
use crate::domain::{AudioBuffer, CANONICAL_SAMPLE_RATE};

const UNSUPPORTED_MARKERS: [&str; 6] = [
    "invalid data found when processing input",
    "could not find codec parameters",
    "unknown input format",
    "does not contain any stream",
    "decoder not found",
    "unsupported codec",
];

/// Transcodes uploads to 16 kHz mono s16le through an `ffmpeg` subprocess.
///
/// The upload is staged in a temporary file that is removed when the call
/// returns or is dropped. The child is spawned with `kill_on_drop`, so a
/// timeout or a dropped future never leaves it running.
pub struct FfmpegAudioNormalizer {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl FfmpegAudioNormalizer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
            temp_dir: None,
        }
    }

    /// Stages uploads under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    async fn stage(&self, data: Bytes) -> Result<NamedTempFile, NormalizationError> {
        let temp_dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix("murmur-upload-").suffix(".bin");
            let mut file = match temp_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&data)?;
            file.flush()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| NormalizationError::Io(std::io::Error::other(e)))?
        .map_err(NormalizationError::Io)
    }
}

#[async_trait]
impl AudioNormalizer for FfmpegAudioNormalizer {
    async fn normalize(&self, data: Bytes) -> Result<AudioBuffer, NormalizationError> {
        if data.is_empty() {
            return Err(NormalizationError::EmptyAudio);
        }

        let input_len = data.len();
        let staged = self.stage(data).await?;

        let sample_rate = CANONICAL_SAMPLE_RATE.to_string();
        let child = Command::new(&self.ffmpeg_path)
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(staged.path())
            .args(["-vn", "-f", "s16le", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(&sample_rate)
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => NormalizationError::ToolUnavailable(format!(
                    "{} not found on PATH",
                    self.ffmpeg_path.display()
                )),
                _ => NormalizationError::Io(e),
            })?;

        tracing::debug!(bytes = input_len, "Transcoding upload with ffmpeg");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs_f64(), "ffmpeg timed out, killing");
                return Err(NormalizationError::Timeout(self.timeout));
            }
        };

        drop(staged);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_ffmpeg_failure(&stderr));
        }

        let audio = AudioBuffer::from_pcm_s16le(&output.stdout, CANONICAL_SAMPLE_RATE);
        if audio.is_empty() {
            return Err(NormalizationError::EmptyAudio);
        }

        tracing::debug!(
            samples = audio.len(),
            duration_secs = audio.duration(),
            "Audio normalized to 16kHz mono PCM"
        );

        Ok(audio)
    }
}

/// Maps ffmpeg's stderr to a normalization error. Unrecognized containers or
/// codecs are `UnsupportedFormat`; every other failure is `CorruptInput`.
pub fn classify_ffmpeg_failure(stderr: &str) -> NormalizationError {
    let lowered = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("ffmpeg failed without output")
        .trim()
        .to_string();

    let unsupported = UNSUPPORTED_MARKERS.iter().any(|m| lowered.contains(m))
        || (lowered.contains("decoder") && lowered.contains("not found"));

    if unsupported {
        NormalizationError::UnsupportedFormat(message)
    } else {
        NormalizationError::CorruptInput(message)
    }
}

/// Runs `ffmpeg -version` and returns the first line of its output.
pub fn check_ffmpeg_binary(ffmpeg_path: &str) -> Result<String, NormalizationError> {
    let output = std::process::Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(|e| NormalizationError::ToolUnavailable(format!("{}: {}", ffmpeg_path, e)))?;

    if !output.status.success() {
        return Err(NormalizationError::ToolUnavailable(format!(
            "{} -version exited with {}",
            ffmpeg_path, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string())
}
