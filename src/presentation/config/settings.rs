use std::time::Duration;

use config::{Config, ConfigError, Environment as EnvironmentSource, File};
use serde::{Deserialize, Serialize};

use super::Environment;

/// Layered settings: built-in defaults, then `appsettings.{environment}`,
/// then `APP__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub scheduler: SchedulerSettings,
    pub normalizer: NormalizerSettings,
    pub upload: UploadSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        Self::load_with(environment, Self::env_source())
    }

    /// Like [`Settings::load`] with an explicit environment-variable source.
    pub fn load_with(environment: Environment, env: EnvironmentSource) -> Result<Self, ConfigError> {
        let configuration = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(
                File::with_name(&format!("appsettings.{}", environment.as_str().to_lowercase()))
                    .required(false),
            )
            .add_source(env)
            .build()?;

        configuration.try_deserialize()
    }

    pub fn env_source() -> EnvironmentSource {
        EnvironmentSource::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineProvider {
    Local,
    Scaffold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Cpu,
    /// CUDA or Metal when available, CPU otherwise.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub provider: EngineProvider,
    /// Hugging Face model id.
    pub model: String,
    pub device: DevicePreference,
    /// Maximum engine calls in flight.
    pub concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider: EngineProvider::Local,
            model: "openai/whisper-medium".to_string(),
            device: DevicePreference::Cpu,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub queue_capacity: usize,
    pub job_timeout_secs: u64,
    pub retention_secs: u64,
    pub retry_after_secs: u64,
}

impl SchedulerSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            job_timeout_secs: 600,
            retention_secs: 3600,
            retry_after_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub ffmpeg_path: String,
    pub timeout_secs: u64,
    /// Staging directory for uploads; the system temp dir when unset.
    pub temp_dir: Option<String>,
}

impl NormalizerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_secs: 120,
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_file_size_mb: u64,
}

impl UploadSettings {
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_json: false,
        }
    }
}
