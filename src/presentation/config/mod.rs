mod environment;
mod scaffold_config;
mod settings;

pub use environment::Environment;
pub use scaffold_config::ScaffoldConfig;
pub use settings::{
    DevicePreference, EngineProvider, EngineSettings, LoggingSettings, NormalizerSettings,
    SchedulerSettings, ServerSettings, Settings, UploadSettings,
};
