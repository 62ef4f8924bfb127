use murmur::infrastructure::observability::TracingConfig;
use murmur::presentation::config::{Environment, LoggingSettings};

#[test]
fn given_logging_settings_when_building_config_then_copies_level_and_format() {
    let logging = LoggingSettings {
        level: "warn".to_string(),
        enable_json: true,
    };

    let config = TracingConfig::from_settings(Environment::Prod, &logging);

    assert_eq!(config.environment, Environment::Prod);
    assert!(config.json_format);
    assert_eq!(config.default_filter(), "warn,murmur=warn,tower_http=warn");
}

#[test]
fn given_blank_level_when_building_filter_then_defaults_to_info() {
    let config = TracingConfig {
        level: "  ".to_string(),
        ..TracingConfig::default()
    };

    assert_eq!(config.default_filter(), "info,murmur=info,tower_http=info");
}
