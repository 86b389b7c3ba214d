use super::data::{path_display, ClientConfig, ConfigFile};
use super::io::ConfigError;
use crate::core::chat_stream::{ChatStreamService, MIN_STREAM_CHANNEL_SIZE};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn defaults_match_lm_studio() {
    let config = ClientConfig::default();
    assert_eq!(config.base_url(), "http://localhost:1234");
    assert_eq!(config.api_url(), "http://localhost:1234/v1");
    assert_eq!(config.http_timeout, Duration::from_secs(300));
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_base_delay, Duration::from_secs(1));
    assert_eq!(config.max_conversation_length, 100);
    assert_eq!(config.max_system_message_length, 10_000);
    assert_eq!(config.max_chat_message_length, 50_000);
    assert_eq!(config.stream_channel_size, 1000);
    assert_eq!(config.log_channel_size, 100);
    config.validate().expect("defaults must validate");
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config =
        ClientConfig::load(Some(&config_path), &ConfigFile::default()).expect("load failed");

    assert_eq!(config, ClientConfig::default());
}

#[test]
fn file_values_are_layered_under_overrides() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "host = \"studio.local\"\nport = 8080\nscheme = \"HTTPS\"\nmax_retries = 5\nretry_base_delay_ms = 250\n",
    )
    .expect("write failed");

    let overrides = ConfigFile {
        port: Some(9000),
        ..Default::default()
    };
    let config = ClientConfig::load(Some(&config_path), &overrides).expect("load failed");

    assert_eq!(config.host, "studio.local");
    assert_eq!(config.port, 9000);
    assert_eq!(config.scheme, "https");
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_base_delay, Duration::from_millis(250));
    assert_eq!(config.base_url(), "https://studio.local:9000");
    // Untouched keys keep their defaults.
    assert_eq!(config.max_conversation_length, 100);
}

#[test]
fn parse_errors_name_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "port = \"not a number\"").expect("write failed");

    let err = ClientConfig::load(Some(&config_path), &ConfigFile::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn unknown_keys_are_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hots = \"typo\"").expect("write failed");

    let err = ConfigFile::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn read_errors_name_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // A directory exists but cannot be read as a file.
    let err = ConfigFile::load_from_path(temp_dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn out_of_range_values_are_invalid() {
    let cases = [
        ConfigFile {
            port: Some(70_000),
            ..Default::default()
        },
        ConfigFile {
            port: Some(0),
            ..Default::default()
        },
        ConfigFile {
            host: Some(String::new()),
            ..Default::default()
        },
        ConfigFile {
            scheme: Some("ftp".into()),
            ..Default::default()
        },
        ConfigFile {
            http_timeout_secs: Some(0),
            ..Default::default()
        },
        ConfigFile {
            retry_base_delay_ms: Some(0),
            ..Default::default()
        },
        ConfigFile {
            max_conversation_length: Some(0),
            ..Default::default()
        },
        ConfigFile {
            log_channel_size: Some(0),
            ..Default::default()
        },
        ConfigFile {
            stream_channel_size: Some(999),
            ..Default::default()
        },
    ];

    for overrides in cases {
        let config = ClientConfig::default().merged(&overrides);
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid(_)),
            "{overrides:?} should be invalid"
        );
    }
}

#[test]
fn stream_channel_floor_matches_bridge() {
    let at_floor = ClientConfig::default().merged(&ConfigFile {
        stream_channel_size: Some(MIN_STREAM_CHANNEL_SIZE),
        ..Default::default()
    });
    assert!(at_floor.validate().is_ok());

    let below = ClientConfig::default().merged(&ConfigFile {
        stream_channel_size: Some(MIN_STREAM_CHANNEL_SIZE - 1),
        ..Default::default()
    });
    assert!(below.validate().is_err());

    // Anything the config accepts is used as-is by the bridge.
    let (_service, rx) = ChatStreamService::new(at_floor.stream_channel_size);
    assert_eq!(rx.max_capacity(), at_floor.stream_channel_size);
}

#[test]
fn zero_retries_is_allowed() {
    let config = ClientConfig::default().merged(&ConfigFile {
        max_retries: Some(0),
        ..Default::default()
    });
    assert!(config.validate().is_ok());
}

#[test]
fn ipv6_hosts_are_bracketed() {
    let config = ClientConfig::default().merged(&ConfigFile {
        host: Some("::1".into()),
        ..Default::default()
    });
    config.validate().expect("IPv6 literal is a valid host");
    assert_eq!(config.api_url(), "http://[::1]:1234/v1");
}

#[test]
fn test_path_display() {
    let path = std::path::Path::new("/definitely/not/home/config.toml");
    assert_eq!(path_display(path), "/definitely/not/home/config.toml");
}
