use crate::core::chat_stream::MIN_STREAM_CHANNEL_SIZE;
use crate::core::config::data::{path_display, ClientConfig, ConfigFile};
use crate::core::validation::{
    validate_host, validate_port, validate_scheme, ValidationError,
};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur while assembling the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range after all layers were applied.
    Invalid(ValidationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path_display(path), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path_display(path), source)
            }
            ConfigError::Invalid(err) => write!(f, "Invalid configuration: {err}"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(source) => Some(source),
        }
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Invalid(err)
    }
}

impl ConfigFile {
    /// Loads a config file. A missing file yields the empty layer.
    pub fn load_from_path(config_path: &Path) -> Result<ConfigFile, ConfigError> {
        if !config_path.exists() {
            return Ok(ConfigFile::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// `config.toml` inside the platform configuration directory, if the
    /// platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "lazylms", "lazylms")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn positive(field: &str, value: u128) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::new(
            field,
            value.to_string(),
            format!("{field} must be positive"),
        ));
    }
    Ok(())
}

impl ClientConfig {
    /// Layers defaults, the config file and command-line overrides, then
    /// validates the result.
    ///
    /// `explicit_path` comes from `--config`; without it the platform default
    /// location is used when it exists.
    pub fn load(
        explicit_path: Option<&Path>,
        overrides: &ConfigFile,
    ) -> Result<ClientConfig, ConfigError> {
        let file = match explicit_path {
            Some(path) => ConfigFile::load_from_path(path)?,
            None => match ConfigFile::default_path() {
                Some(path) => ConfigFile::load_from_path(&path)?,
                None => ConfigFile::default(),
            },
        };

        let config = ClientConfig::default().merged(&file).merged(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.host)?;
        validate_port(self.port)?;
        validate_scheme(&self.scheme)?;
        positive("http_timeout", self.http_timeout.as_millis())?;
        positive("retry_base_delay", self.retry_base_delay.as_millis())?;
        positive("max_conversation_length", self.max_conversation_length as u128)?;
        positive("max_system_message_length", self.max_system_message_length as u128)?;
        positive("max_chat_message_length", self.max_chat_message_length as u128)?;
        positive("log_channel_size", self.log_channel_size as u128)?;

        if self.stream_channel_size < MIN_STREAM_CHANNEL_SIZE {
            return Err(ValidationError::new(
                "stream_channel_size",
                self.stream_channel_size.to_string(),
                format!("stream_channel_size must be at least {MIN_STREAM_CHANNEL_SIZE}"),
            )
            .into());
        }

        Ok(())
    }
}
