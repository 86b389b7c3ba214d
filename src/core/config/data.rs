use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::session::MessageLimits;
use crate::utils::url::{construct_api_url, format_base_url};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_STREAM_CHANNEL_SIZE: usize = 1000;
pub const DEFAULT_LOG_CHANNEL_SIZE: usize = 100;

/// Effective runtime configuration after all layers have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_conversation_length: usize,
    pub max_system_message_length: usize,
    pub max_chat_message_length: usize,
    pub stream_channel_size: usize,
    pub log_channel_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let limits = MessageLimits::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scheme: DEFAULT_SCHEME.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_conversation_length: limits.conversation,
            max_system_message_length: limits.system,
            max_chat_message_length: limits.chat,
            stream_channel_size: DEFAULT_STREAM_CHANNEL_SIZE,
            log_channel_size: DEFAULT_LOG_CHANNEL_SIZE,
        }
    }
}

impl ClientConfig {
    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format_base_url(&self.scheme, &self.host, self.port)
    }

    /// `scheme://host:port/v1`
    pub fn api_url(&self) -> String {
        construct_api_url(&self.base_url(), "v1")
    }

    pub fn message_limits(&self) -> MessageLimits {
        MessageLimits {
            system: self.max_system_message_length,
            chat: self.max_chat_message_length,
            conversation: self.max_conversation_length,
        }
    }

    /// Returns a copy with every key present in `file` applied on top.
    pub fn merged(mut self, file: &ConfigFile) -> Self {
        if let Some(host) = &file.host {
            self.host = host.clone();
        }
        if let Some(port) = file.port {
            // Out-of-range values are kept as 0 so validation reports them.
            self.port = u16::try_from(port).unwrap_or(0);
        }
        if let Some(scheme) = &file.scheme {
            self.scheme = scheme.to_ascii_lowercase();
        }
        if let Some(secs) = file.http_timeout_secs {
            self.http_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = file.max_retries {
            self.max_retries = retries;
        }
        if let Some(ms) = file.retry_base_delay_ms {
            self.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(len) = file.max_conversation_length {
            self.max_conversation_length = len;
        }
        if let Some(len) = file.max_system_message_length {
            self.max_system_message_length = len;
        }
        if let Some(len) = file.max_chat_message_length {
            self.max_chat_message_length = len;
        }
        if let Some(size) = file.stream_channel_size {
            self.stream_channel_size = size;
        }
        if let Some(size) = file.log_channel_size {
            self.log_channel_size = size;
        }
        self
    }
}

/// On-disk `config.toml`. Every key is optional; absent keys keep the
/// lower layer's value. Command-line overrides use the same shape.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u32>,
    pub scheme: Option<String>,
    /// Overall HTTP timeout in seconds
    pub http_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    /// Backoff base in milliseconds; retry `n` waits `base * 2^n`
    pub retry_base_delay_ms: Option<u64>,
    pub max_conversation_length: Option<usize>,
    pub max_system_message_length: Option<usize>,
    pub max_chat_message_length: Option<usize>,
    pub stream_channel_size: Option<usize>,
    pub log_channel_size: Option<usize>,
}

/// Get a user-friendly display string for a path, using `~` for the home
/// directory on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
