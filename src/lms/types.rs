use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Quantization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bits: u32,
}

/// One entry of `lms ls --json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadedModel {
    #[serde(rename = "type")]
    pub kind: String,
    pub model_key: String,
    pub format: String,
    pub display_name: String,
    pub publisher: String,
    pub path: String,
    pub size_bytes: u64,
    pub architecture: String,
    pub quantization: Quantization,
    pub max_context_length: u64,
    /// Filled from `lms load --estimate-only`; not part of the listing.
    #[serde(skip)]
    pub can_load: bool,
}

/// One entry of `lms ps --json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadedModel {
    #[serde(rename = "type")]
    pub kind: String,
    pub model_key: String,
    pub format: String,
    pub display_name: String,
    pub publisher: String,
    pub path: String,
    pub size_bytes: u64,
    pub architecture: String,
    pub quantization: Quantization,
    pub identifier: String,
    pub ttl_ms: Option<i64>,
    pub last_used_time: i64,
    pub vision: bool,
    pub trained_for_tool_use: bool,
    pub max_context_length: u64,
    pub context_length: u64,
    pub status: String,
    pub queued: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    On,
    Off,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::On => "ON",
            ServerStatus::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    Available,
    Unavailable,
}

/// Human-readable size, e.g. `4.68 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
