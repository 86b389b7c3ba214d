//! Append-only log stream shared by the session core and the presentation
//! layer.
//!
//! Writers never block: when the channel is full the entry is dropped. Every
//! entry is mirrored to `tracing`, so a log file configured with `--log-file`
//! still sees what the Logs panel missed.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    /// One line for the Logs panel: `INFO: msg` for info, `[LEVEL] msg`
    /// otherwise.
    pub fn display_line(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S");
        match self.level {
            LogLevel::Info => format!("{time} INFO: {}", self.message),
            level => format!("{time} [{level}] {}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogSink {
    tx: Option<mpsc::Sender<LogEntry>>,
}

impl LogSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only forwards to `tracing`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(target: "lazylms", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "lazylms", "{message}"),
            LogLevel::Info => tracing::info!(target: "lazylms", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "lazylms", "{message}"),
        }

        if let Some(tx) = &self.tx {
            let entry = LogEntry {
                level,
                message,
                timestamp: Local::now(),
            };
            // Full or closed: the panel loses the line, tracing already has it.
            let _ = tx.try_send(entry);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }
}

/// Collects everything currently queued without waiting.
pub fn drain(rx: &mut mpsc::Receiver<LogEntry>) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        entries.push(entry);
    }
    entries
}
