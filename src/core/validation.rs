//! Input validation shared by the session, configuration, and `lms` layers.
//!
//! Every check returns a [`ValidationError`] naming the offending field and
//! value so callers can surface it verbatim. Validation always happens before
//! any network or process call.

use std::fmt;
use std::net::IpAddr;

pub const MAX_SYSTEM_MESSAGE_LENGTH: usize = 10_000;
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 50_000;
pub const MAX_MODEL_ID_LENGTH: usize = 256;
pub const MAX_HOSTNAME_LENGTH: usize = 253;
pub const VALID_SCHEMES: [&str; 2] = ["http", "https"];

/// `lms` subcommands the process launcher is allowed to run.
pub const ALLOWED_LMS_COMMANDS: [&str; 5] = ["status", "load", "unload", "ls", "ps"];

const DANGEROUS_ARGUMENT_CHARS: [char; 6] = ['&', '|', ';', '`', '$', '\0'];

/// Rejected input, with enough context to show the user what was wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation failed for {}='{}': {}",
            self.field,
            preview(&self.value),
            self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

/// Shortens long values so a 50k-character prompt does not flood the log.
fn preview(value: &str) -> String {
    const PREVIEW_CHARS: usize = 60;
    if value.chars().count() <= PREVIEW_CHARS {
        value.to_string()
    } else {
        let head: String = value.chars().take(PREVIEW_CHARS).collect();
        format!("{head}…")
    }
}

/// Trims the input, strips NUL bytes, and drops control characters other
/// than newline and tab.
pub fn sanitize_input(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn validate_text(
    field: &str,
    label: &str,
    content: &str,
    max_length: usize,
) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new(
            field,
            content,
            format!("{label} cannot be empty"),
        ));
    }

    if content.contains('\0') {
        return Err(ValidationError::new(
            field,
            content,
            format!("{label} must be valid text without NUL bytes"),
        ));
    }

    if content.chars().count() > max_length {
        return Err(ValidationError::new(
            field,
            content,
            format!("{label} exceeds maximum length of {max_length} characters"),
        ));
    }

    Ok(())
}

pub fn validate_system_message(content: &str, max_length: usize) -> Result<(), ValidationError> {
    validate_text("system_message", "system message", content, max_length)
}

pub fn validate_chat_message(content: &str, max_length: usize) -> Result<(), ValidationError> {
    validate_text("chat_message", "chat message", content, max_length)
}

pub fn validate_model_id(model_id: &str) -> Result<(), ValidationError> {
    if model_id.trim().is_empty() {
        return Err(ValidationError::new(
            "model_id",
            model_id,
            "model ID cannot be empty",
        ));
    }

    if model_id.chars().count() > MAX_MODEL_ID_LENGTH {
        return Err(ValidationError::new(
            "model_id",
            model_id,
            format!("model ID exceeds maximum length of {MAX_MODEL_ID_LENGTH} characters"),
        ));
    }

    Ok(())
}

pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.trim().is_empty() {
        return Err(ValidationError::new("host", host, "host cannot be empty"));
    }

    if host.len() > MAX_HOSTNAME_LENGTH {
        return Err(ValidationError::new(
            "host",
            host,
            format!("host exceeds maximum length of {MAX_HOSTNAME_LENGTH} characters"),
        ));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    if !host.split('.').all(is_valid_hostname_label) {
        return Err(ValidationError::new(
            "host",
            host,
            "host must be a valid hostname or IP address",
        ));
    }

    Ok(())
}

fn is_valid_hostname_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_alphanumeric();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::new(
            "port",
            port.to_string(),
            "port must be between 1 and 65535",
        ));
    }
    Ok(())
}

pub fn validate_scheme(scheme: &str) -> Result<(), ValidationError> {
    if scheme.trim().is_empty() {
        return Err(ValidationError::new(
            "scheme",
            scheme,
            "scheme cannot be empty",
        ));
    }

    let lowered = scheme.to_ascii_lowercase();
    if VALID_SCHEMES.contains(&lowered.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "scheme",
            lowered,
            format!("scheme must be one of: {}", VALID_SCHEMES.join(", ")),
        ))
    }
}

/// Validates a full base URL such as `http://localhost:1234`.
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::new("url", url, "URL cannot be empty"));
    }

    let parsed = reqwest::Url::parse(url).map_err(|err| {
        ValidationError::new("url", url, format!("invalid URL format: {err}"))
    })?;

    validate_scheme(parsed.scheme())?;
    let host = parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .unwrap_or_default();
    validate_host(host)?;
    if let Some(port) = parsed.port() {
        validate_port(port)?;
    }
    Ok(())
}

/// Checks an `lms` invocation against the allow-list and rejects shell
/// metacharacters in every argument.
pub fn validate_lms_command(args: &[String]) -> Result<(), ValidationError> {
    let Some(command) = args.first() else {
        return Err(ValidationError::new(
            "command",
            "",
            "command cannot be empty",
        ));
    };

    if !ALLOWED_LMS_COMMANDS.contains(&command.as_str()) {
        return Err(ValidationError::new(
            "command",
            command.as_str(),
            format!("command not allowed: {command}"),
        ));
    }

    for (index, arg) in args.iter().enumerate() {
        if arg.contains(DANGEROUS_ARGUMENT_CHARS) {
            return Err(ValidationError::new(
                format!("command[{index}]"),
                arg.as_str(),
                "argument contains dangerous characters",
            ));
        }
    }

    Ok(())
}
