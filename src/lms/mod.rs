//! Model management through the LM Studio `lms` command-line tool.

pub mod runner;
pub mod types;

use async_trait::async_trait;
use std::fmt;

use crate::api::models::{fetch_models, sort_models};
use crate::core::validation::{validate_lms_command, validate_model_id, ValidationError};

pub use runner::{CommandRunner, ProcessRunner};
pub use types::{format_size, DownloadedModel, Estimate, LoadedModel, Quantization, ServerStatus};

/// Embedding model bundled with LM Studio; it cannot be chatted with.
pub const EMBEDDING_MODEL_KEY: &str = "text-embedding-nomic-embed-text-v1.5";

const ESTIMATE_SUCCESS_MESSAGE: &str =
    "Estimate: This model may be loaded based on your resource guardrails settings.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LmsError {
    Rejected(ValidationError),
    /// `lms` is not on `PATH`.
    NotFound,
    Spawn(String),
    Failed {
        status: Option<i32>,
        stderr: String,
    },
    Parse(String),
}

impl fmt::Display for LmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LmsError::Rejected(err) => write!(f, "invalid lms command: {err}"),
            LmsError::NotFound => write!(f, "lms command not found in PATH"),
            LmsError::Spawn(err) => write!(f, "failed to run lms command: {err}"),
            LmsError::Failed { status, stderr } => {
                match status {
                    Some(code) => write!(f, "lms exited with status {code}")?,
                    None => write!(f, "lms was terminated by a signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ", stderr: {stderr}")?;
                }
                Ok(())
            }
            LmsError::Parse(err) => write!(f, "failed to parse lms output: {err}"),
        }
    }
}

impl std::error::Error for LmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LmsError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for LmsError {
    fn from(err: ValidationError) -> Self {
        LmsError::Rejected(err)
    }
}

/// Typed wrapper over the allow-listed `lms` subcommands.
pub struct LmsClient<R = ProcessRunner> {
    runner: R,
}

impl LmsClient<ProcessRunner> {
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner::new())
    }
}

impl Default for LmsClient<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> LmsClient<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    /// Validates `args` and runs them; nothing is spawned for a rejected command.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, LmsError> {
        let args: Vec<String> = args.iter().map(|arg| arg.as_ref().to_string()).collect();
        validate_lms_command(&args)?;
        self.runner.run(&args).await
    }

    pub async fn status(&self) -> Result<ServerStatus, LmsError> {
        let output = self.run(&["status"]).await?;
        Ok(if output.contains("ON") {
            ServerStatus::On
        } else {
            ServerStatus::Off
        })
    }

    pub async fn downloaded_models(&self) -> Result<Vec<DownloadedModel>, LmsError> {
        let output = self.run(&["ls", "--json"]).await?;
        let models: Vec<DownloadedModel> = parse_json(&output)?;
        Ok(models
            .into_iter()
            .filter(|model| model.model_key != EMBEDDING_MODEL_KEY)
            .map(|mut model| {
                model.can_load = true;
                model
            })
            .collect())
    }

    pub async fn loaded_models(&self) -> Result<Vec<LoadedModel>, LmsError> {
        let output = self.run(&["ps", "--json"]).await?;
        parse_json(&output)
    }

    /// Asks LM Studio whether `path` fits within the resource guardrails.
    pub async fn estimate(&self, path: &str) -> Result<Estimate, LmsError> {
        validate_model_id(path)?;
        let output = self
            .run(&["load", "--exact", "--estimate-only", path])
            .await?;
        Ok(if output.contains(ESTIMATE_SUCCESS_MESSAGE) {
            Estimate::Available
        } else {
            Estimate::Unavailable
        })
    }

    /// Like [`Self::downloaded_models`], with `can_load` filled per model.
    /// A failed estimate marks that model as not loadable.
    pub async fn downloaded_models_with_estimates(
        &self,
    ) -> Result<Vec<DownloadedModel>, LmsError> {
        let mut models = self.downloaded_models().await?;
        for model in &mut models {
            model.can_load = match self.estimate(&model.path).await {
                Ok(estimate) => estimate == Estimate::Available,
                Err(err) => {
                    tracing::debug!(path = %model.path, error = %err, "estimate failed");
                    false
                }
            };
        }
        Ok(models)
    }

    pub async fn load(&self, model: &str) -> Result<String, LmsError> {
        validate_model_id(model)?;
        self.run(&["load", model]).await
    }

    pub async fn unload(&self, model: &str) -> Result<String, LmsError> {
        validate_model_id(model)?;
        self.run(&["unload", model]).await
    }

    /// Unloads everything, one model at a time if `unload --all` fails.
    pub async fn unload_all(&self) -> Result<(), LmsError> {
        let err = match self.run(&["unload", "--all"]).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        tracing::debug!(error = %err, "unload --all failed; unloading individually");

        let loaded = self.loaded_models().await?;
        for model in loaded {
            self.unload(&model.identifier).await?;
        }
        Ok(())
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>, LmsError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(output).map_err(|err| LmsError::Parse(err.to_string()))
}

/// Picks the `preferred` identifier if it is available, else the first one.
pub fn pick_active_model<'a>(
    available: impl IntoIterator<Item = &'a str>,
    preferred: Option<&str>,
) -> Option<String> {
    let available: Vec<&str> = available.into_iter().collect();
    if let Some(preferred) = preferred.map(str::trim).filter(|id| !id.is_empty()) {
        if available.contains(&preferred) {
            return Some(preferred.to_string());
        }
    }
    available.first().map(|id| (*id).to_string())
}

/// Source of the model a chat turn should target.
#[async_trait]
pub trait ModelDirectory: Send + Sync {
    async fn available_models(&self) -> Result<Vec<String>, String>;

    /// The preferred identifier if loaded, else the first loaded model.
    async fn active_model(&self, preferred: Option<&str>) -> Result<Option<String>, String> {
        let models = self.available_models().await?;
        Ok(pick_active_model(models.iter().map(String::as_str), preferred))
    }
}

#[async_trait]
impl<R: CommandRunner> ModelDirectory for LmsClient<R> {
    async fn available_models(&self) -> Result<Vec<String>, String> {
        let loaded = self.loaded_models().await.map_err(|err| err.to_string())?;
        Ok(loaded.into_iter().map(|model| model.identifier).collect())
    }
}

/// Model directory backed by `GET /v1/models`, for servers without `lms`.
pub struct ApiModelDirectory {
    client: reqwest::Client,
    api_url: String,
}

impl ApiModelDirectory {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl ModelDirectory for ApiModelDirectory {
    async fn available_models(&self) -> Result<Vec<String>, String> {
        let mut response = fetch_models(&self.client, &self.api_url)
            .await
            .map_err(|err| err.to_string())?;
        sort_models(&mut response.data);
        Ok(response.data.into_iter().map(|model| model.id).collect())
    }
}
