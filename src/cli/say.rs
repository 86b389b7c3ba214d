//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use crate::core::chat_session::{ChatSession, TurnEvent, TurnOutcome};
use crate::core::config::ClientConfig;
use crate::core::log_sink::LogSink;
use crate::core::message::FragmentKind;
use crate::core::transport::HttpTransport;
use crate::lms::{ApiModelDirectory, LmsClient, ModelDirectory};

/// Picks the model for a one-shot request: the loaded model `lms` reports,
/// then the server's model list, then the `-m` value as given.
pub async fn resolve_model(
    config: &ClientConfig,
    client: reqwest::Client,
    preferred: Option<&str>,
) -> Option<String> {
    match LmsClient::new().active_model(preferred).await {
        Ok(Some(model)) => return Some(model),
        Ok(None) => {}
        Err(err) => tracing::debug!(error = %err, "lms unavailable; asking the server"),
    }

    let api = ApiModelDirectory::new(client, config.api_url());
    match api.active_model(preferred).await {
        Ok(Some(model)) => Some(model),
        Ok(None) => preferred.map(str::to_owned),
        Err(err) => {
            tracing::warn!(error = %err, "could not list models");
            preferred.map(str::to_owned)
        }
    }
}

pub async fn run_say(
    config: &ClientConfig,
    prompt: Vec<String>,
    system: Option<String>,
    model: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: lazylms say <prompt>");
        std::process::exit(1);
    }

    let transport = HttpTransport::new(config)?;
    let model = resolve_model(config, transport.client().clone(), model.as_deref()).await;

    let mut session = ChatSession::new(config, Arc::new(transport), LogSink::disabled());
    if let Some(system) = system {
        session.set_system_message(&system)?;
    }
    session.submit(&prompt, model.as_deref())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                session.cancel();
            }
            event = session.next_event() => match event {
                Some(TurnEvent::Fragment(fragment)) => match fragment.kind {
                    FragmentKind::Output => {
                        write!(stdout, "{}", fragment.text)?;
                        stdout.flush()?;
                    }
                    FragmentKind::Reasoning => {
                        write!(stderr, "{}", fragment.text)?;
                        stderr.flush()?;
                    }
                },
                Some(TurnEvent::Started) => {}
                Some(TurnEvent::Finished(outcome)) => {
                    writeln!(stdout)?;
                    return match outcome {
                        TurnOutcome::Completed => Ok(()),
                        TurnOutcome::Cancelled => {
                            eprintln!("[cancelled]");
                            std::process::exit(130);
                        }
                        TurnOutcome::Failed(message) => {
                            eprintln!("❌ Error: {message}");
                            std::process::exit(1);
                        }
                    };
                }
                None => return Ok(()),
            },
        }
    }
}
