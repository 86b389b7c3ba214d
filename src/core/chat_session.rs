//! The per-turn state machine that ties session state, transport and the
//! bridge together.
//!
//! A turn moves `Idle → Sending → Streaming → Idle`. All mutation happens on
//! the caller's task: the background stream only talks back through the
//! bridge, and [`ChatSession::next_event`] / [`ChatSession::poll_events`]
//! apply those messages.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::ResponseRequest;
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::config::ClientConfig;
use crate::core::log_sink::LogSink;
use crate::core::message::{ResponseBuffer, StreamFragment, Turn};
use crate::core::session::SessionState;
use crate::core::transport::{RetryPolicy, Transport};
use crate::core::validation::{
    sanitize_input, validate_chat_message, validate_model_id, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// What the display needs to know after a bridge message was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Started,
    Fragment(StreamFragment),
    Finished(TurnOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A turn is already in flight.
    Busy,
    NoActiveModel,
    Invalid(ValidationError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Busy => write!(f, "a response is still streaming"),
            SubmitError::NoActiveModel => write!(f, "no model is loaded"),
            SubmitError::Invalid(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for SubmitError {
    fn from(err: ValidationError) -> Self {
        SubmitError::Invalid(err)
    }
}

pub struct ChatSession {
    state: SessionState,
    buffer: ResponseBuffer,
    stream_service: ChatStreamService,
    rx: mpsc::Receiver<(StreamMessage, u64)>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
    log: LogSink,
    phase: TurnPhase,
    last_outcome: Option<TurnOutcome>,
    cancel_token: Option<CancellationToken>,
    current_stream_id: u64,
}

impl ChatSession {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>, log: LogSink) -> Self {
        let (stream_service, rx) = ChatStreamService::new(config.stream_channel_size);
        Self {
            state: SessionState::new(config.message_limits()),
            buffer: ResponseBuffer::new(),
            stream_service,
            rx,
            transport,
            policy: RetryPolicy::from_config(config),
            timeout: config.http_timeout,
            log,
            phase: TurnPhase::Idle,
            last_outcome: None,
            cancel_token: None,
            current_stream_id: 0,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    pub fn last_outcome(&self) -> Option<&TurnOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn history(&self) -> &[Turn] {
        self.state.turns()
    }

    pub fn response_buffer(&self) -> &ResponseBuffer {
        &self.buffer
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.state.continuation_token()
    }

    pub fn system_message(&self) -> Option<&str> {
        self.state.system_message()
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// Starts a turn for `prompt` against `active_model`.
    pub fn submit(&mut self, prompt: &str, active_model: Option<&str>) -> Result<(), SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::Busy);
        }

        let prompt = sanitize_input(prompt);
        validate_chat_message(&prompt, self.state.limits().chat)?;

        let model = active_model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .ok_or(SubmitError::NoActiveModel)?;
        validate_model_id(model)?;

        self.state.append_user(&prompt)?;
        let removed = self.state.truncate(0);
        if removed > 0 {
            self.log
                .info(format!("Dropped {removed} old messages from the conversation"));
        }

        let request = ResponseRequest::streaming(
            model,
            self.state.input_messages(),
            self.state.continuation_token().map(str::to_owned),
        );

        self.buffer.clear();
        self.current_stream_id += 1;
        let cancel_token = CancellationToken::new();
        self.cancel_token = Some(cancel_token.clone());

        self.log.debug(format!(
            "Sending {} messages to {model} (stream {})",
            request.input.len(),
            self.current_stream_id
        ));
        self.stream_service.spawn_stream(StreamParams {
            transport: Arc::clone(&self.transport),
            request,
            policy: self.policy,
            timeout: self.timeout,
            log: self.log.clone(),
            cancel_token,
            stream_id: self.current_stream_id,
        });
        self.phase = TurnPhase::Sending;
        Ok(())
    }

    /// Requests cancellation of the in-flight turn. The turn ends once the
    /// background task acknowledges it.
    pub fn cancel(&mut self) -> bool {
        match (&self.cancel_token, self.is_busy()) {
            (Some(token), true) => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn set_system_message(&mut self, text: &str) -> Result<(), ValidationError> {
        self.state.set_system_message(text)?;
        self.log.info("System prompt updated");
        Ok(())
    }

    /// Empties the conversation. An in-flight turn is cancelled and its
    /// remaining messages are ignored.
    pub fn clear_conversation(&mut self) {
        if self.cancel() {
            self.current_stream_id += 1;
            self.finish(TurnOutcome::Cancelled);
        }
        self.state.clear();
        self.buffer.clear();
    }

    /// Waits for the next bridge message of the current turn and applies it.
    /// Returns `None` while idle.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        while self.is_busy() {
            let (message, stream_id) = self.rx.recv().await?;
            if let Some(event) = self.apply(message, stream_id) {
                return Some(event);
            }
        }
        None
    }

    /// Applies every message already queued, without waiting.
    pub fn poll_events(&mut self) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Ok((message, stream_id)) = self.rx.try_recv() {
            if let Some(event) = self.apply(message, stream_id) {
                events.push(event);
            }
        }
        events
    }

    fn apply(&mut self, message: StreamMessage, stream_id: u64) -> Option<TurnEvent> {
        if stream_id != self.current_stream_id || !self.is_busy() {
            tracing::trace!(stream_id, "ignoring message from a stale stream");
            return None;
        }

        match message {
            StreamMessage::Started => {
                self.phase = TurnPhase::Streaming;
                Some(TurnEvent::Started)
            }
            StreamMessage::Fragment(fragment) => {
                self.buffer.push(fragment.clone());
                Some(TurnEvent::Fragment(fragment))
            }
            StreamMessage::Completed { response_id } => {
                let segments = self.buffer.take();
                let committed = !segments.is_empty()
                    && match self.state.append_assistant_segments(segments) {
                        Ok(()) => true,
                        Err(err) => {
                            self.log
                                .warn(format!("Response was not added to history: {err}"));
                            false
                        }
                    };
                // The token must name a response that history actually holds.
                match response_id {
                    Some(id) if committed => self.state.record_continuation_token(id),
                    Some(id) => tracing::debug!(%id, "response not committed; token kept"),
                    None => {}
                }
                Some(self.finish(TurnOutcome::Completed))
            }
            StreamMessage::Cancelled => {
                if !self.buffer.is_empty() {
                    let segments = self.buffer.take_cancelled();
                    if let Err(err) = self.state.append_assistant_segments(segments) {
                        self.log
                            .warn(format!("Partial response was not added to history: {err}"));
                    }
                }
                self.log.info("Response cancelled");
                Some(self.finish(TurnOutcome::Cancelled))
            }
            StreamMessage::Failed(err) => {
                self.buffer.clear();
                let message = err.to_string();
                self.log.error(format!("Chat request failed: {message}"));
                Some(self.finish(TurnOutcome::Failed(message)))
            }
        }
    }

    fn finish(&mut self, outcome: TurnOutcome) -> TurnEvent {
        self.phase = TurnPhase::Idle;
        self.cancel_token = None;
        self.last_outcome = Some(outcome.clone());
        TurnEvent::Finished(outcome)
    }

    /// Runs the current turn to its end, returning the outcome.
    pub async fn wait_for_turn(&mut self) -> Option<TurnOutcome> {
        while let Some(event) = self.next_event().await {
            if let TurnEvent::Finished(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(token) = &self.cancel_token {
            token.cancel();
        }
    }
}
