//! In-memory transports for exercising the streaming core without a server.

use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::api::ResponseRequest;
use crate::core::transport::{ByteStream, ProtocolError, StreamError, Transport, TransportError};

pub type ChunkSender = mpsc::Sender<Result<Vec<u8>, TransportError>>;

/// What the next call to [`Transport::open`] does.
pub enum Step {
    Status(u16),
    Connection(String),
    Body(Vec<Result<Vec<u8>, TransportError>>),
    /// Body chunks are fed by the test through a [`ChunkSender`]; the body
    /// ends when the sender is dropped.
    Channel(mpsc::Receiver<Result<Vec<u8>, TransportError>>),
}

impl Step {
    pub fn status(status: u16) -> Self {
        Step::Status(status)
    }

    pub fn body(chunks: &[&str]) -> Self {
        Step::Body(chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect())
    }

    pub fn channel() -> (Self, ChunkSender) {
        let (tx, rx) = mpsc::channel(64);
        (Step::Channel(rx), tx)
    }
}

/// SSE block for a named event.
pub fn sse(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

pub fn delta(text: &str) -> String {
    sse(
        "response.output_text.delta",
        &serde_json::json!({ "delta": text }).to_string(),
    )
}

pub fn reasoning(text: &str) -> String {
    sse(
        "response.reasoning_text.delta",
        &serde_json::json!({ "delta": text }).to_string(),
    )
}

pub fn created(id: &str) -> String {
    sse(
        "response.created",
        &serde_json::json!({ "response": { "id": id } }).to_string(),
    )
}

pub fn completed() -> String {
    sse("response.completed", "{}")
}

/// Plays back a fixed script and records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ResponseRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ResponseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &ResponseRequest) -> Result<ByteStream, StreamError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Status(status)) if (500..600).contains(&status) => {
                Err(TransportError::ServerStatus {
                    status,
                    body: String::new(),
                }
                .into())
            }
            Some(Step::Status(status)) if !(200..300).contains(&status) => {
                Err(ProtocolError::ClientStatus {
                    status,
                    body: String::new(),
                }
                .into())
            }
            Some(Step::Status(_)) => Ok(Box::pin(stream::empty())),
            Some(Step::Connection(msg)) => Err(TransportError::Connection(msg).into()),
            Some(Step::Body(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(Step::Channel(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            None => Err(TransportError::Connection("script exhausted".into()).into()),
        }
    }
}
