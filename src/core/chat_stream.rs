//! Bridge between the per-turn network task and the task that owns the
//! session.
//!
//! Messages travel as `(StreamMessage, stream_id)` over a bounded channel.
//! Fragments are sent with `try_send` and dropped when the channel is full,
//! so the producer never blocks on them. `Started`, `Completed`, `Cancelled`
//! and `Failed` are awaited and always arrive. After a cancel the task reports
//! `Cancelled` first and then drains the rest of the body.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ResponseRequest;
use crate::core::event_stream::{decode_stream, DecodeOutcome};
use crate::core::log_sink::LogSink;
use crate::core::message::StreamFragment;
use crate::core::transport::{send_within, RetryPolicy, StreamError, Transport};

/// Smallest bridge capacity the session accepts.
pub const MIN_STREAM_CHANNEL_SIZE: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    /// The transport handed back a live body.
    Started,
    Fragment(StreamFragment),
    Completed { response_id: Option<String> },
    Cancelled,
    Failed(StreamError),
}

impl StreamMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamMessage::Completed { .. } | StreamMessage::Cancelled | StreamMessage::Failed(_)
        )
    }
}

/// Producer half of the bridge for one turn.
///
/// Fragments are offered with `try_send` and dropped when the display falls
/// behind; lifecycle messages wait for room so every turn terminates.
pub struct StreamSender {
    tx: mpsc::Sender<(StreamMessage, u64)>,
    stream_id: u64,
    dropped: u64,
}

impl StreamSender {
    pub fn fragment(&mut self, fragment: StreamFragment) {
        match self
            .tx
            .try_send((StreamMessage::Fragment(fragment), self.stream_id))
        {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::debug!(
                    stream_id = self.stream_id,
                    dropped = self.dropped,
                    "bridge full; dropping fragment"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub async fn lifecycle(&self, message: StreamMessage) {
        let _ = self.tx.send((message, self.stream_id)).await;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub struct StreamParams {
    pub transport: Arc<dyn Transport>,
    pub request: ResponseRequest,
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub log: LogSink,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::Sender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_STREAM_CHANNEL_SIZE));
        (Self { tx }, rx)
    }

    /// Channel of an exact size, for exercising back-pressure.
    #[cfg(test)]
    pub fn with_exact_capacity(capacity: usize) -> (Self, mpsc::Receiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn sender(&self, stream_id: u64) -> StreamSender {
        StreamSender {
            tx: self.tx.clone(),
            stream_id,
            dropped: 0,
        }
    }

    pub fn spawn_stream(&self, params: StreamParams) -> JoinHandle<()> {
        let sender = self.sender(params.stream_id);
        tokio::spawn(run_turn(params, sender))
    }

    #[cfg(test)]
    pub async fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id)).await;
    }
}

/// Runs one turn in the background: open with retries, decode, report.
pub async fn run_turn(params: StreamParams, mut sender: StreamSender) {
    let StreamParams {
        transport,
        request,
        policy,
        timeout,
        log,
        cancel_token,
        stream_id,
    } = params;

    let opened = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            sender.lifecycle(StreamMessage::Cancelled).await;
            return;
        }
        result = send_within(transport.as_ref(), &request, &policy, timeout, &log) => result,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            sender.lifecycle(StreamMessage::Failed(err)).await;
            return;
        }
    };
    sender.lifecycle(StreamMessage::Started).await;

    let outcome = decode_stream(&mut stream, &cancel_token, |fragment| {
        sender.fragment(fragment)
    })
    .await;

    if sender.dropped() > 0 {
        log.warn(format!(
            "Display fell behind; {} fragments were dropped",
            sender.dropped()
        ));
    }

    match outcome {
        Ok(DecodeOutcome::Completed { response_id }) => {
            sender
                .lifecycle(StreamMessage::Completed { response_id })
                .await;
        }
        Ok(DecodeOutcome::Cancelled) => {
            sender.lifecycle(StreamMessage::Cancelled).await;
            // Read the rest of the body so the connection can be reused.
            let mut discarded = 0usize;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => discarded += bytes.len(),
                    Err(_) => break,
                }
            }
            tracing::debug!(stream_id, discarded, "drained cancelled response body");
        }
        Err(err) => {
            sender.lifecycle(StreamMessage::Failed(err)).await;
        }
    }
}
