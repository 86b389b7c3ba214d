//! Server-sent event decoding for `/v1/responses` streams.
//!
//! Bytes arrive in arbitrary chunks. [`LineBuffer`] reassembles lines,
//! [`EventStreamDecoder`] groups them into `event:`/`data:` blocks and maps
//! each block to a [`StreamEvent`], and [`decode_stream`] drives both over a
//! live [`ByteStream`] while watching for cancellation.

use futures_util::StreamExt;
use memchr::memchr;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::message::StreamFragment;
use crate::core::transport::{ByteStream, ProtocolError, StreamError};

pub const EVENT_RESPONSE_CREATED: &str = "response.created";
pub const EVENT_OUTPUT_TEXT_DELTA: &str = "response.output_text.delta";
pub const EVENT_REASONING_TEXT_DELTA: &str = "response.reasoning_text.delta";
pub const EVENT_RESPONSE_COMPLETED: &str = "response.completed";

const DONE_MARKER: &str = "[DONE]";

/// Splits a byte stream into lines regardless of how it was chunked.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    start: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 && self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let rest = &self.buf[self.start..];
        let newline = memchr(b'\n', rest)?;
        let mut line = &rest[..newline];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = line.to_vec();
        self.start += newline + 1;
        if self.start > 4096 && self.start * 2 > self.buf.len() {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        Some(line)
    }

    /// Whatever is left after the last newline, consumed.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        let rest = &self.buf[self.start..];
        let rest = rest.strip_suffix(b"\r").unwrap_or(rest);
        let remainder = (!rest.is_empty()).then(|| rest.to_vec());
        self.buf.clear();
        self.start = 0;
        remainder
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// `response.created`; carries the server's response identifier when one
    /// was present.
    Created { response_id: Option<String> },
    Fragment(StreamFragment),
    Completed,
    /// Any other event type, kept for tracing.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Completed { response_id: Option<String> },
    Cancelled,
}

#[derive(Debug, Default)]
struct PendingBlock {
    event_type: Option<String>,
    data: String,
}

#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    lines: LineBuffer,
    block: PendingBlock,
    response_id: Option<String>,
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let value = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

fn response_id_of(value: &Value) -> Option<String> {
    value
        .get("response_id")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/response/id").and_then(Value::as_str))
        .or_else(|| value.get("id").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

fn delta_of(value: &Value) -> Option<&str> {
    value
        .get("delta")
        .and_then(Value::as_str)
        .filter(|delta| !delta.is_empty())
}

/// Maps one complete block to an event. `[DONE]` and deltas without text
/// produce nothing.
pub fn decode_block(
    event_type: Option<&str>,
    data: &str,
) -> Result<Option<StreamEvent>, ProtocolError> {
    if data.trim() == DONE_MARKER {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(data).map_err(|err| ProtocolError::MalformedEvent {
            event_type: event_type.unwrap_or_default().to_string(),
            message: err.to_string(),
        })?;

    let kind = event_type
        .filter(|kind| !kind.is_empty())
        .or_else(|| value.get("type").and_then(Value::as_str))
        .unwrap_or_default();

    let event = match kind {
        EVENT_RESPONSE_CREATED => StreamEvent::Created {
            response_id: response_id_of(&value),
        },
        EVENT_OUTPUT_TEXT_DELTA => match delta_of(&value) {
            Some(delta) => StreamEvent::Fragment(StreamFragment::output(delta)),
            None => return Ok(None),
        },
        EVENT_REASONING_TEXT_DELTA => match delta_of(&value) {
            Some(delta) => StreamEvent::Fragment(StreamFragment::reasoning(delta)),
            None => return Ok(None),
        },
        EVENT_RESPONSE_COMPLETED => StreamEvent::Completed,
        other => StreamEvent::Other(other.to_string()),
    };
    Ok(Some(event))
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.lines.push(chunk);
    }

    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        self.lines.next_line()
    }

    /// Identifier from the most recent `response.created`, if any.
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    /// Applies one line. A blank line completes the pending block.
    pub fn process_line(&mut self, line: &[u8]) -> Result<Option<StreamEvent>, ProtocolError> {
        let line = std::str::from_utf8(line)
            .map_err(|err| ProtocolError::InvalidEncoding(err.to_string()))?;

        if line.is_empty() {
            return self.flush_block();
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        if let Some(value) = field_value(line, "event") {
            self.block.event_type = Some(value.trim().to_string());
        } else if let Some(value) = field_value(line, "data") {
            self.block.data.push_str(value);
        }
        Ok(None)
    }

    fn flush_block(&mut self) -> Result<Option<StreamEvent>, ProtocolError> {
        let block = std::mem::take(&mut self.block);
        if block.data.is_empty() {
            return Ok(None);
        }
        let event = decode_block(block.event_type.as_deref(), &block.data)?;
        if let Some(StreamEvent::Created {
            response_id: Some(id),
        }) = &event
        {
            self.response_id = Some(id.clone());
        }
        Ok(event)
    }

    /// Pushes a chunk and decodes every complete line it finishes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ProtocolError> {
        self.push(chunk);
        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// End of input: decodes a trailing partial line and a block that was
    /// never followed by a blank line.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, ProtocolError> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.take_remainder() {
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
        }
        if let Some(event) = self.flush_block()? {
            events.push(event);
        }
        Ok(events)
    }
}

/// Decodes `stream` to its end, handing each fragment to `on_fragment` in
/// arrival order.
///
/// Cancellation is observed before every line and while waiting for the
/// next chunk; the partially accumulated block is discarded in that case.
/// The stream itself is left to the caller so it can be drained.
pub async fn decode_stream<F>(
    stream: &mut ByteStream,
    cancel: &CancellationToken,
    mut on_fragment: F,
) -> Result<DecodeOutcome, StreamError>
where
    F: FnMut(StreamFragment),
{
    let mut decoder = EventStreamDecoder::new();
    let mut handle = |event: StreamEvent| match event {
        StreamEvent::Fragment(fragment) => on_fragment(fragment),
        StreamEvent::Created { response_id } => {
            tracing::debug!(?response_id, "response created");
        }
        StreamEvent::Completed => tracing::debug!("response completed"),
        StreamEvent::Other(kind) => tracing::trace!(%kind, "ignoring event"),
    };

    loop {
        while let Some(line) = decoder.next_line() {
            if cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }
            if let Some(event) = decoder.process_line(&line)? {
                handle(event);
            }
        }

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DecodeOutcome::Cancelled),
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(err)) => return Err(err.into()),
            None => break,
        }
    }

    if cancel.is_cancelled() {
        return Ok(DecodeOutcome::Cancelled);
    }
    for event in decoder.finish()? {
        handle(event);
    }

    Ok(DecodeOutcome::Completed {
        response_id: decoder.response_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::FragmentKind;
    use crate::core::transport::TransportError;
    use futures_util::stream;

    fn byte_stream(chunks: Vec<Result<Vec<u8>, TransportError>>) -> ByteStream {
        Box::pin(stream::iter(chunks))
    }

    fn ok_chunks(chunks: &[&str]) -> ByteStream {
        byte_stream(chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect())
    }

    fn fragments(events: &[StreamEvent]) -> Vec<(String, FragmentKind)> {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Fragment(f) => Some((f.text.clone(), f.kind)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn line_buffer_handles_split_chunks_and_crlf() {
        let mut lines = LineBuffer::new();
        lines.push(b"event: a\r");
        assert_eq!(lines.next_line(), None);
        lines.push(b"\ndata: {}\n\npart");
        assert_eq!(lines.next_line().as_deref(), Some(&b"event: a"[..]));
        assert_eq!(lines.next_line().as_deref(), Some(&b"data: {}"[..]));
        assert_eq!(lines.next_line().as_deref(), Some(&b""[..]));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_remainder().as_deref(), Some(&b"part"[..]));
        assert_eq!(lines.take_remainder(), None);
    }

    #[test]
    fn decodes_named_events_into_fragments() {
        let mut decoder = EventStreamDecoder::new();
        let input = concat!(
            "event: response.created\n",
            "data: {\"response\":{\"id\":\"r1\"}}\n\n",
            "event: response.reasoning_text.delta\n",
            "data: {\"delta\":\"thinking\"}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"delta\":\"Hel\"}\n\n",
            "event: response.output_text.delta\n",
            "data:{\"delta\":\"lo\"}\n\n",
            "event: response.completed\n",
            "data: {}\n\n",
        );
        let events = decoder.feed(input.as_bytes()).unwrap();

        assert_eq!(
            fragments(&events),
            vec![
                ("thinking".to_string(), FragmentKind::Reasoning),
                ("Hel".to_string(), FragmentKind::Output),
                ("lo".to_string(), FragmentKind::Output),
            ]
        );
        assert_eq!(events.last(), Some(&StreamEvent::Completed));
        assert_eq!(decoder.response_id(), Some("r1"));
    }

    #[test]
    fn byte_at_a_time_matches_whole_input() {
        let input = "event: response.output_text.delta\r\ndata: {\"delta\":\"h\u{e9}\"}\r\n\r\n";
        let mut whole = EventStreamDecoder::new();
        let expected = whole.feed(input.as_bytes()).unwrap();

        let mut split = EventStreamDecoder::new();
        let mut events = Vec::new();
        for byte in input.as_bytes() {
            events.extend(split.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(events, expected);
        assert_eq!(fragments(&events), vec![("h\u{e9}".to_string(), FragmentKind::Output)]);
    }

    #[test]
    fn type_field_is_used_without_event_line() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder
            .feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"x\"}\n\n")
            .unwrap();
        assert_eq!(fragments(&events), vec![("x".to_string(), FragmentKind::Output)]);
    }

    #[test]
    fn multi_line_data_is_concatenated() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder
            .feed(b"event: response.output_text.delta\ndata: {\"delta\":\ndata: \"joined\"}\n\n")
            .unwrap();
        assert_eq!(fragments(&events), vec![("joined".to_string(), FragmentKind::Output)]);
    }

    #[test]
    fn event_type_resets_after_each_block() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder
            .feed(concat!(
                "event: response.output_text.delta\n",
                "data: {\"delta\":\"a\"}\n\n",
                "data: {\"delta\":\"b\"}\n\n",
            ).as_bytes())
            .unwrap();
        // The second block has no event line and no type field.
        assert_eq!(fragments(&events), vec![("a".to_string(), FragmentKind::Output)]);
        assert_eq!(events[1], StreamEvent::Other(String::new()));
    }

    #[test]
    fn comments_unknown_fields_and_done_are_ignored() {
        let mut decoder = EventStreamDecoder::new();
        let events = decoder
            .feed(b": keep-alive\nid: 7\nretry: 100\n\nevent: response.in_progress\ndata: {}\n\ndata: [DONE]\n\n")
            .unwrap();
        assert_eq!(events, vec![StreamEvent::Other("response.in_progress".into())]);
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.feed(b"event: response.completed\n\n\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_protocol_error() {
        let mut decoder = EventStreamDecoder::new();
        let err = decoder
            .feed(b"event: response.output_text.delta\ndata: {not json\n\n")
            .unwrap_err();
        match err {
            ProtocolError::MalformedEvent { event_type, .. } => {
                assert_eq!(event_type, "response.output_text.delta")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_a_protocol_error() {
        let mut decoder = EventStreamDecoder::new();
        let err = decoder.feed(b"data: \xff\xfe\n").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidEncoding(_)));
    }

    #[test]
    fn trailing_block_is_flushed_at_end_of_input() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder
            .feed(b"event: response.output_text.delta\ndata: {\"delta\":\"tail\"}")
            .unwrap()
            .is_empty());
        let events = decoder.finish().unwrap();
        assert_eq!(fragments(&events), vec![("tail".to_string(), FragmentKind::Output)]);
    }

    #[test]
    fn response_id_fallbacks() {
        for (payload, expected) in [
            (r#"{"response_id":"a","response":{"id":"b"},"id":"c"}"#, Some("a")),
            (r#"{"response":{"id":"b"},"id":"c"}"#, Some("b")),
            (r#"{"id":"c"}"#, Some("c")),
            (r#"{"response_id":""}"#, None),
            (r#"{}"#, None),
        ] {
            let event = decode_block(Some(EVENT_RESPONSE_CREATED), payload).unwrap();
            assert_eq!(
                event,
                Some(StreamEvent::Created {
                    response_id: expected.map(str::to_owned)
                }),
                "payload {payload}"
            );
        }
    }

    #[tokio::test]
    async fn decode_stream_reports_fragments_and_response_id() {
        let mut stream = ok_chunks(&[
            "event: response.created\ndata: {\"response_id\":\"r1\"}\n\nevent: response.output_",
            "text.delta\ndata: {\"delta\":\"Hel\"}\n\n",
            "event: response.output_text.delta\ndata: {\"delta\":\"lo\"}\n\n",
            "event: response.completed\ndata: {}\n\n",
        ]);
        let mut seen = Vec::new();
        let outcome = decode_stream(&mut stream, &CancellationToken::new(), |f| seen.push(f.text))
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(
            outcome,
            DecodeOutcome::Completed {
                response_id: Some("r1".into())
            }
        );
    }

    #[tokio::test]
    async fn decode_stream_stops_between_lines_when_cancelled() {
        let cancel = CancellationToken::new();
        let mut stream = ok_chunks(&[concat!(
            "event: response.output_text.delta\ndata: {\"delta\":\"Hel\"}\n\n",
            "event: response.output_text.delta\ndata: {\"delta\":\"lo\"}\n\n",
        )]);
        let mut seen = Vec::new();
        let outcome = decode_stream(&mut stream, &cancel, |f| {
            seen.push(f.text);
            cancel.cancel();
        })
        .await
        .unwrap();

        assert_eq!(outcome, DecodeOutcome::Cancelled);
        assert_eq!(seen, vec!["Hel"]);
    }

    #[tokio::test]
    async fn decode_stream_surfaces_mid_stream_failures() {
        let mut stream = byte_stream(vec![
            Ok(b"event: response.output_text.delta\ndata: {\"delta\":\"a\"}\n\n".to_vec()),
            Err(TransportError::Stream("connection reset".into())),
        ]);
        let err = decode_stream(&mut stream, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::Transport(TransportError::Stream("connection reset".into()))
        );
    }
}
