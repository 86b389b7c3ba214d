use serde::{Deserialize, Serialize};

/// Marker appended to an assistant turn that was interrupted by the user.
pub const CANCELLED_MARKER: &str = " [cancelled]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid role: {value}")),
        }
    }
}

/// Whether a streamed fragment is part of the answer or the model's
/// reasoning commentary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Output,
    Reasoning,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Output => "output",
            FragmentKind::Reasoning => "reasoning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
    pub kind: FragmentKind,
}

impl StreamFragment {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FragmentKind::Output,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FragmentKind::Reasoning,
        }
    }
}

/// A run of same-kind fragments merged together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: FragmentKind,
    pub text: String,
}

/// One conversation entry.
///
/// `content` is what gets replayed to the server. Assistant turns assembled
/// from a stream also keep their `segments` so reasoning can still be shown;
/// only output segments contribute to `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub segments: Vec<Segment>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            segments: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Content is the output text; a reply made only of reasoning keeps its
    /// reasoning as content so the turn is never empty.
    pub fn assistant_from_segments(segments: Vec<Segment>) -> Self {
        let mut content = output_text(&segments);
        if content.trim().is_empty() {
            content = segments.iter().map(|s| s.text.as_str()).collect();
        }
        Self {
            role: Role::Assistant,
            content,
            segments,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Display form: every segment in order, reasoning included.
    pub fn full_text(&self) -> String {
        if self.segments.is_empty() {
            self.content.clone()
        } else {
            self.segments.iter().map(|s| s.text.as_str()).collect()
        }
    }
}

pub fn output_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter(|s| s.kind == FragmentKind::Output)
        .map(|s| s.text.as_str())
        .collect()
}

/// The assistant turn being streamed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuffer {
    segments: Vec<Segment>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: StreamFragment) {
        if fragment.text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.kind == fragment.kind => last.text.push_str(&fragment.text),
            _ => self.segments.push(Segment {
                kind: fragment.kind,
                text: fragment.text,
            }),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Moves the buffered segments out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.segments)
    }

    /// Like [`take`](Self::take), with the cancellation marker appended.
    pub fn take_cancelled(&mut self) -> Vec<Segment> {
        self.push(StreamFragment::output(CANCELLED_MARKER));
        self.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::try_from("system"), Ok(Role::System));
        assert!(Role::try_from("tool").is_err());
    }

    #[test]
    fn buffer_merges_adjacent_same_kind_fragments() {
        let mut buffer = ResponseBuffer::new();
        buffer.push(StreamFragment::reasoning("think"));
        buffer.push(StreamFragment::reasoning("ing"));
        buffer.push(StreamFragment::output("Hel"));
        buffer.push(StreamFragment::output("lo"));
        buffer.push(StreamFragment::reasoning("!"));

        assert_eq!(
            buffer.segments(),
            &[
                Segment {
                    kind: FragmentKind::Reasoning,
                    text: "thinking".into()
                },
                Segment {
                    kind: FragmentKind::Output,
                    text: "Hello".into()
                },
                Segment {
                    kind: FragmentKind::Reasoning,
                    text: "!".into()
                },
            ]
        );
        assert_eq!(buffer.text(), "thinkingHello!");
    }

    #[test]
    fn empty_fragments_do_not_open_segments() {
        let mut buffer = ResponseBuffer::new();
        buffer.push(StreamFragment::output(""));
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_cancelled_appends_marker_to_output_run() {
        let mut buffer = ResponseBuffer::new();
        buffer.push(StreamFragment::output("Hel"));
        let segments = buffer.take_cancelled();
        assert!(buffer.is_empty());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hel [cancelled]");
    }

    #[test]
    fn assistant_turn_content_excludes_reasoning() {
        let turn = Turn::assistant_from_segments(vec![
            Segment {
                kind: FragmentKind::Reasoning,
                text: "hmm".into(),
            },
            Segment {
                kind: FragmentKind::Output,
                text: "42".into(),
            },
        ]);
        assert_eq!(turn.content, "42");
        assert_eq!(turn.full_text(), "hmm42");
    }

    #[test]
    fn reasoning_only_turn_keeps_reasoning_as_content() {
        let turn = Turn::assistant_from_segments(vec![Segment {
            kind: FragmentKind::Reasoning,
            text: "thinking hard".into(),
        }]);
        assert_eq!(turn.content, "thinking hard");
        assert_eq!(turn.full_text(), "thinking hard");
    }
}
