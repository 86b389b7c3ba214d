//! Conversation history and continuation token.
//!
//! [`SessionState`] is the only place the conversation is mutated. Every
//! append is validated first, and any operation that makes the server-side
//! context diverge from local history (reset, truncation, a new system
//! prompt) drops the continuation token.

use crate::api::InputMessage;
use crate::core::message::{Role, Segment, Turn};
use crate::core::validation::{
    sanitize_input, validate_chat_message, validate_system_message, ValidationError,
    MAX_CHAT_MESSAGE_LENGTH, MAX_SYSTEM_MESSAGE_LENGTH,
};

pub const DEFAULT_MAX_CONVERSATION_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub system: usize,
    pub chat: usize,
    pub conversation: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            system: MAX_SYSTEM_MESSAGE_LENGTH,
            chat: MAX_CHAT_MESSAGE_LENGTH,
            conversation: DEFAULT_MAX_CONVERSATION_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    conversation: Vec<Turn>,
    continuation_token: Option<String>,
    limits: MessageLimits,
}

impl SessionState {
    pub fn new(limits: MessageLimits) -> Self {
        Self {
            conversation: Vec::new(),
            continuation_token: None,
            limits,
        }
    }

    pub fn limits(&self) -> MessageLimits {
        self.limits
    }

    pub fn append_user(&mut self, text: &str) -> Result<(), ValidationError> {
        validate_chat_message(text, self.limits.chat)?;
        self.conversation.push(Turn::user(text));
        Ok(())
    }

    pub fn append_assistant(&mut self, text: &str) -> Result<(), ValidationError> {
        validate_chat_message(text, self.limits.chat)?;
        self.conversation.push(Turn::assistant(text));
        Ok(())
    }

    /// Commits a streamed response. Validation runs on the output text that
    /// will be replayed to the server.
    pub fn append_assistant_segments(
        &mut self,
        segments: Vec<Segment>,
    ) -> Result<(), ValidationError> {
        let turn = Turn::assistant_from_segments(segments);
        validate_chat_message(&turn.content, self.limits.chat)?;
        self.conversation.push(turn);
        Ok(())
    }

    pub fn set_system_message(&mut self, text: &str) -> Result<(), ValidationError> {
        let text = sanitize_input(text);
        validate_system_message(&text, self.limits.system)?;

        if self.conversation.first().is_some_and(Turn::is_system) {
            self.conversation.remove(0);
        }
        self.conversation.insert(0, Turn::system(text));
        self.continuation_token = None;
        tracing::debug!("system message replaced; continuation token cleared");
        Ok(())
    }

    pub fn system_message(&self) -> Option<&str> {
        self.conversation
            .first()
            .filter(|turn| turn.is_system())
            .map(|turn| turn.content.as_str())
    }

    /// Drops the oldest non-system turns until at most `max` remain.
    /// A `max` of zero falls back to the configured conversation limit.
    /// Returns the number of turns removed.
    pub fn truncate(&mut self, max: usize) -> usize {
        let max = if max == 0 {
            self.limits.conversation
        } else {
            max
        };
        if self.conversation.len() <= max {
            return 0;
        }

        let overflow = self.conversation.len() - max;
        let start = usize::from(self.conversation.first().is_some_and(Turn::is_system));
        // With a system turn and max == 1 only the system turn can stay.
        let removable = self.conversation.len() - start;
        let removed = overflow.min(removable);
        self.conversation.drain(start..start + removed);
        self.continuation_token = None;
        tracing::debug!(removed, max, "conversation truncated");
        removed
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        self.continuation_token = None;
    }

    /// An owned copy of the conversation.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.conversation.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.conversation
    }

    pub fn len(&self) -> usize {
        self.conversation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversation.is_empty()
    }

    /// The conversation in request form.
    pub fn input_messages(&self) -> Vec<InputMessage> {
        self.conversation
            .iter()
            .map(|turn| InputMessage {
                role: turn.role,
                content: turn.content.clone(),
            })
            .collect()
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// Stores the identifier of the last completed exchange. Empty ids are
    /// ignored.
    pub fn record_continuation_token(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.continuation_token = Some(id);
        }
    }

    pub fn last_role(&self) -> Option<Role> {
        self.conversation.last().map(|turn| turn.role)
    }
}
