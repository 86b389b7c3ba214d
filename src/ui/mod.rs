//! Terminal UI layer for interactive chat sessions.
//!
//! - [`chat_loop`]: the event loop, key handling and background model tasks.
//! - [`markdown`]: styled rendering of assistant output.
//! - [`renderer`]: panel layout and frame output.
//! - [`state`]: view state that survives between frames.
//!
//! Ownership boundary: this layer presents and captures interaction state,
//! while [`crate::core`] owns the conversation and streaming.

pub mod chat_loop;
pub mod markdown;
pub mod renderer;
pub mod state;
