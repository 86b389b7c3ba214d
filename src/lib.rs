//! lazylms is a terminal client for LM Studio.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, the streaming transport and decoder,
//!   the per-turn state machine, configuration and the log sink.
//! - [`lms`] wraps the `lms` command-line tool for listing, loading and
//!   unloading models.
//! - [`ui`] renders the terminal interface and runs the interactive event loop.
//! - [`api`] defines the request and model-listing payloads.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod lms;
pub mod logging;
pub mod ui;
pub mod utils;
