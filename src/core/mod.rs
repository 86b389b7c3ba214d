pub mod chat_session;
pub mod chat_stream;
pub mod config;
pub mod event_stream;
pub mod log_sink;
pub mod message;
pub mod session;
#[cfg(test)]
pub mod test_support;
pub mod transport;
pub mod validation;
