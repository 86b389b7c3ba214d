pub mod data;
pub mod io;

#[cfg(test)]
pub mod tests;

pub use data::{ClientConfig, ConfigFile};
pub use io::ConfigError;
