pub mod cli;
pub mod config;
pub mod logging;

pub use cli::Cli;
pub use config::{Config, ConfigError, Settings};
