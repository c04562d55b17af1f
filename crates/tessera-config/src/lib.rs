//! Runtime settings for sector streaming, persisted as RON and overridable
//! from the command line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, Config, DebugConfig, DemoConfig, LoaderConfig, StreamingConfig,
    default_config_dir,
};
pub use error::ConfigError;
