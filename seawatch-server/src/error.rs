use std::path::PathBuf;

use miette::Diagnostic;
use seawatch_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum WatchError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("Cannot read configuration file '{}'", .path.display())]
    #[diagnostic(code(seawatch::config::read))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse configuration file '{}': {message}", .path.display())]
    #[diagnostic(
        code(seawatch::config::parse),
        help("The file must be a JSON object with optional \"connection\" and \"alarms\" sections")
    )]
    ConfigParse { path: PathBuf, message: String },
    #[error("Invalid configuration")]
    #[diagnostic(code(seawatch::config::invalid))]
    Config(#[from] ConfigError),
    #[error("Cannot encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Ingestion service is not running")]
    ChannelClosed,
    #[error("Shutdown")]
    Shutdown,
}
