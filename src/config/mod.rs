//! Configuration module
//!
//! Handles the settings file, the live timing parameters and operator commands.
//! Every value is validated here so the controller only ever sees sane numbers.

pub mod command;
pub mod settings;

use std::path::PathBuf;

pub use command::OperatorCommand;
pub use settings::{
    CadenceSettings, CaptureSettings, DetectorSettings, Settings, SharedParameters,
    TimingParameters,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Missing argument for '{0}'")]
    MissingArgument(&'static str),
    #[error("Invalid coordinate list '{0}'")]
    InvalidCoordinates(String),
    #[error("Capture region must have a non-zero size")]
    EmptyRegion,
    #[error("Loop intervals must be non-zero")]
    ZeroInterval,
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}
