//! Error type shared by every simkit operation.

use thiserror::Error;

use crate::version::ToolchainVersion;

/// Errors that can occur when controlling a simulator.
///
/// A lookup that finds nothing (no inspector socket yet, app not installed) is
/// not an error; those operations return `Option` or an empty `Vec` instead.
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// The installed Xcode is older than the oldest supported variant.
    #[error("Xcode version {version} is not supported (minimum is {minimum})")]
    UnsupportedVersion {
        version: ToolchainVersion,
        minimum: String,
    },

    /// No simulator with the given UDID is known to simctl.
    #[error("No sim found with udid '{0}'")]
    InstanceNotFound(String),

    /// An external command could not be run, exited non-zero, or produced
    /// output that could not be understood.
    #[error("{operation} failed: {message}")]
    Environment { operation: String, message: String },

    /// The selected Xcode variant has no way to perform this operation.
    #[error("{operation} is not supported by the {variant} variant")]
    UnsupportedOperation {
        operation: &'static str,
        variant: &'static str,
    },

    /// The toolchain version string could not be parsed.
    #[error("Could not parse Xcode version from '{0}'")]
    InvalidVersion(String),

    /// Failed to parse or produce JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A local I/O error (temp files, keychain directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulatorError {
    /// Builds an [`SimulatorError::Environment`] tagged with `operation`.
    pub fn environment(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Environment {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
