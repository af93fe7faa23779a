//! Detection and parsing of the installed Xcode toolchain version.
//!
//! The version is read once per session from `xcrun xcodebuild -version`,
//! whose first line looks like `Xcode 11.4.1`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SimulatorError;
use crate::runner::{run_checked, CommandRunner};

/// The installed Xcode version.
///
/// Only `major` and `minor` take part in variant selection; `version_string`
/// keeps whatever the toolchain reported (including any patch component).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainVersion {
    pub major: u32,
    pub minor: u32,
    pub version_string: String,
}

impl ToolchainVersion {
    pub fn new(major: u32, minor: u32, version_string: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            version_string: version_string.into(),
        }
    }

    /// Parses a dotted version such as `11`, `11.4` or `11.4.1`.
    ///
    /// A missing minor component is treated as `0`.
    pub fn parse(text: &str) -> Result<Self, SimulatorError> {
        let trimmed = text.trim();
        let mut parts = trimmed.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| SimulatorError::InvalidVersion(text.to_string()))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| SimulatorError::InvalidVersion(text.to_string()))?,
            None => 0,
        };
        Ok(Self::new(major, minor, trimmed))
    }

    /// Extracts the version from `xcodebuild -version` output.
    pub fn from_xcodebuild_output(output: &str) -> Result<Self, SimulatorError> {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix("Xcode "))
            .ok_or_else(|| SimulatorError::InvalidVersion(output.trim().to_string()))
            .and_then(Self::parse)
    }

    /// Queries the toolchain through `xcrun xcodebuild -version`.
    pub async fn detect(runner: &dyn CommandRunner, xcrun: &str) -> Result<Self, SimulatorError> {
        let output = run_checked(runner, "xcodebuild -version", xcrun, &["xcodebuild", "-version"]).await?;
        let version = Self::from_xcodebuild_output(&output.stdout)?;
        debug!(version = %version, "Detected Xcode version");
        Ok(version)
    }

    /// Returns true when this version is `major.minor` or newer.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version_string)
    }
}
