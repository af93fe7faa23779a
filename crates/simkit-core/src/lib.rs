//! # simkit-core
//!
//! Xcode-version-aware control of iOS Simulator instances on macOS.
//!
//! Simulator behavior shifts between Xcode releases: which `simctl`
//! subcommands exist, how certificates and permissions are applied, whether
//! the Simulator app has to be up before booting. This crate detects the
//! installed Xcode once, picks the matching [`variant::Variant`], and exposes
//! one lifecycle API on [`simulator::Simulator`].
//!
//! ## Modules
//!
//! - [`version`] - Xcode version detection and parsing
//! - [`variant`] - Ordered table of per-version behavior variants
//! - [`simulator`] - Handle on one simulator instance
//! - [`simctl`] - Wrapper around `xcrun simctl`
//! - [`inspector`] - Web-inspector socket discovery from `lsof` output
//! - [`runner`] - Seam for running external commands
//! - [`config`] - `~/.simkit/config.json`
//! - [`error`] - Error type
//!
//! ## External Dependencies
//!
//! - **Xcode** (for `xcrun simctl` and `xcodebuild`)
//! - **lsof**, **pgrep**, **open**, **osascript** (shipped with macOS)
//! - **applesimutils** for permission changes on Xcode older than 11.4
//!   (`brew install wix/brew/applesimutils`)

pub mod config;
pub mod error;
pub mod inspector;
pub mod runner;
pub mod simctl;
pub mod simulator;
pub mod variant;
pub mod version;

pub use error::SimulatorError;
pub use simulator::Simulator;
pub use version::ToolchainVersion;

/// Lists every simulator device known to simctl.
pub async fn list_devices(
    runner: std::sync::Arc<dyn runner::CommandRunner>,
    config: &config::SimkitConfig,
) -> Result<Vec<simctl::SimulatorDevice>, SimulatorError> {
    simctl::Simctl::new(runner, config.xcrun.clone())
        .list_devices()
        .await
}

/// Creates a new simulator device and returns its UDID.
pub async fn create_device(
    runner: std::sync::Arc<dyn runner::CommandRunner>,
    config: &config::SimkitConfig,
    name: &str,
    device_type: &str,
    runtime: &str,
) -> Result<String, SimulatorError> {
    simctl::Simctl::new(runner, config.xcrun.clone())
        .create_device(name, device_type, runtime)
        .await
}
