//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! [`Simctl`] maps one method to one simctl subcommand. It knows nothing about
//! Xcode versions; picking the right subcommand for the installed toolchain is
//! the job of [`crate::simulator::Simulator`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use simkit_core::runner::ProcessRunner;
//! use simkit_core::simctl::Simctl;
//!
//! # async fn example() -> Result<(), simkit_core::error::SimulatorError> {
//! let simctl = Simctl::new(Arc::new(ProcessRunner), "xcrun");
//! for device in simctl.list_devices().await? {
//!     println!("{}: {} ({})", device.name, device.udid, device.state);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SimulatorError;
use crate::runner::{exit_error, run_raw, CommandOutput, CommandRunner};

/// Represents an iOS Simulator device.
///
/// This struct contains information about a simulator device as reported
/// by `xcrun simctl list devices -j`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorDevice {
    /// The unique device identifier (UDID) for this simulator.
    pub udid: String,

    /// The human-readable name of the device (e.g., "iPhone 11").
    pub name: String,

    /// The current state of the device (e.g., "Booted", "Shutdown").
    pub state: String,

    /// The device type identifier (e.g., "com.apple.CoreSimulator.SimDeviceType.iPhone-11").
    #[serde(rename = "deviceTypeIdentifier", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: HashMap<String, Vec<SimulatorDevice>>,
}

/// Which container `simctl get_app_container` should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// The `.app` bundle directory.
    App,
    /// The application's data (sandbox) directory.
    Data,
}

impl ContainerKind {
    fn as_arg(self) -> &'static str {
        match self {
            ContainerKind::App => "app",
            ContainerKind::Data => "data",
        }
    }
}

/// Wrapper for `xcrun simctl` commands.
#[derive(Clone)]
pub struct Simctl {
    runner: Arc<dyn CommandRunner>,
    xcrun: String,
}

impl Simctl {
    /// Creates a wrapper that invokes `<xcrun> simctl ...` through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, xcrun: impl Into<String>) -> Self {
        Self {
            runner,
            xcrun: xcrun.into(),
        }
    }

    async fn exec(&self, operation: &str, args: &[&str]) -> Result<CommandOutput, SimulatorError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("simctl");
        full.extend_from_slice(args);
        debug!(operation, args = ?full, "simctl");
        run_raw(self.runner.as_ref(), operation, &self.xcrun, &full).await
    }

    /// Runs a subcommand that must exit 0.
    async fn exec_checked(
        &self,
        operation: &str,
        args: &[&str],
    ) -> Result<CommandOutput, SimulatorError> {
        let output = self.exec(operation, args).await?;
        if !output.success() {
            return Err(exit_error(operation, &output));
        }
        Ok(output)
    }

    /// Runs a subcommand, treating a failure whose stderr contains `benign`
    /// as success.
    async fn exec_tolerating(
        &self,
        operation: &str,
        args: &[&str],
        benign: &[&str],
    ) -> Result<(), SimulatorError> {
        let output = self.exec(operation, args).await?;
        if !output.success() {
            let stderr = output.stderr.to_lowercase();
            if !benign.iter().any(|b| stderr.contains(&b.to_lowercase())) {
                return Err(exit_error(operation, &output));
            }
            debug!(operation, stderr = %output.stderr.trim(), "Ignoring benign simctl failure");
        }
        Ok(())
    }

    /// Lists all simulator devices across every runtime.
    ///
    /// # Errors
    ///
    /// - [`SimulatorError::Environment`] if simctl cannot run or exits non-zero
    /// - [`SimulatorError::JsonParse`] if the output cannot be parsed as JSON
    pub async fn list_devices(&self) -> Result<Vec<SimulatorDevice>, SimulatorError> {
        let output = self
            .exec_checked("list devices", &["list", "devices", "-j"])
            .await?;
        Self::parse_device_list(output.stdout.as_bytes())
    }

    /// Returns the device record for `udid`, if simctl knows about it.
    pub async fn find_device(&self, udid: &str) -> Result<Option<SimulatorDevice>, SimulatorError> {
        Ok(self.list_devices().await?.into_iter().find(|d| d.udid == udid))
    }

    /// Creates a new device and returns its UDID.
    pub async fn create_device(
        &self,
        name: &str,
        device_type: &str,
        runtime: &str,
    ) -> Result<String, SimulatorError> {
        let output = self
            .exec_checked("create", &["create", name, device_type, runtime])
            .await?;
        let udid = output.stdout.trim().to_string();
        if udid.is_empty() {
            return Err(SimulatorError::environment(
                "create",
                "simctl printed no UDID for the new device",
            ));
        }
        info!(%udid, name, "Created simulator");
        Ok(udid)
    }

    /// Boots a device. An already booted device is not an error.
    pub async fn boot(&self, udid: &str) -> Result<(), SimulatorError> {
        self.exec_tolerating("boot", &["boot", udid], &["current state: Booted"])
            .await
    }

    /// Shuts a device down. An already shut down device is not an error.
    pub async fn shutdown(&self, udid: &str) -> Result<(), SimulatorError> {
        self.exec_tolerating("shutdown", &["shutdown", udid], &["current state: Shutdown"])
            .await
    }

    /// Resets a device to its factory content and settings.
    pub async fn erase(&self, udid: &str) -> Result<(), SimulatorError> {
        self.exec_checked("erase", &["erase", udid]).await.map(drop)
    }

    pub async fn delete_device(&self, udid: &str) -> Result<(), SimulatorError> {
        self.exec_checked("delete", &["delete", udid]).await.map(drop)
    }

    pub async fn install_app(&self, udid: &str, app_path: &Path) -> Result<(), SimulatorError> {
        let path = app_path.to_string_lossy();
        self.exec_checked("install", &["install", udid, &path])
            .await
            .map(drop)
    }

    pub async fn remove_app(&self, udid: &str, bundle_id: &str) -> Result<(), SimulatorError> {
        self.exec_checked("uninstall", &["uninstall", udid, bundle_id])
            .await
            .map(drop)
    }

    /// Launches an installed app and returns the `bundle: pid` line simctl prints.
    pub async fn launch_app(&self, udid: &str, bundle_id: &str) -> Result<String, SimulatorError> {
        let output = self
            .exec_checked("launch", &["launch", udid, bundle_id])
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Terminates a running app. An app that is not running is not an error.
    pub async fn terminate_app(&self, udid: &str, bundle_id: &str) -> Result<(), SimulatorError> {
        self.exec_tolerating(
            "terminate",
            &["terminate", udid, bundle_id],
            &["not running", "found nothing to terminate"],
        )
        .await
    }

    /// Returns the container path for an installed app, or `None` if the app
    /// is not installed.
    pub async fn get_app_container(
        &self,
        udid: &str,
        bundle_id: &str,
        kind: ContainerKind,
    ) -> Result<Option<String>, SimulatorError> {
        let output = self
            .exec(
                "get_app_container",
                &["get_app_container", udid, bundle_id, kind.as_arg()],
            )
            .await?;
        if !output.success() {
            if Self::is_missing_app(&output.stderr) {
                return Ok(None);
            }
            return Err(exit_error("get_app_container", &output));
        }
        let path = output.stdout.trim();
        Ok((!path.is_empty()).then(|| path.to_string()))
    }

    /// Returns `light` or `dark`.
    pub async fn get_appearance(&self, udid: &str) -> Result<String, SimulatorError> {
        let output = self
            .exec_checked("get appearance", &["ui", udid, "appearance"])
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn set_appearance(&self, udid: &str, value: &str) -> Result<(), SimulatorError> {
        self.exec_checked("set appearance", &["ui", udid, "appearance", value])
            .await
            .map(drop)
    }

    /// Adds a certificate file to the trusted root store.
    pub async fn add_root_certificate(&self, udid: &str, cert: &Path) -> Result<(), SimulatorError> {
        let path = cert.to_string_lossy();
        self.exec_checked("add root certificate", &["keychain", udid, "add-root-cert", &path])
            .await
            .map(drop)
    }

    /// Adds a certificate file to the keychain.
    pub async fn add_certificate(&self, udid: &str, cert: &Path) -> Result<(), SimulatorError> {
        let path = cert.to_string_lossy();
        self.exec_checked("add certificate", &["keychain", udid, "add-cert", &path])
            .await
            .map(drop)
    }

    pub async fn reset_keychain(&self, udid: &str) -> Result<(), SimulatorError> {
        self.exec_checked("reset keychain", &["keychain", udid, "reset"])
            .await
            .map(drop)
    }

    /// Delivers the push payload stored in `payload_file`.
    pub async fn push_notification(&self, udid: &str, payload_file: &Path) -> Result<(), SimulatorError> {
        let path = payload_file.to_string_lossy();
        self.exec_checked("push", &["push", udid, &path])
            .await
            .map(drop)
    }

    /// Grants a privacy service (e.g. `calendar`) to `bundle_id`.
    pub async fn grant_permission(
        &self,
        udid: &str,
        bundle_id: &str,
        service: &str,
    ) -> Result<(), SimulatorError> {
        self.exec_checked("privacy grant", &["privacy", udid, "grant", service, bundle_id])
            .await
            .map(drop)
    }

    /// Revokes a privacy service (e.g. `calendar`) from `bundle_id`.
    pub async fn revoke_permission(
        &self,
        udid: &str,
        bundle_id: &str,
        service: &str,
    ) -> Result<(), SimulatorError> {
        self.exec_checked("privacy revoke", &["privacy", udid, "revoke", service, bundle_id])
            .await
            .map(drop)
    }

    /// Parses `simctl list devices -j` output into a flat vector of devices.
    pub fn parse_device_list(json: &[u8]) -> Result<Vec<SimulatorDevice>, SimulatorError> {
        let device_list: DeviceList = serde_json::from_slice(json)?;
        Ok(device_list.devices.into_values().flatten().collect())
    }

    // simctl reports an uninstalled bundle as POSIX ENOENT. Other POSIX codes
    // (EINVAL is `code=22`) are real failures.
    fn is_missing_app(stderr: &str) -> bool {
        stderr.contains("No such file or directory")
            || stderr.contains("NSPOSIXErrorDomain, code=2)")
            || stderr.contains("not installed")
    }
}
