//! A handle on one existing simulator instance.
//!
//! [`Simulator`] is the uniform lifecycle API. It owns the [`Variant`] chosen
//! for the installed Xcode and routes every operation to the call shape that
//! variant prescribes. It also owns the two per-instance memos: the resolved
//! web-inspector socket and the app container paths.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use simkit_core::config::SimkitConfig;
//! use simkit_core::runner::ProcessRunner;
//! use simkit_core::simulator::Simulator;
//!
//! # async fn example() -> Result<(), simkit_core::error::SimulatorError> {
//! let mut sim = Simulator::open(
//!     "F1191A22-11DD-408E-8CAF-0BC4A8F79E3B",
//!     Arc::new(ProcessRunner),
//!     SimkitConfig::load(),
//! )
//! .await?;
//!
//! sim.run(true).await?;
//! if let Some(socket) = sim.web_inspector_socket().await? {
//!     println!("inspector: {socket}");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SimkitConfig;
use crate::error::SimulatorError;
use crate::inspector::locate_inspector_socket;
use crate::runner::{exit_error, run_checked, run_raw, CommandRunner};
use crate::simctl::{ContainerKind, Simctl, SimulatorDevice};
use crate::variant::{
    self, AppearanceSupport, CalendarAccess, CertificateSupport, KeychainReset, LaunchOrder,
    PushSupport, Variant,
};
use crate::version::ToolchainVersion;

/// Container paths for one installed app.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AppDirs {
    data: String,
    bundle: String,
}

/// Handle on an existing simulator instance.
///
/// A handle is meant to be driven by one caller at a time; operations that
/// touch the memoized state take `&mut self`.
pub struct Simulator {
    udid: String,
    version: ToolchainVersion,
    variant: &'static Variant,
    runner: Arc<dyn CommandRunner>,
    simctl: Simctl,
    config: SimkitConfig,
    web_inspector_socket: Option<String>,
    app_dirs: HashMap<String, AppDirs>,
}

impl Simulator {
    /// Opens a handle on `udid`, detecting the Xcode version unless the
    /// config pins one.
    ///
    /// # Errors
    ///
    /// - [`SimulatorError::InvalidVersion`] if the version cannot be parsed
    /// - [`SimulatorError::UnsupportedVersion`] if Xcode is too old
    /// - [`SimulatorError::InstanceNotFound`] if simctl does not know `udid`
    /// - [`SimulatorError::Environment`] if a query command fails
    pub async fn open(
        udid: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        config: SimkitConfig,
    ) -> Result<Self, SimulatorError> {
        let version = match &config.xcode_version {
            Some(pinned) => ToolchainVersion::parse(pinned)?,
            None => ToolchainVersion::detect(runner.as_ref(), &config.xcrun).await?,
        };
        Self::with_version(udid, version, runner, config).await
    }

    /// Opens a handle on `udid` for an already known Xcode version.
    pub async fn with_version(
        udid: impl Into<String>,
        version: ToolchainVersion,
        runner: Arc<dyn CommandRunner>,
        config: SimkitConfig,
    ) -> Result<Self, SimulatorError> {
        let udid = udid.into();
        let variant = variant::select(&version)?;
        let simctl = Simctl::new(runner.clone(), config.xcrun.clone());

        if simctl.find_device(&udid).await?.is_none() {
            return Err(SimulatorError::InstanceNotFound(udid));
        }
        debug!(%udid, %version, variant = variant.name, "Opened simulator");

        Ok(Self {
            udid,
            version,
            variant,
            runner,
            simctl,
            config,
            web_inspector_socket: None,
            app_dirs: HashMap::new(),
        })
    }

    pub fn udid(&self) -> &str {
        &self.udid
    }

    pub fn toolchain_version(&self) -> &ToolchainVersion {
        &self.version
    }

    pub fn variant(&self) -> &'static Variant {
        self.variant
    }

    pub fn simctl(&self) -> &Simctl {
        &self.simctl
    }

    // -----------------------------------------------------------------------
    // Device lifecycle
    // -----------------------------------------------------------------------

    /// Returns the current simctl record for this device.
    pub async fn stat(&self) -> Result<SimulatorDevice, SimulatorError> {
        self.simctl
            .find_device(&self.udid)
            .await?
            .ok_or_else(|| SimulatorError::InstanceNotFound(self.udid.clone()))
    }

    pub async fn boot(&self) -> Result<(), SimulatorError> {
        info!(udid = %self.udid, "Booting simulator");
        self.simctl.boot(&self.udid).await
    }

    pub async fn shutdown(&self) -> Result<(), SimulatorError> {
        info!(udid = %self.udid, "Shutting down simulator");
        self.simctl.shutdown(&self.udid).await
    }

    /// Erases all content and settings. Cached app paths are dropped.
    pub async fn erase(&mut self) -> Result<(), SimulatorError> {
        info!(udid = %self.udid, "Erasing simulator");
        self.simctl.erase(&self.udid).await?;
        self.app_dirs.clear();
        Ok(())
    }

    pub async fn delete(self) -> Result<(), SimulatorError> {
        info!(udid = %self.udid, "Deleting simulator");
        self.simctl.delete_device(&self.udid).await
    }

    /// Boots the device and, when `start_ui_client` is set, makes sure the
    /// Simulator app shows it. The order of the two steps follows the variant.
    pub async fn run(&self, start_ui_client: bool) -> Result<(), SimulatorError> {
        let needs_ui_client = start_ui_client && !self.is_ui_client_running().await?;

        match self.variant.launch_order {
            LaunchOrder::UiClientThenBoot => {
                if needs_ui_client {
                    self.start_ui_client().await?;
                }
                self.boot().await
            }
            LaunchOrder::BootThenUiClient => {
                self.boot().await?;
                if needs_ui_client {
                    self.start_ui_client().await?;
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // UI client
    // -----------------------------------------------------------------------

    /// Returns true if the Simulator UI client process is running.
    pub async fn is_ui_client_running(&self) -> Result<bool, SimulatorError> {
        let name = self.variant.ui_client_name;
        let output = run_raw(self.runner.as_ref(), "pgrep", "pgrep", &["-x", name]).await?;
        match output.code {
            Some(0) => Ok(true),
            // pgrep exits 1 when nothing matched.
            Some(1) => Ok(false),
            _ => Err(exit_error("pgrep", &output)),
        }
    }

    /// Launches the Simulator UI client pointed at this device.
    pub async fn start_ui_client(&self) -> Result<(), SimulatorError> {
        let name = self.variant.ui_client_name;
        info!(udid = %self.udid, app = name, "Starting UI client");
        run_checked(
            self.runner.as_ref(),
            "start UI client",
            "open",
            &["-a", name, "--args", "-CurrentDeviceUDID", &self.udid],
        )
        .await
        .map(drop)
    }

    /// Brings the Simulator UI client to the front.
    pub async fn focus_ui_client(&self) -> Result<(), SimulatorError> {
        self.tell_ui_client("focus UI client", "activate").await
    }

    /// Quits the Simulator UI client.
    pub async fn quit_ui_client(&self) -> Result<(), SimulatorError> {
        self.tell_ui_client("quit UI client", "quit").await
    }

    async fn tell_ui_client(&self, operation: &str, verb: &str) -> Result<(), SimulatorError> {
        let script = format!(
            "tell application \"{}\" to {}",
            self.variant.ui_client_name, verb
        );
        run_checked(self.runner.as_ref(), operation, "osascript", &["-e", &script])
            .await
            .map(drop)
    }

    // -----------------------------------------------------------------------
    // Apps
    // -----------------------------------------------------------------------

    pub async fn install_app(&self, app_path: &Path) -> Result<(), SimulatorError> {
        info!(udid = %self.udid, app = %app_path.display(), "Installing app");
        self.simctl.install_app(&self.udid, app_path).await
    }

    /// Uninstalls an app and forgets its cached container paths.
    pub async fn remove_app(&mut self, bundle_id: &str) -> Result<(), SimulatorError> {
        self.simctl.remove_app(&self.udid, bundle_id).await?;
        self.app_dirs.remove(bundle_id);
        Ok(())
    }

    pub async fn launch_app(&self, bundle_id: &str) -> Result<String, SimulatorError> {
        self.simctl.launch_app(&self.udid, bundle_id).await
    }

    pub async fn terminate_app(&self, bundle_id: &str) -> Result<(), SimulatorError> {
        self.simctl.terminate_app(&self.udid, bundle_id).await
    }

    /// Returns `[data_dir, bundle_dir]` for an installed app, or an empty
    /// vector if the app is not installed.
    ///
    /// Found paths are cached on the handle until
    /// [`clear_app_dir_cache`](Self::clear_app_dir_cache) is called.
    pub async fn get_app_dirs(&mut self, bundle_id: &str) -> Result<Vec<String>, SimulatorError> {
        Ok(match self.app_dirs_for(bundle_id).await? {
            Some(dirs) => vec![dirs.data, dirs.bundle],
            None => Vec::new(),
        })
    }

    /// Returns the data container of an installed app.
    pub async fn get_app_data_dir(&mut self, bundle_id: &str) -> Result<Option<String>, SimulatorError> {
        Ok(self.app_dirs_for(bundle_id).await?.map(|dirs| dirs.data))
    }

    /// Forgets every cached app container path.
    pub fn clear_app_dir_cache(&mut self) {
        self.app_dirs.clear();
    }

    async fn app_dirs_for(&mut self, bundle_id: &str) -> Result<Option<AppDirs>, SimulatorError> {
        if let Some(dirs) = self.app_dirs.get(bundle_id) {
            return Ok(Some(dirs.clone()));
        }

        let data = self
            .simctl
            .get_app_container(&self.udid, bundle_id, ContainerKind::Data)
            .await?;
        let bundle = self
            .simctl
            .get_app_container(&self.udid, bundle_id, ContainerKind::App)
            .await?;

        // Misses are not cached so that a later install is picked up.
        let (Some(data), Some(bundle)) = (data, bundle) else {
            return Ok(None);
        };
        let dirs = AppDirs { data, bundle };
        self.app_dirs.insert(bundle_id.to_string(), dirs.clone());
        Ok(Some(dirs))
    }

    // -----------------------------------------------------------------------
    // Variant-dependent settings
    // -----------------------------------------------------------------------

    /// Sets the UI appearance (`light` or `dark`, any case). The device must be booted.
    pub async fn set_appearance(&self, value: &str) -> Result<(), SimulatorError> {
        match self.variant.appearance {
            AppearanceSupport::SimctlUi => {
                self.simctl
                    .set_appearance(&self.udid, &value.to_lowercase())
                    .await
            }
            AppearanceSupport::Unsupported => self.variant.unsupported("set_appearance"),
        }
    }

    /// Returns the current UI appearance. The device must be booted.
    pub async fn get_appearance(&self) -> Result<String, SimulatorError> {
        match self.variant.appearance {
            AppearanceSupport::SimctlUi => self.simctl.get_appearance(&self.udid).await,
            AppearanceSupport::Unsupported => self.variant.unsupported("get_appearance"),
        }
    }

    /// Adds a PEM certificate, to the trusted root store when `is_root` is
    /// set and to the keychain otherwise. Works on booted and shut down
    /// devices.
    pub async fn add_certificate(&self, pem: &str, is_root: bool) -> Result<(), SimulatorError> {
        if self.variant.certificates == CertificateSupport::Unsupported {
            return self.variant.unsupported("add_certificate");
        }

        let path = temp_payload_path("cert", "pem");
        write_temp_payload("add_certificate", &path, pem.as_bytes()).await?;
        let result = if is_root {
            self.simctl.add_root_certificate(&self.udid, &path).await
        } else {
            self.simctl.add_certificate(&self.udid, &path).await
        };
        remove_temp(&path).await;
        result
    }

    /// Delivers a simulated push notification.
    ///
    /// The payload must contain a `"Simulator Target Bundle"` key naming the
    /// target app and an `"aps"` dictionary.
    pub async fn push_notification(&self, payload: &serde_json::Value) -> Result<(), SimulatorError> {
        if self.variant.push == PushSupport::Unsupported {
            return self.variant.unsupported("push_notification");
        }

        let path = temp_payload_path("push", "apns");
        write_temp_payload("push_notification", &path, &serde_json::to_vec(payload)?).await?;
        let result = self.simctl.push_notification(&self.udid, &path).await;
        remove_temp(&path).await;
        result
    }

    /// Applies a set of permissions, e.g. `{"calendar": "YES", "photos": "NO"}`.
    ///
    /// Every variant currently delegates to the base implementation
    /// (`applesimutils`). `simctl privacy` is not used for bulk changes on
    /// 11.4+ because it does not yet apply them reliably; this is a known
    /// limitation.
    pub async fn set_permissions(
        &self,
        bundle_id: &str,
        permissions: &BTreeMap<String, String>,
    ) -> Result<(), SimulatorError> {
        self.apply_permissions_with_applesimutils(bundle_id, permissions)
            .await
    }

    pub async fn enable_calendar_access(&self, bundle_id: &str) -> Result<(), SimulatorError> {
        match self.variant.calendar {
            CalendarAccess::SimctlPrivacy => {
                self.simctl
                    .grant_permission(&self.udid, bundle_id, "calendar")
                    .await
            }
            CalendarAccess::AppleSimUtils => {
                self.apply_permissions_with_applesimutils(bundle_id, &calendar_permission("YES"))
                    .await
            }
        }
    }

    pub async fn disable_calendar_access(&self, bundle_id: &str) -> Result<(), SimulatorError> {
        match self.variant.calendar {
            CalendarAccess::SimctlPrivacy => {
                self.simctl
                    .revoke_permission(&self.udid, bundle_id, "calendar")
                    .await
            }
            CalendarAccess::AppleSimUtils => {
                self.apply_permissions_with_applesimutils(bundle_id, &calendar_permission("NO"))
                    .await
            }
        }
    }

    async fn apply_permissions_with_applesimutils(
        &self,
        bundle_id: &str,
        permissions: &BTreeMap<String, String>,
    ) -> Result<(), SimulatorError> {
        if permissions.is_empty() {
            return Ok(());
        }
        let assignments = permissions
            .iter()
            .map(|(service, value)| format!("{service}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        debug!(udid = %self.udid, bundle_id, permissions = %assignments, "Setting permissions");
        run_checked(
            self.runner.as_ref(),
            "set permissions",
            &self.config.applesimutils,
            &[
                "--byId",
                &self.udid,
                "--bundle",
                bundle_id,
                "--setPermissions",
                &assignments,
            ],
        )
        .await
        .map(drop)
    }

    /// Removes every keychain item from the device.
    pub async fn clear_keychains(&self) -> Result<(), SimulatorError> {
        match self.variant.keychain_reset {
            KeychainReset::SimctlReset => self.simctl.reset_keychain(&self.udid).await,
            KeychainReset::DeleteKeychainDir => self.delete_keychain_dir_contents().await,
        }
    }

    async fn delete_keychain_dir_contents(&self) -> Result<(), SimulatorError> {
        let Some(devices_dir) = self.config.resolved_devices_dir() else {
            return Err(SimulatorError::environment(
                "clear keychains",
                "cannot locate the CoreSimulator devices directory",
            ));
        };
        let keychains = devices_dir
            .join(&self.udid)
            .join("data")
            .join("Library")
            .join("Keychains");
        if !tokio::fs::try_exists(&keychains).await? {
            debug!(path = %keychains.display(), "No keychain directory to clear");
            return Ok(());
        }

        let mut entries = tokio::fs::read_dir(&keychains).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        info!(udid = %self.udid, "Cleared keychains");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Web inspector
    // -----------------------------------------------------------------------

    /// Returns the path of this device's web-inspector socket, or `None` if
    /// it cannot be found yet (e.g. the device is still booting).
    ///
    /// A found path is kept for the life of the handle and `lsof` is not run
    /// again.
    pub async fn web_inspector_socket(&mut self) -> Result<Option<String>, SimulatorError> {
        if let Some(socket) = &self.web_inspector_socket {
            return Ok(Some(socket.clone()));
        }
        let socket =
            locate_inspector_socket(self.runner.as_ref(), &self.config.lsof, &self.udid).await?;
        if let Some(path) = &socket {
            info!(udid = %self.udid, socket = %path, "Resolved web inspector socket");
            self.web_inspector_socket = Some(path.clone());
        }
        Ok(socket)
    }
}

fn calendar_permission(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("calendar".to_string(), value.to_string())])
}

fn temp_payload_path(kind: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "simkit_{}_{}.{}",
        kind,
        uuid::Uuid::new_v4(),
        extension
    ))
}

async fn write_temp_payload(
    operation: &str,
    path: &Path,
    contents: &[u8],
) -> Result<(), SimulatorError> {
    tokio::fs::write(path, contents).await.map_err(|e| {
        SimulatorError::environment(
            operation,
            format!("could not write {}: {}", path.display(), e),
        )
    })
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Could not remove temp file");
    }
}
