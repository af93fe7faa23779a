//! Persistent configuration for simkit.
//!
//! Stores user settings in `~/.simkit/config.json`. Every field is optional in
//! the file; anything missing takes its default.
//!
//! # Example
//!
//! ```no_run
//! use simkit_core::config::SimkitConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = SimkitConfig::load();
//! println!("using {}", config.xcrun);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_DIRNAME: &str = ".simkit";
const CONFIG_FILENAME: &str = "config.json";

/// Persistent simkit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimkitConfig {
    /// Program used to reach `simctl` and `xcodebuild`.
    pub xcrun: String,

    /// Program used to snapshot open sockets.
    pub lsof: String,

    /// Program used for bulk permission changes on older Xcode variants.
    pub applesimutils: String,

    /// Skips `xcodebuild -version` detection when set (e.g. `"11.4"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xcode_version: Option<String>,

    /// CoreSimulator devices directory. Defaults to
    /// `~/Library/Developer/CoreSimulator/Devices`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices_dir: Option<PathBuf>,
}

impl Default for SimkitConfig {
    fn default() -> Self {
        Self {
            xcrun: "xcrun".to_string(),
            lsof: "lsof".to_string(),
            applesimutils: "applesimutils".to_string(),
            xcode_version: None,
            devices_dir: None,
        }
    }
}

/// Returns `~/.simkit`, or `None` when the home directory is unknown.
pub fn simkit_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIRNAME))
}

impl SimkitConfig {
    /// Load config from `~/.simkit/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        match simkit_dir() {
            Some(dir) => Self::load_from(&dir.join(CONFIG_FILENAME)),
            None => Self::default(),
        }
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config");
            Self::default()
        })
    }

    /// The CoreSimulator directory holding one folder per device UDID.
    pub fn resolved_devices_dir(&self) -> Option<PathBuf> {
        self.devices_dir.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join("Library/Developer/CoreSimulator/Devices"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_plain_tool_names() {
        let config = SimkitConfig::default();
        assert_eq!(config.xcrun, "xcrun");
        assert_eq!(config.lsof, "lsof");
        assert_eq!(config.applesimutils, "applesimutils");
        assert!(config.xcode_version.is_none());
    }

    #[test]
    fn deserialize_partial_json() {
        let loaded: SimkitConfig =
            serde_json::from_str(r#"{"xcode_version": "11.4", "lsof": "/usr/sbin/lsof"}"#).unwrap();
        assert_eq!(loaded.xcode_version.as_deref(), Some("11.4"));
        assert_eq!(loaded.lsof, "/usr/sbin/lsof");
        assert_eq!(loaded.xcrun, "xcrun");
    }

    #[test]
    fn roundtrip_skips_unset_options() {
        let json = serde_json::to_string(&SimkitConfig::default()).unwrap();
        assert!(!json.contains("xcode_version"));
        assert!(!json.contains("devices_dir"));
    }

    #[test]
    fn load_from_missing_file_is_default() {
        let config = SimkitConfig::load_from(Path::new("/nonexistent/simkit/config.json"));
        assert_eq!(config, SimkitConfig::default());
    }

    #[test]
    fn load_from_malformed_file_is_default() {
        let path = std::env::temp_dir().join(format!("simkit_config_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{not json").unwrap();
        let config = SimkitConfig::load_from(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(config, SimkitConfig::default());
    }

    #[test]
    fn explicit_devices_dir_wins() {
        let config = SimkitConfig {
            devices_dir: Some(PathBuf::from("/tmp/devices")),
            ..Default::default()
        };
        assert_eq!(config.resolved_devices_dir(), Some(PathBuf::from("/tmp/devices")));
    }
}
