//! Xcode-version variant table.
//!
//! Each [`Variant`] records how a handful of simulator operations are carried
//! out for one range of Xcode versions. Entries are ordered oldest to newest
//! and every entry is written as "the previous entry plus its overrides", so
//! anything a newer Xcode did not change falls through to the older shape.

use crate::error::SimulatorError;
use crate::version::ToolchainVersion;

/// How the UI appearance (light/dark) is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppearanceSupport {
    Unsupported,
    /// `simctl ui <udid> appearance [value]`
    SimctlUi,
}

/// How certificates are added to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateSupport {
    Unsupported,
    /// `simctl keychain <udid> add-root-cert|add-cert <file>`
    SimctlKeychain,
}

/// How push notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSupport {
    Unsupported,
    /// `simctl push <udid> <file>`
    SimctlPush,
}

/// How calendar access is granted and revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarAccess {
    /// `applesimutils --setPermissions calendar=YES|NO`
    AppleSimUtils,
    /// `simctl privacy <udid> grant|revoke calendar <bundle>`
    SimctlPrivacy,
}

/// How keychains are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeychainReset {
    /// Remove the contents of the device's `data/Library/Keychains` directory.
    DeleteKeychainDir,
    /// `simctl keychain <udid> reset`
    SimctlReset,
}

/// Ordering between booting the device and launching the Simulator UI client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOrder {
    BootThenUiClient,
    /// The window stays minimized unless the UI client is already up at boot.
    UiClientThenBoot,
}

/// One behavior variant, selected by Xcode version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub name: &'static str,
    /// Oldest Xcode `(major, minor)` this variant applies to.
    pub since: (u32, u32),
    /// Application name of the Simulator UI client.
    pub ui_client_name: &'static str,
    pub appearance: AppearanceSupport,
    pub certificates: CertificateSupport,
    pub push: PushSupport,
    pub calendar: CalendarAccess,
    pub keychain_reset: KeychainReset,
    pub launch_order: LaunchOrder,
}

const XCODE_6: Variant = Variant {
    name: "Xcode 6",
    since: (6, 0),
    ui_client_name: "iOS Simulator",
    appearance: AppearanceSupport::Unsupported,
    certificates: CertificateSupport::Unsupported,
    push: PushSupport::Unsupported,
    calendar: CalendarAccess::AppleSimUtils,
    keychain_reset: KeychainReset::DeleteKeychainDir,
    launch_order: LaunchOrder::BootThenUiClient,
};

const XCODE_7: Variant = Variant {
    name: "Xcode 7",
    since: (7, 0),
    ui_client_name: "Simulator",
    ..XCODE_6
};

const XCODE_8: Variant = Variant {
    name: "Xcode 8",
    since: (8, 0),
    ..XCODE_7
};

const XCODE_9: Variant = Variant {
    name: "Xcode 9",
    since: (9, 0),
    ..XCODE_8
};

const XCODE_9_3: Variant = Variant {
    name: "Xcode 9.3",
    since: (9, 3),
    ..XCODE_9
};

const XCODE_10: Variant = Variant {
    name: "Xcode 10",
    since: (10, 0),
    ..XCODE_9_3
};

const XCODE_11: Variant = Variant {
    name: "Xcode 11",
    since: (11, 0),
    ..XCODE_10
};

const XCODE_11_4: Variant = Variant {
    name: "Xcode 11.4",
    since: (11, 4),
    appearance: AppearanceSupport::SimctlUi,
    certificates: CertificateSupport::SimctlKeychain,
    push: PushSupport::SimctlPush,
    calendar: CalendarAccess::SimctlPrivacy,
    keychain_reset: KeychainReset::SimctlReset,
    launch_order: LaunchOrder::UiClientThenBoot,
    ..XCODE_11
};

/// Every known variant, oldest first.
pub const VARIANTS: &[Variant] = &[
    XCODE_6, XCODE_7, XCODE_8, XCODE_9, XCODE_9_3, XCODE_10, XCODE_11, XCODE_11_4,
];

/// Picks the newest variant whose threshold `version` meets.
///
/// Versions newer than every known threshold get the newest variant.
///
/// # Errors
///
/// [`SimulatorError::UnsupportedVersion`] if `version` predates the oldest
/// variant.
pub fn select(version: &ToolchainVersion) -> Result<&'static Variant, SimulatorError> {
    VARIANTS
        .iter()
        .rev()
        .find(|v| version.at_least(v.since.0, v.since.1))
        .ok_or_else(|| {
            let (major, minor) = VARIANTS[0].since;
            SimulatorError::UnsupportedVersion {
                version: version.clone(),
                minimum: format!("{major}.{minor}"),
            }
        })
}

impl Variant {
    /// Fails with [`SimulatorError::UnsupportedOperation`] naming this variant.
    pub(crate) fn unsupported<T>(&self, operation: &'static str) -> Result<T, SimulatorError> {
        Err(SimulatorError::UnsupportedOperation {
            operation,
            variant: self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32) -> ToolchainVersion {
        ToolchainVersion::new(major, minor, format!("{major}.{minor}.0"))
    }

    #[test]
    fn table_is_strictly_ordered() {
        for pair in VARIANTS.windows(2) {
            assert!(pair[0].since < pair[1].since, "{} !< {}", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn each_threshold_selects_its_own_variant() {
        let cases = [
            (6, 0, "Xcode 6"),
            (7, 0, "Xcode 7"),
            (8, 0, "Xcode 8"),
            (9, 0, "Xcode 9"),
            (9, 3, "Xcode 9.3"),
            (10, 0, "Xcode 10"),
            (11, 0, "Xcode 11"),
            (11, 4, "Xcode 11.4"),
        ];
        for (major, minor, name) in cases {
            assert_eq!(select(&v(major, minor)).unwrap().name, name, "{major}.{minor}");
        }
    }

    #[test]
    fn between_thresholds_selects_older() {
        assert_eq!(select(&v(9, 2)).unwrap().name, "Xcode 9");
        assert_eq!(select(&v(11, 3)).unwrap().name, "Xcode 11");
        assert_eq!(select(&v(10, 3)).unwrap().name, "Xcode 10");
    }

    #[test]
    fn future_versions_select_newest() {
        assert_eq!(select(&v(11, 5)).unwrap().name, "Xcode 11.4");
        assert_eq!(select(&v(12, 0)).unwrap().name, "Xcode 11.4");
        assert_eq!(select(&v(16, 2)).unwrap().name, "Xcode 11.4");
    }

    #[test]
    fn too_old_is_rejected() {
        let err = select(&ToolchainVersion::new(5, 4, "5.4.0")).unwrap_err();
        match err {
            SimulatorError::UnsupportedVersion { version, minimum } => {
                assert_eq!(version.major, 5);
                assert_eq!(minimum, "6.0");
            }
            other => panic!("Expected UnsupportedVersion, got: {:?}", other),
        }
    }

    #[test]
    fn selection_is_monotonic() {
        let index_of = |name: &str| VARIANTS.iter().position(|v| v.name == name).unwrap();
        let mut previous = 0;
        for major in 6..=16 {
            for minor in 0..=9 {
                let selected = index_of(select(&v(major, minor)).unwrap().name);
                assert!(selected >= previous, "{major}.{minor} went backwards");
                previous = selected;
            }
        }
    }

    #[test]
    fn overrides_fall_through() {
        let x8 = select(&v(8, 0)).unwrap();
        assert_eq!(x8.ui_client_name, "Simulator");
        assert_eq!(x8.calendar, CalendarAccess::AppleSimUtils);

        let x6 = select(&v(6, 1)).unwrap();
        assert_eq!(x6.ui_client_name, "iOS Simulator");

        let x114 = select(&v(11, 4)).unwrap();
        assert_eq!(x114.ui_client_name, "Simulator");
        assert_eq!(x114.launch_order, LaunchOrder::UiClientThenBoot);
        assert_eq!(x114.appearance, AppearanceSupport::SimctlUi);

        let x11 = select(&v(11, 0)).unwrap();
        assert_eq!(x11.launch_order, LaunchOrder::BootThenUiClient);
        assert_eq!(x11.push, PushSupport::Unsupported);
    }
}
