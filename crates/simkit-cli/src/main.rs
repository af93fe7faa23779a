//! Command-line front end for simkit.
//!
//! # Usage
//!
//! ```bash
//! # Show the detected Xcode and the behavior variant it selects
//! simkit version
//!
//! # List devices
//! simkit list
//!
//! # Boot a device and bring up the Simulator app
//! simkit boot F1191A22-11DD-408E-8CAF-0BC4A8F79E3B --ui-client
//!
//! # Find the web-inspector socket of a booted device
//! simkit inspector-socket F1191A22-11DD-408E-8CAF-0BC4A8F79E3B
//!
//! # Pretend a specific Xcode is installed
//! simkit --xcode-version 11.0 appearance F1191A22-11DD-408E-8CAF-0BC4A8F79E3B dark
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use simkit_core::config::SimkitConfig;
use simkit_core::runner::{CommandRunner, ProcessRunner};
use simkit_core::variant::{self, VARIANTS};
use simkit_core::{Simulator, SimulatorError, ToolchainVersion};

/// Xcode-version-aware iOS Simulator control.
#[derive(Parser)]
#[command(name = "simkit")]
#[command(about = "Control iOS simulators with the right call shapes for the installed Xcode")]
#[command(version)]
struct Cli {
    /// Use this Xcode version instead of asking xcodebuild
    #[arg(long, env = "SIMKIT_XCODE_VERSION")]
    xcode_version: Option<String>,

    /// Path to a config file (defaults to ~/.simkit/config.json)
    #[arg(long, env = "SIMKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Log external commands to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show the Xcode version and selected variant
    Version,

    /// List the known Xcode variants
    Variants,

    /// List simulator devices
    List,

    /// Create a new device and print its UDID
    Create {
        name: String,
        /// Device type identifier or name (e.g., "iPhone 11")
        device_type: String,
        /// Runtime identifier (e.g., com.apple.CoreSimulator.SimRuntime.iOS-13-4)
        runtime: String,
    },

    /// Show a device's simctl record
    Stat { udid: String },

    /// Boot a device
    Boot {
        udid: String,
        /// Also make sure the Simulator app is showing the device
        #[arg(long)]
        ui_client: bool,
    },

    /// Shut a device down
    Shutdown { udid: String },

    /// Erase all content and settings
    Erase { udid: String },

    /// Delete a device
    Delete { udid: String },

    /// Install an .app bundle
    Install { udid: String, app: PathBuf },

    /// Uninstall an app
    Uninstall { udid: String, bundle_id: String },

    /// Launch an installed app
    Launch { udid: String, bundle_id: String },

    /// Terminate a running app
    Terminate { udid: String, bundle_id: String },

    /// Print an app's data and bundle directories
    AppDirs { udid: String, bundle_id: String },

    /// Get or set the UI appearance (light/dark)
    Appearance {
        udid: String,
        /// New appearance; omit to print the current one
        value: Option<String>,
    },

    /// Add a PEM certificate
    AddCert {
        udid: String,
        cert: PathBuf,
        /// Add to the keychain instead of the trusted root store
        #[arg(long)]
        keychain: bool,
    },

    /// Deliver a push notification from a JSON payload file
    Push { udid: String, payload: PathBuf },

    /// Apply permissions given as JSON, e.g. '{"photos":"YES"}'
    Permissions {
        udid: String,
        bundle_id: String,
        permissions: String,
    },

    /// Grant or revoke calendar access
    Calendar {
        udid: String,
        bundle_id: String,
        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },

    /// Remove all keychain items
    ClearKeychains { udid: String },

    /// Print the device's web-inspector socket path
    InspectorSocket { udid: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code(&e)
        }
    }
}

fn exit_code(err: &SimulatorError) -> ExitCode {
    match err {
        SimulatorError::Environment { .. } | SimulatorError::Io(_) => ExitCode::from(2),
        SimulatorError::UnsupportedVersion { .. } | SimulatorError::UnsupportedOperation { .. } => {
            ExitCode::from(3)
        }
        _ => ExitCode::from(1),
    }
}

struct Context {
    runner: Arc<dyn CommandRunner>,
    config: SimkitConfig,
    format: OutputFormat,
}

impl Context {
    async fn open(&self, udid: &str) -> Result<Simulator, SimulatorError> {
        Simulator::open(udid, self.runner.clone(), self.config.clone()).await
    }

    async fn toolchain_version(&self) -> Result<ToolchainVersion, SimulatorError> {
        match &self.config.xcode_version {
            Some(pinned) => ToolchainVersion::parse(pinned),
            None => ToolchainVersion::detect(self.runner.as_ref(), &self.config.xcrun).await,
        }
    }

    fn print_value(&self, key: &str, value: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::json!({ key: value })),
            OutputFormat::Text => println!("{}", value),
        }
    }

    fn print_ok(&self, message: &str) {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::json!({ "success": true }));
        } else {
            eprintln!("{}", message);
        }
    }
}

async fn run(cli: Cli) -> Result<(), SimulatorError> {
    let mut config = match &cli.config {
        Some(path) => SimkitConfig::load_from(path),
        None => SimkitConfig::load(),
    };
    if let Some(version) = cli.xcode_version {
        config.xcode_version = Some(version);
    }

    let ctx = Context {
        runner: Arc::new(ProcessRunner),
        config,
        format: cli.format,
    };

    match cli.command {
        Command::Version => {
            let version = ctx.toolchain_version().await?;
            let selected = variant::select(&version)?;
            match ctx.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "xcode": version.version_string,
                        "major": version.major,
                        "minor": version.minor,
                        "variant": selected.name,
                    })
                ),
                OutputFormat::Text => println!("Xcode {} ({})", version, selected.name),
            }
        }
        Command::Variants => {
            for v in VARIANTS {
                let (major, minor) = v.since;
                match ctx.format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "name": v.name, "since": format!("{major}.{minor}") })
                    ),
                    OutputFormat::Text => println!("{:<12} >= {}.{}", v.name, major, minor),
                }
            }
        }
        Command::List => {
            let devices = simkit_core::list_devices(ctx.runner.clone(), &ctx.config).await?;
            match ctx.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
                OutputFormat::Text => {
                    for d in devices {
                        println!("{}  {:<10} {}", d.udid, d.state, d.name);
                    }
                }
            }
        }
        Command::Create {
            name,
            device_type,
            runtime,
        } => {
            let udid = simkit_core::create_device(
                ctx.runner.clone(),
                &ctx.config,
                &name,
                &device_type,
                &runtime,
            )
            .await?;
            ctx.print_value("udid", &udid);
        }
        Command::Stat { udid } => {
            let device = ctx.open(&udid).await?.stat().await?;
            match ctx.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&device)?),
                OutputFormat::Text => println!("{}  {}  {}", device.udid, device.state, device.name),
            }
        }
        Command::Boot { udid, ui_client } => {
            ctx.open(&udid).await?.run(ui_client).await?;
            ctx.print_ok("Booted");
        }
        Command::Shutdown { udid } => {
            ctx.open(&udid).await?.shutdown().await?;
            ctx.print_ok("Shut down");
        }
        Command::Erase { udid } => {
            ctx.open(&udid).await?.erase().await?;
            ctx.print_ok("Erased");
        }
        Command::Delete { udid } => {
            ctx.open(&udid).await?.delete().await?;
            ctx.print_ok("Deleted");
        }
        Command::Install { udid, app } => {
            ctx.open(&udid).await?.install_app(&app).await?;
            ctx.print_ok("Installed");
        }
        Command::Uninstall { udid, bundle_id } => {
            ctx.open(&udid).await?.remove_app(&bundle_id).await?;
            ctx.print_ok("Uninstalled");
        }
        Command::Launch { udid, bundle_id } => {
            let line = ctx.open(&udid).await?.launch_app(&bundle_id).await?;
            ctx.print_value("launched", &line);
        }
        Command::Terminate { udid, bundle_id } => {
            ctx.open(&udid).await?.terminate_app(&bundle_id).await?;
            ctx.print_ok("Terminated");
        }
        Command::AppDirs { udid, bundle_id } => {
            let dirs = ctx.open(&udid).await?.get_app_dirs(&bundle_id).await?;
            match ctx.format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "dirs": dirs })),
                OutputFormat::Text => {
                    if dirs.is_empty() {
                        eprintln!("{} is not installed", bundle_id);
                    }
                    for dir in dirs {
                        println!("{}", dir);
                    }
                }
            }
        }
        Command::Appearance { udid, value } => {
            let sim = ctx.open(&udid).await?;
            match value {
                Some(value) => {
                    sim.set_appearance(&value).await?;
                    ctx.print_ok("Appearance set");
                }
                None => {
                    let current = sim.get_appearance().await?;
                    ctx.print_value("appearance", &current);
                }
            }
        }
        Command::AddCert {
            udid,
            cert,
            keychain,
        } => {
            let pem = std::fs::read_to_string(&cert)?;
            ctx.open(&udid).await?.add_certificate(&pem, !keychain).await?;
            ctx.print_ok("Certificate added");
        }
        Command::Push { udid, payload } => {
            let payload: serde_json::Value = serde_json::from_slice(&std::fs::read(&payload)?)?;
            ctx.open(&udid).await?.push_notification(&payload).await?;
            ctx.print_ok("Notification sent");
        }
        Command::Permissions {
            udid,
            bundle_id,
            permissions,
        } => {
            let permissions: BTreeMap<String, String> = serde_json::from_str(&permissions)?;
            ctx.open(&udid)
                .await?
                .set_permissions(&bundle_id, &permissions)
                .await?;
            ctx.print_ok("Permissions applied");
        }
        Command::Calendar {
            udid,
            bundle_id,
            revoke,
        } => {
            let sim = ctx.open(&udid).await?;
            if revoke {
                sim.disable_calendar_access(&bundle_id).await?;
            } else {
                sim.enable_calendar_access(&bundle_id).await?;
            }
            ctx.print_ok("Calendar access updated");
        }
        Command::ClearKeychains { udid } => {
            ctx.open(&udid).await?.clear_keychains().await?;
            ctx.print_ok("Keychains cleared");
        }
        Command::InspectorSocket { udid } => {
            let mut sim = ctx.open(&udid).await?;
            match sim.web_inspector_socket().await? {
                Some(path) => ctx.print_value("socket", &path),
                None => match ctx.format {
                    OutputFormat::Json => println!("{}", serde_json::json!({ "socket": null })),
                    OutputFormat::Text => eprintln!("No web inspector socket found for {}", udid),
                },
            }
        }
    }

    Ok(())
}
