//! Shared test helpers for simkit-core integration tests.
//!
//! [`ScriptedRunner`] stands in for the host: each rule answers a program
//! plus argument prefix with a canned [`CommandOutput`], and every invocation
//! is recorded so tests can assert on exact call shapes and counts.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use simkit_core::config::SimkitConfig;
use simkit_core::runner::{CommandOutput, CommandRunner};
use simkit_core::{Simulator, ToolchainVersion};

pub const UDID: &str = "F1191A22-11DD-408E-8CAF-0BC4A8F79E3B";
pub const OTHER_UDID: &str = "150983FD-82FB-4A7B-86DC-D3D264DD90E5";

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

struct Rule {
    program: String,
    args_prefix: Vec<String>,
    output: CommandOutput,
}

/// A [`CommandRunner`] that replays canned outputs.
///
/// Rules are matched in insertion order. A command with no matching rule
/// fails to spawn with `NotFound`, like a missing binary would.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `program args_prefix...` with `output`.
    pub fn on(mut self, program: &str, args_prefix: &[&str], output: CommandOutput) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|s| s.to_string()).collect(),
            output,
        });
        self
    }

    /// Answers `xcrun simctl list devices -j` with the given device UDIDs.
    pub fn with_devices(self, udids: &[&str]) -> Self {
        self.on("xcrun", &["simctl", "list", "devices", "-j"], ok(&device_list_json(udids)))
    }

    /// Every recorded invocation as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of `program` whose args start with `args_prefix`.
    pub fn count(&self, program: &str, args_prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|call| call[0] == program && starts_with(&call[1..], args_prefix))
            .count()
    }

    /// Index of the first invocation matching, if any.
    pub fn position(&self, program: &str, args_prefix: &[&str]) -> Option<usize> {
        self.calls()
            .iter()
            .position(|call| call[0] == program && starts_with(&call[1..], args_prefix))
    }
}

fn starts_with(args: &[String], prefix: &[&str]) -> bool {
    args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p)
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|s| s.to_string()));
        self.calls.lock().unwrap().push(call);

        self.rules
            .iter()
            .find(|rule| {
                rule.program == program
                    && args.len() >= rule.args_prefix.len()
                    && args.iter().zip(&rule.args_prefix).all(|(a, p)| a == p)
            })
            .map(|rule| rule.output.clone())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted response for {program} {args:?}"),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn device_list_json(udids: &[&str]) -> String {
    let devices: Vec<serde_json::Value> = udids
        .iter()
        .enumerate()
        .map(|(i, udid)| {
            serde_json::json!({
                "udid": udid,
                "name": format!("iPhone {}", 11 + i),
                "state": "Shutdown",
                "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPhone-11"
            })
        })
        .collect();
    serde_json::json!({
        "devices": { "com.apple.CoreSimulator.SimRuntime.iOS-13-4": devices }
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opens a handle on [`UDID`] with a fixed Xcode version.
pub async fn open_sim(runner: Arc<ScriptedRunner>, major: u32, minor: u32) -> Simulator {
    open_sim_with_config(runner, major, minor, SimkitConfig::default()).await
}

pub async fn open_sim_with_config(
    runner: Arc<ScriptedRunner>,
    major: u32,
    minor: u32,
    config: SimkitConfig,
) -> Simulator {
    let version = ToolchainVersion::new(major, minor, format!("{major}.{minor}"));
    Simulator::with_version(UDID, version, runner, config)
        .await
        .expect("simulator should open")
}
