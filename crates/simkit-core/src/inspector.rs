//! Discovery of a simulator's web-inspector socket.
//!
//! Every booted simulator runs its own `launchd_sim`, and each of those holds
//! a `com.apple.webinspectord_sim.socket`. `lsof -aUc launchd_sim` lists the
//! Unix sockets of all of them at once:
//!
//! ```text
//! COMMAND     PID      USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
//! launchd_s 81243 developer    3u  unix 0x9461828ef425ac31      0t0      /private/tmp/com.apple.launchd.ULf9wKNtd5/com.apple.webinspectord_sim.socket
//! launchd_s 81243 developer    4u  unix 0x9461828ef425bc99      0t0      /tmp/com.apple.CoreSimulator.SimDevice.F1191A22-11DD-408E-8CAF-0BC4A8F79E3B/syslogsock
//! launchd_s 35621 developer    4u  unix 0x7b7dbedd6d63253f      0t0      /tmp/com.apple.CoreSimulator.SimDevice.150983FD-82FB-4A7B-86DC-D3D264DD90E5/syslogsock
//! launchd_s 35621 developer    5u  unix 0x7b7dbedd6d62f727      0t0      /private/tmp/com.apple.launchd.zuM1XDJcwr/com.apple.webinspectord_sim.socket
//! ```
//!
//! The device UDID only shows up in the syslog socket path, so the lookup goes
//! UDID -> owning PID -> that PID's inspector socket. Line order is never
//! relied on.

use tracing::debug;

use crate::error::SimulatorError;
use crate::runner::{run_checked, CommandRunner};

/// File name of the web-inspector socket inside a simulator's launchd tmp dir.
pub const INSPECTOR_SOCKET_NAME: &str = "com.apple.webinspectord_sim.socket";

/// Process name filter passed to `lsof -c`.
const LAUNCHD_SIM: &str = "launchd_sim";

/// One parsed row of `lsof` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessListingEntry {
    pub pid: u32,
    pub fd: String,
    pub kind: String,
    /// The NAME column: a socket path or a `->0x...` peer reference.
    pub target: String,
}

/// Parses `lsof` output into entries.
///
/// The header and any row whose PID column is not numeric are skipped. Unix
/// socket rows usually leave the NODE column blank, so the NAME column starts
/// at the eighth field unless that field is a node number.
pub fn parse_lsof_output(output: &str) -> Vec<ProcessListingEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let pid = fields[1].parse::<u32>().ok()?;
            let name_start = match fields.get(7) {
                Some(node) if fields.len() > 8 && node.bytes().all(|b| b.is_ascii_digit()) => 8,
                Some(_) => 7,
                None => fields.len() - 1,
            };
            let target = fields[name_start..].join(" ");
            Some(ProcessListingEntry {
                pid,
                fd: fields[3].to_string(),
                kind: fields[4].to_string(),
                target,
            })
        })
        .collect()
}

/// Finds the inspector socket belonging to `udid` in a parsed listing.
///
/// Returns `None` when no entry mentions the UDID, or when the owning process
/// has no inspector socket yet.
pub fn find_inspector_socket<'a>(
    entries: &'a [ProcessListingEntry],
    udid: &str,
) -> Option<&'a str> {
    let pid = entries.iter().find(|e| e.target.contains(udid))?.pid;
    entries
        .iter()
        .find(|e| e.pid == pid && e.target.ends_with(INSPECTOR_SOCKET_NAME))
        .map(|e| e.target.as_str())
}

/// Takes a fresh `lsof` snapshot and resolves the inspector socket for `udid`.
///
/// # Errors
///
/// [`SimulatorError::Environment`] if `lsof` cannot be run or exits non-zero.
pub async fn locate_inspector_socket(
    runner: &dyn CommandRunner,
    lsof: &str,
    udid: &str,
) -> Result<Option<String>, SimulatorError> {
    let output = run_checked(runner, "lsof", lsof, &["-aUc", LAUNCHD_SIM]).await?;
    let entries = parse_lsof_output(&output.stdout);
    let socket = find_inspector_socket(&entries, udid).map(str::to_string);
    debug!(udid, entries = entries.len(), socket = ?socket, "Scanned launchd_sim sockets");
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "COMMAND     PID      USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME";

    #[test]
    fn parses_rows_and_skips_header() {
        let out = format!(
            "{HEADER}\n\
             launchd_s 81243 developer    3u  unix 0x9461828ef425ac31      0t0      /private/tmp/com.apple.launchd.ULf9wKNtd5/com.apple.webinspectord_sim.socket\n\
             launchd_s 81243 developer    6u  unix 0x9461828ef27d4c39      0t0      ->0x9461828ef27d4b71\n"
        );
        let entries = parse_lsof_output(&out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pid, 81243);
        assert_eq!(entries[0].fd, "3u");
        assert_eq!(entries[0].kind, "unix");
        assert!(entries[0].target.ends_with(INSPECTOR_SOCKET_NAME));
        assert_eq!(entries[1].target, "->0x9461828ef27d4b71");
    }

    #[test]
    fn parses_rows_with_node_column() {
        let out = "launchd_s 100 me 3u unix 0xabc 0t0 12345 /tmp/with space/sock\n";
        let entries = parse_lsof_output(out);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "/tmp/with space/sock");
    }

    #[test]
    fn keeps_spaces_in_paths_without_node_column() {
        let out = "launchd_s 1 me 3u unix 0x1 0t0 /tmp/My Dir/com.apple.webinspectord_sim.socket\n";
        let entries = parse_lsof_output(out);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].target,
            "/tmp/My Dir/com.apple.webinspectord_sim.socket"
        );
    }

    #[test]
    fn short_rows_take_last_field() {
        let entries = parse_lsof_output("launchd_s 7 me 3u unix ->0x1\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "->0x1");
    }

    #[test]
    fn ignores_short_and_blank_lines() {
        let entries = parse_lsof_output("\n   \nlsof: WARNING: can't stat()\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn owner_without_inspector_socket_is_none() {
        let out = "launchd_s 1 me 4u unix 0x1 0t0 /tmp/com.apple.CoreSimulator.SimDevice.AAAA/syslogsock\n\
                   launchd_s 2 me 5u unix 0x2 0t0 /private/tmp/x/com.apple.webinspectord_sim.socket\n";
        let entries = parse_lsof_output(out);
        assert_eq!(find_inspector_socket(&entries, "AAAA"), None);
    }

    #[test]
    fn empty_listing_is_none() {
        assert_eq!(find_inspector_socket(&[], "AAAA"), None);
    }
}
