//! Thin wrapper around the adb executable
//!
//! Every method maps onto exactly one adb invocation. Failures are reported
//! with the full command line and adb's stderr so setup problems can be
//! diagnosed without re-running anything by hand.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

use serde::Serialize;

use crate::error::{MinitouchError, Result};

/// Abstract socket name minitouch listens on
pub const MINITOUCH_SOCKET: &str = "localabstract:minitouch";

/// A device as reported by `adb devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `unauthorized`, `offline`, ...
    pub state: String,
}

impl AdbDevice {
    /// Whether adb can talk to the device
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Handle on the adb executable, optionally bound to one device serial
#[derive(Debug, Clone)]
pub struct Adb {
    executable: PathBuf,
    serial: Option<String>,
}

impl Adb {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            serial: None,
        }
    }

    /// Target every following command at `serial` (`adb -s <serial>`)
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Full argument list including the `-s <serial>` prefix
    fn full_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full.push("-s");
            full.push(serial.as_str());
        }
        full.extend_from_slice(args);
        full
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut line = self.executable.display().to_string();
        for arg in self.full_args(args) {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(self.full_args(args));
        command
    }

    /// Run adb to completion and return its trimmed stdout
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let description = self.describe(args);
        tracing::debug!("adb: {}", description);

        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| MinitouchError::AdbSpawn {
                command: description.clone(),
                source,
            })?;

        check_output(description, output)
    }

    /// Read a system property (`adb shell getprop <prop>`)
    pub fn getprop(&self, prop: &str) -> Result<String> {
        self.run(&["shell", "getprop", prop])
    }

    /// File names in a directory on the device
    pub fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let listing = self.run(&["shell", "ls", dir])?;
        Ok(listing
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    pub fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_string_lossy();
        self.run(&["push", &*local, remote]).map(drop)
    }

    pub fn chmod(&self, mode: &str, remote: &str) -> Result<()> {
        self.run(&["shell", "chmod", mode, remote]).map(drop)
    }

    /// `adb forward tcp:<port> <remote>`
    pub fn forward(&self, port: u16, remote: &str) -> Result<()> {
        let local = format!("tcp:{}", port);
        self.run(&["forward", &local, remote]).map(drop)
    }

    /// `adb forward --remove tcp:<port>`
    pub fn remove_forward(&self, port: u16) -> Result<()> {
        let local = format!("tcp:{}", port);
        self.run(&["forward", "--remove", &local]).map(drop)
    }

    /// Start a long-running `adb shell` command with its stdout discarded
    pub fn spawn_shell(&self, command: &[&str]) -> Result<Child> {
        let mut args = vec!["shell"];
        args.extend_from_slice(command);
        let description = self.describe(&args);
        tracing::debug!("adb (background): {}", description);

        self.command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| MinitouchError::AdbSpawn {
                command: description,
                source,
            })
    }

    /// Devices attached to the adb server
    pub fn list_devices(&self) -> Result<Vec<AdbDevice>> {
        let output = self.run(&["devices"])?;
        Ok(parse_devices(&output))
    }
}

fn check_output(description: String, output: Output) -> Result<String> {
    if !output.status.success() {
        return Err(MinitouchError::AdbFailed {
            command: description,
            status: output.status.to_string(),
            stderr: to_trimmed_utf8(&output.stderr),
        });
    }
    Ok(to_trimmed_utf8(&output.stdout))
}

/// Lossy so odd vendor output never fails a command
fn to_trimmed_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Parse the output of `adb devices`
pub fn parse_devices(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some(AdbDevice {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice\n\
                      R58M123ABC\tunauthorized\n\
                      \n";

        let devices = parse_devices(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_ready());
        assert_eq!(devices[1].state, "unauthorized");
        assert!(!devices[1].is_ready());
    }

    #[test]
    fn test_parse_devices_skips_daemon_chatter() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n";

        assert!(parse_devices(output).is_empty());
    }

    #[test]
    fn test_serial_is_prefixed() {
        let adb = Adb::new("adb").with_serial("3d33076e");
        assert_eq!(
            adb.describe(&["forward", "tcp:20000", MINITOUCH_SOCKET]),
            "adb -s 3d33076e forward tcp:20000 localabstract:minitouch"
        );
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let adb = Adb::new("/nonexistent/minitouch-test/adb");
        let err = adb.run(&["devices"]).unwrap_err();

        assert!(matches!(err, MinitouchError::AdbSpawn { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Setup);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_devices_through_fake_adb() {
        let fake = crate::testing::fake_adb();
        let devices = Adb::new(fake.executable()).list_devices().unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_command_reports_stderr() {
        let fake = crate::testing::fake_adb();
        let adb = Adb::new(fake.executable()).with_serial("fail-forward");

        match adb.forward(20000, MINITOUCH_SOCKET) {
            Err(MinitouchError::AdbFailed {
                command, stderr, ..
            }) => {
                assert!(command.contains("forward tcp:20000"));
                assert!(stderr.contains("cannot bind"));
            }
            other => panic!("Expected AdbFailed, got: {:?}", other),
        }
    }
}
