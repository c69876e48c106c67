//! Test doubles for adb and the minitouch socket

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::connection::CommandSink;
use crate::error::{MinitouchError, Result};

/// Records every published batch instead of sending it
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub batches: Vec<String>,
    /// Fail every send after this many have succeeded
    pub fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn failing_after(sends: usize) -> Self {
        Self {
            batches: Vec::new(),
            fail_after: Some(sends),
        }
    }

    /// All batches concatenated in publish order
    pub fn text(&self) -> String {
        self.batches.concat()
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, text: &str) -> Result<Vec<u8>> {
        if self.fail_after.is_some_and(|limit| self.batches.len() >= limit) {
            return Err(MinitouchError::ConnectionClosed);
        }
        self.batches.push(text.to_string());
        Ok(Vec::new())
    }
}

/// Banner sent by [`FakeMinitouch`] unless a test supplies its own
pub const BANNER: &str = "v 1\n^ 10 1080 1920 255\n$ 4242\n";

/// A one-shot minitouch stand-in listening on an ephemeral loopback port.
///
/// It writes the banner to the first client, then records everything the
/// client sends until the client closes the socket.
pub struct FakeMinitouch {
    port: u16,
    received: mpsc::Receiver<String>,
    handle: Option<JoinHandle<()>>,
}

impl FakeMinitouch {
    pub fn start() -> Self {
        Self::with_banner(BANNER)
    }

    pub fn with_banner(banner: &str) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let banner = banner.to_string();
        let (tx, received) = mpsc::channel();

        let handle = std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            if stream.write_all(banner.as_bytes()).is_err() {
                return;
            }
            let mut text = String::new();
            let _ = stream.read_to_string(&mut text);
            let _ = tx.send(text);
        });

        Self {
            port,
            received,
            handle: Some(handle),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Everything the client sent. Blocks until the client disconnects.
    pub fn received(mut self) -> String {
        let text = self.received.recv().unwrap_or_default();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        text
    }
}

/// Scripted adb replacement.
///
/// Each invocation is appended to `<dir>/<serial>.log`, so tests using
/// distinct serials can share one script. Behaviour keyed on the serial:
/// `fail-forward` makes `forward` fail, `crash-*` makes the minitouch launch
/// exit immediately, `missing-*` reports minitouch as absent from the device.
#[cfg(unix)]
pub struct FakeAdb {
    dir: tempfile::TempDir,
}

#[cfg(unix)]
const FAKE_ADB_SCRIPT: &str = r#"#!/bin/sh
dir=$(dirname "$0")
serial=none
if [ "$1" = "-s" ]; then serial=$2; shift 2; fi
echo "$*" >> "$dir/$serial.log"
case "$1" in
    devices)
        printf 'List of devices attached\nemulator-5554\tdevice\nR58M123ABC\tunauthorized\n\n'
        ;;
    forward)
        if [ "$serial" = "fail-forward" ]; then echo "error: cannot bind listener" >&2; exit 1; fi
        ;;
    push)
        ;;
    shell)
        case "$2" in
            getprop) echo "arm64-v8a" ;;
            ls)
                case "$serial" in
                    missing-*) echo "busybox" ;;
                    *) echo "busybox"; echo "minitouch" ;;
                esac
                ;;
            chmod) ;;
            *)
                case "$serial" in
                    crash-*) exit 1 ;;
                    *) exec sleep 30 ;;
                esac
                ;;
        esac
        ;;
esac
"#;

#[cfg(unix)]
impl FakeAdb {
    pub fn executable(&self) -> PathBuf {
        self.dir.path().join("adb")
    }

    /// Invocations recorded for `serial`, one per line
    pub fn log(&self, serial: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("{}.log", serial)))
            .unwrap_or_default()
    }
}

/// Shared fake adb, written once so no test forks while the script is open
/// for writing.
#[cfg(unix)]
pub fn fake_adb() -> &'static FakeAdb {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::OnceLock;

    static FAKE: OnceLock<FakeAdb> = OnceLock::new();
    FAKE.get_or_init(|| {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("adb");
        std::fs::write(&path, FAKE_ADB_SCRIPT).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        FakeAdb { dir }
    })
}
