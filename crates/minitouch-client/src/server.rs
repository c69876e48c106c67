//! Lifecycle of the minitouch process on the device
//!
//! Before a connection can be opened, minitouch has to be running on the
//! device and a local port has to be forwarded to its abstract socket:
//!
//! ```text
//! adb -s <serial> forward tcp:<port> localabstract:minitouch
//! adb -s <serial> shell /data/local/tmp/minitouch
//! ```
//!
//! [`MinitouchServer`] does both, and undoes both on [`stop`](RemoteProcess::stop)
//! or drop.

use std::process::Child;
use std::sync::Arc;

use minitouch_config::AdbConfig;

use crate::adb::{Adb, MINITOUCH_SOCKET};
use crate::error::{MinitouchError, Result};
use crate::installer::Installer;
use crate::port::PortAllocator;

/// A touch-injection process on a device, reachable through a local port
pub trait RemoteProcess {
    /// Launch the process for `device_id` and return the forwarded local port.
    /// Starting again for the same device returns the running port; another
    /// device is refused while running.
    fn start(&mut self, device_id: &str) -> Result<u16>;

    /// Terminate the process and remove the forward. Stopping twice is a no-op.
    fn stop(&mut self) -> Result<()>;

    fn is_alive(&mut self) -> bool;
}

#[derive(Debug)]
struct Running {
    adb: Adb,
    port: u16,
    child: Child,
}

/// minitouch launched through `adb shell`
#[derive(Debug)]
pub struct MinitouchServer {
    config: AdbConfig,
    allocator: Arc<PortAllocator>,
    running: Option<Running>,
}

impl MinitouchServer {
    pub fn new(config: AdbConfig, allocator: Arc<PortAllocator>) -> Self {
        Self {
            config,
            allocator,
            running: None,
        }
    }

    /// Forwarded local port while running
    pub fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|running| running.port)
    }

    fn launch(&self, adb: &Adb, port: u16) -> Result<Child> {
        Installer::new(adb, &self.config.remote_path, self.config.prebuilt_dir.as_deref())
            .ensure_installed()?;

        adb.forward(port, MINITOUCH_SOCKET)?;

        let mut child = match adb.spawn_shell(&[self.config.remote_path.as_str()]) {
            Ok(child) => child,
            Err(e) => {
                remove_forward_quietly(adb, port);
                return Err(e);
            }
        };

        std::thread::sleep(self.config.startup_delay);

        if !matches!(child.try_wait(), Ok(None)) {
            let _ = child.wait();
            remove_forward_quietly(adb, port);
            return Err(MinitouchError::ServerExited {
                device: adb.serial().unwrap_or("<default>").to_string(),
            });
        }

        Ok(child)
    }
}

impl RemoteProcess for MinitouchServer {
    fn start(&mut self, device_id: &str) -> Result<u16> {
        if let Some(running) = &self.running {
            let running_device = running.adb.serial().unwrap_or("<default>");
            if running_device != device_id {
                return Err(MinitouchError::ServerBusy {
                    running: running_device.to_string(),
                    requested: device_id.to_string(),
                });
            }
            tracing::warn!(
                device = device_id,
                port = running.port,
                "minitouch already running, reusing it"
            );
            return Ok(running.port);
        }

        let port = self.allocator.acquire()?;
        tracing::info!(device = device_id, port, "Forwarding local port to device");

        let adb = Adb::new(&self.config.executable).with_serial(device_id);
        match self.launch(&adb, port) {
            Ok(child) => {
                tracing::info!(device = device_id, port, "minitouch started");
                self.running = Some(Running { adb, port, child });
                Ok(port)
            }
            Err(e) => {
                self.allocator.release(port);
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        if let Err(e) = running.child.kill() {
            tracing::debug!("minitouch process already gone: {}", e);
        }
        let _ = running.child.wait();

        let forward = running.adb.remove_forward(running.port);
        if let Err(e) = &forward {
            tracing::warn!(port = running.port, "Failed to remove adb forward: {}", e);
        }

        self.allocator.release(running.port);
        tracing::info!(
            device = running.adb.serial().unwrap_or("<default>"),
            port = running.port,
            "minitouch stopped"
        );
        forward
    }

    fn is_alive(&mut self) -> bool {
        self.running
            .as_mut()
            .is_some_and(|running| matches!(running.child.try_wait(), Ok(None)))
    }
}

impl Drop for MinitouchServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("minitouch teardown failed: {}", e);
        }
    }
}

fn remove_forward_quietly(adb: &Adb, port: u16) {
    if let Err(e) = adb.remove_forward(port) {
        tracing::warn!(port, "Failed to remove adb forward: {}", e);
    }
}
