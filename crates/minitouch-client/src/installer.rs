//! Getting the minitouch binary onto a device
//!
//! Prebuilt binaries are looked up in a local directory that mirrors the
//! layout of the stf prebuilt packages: `<prebuilt_dir>/<abi>/bin/minitouch`.

use std::path::{Path, PathBuf};

use crate::adb::Adb;
use crate::error::{MinitouchError, Result};

/// What [`Installer::ensure_installed`] had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyPresent,
    Installed { abi: String },
}

/// Installs minitouch on one device
#[derive(Debug)]
pub struct Installer<'a> {
    adb: &'a Adb,
    remote_path: &'a str,
    prebuilt_dir: Option<&'a Path>,
}

impl<'a> Installer<'a> {
    pub fn new(adb: &'a Adb, remote_path: &'a str, prebuilt_dir: Option<&'a Path>) -> Self {
        Self {
            adb,
            remote_path,
            prebuilt_dir,
        }
    }

    /// Primary ABI of the device (`ro.product.cpu.abi`)
    pub fn abi(&self) -> Result<String> {
        let abi = self.adb.getprop("ro.product.cpu.abi")?;
        tracing::info!(
            device = self.adb.serial().unwrap_or("<default>"),
            abi = %abi,
            "Detected device ABI"
        );
        Ok(abi)
    }

    /// Whether the binary already exists at the remote path
    pub fn is_installed(&self) -> Result<bool> {
        let (dir, name) = split_remote_path(self.remote_path);
        Ok(self.adb.list_dir(dir)?.iter().any(|entry| entry == name))
    }

    /// Push the prebuilt binary for this device's ABI and make it executable
    pub fn install(&self) -> Result<String> {
        let prebuilt_dir = self.prebuilt_dir.ok_or_else(|| MinitouchError::NotInstalled {
            remote_path: self.remote_path.to_string(),
        })?;
        let abi = self.abi()?;
        let local = prebuilt_path(prebuilt_dir, &abi);
        if !local.is_file() {
            return Err(MinitouchError::PrebuiltMissing { abi, path: local });
        }

        tracing::info!("Pushing {} to {}", local.display(), self.remote_path);
        self.adb.push(&local, self.remote_path)?;
        self.adb.chmod("777", self.remote_path)?;
        Ok(abi)
    }

    pub fn ensure_installed(&self) -> Result<InstallOutcome> {
        if self.is_installed()? {
            tracing::info!("minitouch already present at {}", self.remote_path);
            return Ok(InstallOutcome::AlreadyPresent);
        }
        let abi = self.install()?;
        Ok(InstallOutcome::Installed { abi })
    }
}

/// `<prebuilt_dir>/<abi>/bin/minitouch`
pub fn prebuilt_path(prebuilt_dir: &Path, abi: &str) -> PathBuf {
    prebuilt_dir.join(abi).join("bin").join("minitouch")
}

fn split_remote_path(remote_path: &str) -> (&str, &str) {
    match remote_path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => (".", remote_path),
    }
}
