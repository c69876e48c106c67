//! Configuration data model

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub connection: ConnectionConfig,
    pub adb: AdbConfig,
    pub gesture: GestureConfig,
}

/// Global settings
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Local side of the forwarded minitouch socket
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host the forwarded port is reachable on
    pub host: String,
    /// Candidate local ports for `adb forward`
    pub port_range: RangeInclusive<u16>,
    /// Pause after every published batch
    pub settle_delay: Duration,
    /// Upper bound for reading the three-line banner
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_range: 20000..=20999,
            settle_delay: Duration::from_millis(20),
            handshake_timeout: Duration::from_millis(3000),
        }
    }
}

/// How the minitouch binary is installed and launched on the device
#[derive(Debug, Clone)]
pub struct AdbConfig {
    /// adb executable (looked up in `PATH` when not absolute)
    pub executable: PathBuf,
    /// Serial used when none is given on the command line
    pub default_device: Option<String>,
    /// Location of the binary on the device
    pub remote_path: String,
    /// Local tree laid out as `<abi>/bin/minitouch`
    pub prebuilt_dir: Option<PathBuf>,
    /// Time given to minitouch to open its socket after launch
    pub startup_delay: Duration,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("adb"),
            default_device: None,
            remote_path: "/data/local/tmp/minitouch".to_string(),
            prebuilt_dir: None,
            startup_delay: Duration::from_millis(1000),
        }
    }
}

/// Defaults for gesture operations
#[derive(Debug, Clone)]
pub struct GestureConfig {
    pub default_pressure: u32,
    /// Interpolation steps per segment for smooth swipes
    pub smooth_parts: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            default_pressure: 100,
            smooth_parts: 10,
        }
    }
}
