//! Error types for minitouch operations

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a [`MinitouchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The forwarded connection could not be established
    Setup,
    /// The handshake banner was malformed
    Protocol,
    /// An established connection failed
    Connection,
    /// Gesture input was rejected before any I/O
    InvalidArgument,
}

/// Errors that can occur while driving minitouch on a device
#[derive(Debug, Error)]
pub enum MinitouchError {
    /// The adb executable could not be launched
    #[error("Failed to run `{command}`: {source}")]
    AdbSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// adb ran but reported failure
    #[error("`{command}` failed ({status}): {stderr}")]
    AdbFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// No device serial was given and none could be chosen
    #[error("No device selected: {reason}")]
    NoDevice { reason: String },

    /// minitouch is not on the device and no local build is available
    #[error("No minitouch binary for ABI `{abi}` at {}", path.display())]
    PrebuiltMissing { abi: String, path: PathBuf },

    /// minitouch is not on the device and no prebuilt directory is configured
    #[error("minitouch not found at {remote_path} and no prebuilt directory is configured")]
    NotInstalled { remote_path: String },

    /// Every candidate port is taken
    #[error("No free local port left in {start}..={end}")]
    PortsExhausted { start: u16, end: u16 },

    /// The forwarded port did not accept a connection
    #[error("Failed to connect to minitouch at {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// minitouch exited before the session was ready
    #[error("minitouch on {device} exited during startup")]
    ServerExited { device: String },

    /// The server is already bound to another device
    #[error("minitouch is already running for {running}, cannot start it for {requested}")]
    ServerBusy { running: String, requested: String },

    /// The banner could not be read (timeout or socket error)
    #[error("Failed to read minitouch handshake line {line}: {source}")]
    HandshakeRead {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// The three-line banner did not match the expected format
    #[error("Malformed minitouch handshake on line {line}: {message}")]
    Handshake { line: usize, message: String },

    /// Writing a batch to the socket failed
    #[error("Failed to send to minitouch: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from the socket failed
    #[error("Failed to receive from minitouch: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The socket was closed by either side
    #[error("Connection to minitouch closed")]
    ConnectionClosed,

    /// Gesture input that cannot be turned into commands
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl MinitouchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AdbSpawn { .. }
            | Self::AdbFailed { .. }
            | Self::NoDevice { .. }
            | Self::PrebuiltMissing { .. }
            | Self::NotInstalled { .. }
            | Self::PortsExhausted { .. }
            | Self::ConnectFailed { .. }
            | Self::ServerExited { .. }
            | Self::ServerBusy { .. } => ErrorKind::Setup,
            Self::Handshake { .. } | Self::HandshakeRead { .. } => ErrorKind::Protocol,
            Self::SendFailed(_) | Self::ReceiveFailed(_) | Self::ConnectionClosed => {
                ErrorKind::Connection
            }
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn handshake(line: usize, message: impl Into<String>) -> Self {
        Self::Handshake {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

pub type Result<T, E = MinitouchError> = std::result::Result<T, E>;
