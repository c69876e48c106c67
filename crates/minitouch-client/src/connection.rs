//! Socket connection to a forwarded minitouch instance
//!
//! ## Protocol
//!
//! On connect minitouch writes a three-line banner:
//!
//! ```text
//! v <version>
//! ^ <max-contacts> <max-x> <max-y> <max-pressure>
//! $ <pid>
//! ```
//!
//! After that the client writes newline-terminated command lines and
//! minitouch never answers. [`MinitouchConnection::send`] therefore only
//! collects whatever bytes happen to be pending and never waits for a reply.

use std::io::{BufRead, BufReader, ErrorKind as IoErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{MinitouchError, Result};
use crate::types::ConnectionCapabilities;

/// Handshake timeout used by [`MinitouchConnection::open`]
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Anything a command batch can be published to.
///
/// [`MinitouchConnection`] is the production implementation; tests record
/// batches instead.
pub trait CommandSink {
    /// Send one batch of protocol text, returning any response bytes
    fn send(&mut self, text: &str) -> Result<Vec<u8>>;
}

impl<S: CommandSink + ?Sized> CommandSink for &mut S {
    fn send(&mut self, text: &str) -> Result<Vec<u8>> {
        (**self).send(text)
    }
}

/// An open connection to minitouch with its announced capabilities
#[derive(Debug)]
pub struct MinitouchConnection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    capabilities: ConnectionCapabilities,
}

impl MinitouchConnection {
    /// Connect to `host:port` and read the handshake banner
    ///
    /// # Errors
    ///
    /// Returns `MinitouchError::ConnectFailed` if nothing accepts the
    /// connection, `MinitouchError::Handshake` if the banner is malformed.
    pub fn open(host: &str, port: u16) -> Result<Self> {
        Self::open_with_timeout(host, port, DEFAULT_HANDSHAKE_TIMEOUT)
    }

    /// Like [`open`](Self::open) with an explicit bound on reading the banner
    pub fn open_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream =
            TcpStream::connect((host, port)).map_err(|source| MinitouchError::ConnectFailed {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let peer = stream
            .peer_addr()
            .map_err(|source| MinitouchError::ConnectFailed {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        // Command batches are small and latency matters more than throughput
        let _ = stream.set_nodelay(true);

        stream
            .set_read_timeout(Some(timeout))
            .map_err(MinitouchError::ReceiveFailed)?;
        let capabilities = {
            let mut reader = BufReader::new(&stream);
            read_handshake(&mut reader)?
        };
        stream
            .set_read_timeout(None)
            .map_err(MinitouchError::ReceiveFailed)?;

        tracing::info!(
            %peer,
            pid = capabilities.pid,
            max_contacts = capabilities.max_contacts,
            max_x = capabilities.max_x,
            max_y = capabilities.max_y,
            max_pressure = capabilities.max_pressure,
            "minitouch connected"
        );

        Ok(Self {
            stream: Some(stream),
            peer,
            capabilities,
        })
    }

    pub fn capabilities(&self) -> ConnectionCapabilities {
        self.capabilities
    }

    pub fn max_contacts(&self) -> u32 {
        self.capabilities.max_contacts
    }

    pub fn max_x(&self) -> u32 {
        self.capabilities.max_x
    }

    pub fn max_y(&self) -> u32 {
        self.capabilities.max_y
    }

    pub fn max_pressure(&self) -> u32 {
        self.capabilities.max_pressure
    }

    /// Process id of minitouch on the device
    pub fn pid(&self) -> u32 {
        self.capabilities.pid
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Write raw protocol text and collect any pending response bytes
    ///
    /// # Errors
    ///
    /// Returns `MinitouchError::ConnectionClosed` after [`close`](Self::close)
    /// or when minitouch has hung up, `MinitouchError::SendFailed` if the
    /// write fails.
    pub fn send(&mut self, text: &str) -> Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(MinitouchError::ConnectionClosed)?;

        tracing::debug!(operation = %text.escape_debug(), "send operation");

        stream
            .write_all(text.as_bytes())
            .map_err(MinitouchError::SendFailed)?;
        stream.flush().map_err(MinitouchError::SendFailed)?;

        drain_pending(stream)
    }

    /// Shut the socket down. Closing an already closed connection does nothing.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                if e.kind() != IoErrorKind::NotConnected {
                    tracing::warn!(peer = %self.peer, "Failed to shut down minitouch socket: {}", e);
                }
            }
            tracing::info!(peer = %self.peer, "minitouch disconnected");
        }
    }
}

impl CommandSink for MinitouchConnection {
    fn send(&mut self, text: &str) -> Result<Vec<u8>> {
        MinitouchConnection::send(self, text)
    }
}

impl Drop for MinitouchConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read whatever the peer already sent without waiting for more
fn drain_pending(stream: &mut TcpStream) -> Result<Vec<u8>> {
    stream
        .set_nonblocking(true)
        .map_err(MinitouchError::ReceiveFailed)?;

    let mut pending = Vec::new();
    let mut buf = [0u8; 1024];
    let outcome = loop {
        match stream.read(&mut buf) {
            Ok(0) => break Err(MinitouchError::ConnectionClosed),
            Ok(n) => pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == IoErrorKind::WouldBlock => break Ok(()),
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => break Err(MinitouchError::ReceiveFailed(e)),
        }
    };

    stream
        .set_nonblocking(false)
        .map_err(MinitouchError::ReceiveFailed)?;
    outcome.map(|()| pending)
}

/// Parse the three-line minitouch banner
///
/// # Errors
///
/// Returns `MinitouchError::Handshake` for a missing or malformed line and
/// `MinitouchError::HandshakeRead` if reading fails or times out.
pub fn read_handshake<R: BufRead>(reader: &mut R) -> Result<ConnectionCapabilities> {
    let version = read_banner_line(reader, 1)?;
    tracing::debug!(version = version.trim(), "minitouch protocol version");

    let limits = read_banner_line(reader, 2)?;
    let mut fields = limits.split_whitespace();
    if fields.next() != Some("^") {
        return Err(MinitouchError::handshake(
            2,
            format!("expected `^ <contacts> <x> <y> <pressure>`, got `{}`", limits.trim()),
        ));
    }
    let values: Vec<&str> = fields.take(4).collect();
    if values.len() < 4 {
        return Err(MinitouchError::handshake(
            2,
            format!("expected 4 limits, got {}", values.len()),
        ));
    }
    let max_contacts = parse_field(values[0], 2, "max contacts")?;
    let max_x = parse_field(values[1], 2, "max x")?;
    let max_y = parse_field(values[2], 2, "max y")?;
    let max_pressure = parse_field(values[3], 2, "max pressure")?;

    let process = read_banner_line(reader, 3)?;
    let mut fields = process.split_whitespace();
    let pid = match (fields.next(), fields.next()) {
        (Some("$"), Some(pid)) => parse_field(pid, 3, "pid")?,
        _ => {
            return Err(MinitouchError::handshake(
                3,
                format!("expected `$ <pid>`, got `{}`", process.trim()),
            ))
        }
    };

    Ok(ConnectionCapabilities {
        max_contacts,
        max_x,
        max_y,
        max_pressure,
        pid,
    })
}

fn read_banner_line<R: BufRead>(reader: &mut R, line: usize) -> Result<String> {
    let mut buf = String::new();
    let bytes_read = reader
        .read_line(&mut buf)
        .map_err(|source| MinitouchError::HandshakeRead { line, source })?;
    if bytes_read == 0 {
        return Err(MinitouchError::handshake(
            line,
            "connection closed before the banner was complete",
        ));
    }
    Ok(buf)
}

fn parse_field(value: &str, line: usize, name: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| MinitouchError::handshake(line, format!("invalid {} `{}`", name, value)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::{Ipv4Addr, TcpListener};

    use super::*;
    use crate::testing::FakeMinitouch;
    use crate::ErrorKind;

    fn parse(banner: &str) -> Result<ConnectionCapabilities> {
        read_handshake(&mut Cursor::new(banner.as_bytes()))
    }

    #[test]
    fn test_handshake_parses_capabilities() {
        let caps = parse("v 1\n^ 10 1080 1920 255\n$ 4242\n").unwrap();

        assert_eq!(caps.max_contacts, 10);
        assert_eq!(caps.max_x, 1080);
        assert_eq!(caps.max_y, 1920);
        assert_eq!(caps.max_pressure, 255);
        assert_eq!(caps.pid, 4242);
    }

    #[test]
    fn test_handshake_ignores_extra_limit_fields() {
        let caps = parse("v 1\n^ 2 4095 4095 0 extra stuff\n$ 7\n").unwrap();
        assert_eq!(caps.max_contacts, 2);
        assert_eq!(caps.max_pressure, 0);
    }

    #[test]
    fn test_handshake_missing_caret_is_protocol_error() {
        let err = parse("v 1\n10 1080 1920 255\n$ 4242\n").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(err, MinitouchError::Handshake { line: 2, .. }));
    }

    #[test]
    fn test_handshake_too_few_limits() {
        let err = parse("v 1\n^ 10 1080 1920\n$ 4242\n").unwrap_err();
        assert!(matches!(err, MinitouchError::Handshake { line: 2, .. }));
    }

    #[test]
    fn test_handshake_non_numeric_limit() {
        let err = parse("v 1\n^ 10 wide 1920 255\n$ 4242\n").unwrap_err();
        assert!(err.to_string().contains("wide"));
    }

    #[test]
    fn test_handshake_malformed_pid_line() {
        let err = parse("v 1\n^ 10 1080 1920 255\npid 4242\n").unwrap_err();
        assert!(matches!(err, MinitouchError::Handshake { line: 3, .. }));

        let err = parse("v 1\n^ 10 1080 1920 255\n$\n").unwrap_err();
        assert!(matches!(err, MinitouchError::Handshake { line: 3, .. }));
    }

    #[test]
    fn test_handshake_truncated_banner() {
        let err = parse("v 1\n^ 10 1080 1920 255\n").unwrap_err();
        assert!(matches!(err, MinitouchError::Handshake { line: 3, .. }));
    }

    #[test]
    fn test_open_and_send() {
        let server = FakeMinitouch::start();
        let mut conn = MinitouchConnection::open("127.0.0.1", server.port()).unwrap();

        assert_eq!(conn.max_x(), 1080);
        assert_eq!(conn.max_y(), 1920);
        assert_eq!(conn.pid(), 4242);

        let ack = conn.send("d 0 150 150 50\nc\nu 0\nc\n").unwrap();
        assert!(ack.is_empty());
        conn.close();

        assert_eq!(server.received(), "d 0 150 150 50\nc\nu 0\nc\n");
    }

    #[test]
    fn test_open_with_bad_banner_fails() {
        let server = FakeMinitouch::with_banner("v 1\nhello\n$ 1\n");
        let err = MinitouchConnection::open("127.0.0.1", server.port()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_silent_server_times_out_as_protocol_error() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });

        let err = MinitouchConnection::open_with_timeout("127.0.0.1", port, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, MinitouchError::HandshakeRead { line: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        server.join().unwrap();
    }

    #[test]
    fn test_open_without_listener_is_setup_error() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = MinitouchConnection::open("127.0.0.1", port).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Setup);
    }

    #[test]
    fn test_close_is_idempotent() {
        let server = FakeMinitouch::start();
        let mut conn = MinitouchConnection::open("127.0.0.1", server.port()).unwrap();

        conn.close();
        conn.close();
        assert!(!conn.is_open());
    }

    #[test]
    fn test_send_after_close_fails() {
        let server = FakeMinitouch::start();
        let mut conn = MinitouchConnection::open("127.0.0.1", server.port()).unwrap();
        conn.close();

        let err = conn.send("c\n").unwrap_err();
        assert!(matches!(err, MinitouchError::ConnectionClosed));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_send_after_peer_hangup_fails() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(crate::testing::BANNER.as_bytes()).unwrap();
        });

        let mut conn = MinitouchConnection::open("127.0.0.1", port).unwrap();
        server.join().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let err = conn.send("c\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
