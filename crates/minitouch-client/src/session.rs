//! A device session: forwarded port, running minitouch, open connection
//!
//! A [`Session`] is torn down exactly once, either by [`Session::stop`] or
//! when it goes out of scope. [`with_session`] wraps the common
//! open-use-stop pattern and still tears down when the closure fails.

use std::sync::Arc;

use minitouch_config::{Config, ConnectionConfig};

use crate::connection::MinitouchConnection;
use crate::error::Result;
use crate::gesture::{GestureEngine, SwipeOptions, TapOptions};
use crate::port::PortAllocator;
use crate::server::{MinitouchServer, RemoteProcess};
use crate::types::{ConnectionCapabilities, Point};

/// Exclusive control of one device's touch input
#[derive(Debug)]
pub struct Session<P: RemoteProcess = MinitouchServer> {
    device_id: String,
    port: u16,
    engine: GestureEngine<MinitouchConnection>,
    process: P,
    stopped: bool,
}

impl Session<MinitouchServer> {
    /// Start minitouch on `device_id` and connect to it, using a private
    /// port pool built from the configured range
    pub fn open(device_id: &str, config: &Config) -> Result<Self> {
        let allocator = Arc::new(PortAllocator::new(config.connection.port_range.clone()));
        Self::open_with_allocator(device_id, config, allocator)
    }

    /// Like [`open`](Self::open), drawing the port from a shared pool
    pub fn open_with_allocator(
        device_id: &str,
        config: &Config,
        allocator: Arc<PortAllocator>,
    ) -> Result<Self> {
        let server = MinitouchServer::new(config.adb.clone(), allocator);
        Self::with_process(server, device_id, &config.connection)
    }
}

impl<P: RemoteProcess> Session<P> {
    /// Start `process` for `device_id` and connect to the port it forwards.
    ///
    /// The process is stopped again if the connection or handshake fails.
    pub fn with_process(mut process: P, device_id: &str, connection: &ConnectionConfig) -> Result<Self> {
        let port = process.start(device_id)?;

        let conn = match MinitouchConnection::open_with_timeout(
            &connection.host,
            port,
            connection.handshake_timeout,
        ) {
            Ok(conn) => conn,
            Err(e) => {
                if let Err(stop_err) = process.stop() {
                    tracing::warn!("Failed to stop minitouch after connect error: {}", stop_err);
                }
                return Err(e);
            }
        };

        tracing::info!(device = device_id, port, "Session open");

        Ok(Self {
            device_id: device_id.to_string(),
            port,
            engine: GestureEngine::with_settle_delay(conn, connection.settle_delay),
            process,
            stopped: false,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Local port forwarded to minitouch
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn capabilities(&self) -> ConnectionCapabilities {
        self.engine.sink().capabilities()
    }

    /// The raw connection, for publishing hand-built batches
    pub fn connection_mut(&mut self) -> &mut MinitouchConnection {
        self.engine.sink_mut()
    }

    pub fn is_alive(&mut self) -> bool {
        !self.stopped && self.process.is_alive()
    }

    pub fn tap(&mut self, points: &[Point], options: TapOptions) -> Result<()> {
        self.engine.tap(points, options)
    }

    pub fn swipe(&mut self, points: &[Point], options: SwipeOptions) -> Result<()> {
        self.engine.swipe(points, options)
    }

    pub fn smooth_swipe(&mut self, points: &[Point], options: SwipeOptions, part: u32) -> Result<()> {
        self.engine.smooth_swipe(points, options, part)
    }

    /// Close the connection and stop minitouch
    pub fn stop(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.engine.sink_mut().close();
        let result = self.process.stop();
        tracing::info!(device = %self.device_id, port = self.port, "Session closed");
        result
    }
}

impl<P: RemoteProcess> Drop for Session<P> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(device = %self.device_id, "Session teardown failed: {}", e);
        }
    }
}

/// Open a session, run `f` with it, and stop the session whatever `f`
/// returns. An error from `f` takes precedence over a teardown error.
pub fn with_session<T, F>(device_id: &str, config: &Config, f: F) -> Result<T>
where
    F: FnOnce(&mut Session) -> Result<T>,
{
    let mut session = Session::open(device_id, config)?;
    let outcome = f(&mut session);
    let teardown = session.stop();
    let value = outcome?;
    teardown?;
    Ok(value)
}
