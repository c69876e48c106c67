//! Touch injection for Android devices through minitouch
//!
//! This crate provides:
//! - adb plumbing to install and launch minitouch and forward its socket
//! - A blocking connection that parses the minitouch banner
//! - A command builder and gesture engine for taps and swipes
//! - A [`Session`] tying all of the above to one device
//!
//! ```no_run
//! use minitouch_client::{with_session, Point, TapOptions};
//! use minitouch_config::Config;
//!
//! let config = Config::default();
//! with_session("emulator-5554", &config, |session| {
//!     session.tap(&[Point::new(400, 600)], TapOptions::default())
//! })?;
//! # Ok::<(), minitouch_client::MinitouchError>(())
//! ```

pub mod adb;
pub mod builder;
pub mod connection;
pub mod error;
pub mod gesture;
pub mod installer;
pub mod port;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use adb::{Adb, AdbDevice};
pub use builder::CommandBuilder;
pub use connection::{CommandSink, MinitouchConnection};
pub use error::{ErrorKind, MinitouchError, Result};
pub use gesture::{
    interpolate, GestureEngine, SwipeOptions, TapOptions, DEFAULT_SMOOTH_PARTS, MAX_SMOOTH_PARTS,
};
pub use installer::{InstallOutcome, Installer};
pub use port::PortAllocator;
pub use server::{MinitouchServer, RemoteProcess};
pub use session::{with_session, Session};
pub use types::{ConnectionCapabilities, ContactId, Point, DEFAULT_PRESSURE};
