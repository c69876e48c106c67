//! Configuration parsing for minitouch-rs
//!
//! This crate handles parsing the KDL configuration file that tells the
//! client where adb lives, which local ports it may forward, and the default
//! gesture parameters.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str, MAX_SMOOTH_PARTS};
