//! KDL configuration parser

use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so we need to extract offset/len manually
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => config.global = parse_global(node)?,
            "connection" => config.connection = parse_connection(node)?,
            "adb" => config.adb = parse_adb(node)?,
            "gesture" => config.gesture = parse_gesture(node)?,
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    for child in children(node) {
        match child.name().value() {
            "log-level" => {
                global.log_level = string_arg(child, "global.log-level")?
                    .parse()
                    .map_err(|message| ConfigError::Invalid { message })?;
            }
            name => {
                tracing::warn!("Unknown global config option: {}", name);
            }
        }
    }

    Ok(global)
}

fn parse_connection(node: &kdl::KdlNode) -> Result<ConnectionConfig, ConfigError> {
    let mut connection = ConnectionConfig::default();

    for child in children(node) {
        match child.name().value() {
            "host" => {
                connection.host = string_arg(child, "connection.host")?.to_string();
            }
            "port-range" => {
                let start = port_arg(child, 0, "connection.port-range")?;
                let end = port_arg(child, 1, "connection.port-range")?;
                if start > end {
                    return Err(ConfigError::Invalid {
                        message: format!("port-range start {} is above end {}", start, end),
                    });
                }
                connection.port_range = start..=end;
            }
            "settle-delay-ms" => {
                connection.settle_delay = millis_arg(child, "connection.settle-delay-ms")?;
            }
            "handshake-timeout-ms" => {
                let timeout = millis_arg(child, "connection.handshake-timeout-ms")?;
                if timeout.is_zero() {
                    return Err(ConfigError::Invalid {
                        message: "handshake-timeout-ms must be greater than zero".to_string(),
                    });
                }
                connection.handshake_timeout = timeout;
            }
            name => {
                tracing::warn!("Unknown connection config option: {}", name);
            }
        }
    }

    Ok(connection)
}

fn parse_adb(node: &kdl::KdlNode) -> Result<AdbConfig, ConfigError> {
    let mut adb = AdbConfig::default();

    for child in children(node) {
        match child.name().value() {
            "executable" => {
                let val = string_arg(child, "adb.executable")?;
                adb.executable = shellexpand::tilde(val).into_owned().into();
            }
            "default-device" => {
                adb.default_device = Some(string_arg(child, "adb.default-device")?.to_string());
            }
            "remote-path" => {
                adb.remote_path = string_arg(child, "adb.remote-path")?.to_string();
            }
            "prebuilt-dir" => {
                let val = string_arg(child, "adb.prebuilt-dir")?;
                adb.prebuilt_dir = Some(shellexpand::tilde(val).into_owned().into());
            }
            "startup-delay-ms" => {
                adb.startup_delay = millis_arg(child, "adb.startup-delay-ms")?;
            }
            name => {
                tracing::warn!("Unknown adb config option: {}", name);
            }
        }
    }

    Ok(adb)
}

/// Largest accepted `gesture.smooth-parts`
pub const MAX_SMOOTH_PARTS: u32 = 1000;

fn parse_gesture(node: &kdl::KdlNode) -> Result<GestureConfig, ConfigError> {
    let mut gesture = GestureConfig::default();

    for child in children(node) {
        match child.name().value() {
            "default-pressure" => {
                gesture.default_pressure = u32_arg(child, 0, "gesture.default-pressure")?;
            }
            "smooth-parts" => {
                let parts = u32_arg(child, 0, "gesture.smooth-parts")?;
                if !(1..=MAX_SMOOTH_PARTS).contains(&parts) {
                    return Err(ConfigError::Invalid {
                        message: format!(
                            "smooth-parts must be between 1 and {}, got {}",
                            MAX_SMOOTH_PARTS, parts
                        ),
                    });
                }
                gesture.smooth_parts = parts;
            }
            name => {
                tracing::warn!("Unknown gesture config option: {}", name);
            }
        }
    }

    Ok(gesture)
}

fn children(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlNode> {
    node.children()
        .into_iter()
        .flat_map(|doc| doc.nodes().iter())
}

fn string_arg<'a>(node: &'a kdl::KdlNode, field: &str) -> Result<&'a str, ConfigError> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::MissingValue {
            field: field.to_string(),
        })
}

fn int_arg(node: &kdl::KdlNode, index: usize, field: &str) -> Result<i64, ConfigError> {
    node.entries()
        .get(index)
        .and_then(|e| e.value().as_i64())
        .ok_or_else(|| ConfigError::MissingValue {
            field: field.to_string(),
        })
}

fn u32_arg(node: &kdl::KdlNode, index: usize, field: &str) -> Result<u32, ConfigError> {
    let val = int_arg(node, index, field)?;
    u32::try_from(val).map_err(|_| ConfigError::Invalid {
        message: format!("{} must be a non-negative 32-bit integer, got {}", field, val),
    })
}

fn port_arg(node: &kdl::KdlNode, index: usize, field: &str) -> Result<u16, ConfigError> {
    let val = int_arg(node, index, field)?;
    match u16::try_from(val) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::Invalid {
            message: format!("{} contains invalid port {}", field, val),
        }),
    }
}

fn millis_arg(node: &kdl::KdlNode, field: &str) -> Result<Duration, ConfigError> {
    let val = int_arg(node, 0, field)?;
    u64::try_from(val)
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid {
            message: format!("{} must not be negative, got {}", field, val),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config_str("").unwrap();

        assert_eq!(config.global.log_level, LogLevel::Warn);
        assert_eq!(config.connection.host, "127.0.0.1");
        assert_eq!(config.connection.port_range, 20000..=20999);
        assert_eq!(config.connection.settle_delay, Duration::from_millis(20));
        assert_eq!(config.adb.remote_path, "/data/local/tmp/minitouch");
        assert_eq!(config.gesture.default_pressure, 100);
        assert_eq!(config.gesture.smooth_parts, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let config = r#"
            global {
                log-level "debug"
            }
            connection {
                host "localhost"
                port-range 30000 30010
                settle-delay-ms 5
                handshake-timeout-ms 500
            }
            adb {
                executable "/opt/platform-tools/adb"
                default-device "emulator-5554"
                remote-path "/data/local/tmp/mt"
                prebuilt-dir "/srv/minitouch/prebuilt"
                startup-delay-ms 250
            }
            gesture {
                default-pressure 50
                smooth-parts 20
            }
        "#;

        let config = parse_config_str(config).unwrap();
        assert_eq!(config.global.log_level, LogLevel::Debug);
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port_range, 30000..=30010);
        assert_eq!(config.connection.settle_delay, Duration::from_millis(5));
        assert_eq!(config.connection.handshake_timeout, Duration::from_millis(500));
        assert_eq!(
            config.adb.executable,
            std::path::PathBuf::from("/opt/platform-tools/adb")
        );
        assert_eq!(config.adb.default_device.as_deref(), Some("emulator-5554"));
        assert_eq!(config.adb.remote_path, "/data/local/tmp/mt");
        assert_eq!(
            config.adb.prebuilt_dir,
            Some(std::path::PathBuf::from("/srv/minitouch/prebuilt"))
        );
        assert_eq!(config.adb.startup_delay, Duration::from_millis(250));
        assert_eq!(config.gesture.default_pressure, 50);
        assert_eq!(config.gesture.smooth_parts, 20);
    }

    #[test]
    fn test_unknown_log_level_fails() {
        let result = parse_config_str(r#"global { log-level "loud" }"#);
        match result {
            Err(ConfigError::Invalid { message }) => assert!(message.contains("loud")),
            other => panic!("Expected Invalid error, got: {:?}", other),
        }
    }

    #[test]
    fn test_reversed_port_range_fails() {
        let result = parse_config_str("connection { port-range 21000 20000 }");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_port_out_of_range_fails() {
        let result = parse_config_str("connection { port-range 20000 70000 }");
        match result {
            Err(ConfigError::Invalid { message }) => assert!(message.contains("70000")),
            other => panic!("Expected Invalid error, got: {:?}", other),
        }
    }

    #[test]
    fn test_port_range_missing_end_fails() {
        let result = parse_config_str("connection { port-range 20000 }");
        match result {
            Err(ConfigError::MissingValue { field }) => {
                assert_eq!(field, "connection.port-range")
            }
            other => panic!("Expected MissingValue error, got: {:?}", other),
        }
    }

    #[test]
    fn test_negative_delay_fails() {
        let result = parse_config_str("connection { settle-delay-ms -1 }");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_smooth_parts_fails() {
        let result = parse_config_str("gesture { smooth-parts 0 }");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_excessive_smooth_parts_fails() {
        let result = parse_config_str("gesture { smooth-parts 1001 }");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let config = parse_config_str("gesture { smooth-parts 1000 }").unwrap();
        assert_eq!(config.gesture.smooth_parts, MAX_SMOOTH_PARTS);
    }

    #[test]
    fn test_string_where_number_expected_fails() {
        let result = parse_config_str(r#"gesture { default-pressure "hard" }"#);
        assert!(matches!(result, Err(ConfigError::MissingValue { .. })));
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let config = r#"
            bluetooth { enabled true }
            gesture {
                vibrate true
                default-pressure 80
            }
        "#;

        let config = parse_config_str(config).unwrap();
        assert_eq!(config.gesture.default_pressure, 80);
    }

    #[test]
    fn test_invalid_kdl_reports_parse_error() {
        let result = parse_config_str("connection { host \"unterminated }");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_tilde_expansion_in_prebuilt_dir() {
        let config = parse_config_str(r#"adb { prebuilt-dir "~/minitouch" }"#).unwrap();
        let path = config.adb.prebuilt_dir.unwrap();

        assert!(
            !path.to_string_lossy().starts_with('~'),
            "Tilde should be expanded, got: {}",
            path.display()
        );
        assert!(path.ends_with("minitouch"));
    }

    #[test]
    fn test_parse_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gesture {{ default-pressure 42 }}").unwrap();

        let config = parse_config(file.path()).unwrap();
        assert_eq!(config.gesture.default_pressure, 42);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = parse_config(&dir.path().join("absent.kdl"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
