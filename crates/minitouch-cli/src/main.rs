//! minitouch CLI
//!
//! Drive touch input on Android devices through minitouch.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use minitouch_client::{
    with_session, Adb, InstallOutcome, Installer, MinitouchError, Point, SwipeOptions, TapOptions,
    MAX_SMOOTH_PARTS,
};
use minitouch_config::Config;

#[derive(Parser, Debug)]
#[command(name = "minitouch")]
#[command(about = "Touch injection for Android devices via minitouch")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "~/.config/minitouch/config.kdl")]
    config: String,

    /// Device serial (defaults to adb.default-device, then the only attached device)
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List devices known to adb
    Devices {
        #[arg(long)]
        json: bool,
    },

    /// Make sure the minitouch binary is on the device
    Install,

    /// Connect and print the touch capabilities of the device
    Info {
        #[arg(long)]
        json: bool,
    },

    /// Tap one or more points at once
    ///
    /// Put `--` before the points when one starts with a minus sign.
    Tap {
        /// Points as `x,y`, one contact each
        #[arg(required = true, value_name = "X,Y")]
        points: Vec<Point>,

        #[arg(long)]
        pressure: Option<u32>,

        /// Hold time in milliseconds
        #[arg(long)]
        duration: Option<u64>,

        /// Leave the contacts down
        #[arg(long)]
        no_up: bool,
    },

    /// Drag one contact through a list of points
    ///
    /// Put `--` before the points when one starts with a minus sign.
    Swipe {
        /// Points as `x,y`
        #[arg(required = true, value_name = "X,Y")]
        points: Vec<Point>,

        #[arg(long)]
        pressure: Option<u32>,

        /// Pause in milliseconds after each move
        #[arg(long)]
        duration: Option<u64>,

        /// The contact is already down
        #[arg(long)]
        no_down: bool,

        /// Leave the contact down at the end
        #[arg(long)]
        no_up: bool,

        /// Interpolate between the given points
        #[arg(long)]
        smooth: bool,

        /// Steps per segment for --smooth
        #[arg(
            long,
            requires = "smooth",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SMOOTH_PARTS))
        )]
        part: Option<u32>,
    },

    /// Send protocol text as-is (`\n` escapes are expanded)
    Raw { text: String },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: std::path::PathBuf = shellexpand::tilde(&cli.config).into_owned().into();
    let config = load_config(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.global.log_level.as_filter())
            }),
        )
        .init();

    let device = cli.device;
    let result = match cli.command {
        Commands::Validate => {
            cmd_validate(&config_path, &config);
            Ok(())
        }
        Commands::Devices { json } => cmd_devices(&config, json),
        Commands::Install => cmd_install(&config, device),
        Commands::Info { json } => cmd_info(&config, device, json),
        Commands::Tap {
            points,
            pressure,
            duration,
            no_up,
        } => {
            let options = TapOptions {
                pressure: pressure.unwrap_or(config.gesture.default_pressure),
                duration,
                no_up,
            };
            cmd_tap(&config, device, &points, options)
        }
        Commands::Swipe {
            points,
            pressure,
            duration,
            no_down,
            no_up,
            smooth,
            part,
        } => {
            let options = SwipeOptions {
                pressure: pressure.unwrap_or(config.gesture.default_pressure),
                duration,
                no_down,
                no_up,
            };
            let part = smooth.then(|| part.unwrap_or(config.gesture.smooth_parts));
            cmd_swipe(&config, device, &points, options, part)
        }
        Commands::Raw { text } => cmd_raw(&config, device, &text),
    };

    result.map_err(|e| miette::miette!("{:#}", e))
}

/// Parse the config file, or fall back to defaults when it does not exist
fn load_config(path: &Path) -> miette::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    minitouch_config::parse_config(path).map_err(miette::Report::new)
}

fn cmd_validate(config_path: &Path, config: &Config) {
    if config_path.exists() {
        println!("Configuration is valid: {}", config_path.display());
    } else {
        println!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
    }

    let connection = &config.connection;
    println!("  Log level: {}", config.global.log_level.as_filter());
    println!(
        "  Connection: {} ports {}..={}",
        connection.host,
        connection.port_range.start(),
        connection.port_range.end()
    );
    println!("  adb: {}", config.adb.executable.display());
    println!(
        "  Default device: {}",
        config.adb.default_device.as_deref().unwrap_or("<auto>")
    );
    println!("  Remote path: {}", config.adb.remote_path);
    if let Some(dir) = &config.adb.prebuilt_dir {
        println!("  Prebuilt dir: {}", dir.display());
    }
    println!(
        "  Gestures: pressure {}, {} smooth parts",
        config.gesture.default_pressure, config.gesture.smooth_parts
    );
}

fn cmd_devices(config: &Config, json: bool) -> anyhow::Result<()> {
    let devices = Adb::new(&config.adb.executable)
        .list_devices()
        .context("Failed to list devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices attached");
    }
    for device in &devices {
        println!("  {}\t{}", device.serial, device.state);
    }
    Ok(())
}

fn cmd_install(config: &Config, device: Option<String>) -> anyhow::Result<()> {
    let serial = resolve_device(config, device)?;
    let adb = Adb::new(&config.adb.executable).with_serial(&serial);
    let installer = Installer::new(
        &adb,
        &config.adb.remote_path,
        config.adb.prebuilt_dir.as_deref(),
    );

    match installer
        .ensure_installed()
        .with_context(|| format!("Failed to install minitouch on {}", serial))?
    {
        InstallOutcome::AlreadyPresent => {
            println!("minitouch already installed at {}", config.adb.remote_path)
        }
        InstallOutcome::Installed { abi } => println!(
            "Installed minitouch ({}) at {}",
            abi, config.adb.remote_path
        ),
    }
    Ok(())
}

fn cmd_info(config: &Config, device: Option<String>, json: bool) -> anyhow::Result<()> {
    let serial = resolve_device(config, device)?;
    let (port, caps) = with_session(&serial, config, |session| {
        Ok((session.port(), session.capabilities()))
    })
    .with_context(|| format!("Failed to open a session on {}", serial))?;

    if json {
        let info = serde_json::json!({
            "device": serial,
            "port": port,
            "capabilities": caps,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Device: {}", serial);
    println!("  Forwarded port: {}", port);
    println!("  minitouch pid: {}", caps.pid);
    println!("  Max contacts: {}", caps.max_contacts);
    println!("  Max x/y: {} x {}", caps.max_x, caps.max_y);
    println!("  Max pressure: {}", caps.max_pressure);
    Ok(())
}

fn cmd_tap(
    config: &Config,
    device: Option<String>,
    points: &[Point],
    options: TapOptions,
) -> anyhow::Result<()> {
    let serial = resolve_device(config, device)?;
    with_session(&serial, config, |session| session.tap(points, options))
        .with_context(|| format!("Tap failed on {}", serial))
}

fn cmd_swipe(
    config: &Config,
    device: Option<String>,
    points: &[Point],
    options: SwipeOptions,
    part: Option<u32>,
) -> anyhow::Result<()> {
    let serial = resolve_device(config, device)?;
    with_session(&serial, config, |session| match part {
        Some(part) => session.smooth_swipe(points, options, part),
        None => session.swipe(points, options),
    })
    .with_context(|| format!("Swipe failed on {}", serial))
}

fn cmd_raw(config: &Config, device: Option<String>, text: &str) -> anyhow::Result<()> {
    let serial = resolve_device(config, device)?;
    let text = unescape_newlines(text);
    let pause = Duration::from_millis(total_wait_ms(&text)) + config.connection.settle_delay;

    let response = with_session(&serial, config, |session| {
        let response = session.connection_mut().send(&text)?;
        std::thread::sleep(pause);
        Ok(response)
    })
    .with_context(|| format!("Failed to send commands to {}", serial))?;

    if !response.is_empty() {
        print!("{}", String::from_utf8_lossy(&response));
    }
    Ok(())
}

/// `--device`, then `adb.default-device`, then the only ready device
fn resolve_device(config: &Config, device: Option<String>) -> anyhow::Result<String> {
    if let Some(serial) = device.or_else(|| config.adb.default_device.clone()) {
        return Ok(serial);
    }

    let devices = Adb::new(&config.adb.executable)
        .list_devices()
        .context("Failed to list devices")?;
    let mut ready = devices.into_iter().filter(|d| d.is_ready());

    match (ready.next(), ready.next()) {
        (Some(only), None) => {
            tracing::info!(device = %only.serial, "Using the only attached device");
            Ok(only.serial)
        }
        (None, _) => Err(MinitouchError::NoDevice {
            reason: "no device attached".to_string(),
        }
        .into()),
        (Some(_), Some(_)) => Err(MinitouchError::NoDevice {
            reason: "several devices attached, pick one with --device".to_string(),
        }
        .into()),
    }
}

/// Turn literal `\n` sequences typed on a shell into newlines
fn unescape_newlines(text: &str) -> String {
    let mut text = text.replace("\\n", "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Sum of the `w <ms>` lines in raw protocol text
fn total_wait_ms(text: &str) -> u64 {
    text.lines()
        .filter_map(|line| line.strip_prefix("w "))
        .filter_map(|ms| ms.trim().parse::<u64>().ok())
        .sum()
}
