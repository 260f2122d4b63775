use anyhow::{Context, Result};
use clap::Parser;
use headtracker::input::KeyboardInputHandler;
use headtracker::{source, EventBus, HeadTrackerConfig, SessionOptions, TrackingSession, TransportMode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "headtracker")]
#[command(about = "Handheld IMU head tracker streaming 6-DoF pose frames over UDP or USB serial")]
#[command(version)]
#[command(long_about = "Fuses accelerometer and gyroscope samples into yaw, pitch and roll with a \
complementary filter and streams them as 48-byte pose frames to head-tracking software, either \
as UDP datagrams on port 4242 or over a USB serial adapter at 115200 8N1. Volume-key taps and \
touch holds calibrate and pause the stream.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "headtracker.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - open transport and source but don't stream
    #[arg(long, help = "Open the transport and sensor source, then exit without streaming")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file
    #[arg(long, value_name = "PATH", help = "Write logs to a daily rolling file as well")]
    log_file: Option<PathBuf>,

    /// Override transport mode
    #[arg(long, value_name = "MODE", help = "Transport: udp or usb-serial")]
    transport: Option<TransportMode>,

    /// Override destination host
    #[arg(long, value_name = "HOST", help = "Host running the head-tracking software")]
    host: Option<String>,

    /// Override serial adapter
    #[arg(long, value_name = "PATH", help = "Serial adapter to write frames to")]
    serial_device: Option<PathBuf>,

    /// Replay a recording instead of the configured source
    #[arg(long, value_name = "PATH", help = "Replay a JSON-lines sensor recording")]
    replay: Option<PathBuf>,

    /// Enable keyboard gestures
    #[arg(long, help = "Read calibrate/pause gestures from the terminal keyboard")]
    keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting headtracker v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match HeadTrackerConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let mut session = TrackingSession::new(Arc::clone(&event_bus));
    let options = SessionOptions::from(&config);
    let sample_source = source::from_config(&config.source).context("Failed to build sensor source")?;

    if args.dry_run {
        let transport = session
            .dry_run(&options, sample_source.as_ref())
            .await
            .context("Dry run failed")?;
        info!("Dry run mode - transport and source opened but not started");
        println!("✓ Dry run completed successfully - {} via {}", sample_source.name(), transport);
        return Ok(());
    }

    session.start(options, sample_source).await.map_err(|e| {
        error!("Failed to start session: {}", e);
        e
    })?;

    let keyboard = match (config.gesture.keyboard, session.gestures(), session.cancellation_token()) {
        (true, Some(gestures), Some(token)) => {
            let handler =
                KeyboardInputHandler::new(gestures, Arc::clone(&event_bus), token.child_token());
            handler.start().await?;
            Some(handler)
        }
        _ => None,
    };

    start_input_device(&config, &session, &event_bus).await?;

    let reason = session.run_until_shutdown().await.map_err(|e| {
        error!("Session error during shutdown: {}", e);
        e
    })?;

    if let Some(keyboard) = keyboard {
        keyboard.stop().await?;
    }

    info!("headtracker exited: {:?}", reason);
    Ok(())
}

fn apply_overrides(config: &mut HeadTrackerConfig, args: &Args) {
    if let Some(mode) = args.transport {
        config.transport.mode = mode;
    }
    if let Some(host) = &args.host {
        config.transport.host = Some(host.clone());
    }
    if let Some(device) = &args.serial_device {
        config.transport.serial_device = Some(device.clone());
    }
    if let Some(path) = &args.replay {
        config.source.kind = source::SourceKind::Replay;
        config.source.replay_path = Some(path.clone());
    }
    if args.keyboard {
        config.gesture.keyboard = true;
    }
}

#[cfg(all(feature = "evdev-input", target_os = "linux"))]
async fn start_input_device(
    config: &HeadTrackerConfig,
    session: &TrackingSession,
    event_bus: &Arc<EventBus>,
) -> Result<()> {
    use headtracker::input::DeviceInputHandler;

    let (Some(path), Some(gestures), Some(token)) = (
        config.gesture.input_device.as_ref(),
        session.gestures(),
        session.cancellation_token(),
    ) else {
        return Ok(());
    };

    let handler = DeviceInputHandler::new(
        path.display().to_string(),
        gestures,
        Arc::clone(event_bus),
        token.child_token(),
    );
    handler.start().await?;
    Ok(())
}

#[cfg(not(all(feature = "evdev-input", target_os = "linux")))]
async fn start_input_device(
    config: &HeadTrackerConfig,
    _session: &TrackingSession,
    _event_bus: &Arc<EventBus>,
) -> Result<()> {
    if let Some(path) = &config.gesture.input_device {
        warn!(
            "Input device {} configured but this build has no evdev support",
            path.display()
        );
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("headtracker={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    layers.push(fmt_layer);

    let guard = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .context("--log-file must name a file")?;

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Headtracker Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[transport]
# Frame transport: "udp" or "usb_serial"
mode = "udp"
# Host running the head-tracking software (required for udp, port 4242 is fixed)
# host = "192.168.1.20"
# Serial adapter (optional, defaults to the first /dev/ttyUSB* or /dev/ttyACM*)
# serial_device = "/dev/ttyUSB0"

[source]
# Sensor source: "synthetic" or "replay"
kind = "synthetic"
# JSON-lines recording to replay (required for replay)
# replay_path = "capture.jsonl"
# Pace samples in real time
realtime = true
# Synthetic sensor rate in Hz
rate_hz = 200
# Synthetic yaw rotation in degrees per second
yaw_rate_dps = 10.0

[gesture]
# Triple tap direction: "gap_order" or "toggle"
triple_tap_policy = "gap_order"
# Read gestures from the terminal keyboard
keyboard = false
# Linux input device for volume keys and touch (needs the evdev-input feature)
# input_device = "/dev/input/event0"

[system]
# Event bus capacity
event_bus_capacity = 100
# Raw samples buffered between the source and the estimator
sensor_queue_capacity = 1024
"#;

    println!("{}", default_config);
}
