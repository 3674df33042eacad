//! penta-fan Daemon (penta-fand)
//!
//! Keeps a single enclosure fan matched to the hottest of the CPU and the
//! drives. Runs as a long-lived service under systemd.
//!
//! # Startup
//! - Load `/etc/penta-fan/penta-fan.toml` (defaults when absent)
//! - Apply wiring overrides from the environment and the env file
//! - Initialize the fan actuator; failure here is fatal
//!
//! # Shutdown
//! SIGINT/SIGTERM stop the control loop between cycles. The fan is set to 0
//! and the actuator released before exit.

mod control_loop;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use pf_core::constants::paths;
use pf_core::{collect_env_overrides, Config, FanActuator, SystemSensors, ThermalEngine};
use tracing::{info, warn};

use crate::control_loop::{run_control_loop, ControlContext, ShutdownSignal};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "PENTAFAN_LOG";

const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

// ============================================================================
// CLI
// ============================================================================

struct Args {
    config: PathBuf,
    env_file: PathBuf,
    dump_config: bool,
}

fn print_help() {
    eprintln!("penta-fand {} - Thermal fan control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    penta-fand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH     Configuration file (default {})", paths::CONFIG_FILE);
    eprintln!("        --env-file PATH   Hardware override env file (default {})", paths::ENV_FILE);
    eprintln!("        --dump-config     Print the effective configuration as JSON and exit");
    eprintln!("    -v, --version         Print version");
    eprintln!("    -h, --help            Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}          Log level (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    HARDWARE_PWM=1        Use sysfs hardware PWM instead of GPIO software PWM");
    eprintln!("    PWMCHIP, PWM_CHANNEL  Hardware PWM chip and channel");
    eprintln!("    FAN_CHIP, FAN_LINE    GPIO chip and line for software PWM");
}

fn print_version() {
    println!("penta-fand {}", VERSION);
}

/// Parse arguments, returning `None` when the process should exit successfully
fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config: PathBuf::from(paths::CONFIG_FILE),
        env_file: PathBuf::from(paths::ENV_FILE),
        dump_config: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            }
            "-v" | "--version" => {
                print_version();
                return None;
            }
            "--dump-config" => parsed.dump_config = true,
            "-c" | "--config" | "--env-file" => {
                let flag = args[i].clone();
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                };
                if flag == "--env-file" {
                    parsed.env_file = PathBuf::from(value);
                } else {
                    parsed.config = PathBuf::from(value);
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    Some(parsed)
}

// ============================================================================
// Setup
// ============================================================================

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        // stderr is captured by journald when running as a service
        eprintln!("PANIC at {}: {}", location, message);
    }));
}

/// Initialize tracing, preferring the systemd journal; returns whether it is in use
fn init_logging(log_level: &str) -> bool {
    use tracing_subscriber::prelude::*;

    if Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

/// Plain stderr logging for one-shot commands, keeping stdout for their output
fn stderr_dispatch<W>(log_level: &str, writer: W) -> tracing::Dispatch
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_env_filter(log_level)
        .with_writer(writer)
        .finish();
    tracing::Dispatch::new(subscriber)
}

/// Hardware access needs root; warn rather than refuse so dry runs still work
fn check_privileges() {
    // SAFETY: geteuid has no preconditions and only returns the effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Running as euid={}; PWM, GPIO and smartctl access will likely fail", euid);
    }
}

/// Load the config file and apply the hardware overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let overrides = collect_env_overrides(&args.env_file)
        .with_context(|| format!("Failed to read env file {}", args.env_file.display()))?;
    config
        .apply_env_overrides(&overrides)
        .context("Invalid hardware override")?;

    Ok(config)
}

fn log_config(config: &Config) {
    info!(
        "CONFIG: fan {} mode {:?}, interval {}ms",
        if config.general.fan_enabled { "enabled" } else { "disabled" },
        config.general.mode,
        config.general.interval_ms
    );
    info!("CONFIG: CPU thresholds {:?} °C", config.fan.as_array());
    info!("CONFIG: drive thresholds {:?} °C", config.fan_ssd.as_array());
    let t = &config.thermal;
    info!(
        "CONFIG: hysteresis {:.1}°C, dead-band {:.1}°C, up {:.0}%+{:.0}%/°C (max {:.0}%), down {:.0}%, hold {:.0}s",
        t.hysteresis_c,
        t.deadband_c,
        t.up_rate_base_per_cycle * 100.0,
        t.up_rate_trend_gain * 100.0,
        t.up_rate_max_per_cycle * 100.0,
        t.down_rate_per_cycle * 100.0,
        t.cooldown_hold_sec
    );
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    install_panic_hook();

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if args.dump_config {
        if let Err(e) = tracing::dispatcher::set_global_default(stderr_dispatch(&log_level, std::io::stderr)) {
            eprintln!("Failed to initialize logging: {}", e);
        }
        let config = load_config(&args)?;
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let use_journald = init_logging(&log_level);

    info!("STARTUP: penta-fand {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });
    check_privileges();

    let config = load_config(&args)?;
    log_config(&config);

    let backend = config.actuator_backend();
    let actuator = FanActuator::new(&backend)
        .with_context(|| format!("Failed to initialize fan actuator ({:?})", backend))?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let handler_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        handler_signal.trigger();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let mut ctx = ControlContext::new(
        Arc::new(SystemSensors::new()),
        ThermalEngine::from_config(&config),
        actuator,
        config.control_interval(),
    );
    run_control_loop(&mut ctx, shutdown).await;

    info!("SHUTDOWN: penta-fand terminated gracefully");
    Ok(())
}
