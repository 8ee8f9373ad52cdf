//! Motor supervisor for a Modbus-RTU BLDC driver.
//!
//! Runs three threads around one shared register transport:
//! - the supervisor control loop
//! - operator input from stdin (one speed per line, `q` to stop)
//! - a telemetry logger polling RPM and direction read-back
//!
//! # Usage
//!
//! ```bash
//! cargo run --features cli --bin motor_supervisor -- --port /dev/ttyUSB0 --speed 120
//! RUST_LOG=bldc_supervisor=debug cargo run --features cli --bin motor_supervisor -- --config motor.toml
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bldc_supervisor::hal::{ModbusRtuLink, MonotonicClock};
use bldc_supervisor::{
    command_channel, run_operator_input, CancelToken, Config, MotorDriver, RegisterTransport,
    Supervisor, SupervisorOutcome, TelemetryPoller,
};

#[derive(Parser)]
#[command(
    name = "motor_supervisor",
    about = "Keep a BLDC motor reversing on sustained stalls"
)]
struct Cli {
    /// TOML configuration file. Defaults apply to missing keys.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device, overriding the configuration
    #[arg(long, value_name = "PATH")]
    port: Option<String>,

    /// Initial speed, overriding the configuration
    #[arg(long, value_name = "N")]
    speed: Option<u16>,

    /// Reversal budget, overriding the configuration
    #[arg(long, value_name = "N")]
    max_reversals: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let link = ModbusRtuLink::open(&config.link)
        .with_context(|| format!("failed to open serial port '{}'", config.link.port))?;
    let transport = Arc::new(RegisterTransport::new(
        link,
        config.link.unit_id,
        config.link.lock_timeout(),
    ));
    let driver = MotorDriver::new(transport, config.registers);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("failed to install Ctrl-C handler")?;
    }

    let (tx, rx) = command_channel((&config.speed).into());
    let mut supervisor = Supervisor::new(
        driver.clone(),
        &config,
        rx,
        cancel.clone(),
        MonotonicClock::new(),
    )
    .context("invalid configuration")?;

    // Blocks on stdin; never joined so a pending read cannot hold up exit.
    thread::Builder::new().name("operator".into()).spawn({
        let cancel = cancel.clone();
        move || {
            tracing::info!("enter a speed per line, 'q' to stop");
            let stdin = io::stdin();
            run_operator_input(stdin.lock(), &tx, &cancel)
        }
    })?;

    let telemetry = config.telemetry.enabled.then(|| {
        let poller = TelemetryPoller::new(
            driver.clone(),
            MonotonicClock::new(),
            config.telemetry.poll_interval(),
        );
        let cancel = cancel.clone();
        thread::Builder::new().name("telemetry".into()).spawn(move || {
            poller.run(&cancel, |frame| {
                tracing::info!(
                    t_ms = frame.at_ms,
                    rpm = frame.rpm,
                    direction = frame.direction.map(|d| d.as_str()),
                    "telemetry"
                );
            })
        })
    });

    let outcome = thread::Builder::new()
        .name("supervisor".into())
        .spawn(move || supervisor.run())?
        .join()
        .map_err(|_| anyhow::anyhow!("supervisor thread panicked"))?;

    // Stop the poller whichever way the loop ended.
    cancel.cancel();
    if let Some(handle) = telemetry {
        let _ = handle?.join();
    }

    match outcome {
        SupervisorOutcome::BudgetExhausted { reversals, shutdown } => {
            tracing::info!(reversals, clean = shutdown.is_clean(), "reversal budget exhausted");
        }
        SupervisorOutcome::Cancelled { from, shutdown } => {
            tracing::info!(state = %from, clean = shutdown.is_clean(), "stopped");
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = &cli.port {
        config.link.port = port.clone();
    }
    if let Some(speed) = cli.speed {
        config.speed.initial = speed;
    }
    if let Some(max) = cli.max_reversals {
        config.reversal.max_reversals = max;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}
