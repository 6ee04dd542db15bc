//! External control runner
//!
//! Opens an external control session, streams the configured number of
//! sine-offset cycles while alternating control modes, and stops in order.
//! Ctrl+C ends the stream early but still performs the stop handshake.

use anyhow::{Context, Result};
use clap::Parser;
use extctl::{
    spawn_forwarder, Config, ConsoleTelemetry, ControlSession, SimulatedRobot, TelemetrySink,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "extctl")]
#[command(about = "External real-time control client - sine offset streaming with control mode switching")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "EXTCTL_CONFIG")]
    config: Option<String>,

    /// Override the number of control cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Print JSON telemetry to stdout
    #[arg(long)]
    telemetry: bool,

    /// Pretty-print telemetry records
    #[arg(long)]
    pretty: bool,

    /// Log every control cycle
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn get_config_path(&self) -> String {
        self.config
            .clone()
            .unwrap_or_else(|| "config/default_config.yaml".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.get_config_path();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    info!("External Control Client");
    info!("{}", "=".repeat(50));
    info!("Using config: {}", config_path);

    let mut config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    if let Some(cycles) = args.cycles {
        config.motion.cycles = cycles;
    }
    if args.telemetry {
        config.telemetry.enabled = true;
    }
    if args.pretty {
        config.telemetry.pretty = true;
    }

    let shutdown_signal = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown_signal);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, stopping after the current cycle");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let (mut sink, forwarder) = if config.telemetry.enabled {
        let publisher = if config.telemetry.pretty {
            ConsoleTelemetry::pretty()
        } else {
            ConsoleTelemetry::new()
        };
        let (sink, handle) = spawn_forwarder(&config.telemetry, Box::new(publisher));
        (sink, Some(handle))
    } else {
        (TelemetrySink::disabled(), None)
    };

    let mut robot = SimulatedRobot::new(config.connection.clone(), config.simulator.clone());
    let mut session = ControlSession::new(config);

    // The cycle loop blocks on the link, keep it off the async workers
    let shutdown = Arc::clone(&shutdown_signal);
    let (result, dropped) = tokio::task::spawn_blocking(move || {
        let result = session.run(&mut robot, &mut sink, &shutdown);
        (result, sink.dropped())
    })
    .await
    .context("Control task panicked")?;

    if let Some(handle) = forwarder {
        match handle.await {
            Ok(published) => info!("Published {} telemetry records", published),
            Err(e) => warn!("Telemetry forwarder failed: {}", e),
        }
    }
    if dropped > 0 {
        warn!("{} telemetry records dropped", dropped);
    }

    match result {
        Ok(report) => {
            info!(
                "Session {} complete: {} cycles, {} mode switches{}",
                report.session_id,
                report.summary.cycles_completed,
                report.summary.mode_switches,
                if report.summary.interrupted { " (interrupted)" } else { "" }
            );
            Ok(())
        }
        Err(e) => {
            error!("Session failed with ret code {}: {}", e.return_code().code(), e);
            Err(e.into())
        }
    }
}
