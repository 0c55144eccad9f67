//! ==============================================================================
//! main.rs - gauge station entry point
//! ==============================================================================
//!
//! purpose:
//!     unattended acquisition host for two vacuum gauge controllers sharing
//!     one RS-485 line. polls both on a fixed schedule, pushes a throttled
//!     status line to an external endpoint and archives every sample to a
//!     csv file that rotates once a day.
//!
//! responsibilities:
//!     - parse the command line and load station.toml
//!     - set up logging
//!     - open the serial port (or the simulated gauges)
//!     - start the operator console and hand everything to the scheduler
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                     gauge-station                         │
//!     │  ┌────────────┐   commands   ┌─────────────────────────┐  │
//!     │  │  console   │ ───────────> │       scheduler         │  │
//!     │  │ (Ctrl-C)   │    (mpsc)    │  poll ─ throttle ─ csv  │  │
//!     │  └────────────┘              └───────────┬─────────────┘  │
//!     └──────────────────────────────────────────┼────────────────┘
//!                                                │ 19200 8N1
//!                                   ┌────────────┴────────────┐
//!                                   ▼                         ▼
//!                             ┌──────────┐             ┌──────────┐
//!                             │ gauge 1  │             │ gauge 2  │
//!                             └──────────┘             └──────────┘
//!
//! exit codes:
//!     0 on operator quit, non-zero when the config is invalid, the port
//!     cannot be opened or the port fails mid-run.
//!
//! ==============================================================================

mod archive;
mod config;
mod control;
mod crc;
mod domain;
mod error;
mod frame;
mod publisher;
mod rotation;
mod scheduler;
mod throttle;
mod transport;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::archive::CsvArchive;
use crate::config::{Overrides, StationConfig};
use crate::publisher::{LogPublisher, Publisher, WebhookPublisher};
use crate::scheduler::Scheduler;
use crate::transport::{SerialTransport, SimulatedTransport, Transport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to station.toml (default: ./config/station.toml, then ../config/station.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Serial port the gauges are attached to
    #[arg(short, long)]
    port: Option<String>,

    /// Directory for the rotated csv files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Answer queries from simulated gauges instead of opening a port
    #[arg(long)]
    simulate: bool,

    /// Log status lines instead of publishing them
    #[arg(long)]
    no_publish: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            interval_seconds: self.interval,
            port: self.port.clone(),
            output_dir: self.output_dir.clone(),
            simulate: self.simulate,
            no_publish: self.no_publish,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // startup banner
    println!("===========================================================");
    println!("  Gauge Station - Pressure Acquisition");
    println!("===========================================================");

    // step 1: configuration
    let mut config = match &args.config {
        Some(path) => StationConfig::load(path)?,
        None => StationConfig::load_or_default(),
    };

    // step 2: logging, RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.apply_overrides(&args.overrides());
    config.validate().context("Invalid station configuration")?;
    config.print_summary();

    // step 3: collaborators
    let transport: Box<dyn Transport> = if config.serial.simulate {
        let gauges = SimulatedTransport::new();
        match config.serial.simulate_miss_every {
            Some(n) => Box::new(gauges.with_miss_every(n)),
            None => Box::new(gauges),
        }
    } else {
        let port = SerialTransport::open(&config.serial)
            .with_context(|| format!("Cannot start without the gauges on {}", config.serial.port))?;
        Box::new(port)
    };

    let publisher: Box<dyn Publisher> = if config.publish.enabled {
        tracing::info!("[STARTUP] ✓ Publishing to {}", config.publish.url);
        Box::new(WebhookPublisher::new(&config.publish))
    } else {
        tracing::info!("[STARTUP] Publishing disabled, status lines go to the debug log");
        Box::new(LogPublisher)
    };

    let archive = Box::new(CsvArchive::new(&config.rotation.output_dir, &config.gauges));
    tracing::info!("[STARTUP] ✓ Archiving to {}", archive.dir().display());

    // step 4: operator console
    let (tx, rx) = mpsc::channel(8);
    let console = control::spawn_console(tx);
    println!("{}", control::HINT);

    // step 5: acquisition loop
    let mut scheduler = Scheduler::new(&config, transport, publisher, archive, rx);
    let outcome = scheduler.run().await;
    console.abort();

    outcome.context("Acquisition stopped on a serial port fault")?;
    println!("[SHUTDOWN] ✓ Data collection ended");
    Ok(())
}
