//! Thermolink - Serial telemetry bridge for thermal process controllers
//!
//! Command-line front end: port discovery, a hardware monitor and a
//! simulation monitor that print telemetry as it arrives.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thermolink_core::cli::{print_exit_codes, CliResult, EventPrinter, OutputFormat};
use thermolink_core::{
    AppConfig, ConnectionManager, PortConfig, SerialParity, SessionLogger,
};

/// Thermolink CLI
#[derive(Parser, Debug)]
#[command(
    name = "thermolink",
    version,
    about = "Serial telemetry bridge for thermal process controllers",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session log directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Open a serial port and print telemetry
    Monitor {
        /// Serial port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Parity (none, odd, even)
        #[arg(long)]
        parity: Option<SerialParity>,

        /// Data bits (5-8)
        #[arg(long)]
        data_bits: Option<u8>,

        /// Stop bits (1, 2)
        #[arg(long)]
        stop_bits: Option<u8>,

        /// Exit after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Text to send after opening, terminated with CR LF
        #[arg(short, long)]
        send: Option<String>,
    },

    /// Run the simulator and print telemetry
    Simulate {
        /// Tick interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Exit after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let result = CliResult::from(&e);
            eprintln!("Error: {:#}", e);
            result.to_exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = &cli.log_dir {
        config.logging.directory = Some(dir.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::debug!("Starting {} v{}", thermolink_core::NAME, thermolink_core::VERSION);

    match &cli.command {
        Commands::Ports => list_ports(&cli),
        Commands::Monitor {
            port,
            baud,
            parity,
            data_bits,
            stop_bits,
            duration,
            send,
        } => {
            let config = load_config(&cli)?;
            let mut serial = config.serial.clone();
            if let Some(port) = port {
                serial.port = port.clone();
            }
            if let Some(baud) = baud {
                serial.baud_rate = *baud;
            }
            if let Some(parity) = parity {
                serial.parity = *parity;
            }
            if let Some(bits) = data_bits {
                serial.data_bits = *bits;
            }
            if let Some(bits) = stop_bits {
                serial.stop_bits = *bits;
            }
            monitor(&cli, &config, serial, *duration, send.as_deref())
        }
        Commands::Simulate {
            interval_ms,
            duration,
        } => {
            let config = load_config(&cli)?;
            simulate(&cli, &config, *interval_ms, *duration)
        }
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(())
        }
    }
}

fn list_ports(cli: &Cli) -> anyhow::Result<()> {
    let manager = ConnectionManager::with_system_ports(
        SessionLogger::disabled().shared(),
        Default::default(),
    );
    let ports = manager.list_ports()?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ports)?),
        OutputFormat::Text => {
            if ports.is_empty() {
                eprintln!("No serial ports found.");
            }
            for port in &ports {
                println!("{}", port);
            }
        }
    }
    Ok(())
}

/// Ctrl-C as a channel
fn interrupt_channel() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(rx)
}

/// Block until Ctrl-C or until `duration` seconds have passed
fn wait_for_exit(interrupt: &Receiver<()>, duration: Option<u64>) {
    match duration {
        Some(secs) => {
            let _ = interrupt.recv_timeout(Duration::from_secs(secs));
        }
        None => {
            let _ = interrupt.recv();
        }
    }
}

fn monitor(
    cli: &Cli,
    config: &AppConfig,
    serial: PortConfig,
    duration: Option<u64>,
    send: Option<&str>,
) -> anyhow::Result<()> {
    let interrupt = interrupt_channel()?;
    let manager = ConnectionManager::with_system_ports(config.open_logger(), config.manager_settings());
    if let Some(path) = manager.logger().path() {
        tracing::info!("Logging to {}", path.display());
    }

    let printer = Arc::new(EventPrinter::stdout(cli.format));
    manager.subscribe(&printer);

    tracing::info!("Opening {}", serial.describe());
    manager.open(serial)?;

    if let Some(text) = send {
        manager.write(&format!("{}\r\n", text))?;
    }

    wait_for_exit(&interrupt, duration);

    manager.close();
    let stats = manager.stats();
    tracing::info!(
        "Received {} bytes in {} lines, {} read errors, sent {} bytes",
        stats.bytes_received,
        stats.lines_received,
        stats.read_errors,
        stats.bytes_sent
    );
    manager.shutdown();
    Ok(())
}

fn simulate(
    cli: &Cli,
    config: &AppConfig,
    interval_ms: Option<u64>,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let interrupt = interrupt_channel()?;
    let manager = ConnectionManager::with_system_ports(config.open_logger(), config.manager_settings());

    let printer = Arc::new(EventPrinter::stdout(cli.format));
    manager.subscribe(&printer);

    let mut simulation = config.simulation.clone();
    if let Some(ms) = interval_ms {
        simulation.interval_ms = ms;
    }
    manager.start_simulation(simulation)?;

    wait_for_exit(&interrupt, duration);

    manager.stop_simulation();
    manager.shutdown();
    Ok(())
}
