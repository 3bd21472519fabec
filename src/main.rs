//! Binary entrypoint for the linksim CLI.
//!
//! Commands:
//! - `init` - write a starter `linksim.toml`
//! - `ports` - list serial ports, ordered by number
//! - `send [--port <path>] [--source <n>]` - frame stdin and transmit it
//! - `receive [--port <path>]` - print text recovered from a port
//! - `simulate [TEXT] [--json]` - send and receive over an in-memory line
//!
//! See the library crate docs for module-level details: `linksim::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
#[cfg(feature = "serial")]
use log::warn;

use linksim::config::Config;
use linksim::station::{simulate, StationSettings};

#[derive(Parser)]
#[command(name = "linksim")]
#[command(about = "Simulated data-link layer: framing, bit stuffing, Hamming FEC and CSMA/CD")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "linksim.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// List available serial ports
    Ports,
    /// Read text from stdin and transmit it in 7-character frames
    Send {
        /// Transmit port (defaults to serial.tx_port)
        #[arg(short, long)]
        port: Option<String>,
        /// Source address, taken modulo 16 (defaults to link.source, then the port number)
        #[arg(short, long)]
        source: Option<u32>,
    },
    /// Print text recovered from a port until it closes
    Receive {
        /// Receive port (defaults to serial.rx_port)
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Run a sender and a receiver over an in-memory line
    Simulate {
        /// Text to send; read from stdin when absent
        text: Option<String>,
        /// Fixed RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init writes the file; every other command reads it if present.
    let config = match cli.command {
        Commands::Init => None,
        _ => match Config::load(&cli.config).await {
            Ok(config) => Some(config),
            Err(e) if tokio::fs::metadata(&cli.config).await.is_ok() => return Err(e),
            Err(_) => None,
        },
    };
    init_logging(&config, cli.verbose);
    let config = config.unwrap_or_default();

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Ports => {
            #[cfg(feature = "serial")]
            {
                let names = linksim::transport::serial::available_port_names()?;
                if names.is_empty() {
                    println!("No serial ports found");
                }
                for name in names {
                    match linksim::transport::port_number(&name) {
                        Some(n) => println!("{:>3}  {}", n, name),
                        None => println!("  -  {}", name),
                    }
                }
            }
            #[cfg(not(feature = "serial"))]
            return Err(anyhow!("Listing ports requires the 'serial' feature"));
        }
        Commands::Send { port, source } => {
            #[cfg(feature = "serial")]
            run_send(&config, port, source).await?;
            #[cfg(not(feature = "serial"))]
            {
                let _ = (port, source);
                return Err(anyhow!("Sending requires the 'serial' feature"));
            }
        }
        Commands::Receive { port } => {
            #[cfg(feature = "serial")]
            run_receive(&config, port).await?;
            #[cfg(not(feature = "serial"))]
            {
                let _ = port;
                return Err(anyhow!("Receiving requires the 'serial' feature"));
            }
        }
        Commands::Simulate { text, seed, json } => {
            let text = match text {
                Some(text) => text,
                None => tokio::task::spawn_blocking(|| {
                    std::io::read_to_string(std::io::stdin())
                })
                .await
                .map_err(|e| anyhow!("stdin task failed: {}", e))??,
            };
            let mut settings = StationSettings::from_config(&config, 0);
            if seed.is_some() {
                settings.seed = seed;
            }
            let report = simulate(settings, text).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.text);
                println!(
                    "frames sent {}, received {}, corrected {}, collisions {}, abandoned bytes {}",
                    report.frames_sent,
                    report.stats.frames_received,
                    report.stats.frames_corrected,
                    report.stats.collisions,
                    report.stats.bytes_abandoned
                );
                if !report.unsent.is_empty() {
                    println!("unsent: {:?}", report.unsent);
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "serial")]
async fn run_send(config: &Config, port: Option<String>, source: Option<u32>) -> Result<()> {
    use linksim::errors::LinkError;
    use linksim::metrics::LinkStats;
    use linksim::station::Sender;
    use linksim::transport::serial::SerialTransport;
    use linksim::transport::LogSink;
    use std::io::BufRead;
    use std::sync::Arc;

    let port = port.unwrap_or_else(|| config.serial.tx_port.clone());
    let transport =
        SerialTransport::open(&port, config.serial.baud_rate, config.serial.read_timeout())?;
    let mut settings = StationSettings::from_config(config, transport.number());
    if let Some(source) = source {
        settings.source = linksim::station::wrap_source(source);
    }
    info!("Sending on {} as source {}", port, settings.source);

    let stats = Arc::new(LinkStats::new());
    let mut sender = Sender::new(&settings, stats.clone());
    tokio::task::spawn_blocking(move || -> Result<()> {
        for line in std::io::stdin().lock().lines() {
            let mut line = line?;
            line.push('\n');
            match sender.send_text(&transport, &line, Some(&LogSink)) {
                Ok(_) => {}
                Err(e @ LinkError::InvalidInput(_)) => warn!("skipping line: {}", e),
                Err(e) => return Err(e.into()),
            }
        }
        if !sender.pending().is_empty() {
            warn!(
                "{} characters left unsent: {}",
                sender.pending().len(),
                linksim::logutil::escape_log(sender.pending())
            );
        }
        Ok(())
    })
    .await
    .map_err(|e| anyhow!("send task failed: {}", e))??;

    let snap = stats.snapshot();
    info!(
        "Sent {} frames, {} bytes ({} collisions, {} abandoned bytes)",
        snap.frames_sent, snap.bytes_sent, snap.collisions, snap.bytes_abandoned
    );
    Ok(())
}

#[cfg(feature = "serial")]
async fn run_receive(config: &Config, port: Option<String>) -> Result<()> {
    use linksim::metrics::LinkStats;
    use linksim::station::receiver;
    use linksim::transport::serial::SerialTransport;
    use linksim::transport::LogSink;
    use std::io::Write;
    use std::sync::Arc;

    let port = port.unwrap_or_else(|| config.serial.rx_port.clone());
    let transport =
        SerialTransport::open(&port, config.serial.baud_rate, config.serial.read_timeout())?;
    let settings = StationSettings::from_config(config, transport.number());
    info!("Receiving on {} ({} check sequence)", port, settings.fcs);

    let stats = Arc::new(LinkStats::new());
    let mut receiver = receiver(&settings, stats.clone());
    tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        receiver.run(&transport, Some(&LogSink), |frame| {
            let _ = write!(stdout, "{}", frame.decoded.text);
            let _ = stdout.flush();
        })
    })
    .await
    .map_err(|e| anyhow!("receive task failed: {}", e))??;

    let snap = stats.snapshot();
    info!(
        "Received {} frames from {} bytes ({} corrected, {} discarded)",
        snap.frames_received, snap.bytes_received, snap.frames_corrected, snap.buffers_discarded
    );
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
