//! `battleship-server` binary: loads configuration, builds the root logger,
//! binds the listening socket, and hands it to the Admission Controller.
//! Per spec §6's "CLI surface: none required beyond an optional host/port
//! override", this only exposes the three ambient overrides SPEC_FULL.md
//! adds (`--address`, `--config`, `--log-level`).

use battleship_core::admission::AdmissionController;
use battleship_core::config::ServerConfig;
use battleship_core::logging;
use clap::Parser;
use std::net::TcpListener;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "battleship-server", version, about = "Hosts one Battleship match at a time.")]
struct Cli {
    /// Listen address, e.g. 127.0.0.1:5001. Overrides the config file.
    #[arg(long)]
    address: Option<String>,

    /// Path to a TOML configuration file. A missing path falls back to
    /// built-in defaults, not an error.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root logger severity: trace, debug, info, warning, error, critical.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    let log = logging::init(logging::parse_level(&cli.log_level));

    let mut config = ServerConfig::load_or_default(cli.config.as_ref());
    if let Some(address) = cli.address {
        config.server.address = address;
    }

    let listener = match TcpListener::bind(&config.server.address) {
        Ok(listener) => listener,
        Err(err) => {
            slog::crit!(log, "failed to bind listen address"; "address" => config.server.address.as_str(), "error" => %err);
            std::process::exit(1);
        }
    };

    slog::info!(log, "battleship-server listening"; "address" => config.server.address.as_str());

    let shutdown_log = log.clone();
    ctrlc::set_handler(move || {
        slog::info!(shutdown_log, "received interrupt, shutting down");
        std::process::exit(0);
    })
    .expect("failed to install SIGINT handler");

    let controller = AdmissionController::new(&config, log.clone());
    controller.run(listener);
}
