use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spdlog::{error, info, warn};

use folio::logger::configure_logger;
use folio::server::server_run;

use crate::config::open_config;

mod config;

const CFG_FILE_NAME: &str = "folio.toml";

/// Serves a directory of Markdown posts as a blog
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to folio.toml. Searched next to the binary, in the working
    /// directory and in the user config directory when left out
    #[arg(short, long)]
    config_path: Option<PathBuf>,
}

#[ntex::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match open_config(args.config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}. Pass --config-path or see folio --help", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = configure_logger(&config) {
        warn!("Logging to the console only, file sinks failed: {}", err);
    }

    info!("folio {} serving {} from {}", env!("CARGO_PKG_VERSION"), config.site.host, config.paths.content_dir.display());
    info!("Listening on {}:{}", config.server.address, config.server.port);

    match server_run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Server stopped: {}", err);
            ExitCode::FAILURE
        }
    }
}
