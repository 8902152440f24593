// linkd - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # linkd
//!
//! Device activation and companion coordination daemon for Linux network
//! links.
//!
//! This is the main entry point for the daemon.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use linkd::models::{self, PlatformBackend};
use linkd::{platform, Daemon, DaemonConfig, APP_NAME, VERSION};

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
    println!();
    println!("Device activation and companion coordination daemon for Linux.");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS]",
        env::args().next().unwrap_or_else(|| APP_NAME.to_string())
    );
    println!();
    println!("Device activation and companion coordination daemon for Linux.");
    println!();
    println!("Options:");
    println!("  -h, --help          Show this help message and exit");
    println!("  -v, --version       Show version information and exit");
    println!("  -d, --debug         Enable debug logging");
    println!("  -c, --config PATH   Read configuration from PATH");
    println!("      --dry-run       Keep link changes in memory only");
    println!("      --dump          Print the device table as JSON and exit");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG            Set log level (trace, debug, info, warn, error)");
    println!();
    println!("Report bugs to: https://github.com/christosdaggas/linkd/issues");
}

/// Default configuration path under XDG_CONFIG_HOME.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(models::CONFIG_DIR_NAME).join(models::CONFIG_FILE_NAME))
}

/// Load the configuration. A missing default file is not an error.
fn load_config(explicit: Option<PathBuf>) -> Result<DaemonConfig, models::Error> {
    match explicit {
        Some(path) => DaemonConfig::load_from_file(&path),
        None => match default_config_path() {
            Some(path) if path.exists() => DaemonConfig::load_from_file(&path),
            _ => Ok(DaemonConfig::default()),
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let mut debug_mode = false;
    let mut dry_run = false;
    let mut dump = false;
    let mut config_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => {
                debug_mode = true;
            }
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Option '{}' requires a path.", arg);
                    return ExitCode::FAILURE;
                }
            },
            "--dry-run" => {
                dry_run = true;
            }
            "--dump" => {
                dump = true;
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Try '--help' for more information.");
                return ExitCode::FAILURE;
            }
        }
    }

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging with appropriate level
    let directive = if debug_mode {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut config = config;
    if dry_run || dump {
        config.platform.backend = PlatformBackend::Memory;
    }
    tracing::debug!("Platform backend: {}", config.platform.backend.as_str());

    let platform = platform::from_config(&config);
    let mut daemon = Daemon::new(config, platform);

    if dump {
        daemon.discover();
        let result = daemon.snapshot_json();
        daemon.shutdown();
        return match result {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
