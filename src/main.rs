//! Prahari - streaming AKI alerting client
//!
//! Connects to a hospital MLLP feed, keeps durable per-patient state,
//! scores each lab result with the configured model, and pages the clinical
//! response team on positive predictions.

use prahari::app::App;
use prahari::config::AppConfig;
use prahari::error::Result;
use std::env;
use std::path::Path;

/// Command-line options
struct Options {
    config_path: String,
    evaluate: bool,
}

/// Parse options from command line arguments.
///
/// Supports:
/// - `prahari <path>` (positional config path)
/// - `prahari --config <path>` (flag-based)
/// - `prahari -c <path>` (short flag)
/// - `prahari --evaluate` (print detection summary at shutdown)
///
/// Defaults to `/etc/prahari.toml` if no path is given.
fn parse_options() -> Options {
    let args: Vec<String> = env::args().collect();
    let mut config_path = "/etc/prahari.toml".to_string();
    let mut evaluate = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = args[i + 1].clone();
                i += 1;
            }
            "--evaluate" => evaluate = true,
            positional if !positional.starts_with('-') => {
                config_path = positional.to_string();
            }
            unknown => log::warn!("Ignoring unknown argument: {}", unknown),
        }
        i += 1;
    }

    Options {
        config_path,
        evaluate,
    }
}

fn main() -> Result<()> {
    let options = parse_options();

    let config = if Path::new(&options.config_path).exists() {
        AppConfig::from_file(&options.config_path)?
    } else {
        AppConfig::deployment_defaults()
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("Prahari v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", options.config_path);

    let mut app = App::new(config, options.evaluate)?;
    app.run()
}
