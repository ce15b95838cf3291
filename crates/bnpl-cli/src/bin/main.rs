//! bnpl-gold entry point
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Records rejected, query denied or metrics failed
//! - 2: Completed with warnings
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 5: Schema-related errors
//! - 10: Internal error

use anyhow::Context;
use bnpl_cli::{run_cli, GoldCli};
use bnpl_core::{LogFormat, LoggingConfig, PlatformConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn load_config(cli: &GoldCli) -> anyhow::Result<PlatformConfig> {
    match &cli.config {
        Some(path) => PlatformConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            let mut config = PlatformConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level, raised by `-v`
fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = GoldCli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging, cli.verbose);

    let exit_code = run_cli(cli, config).await;
    std::process::exit(exit_code.into());
}
