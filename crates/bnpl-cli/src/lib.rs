//! bnpl-gold command-line interface
//!
//! ```bash
//! # Bronze events -> Silver table files
//! bnpl-gold ingest --bronze events.jsonl --out silver/
//!
//! # Validate Silver files against the schema registry
//! bnpl-gold validate --silver silver/
//!
//! # Compute every metric for one day
//! bnpl-gold compute --silver silver/ --date 2024-01-01
//!
//! # Recompute a range from scratch
//! bnpl-gold rebuild --silver silver/ --from 2024-01-01 --to 2024-01-31
//!
//! # Check a query against the configured contracts
//! bnpl-gold -c bnpl-gold.toml authorize --consumer insights-bot --class agent --table kpi_daily
//!
//! # Serve HTTP queries
//! bnpl-gold -c bnpl-gold.toml serve --silver silver/
//! ```

pub mod cli;
pub mod error;
pub mod loader;
pub mod platform;

pub use cli::{ExitCode, GoldCli, GoldCommands, OutputFormat};
pub use error::{CliError, Result};
pub use loader::{load_silver, LoadedSilver};
pub use platform::Platform;

use bnpl_core::PlatformConfig;

/// Run the CLI with an already loaded configuration and return the exit code
pub async fn run_cli(cli: GoldCli, config: PlatformConfig) -> ExitCode {
    let platform = match Platform::new(config) {
        Ok(platform) => platform,
        Err(e) => return cli::report_error(&e),
    };
    match cli::run(cli, &platform).await {
        Ok(code) => code,
        Err(e) => cli::report_error(&e),
    }
}
