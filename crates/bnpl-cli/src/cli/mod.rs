//! Command-line interface for the BNPL Gold contract layer

pub mod commands;
pub mod output;

pub use commands::{ClassArg, GoldCli, GoldCommands};
pub use output::{OutputFormat, Render};

use bnpl_core::DateRange;
use std::io;

use crate::error::{CliError, Result};
use crate::platform::Platform;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed cleanly
    Success = 0,
    /// Records rejected, query denied or metrics failed
    Failed = 1,
    /// Completed with warnings (malformed lines, deferred metrics,
    /// dangling references)
    Warnings = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Schema-related errors
    SchemaError = 5,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

fn print<R: Render>(output: &R, format: OutputFormat, code: ExitCode) -> Result<ExitCode> {
    output.render(format, &mut io::stdout().lock())?;
    Ok(code)
}

/// Run a parsed command against a platform
pub async fn run(cli: GoldCli, platform: &Platform) -> Result<ExitCode> {
    let format = cli.format;
    match cli.command {
        GoldCommands::Ingest { bronze, out } => {
            let (output, code) = commands::execute_ingest(platform, &bronze, &out)?;
            print(&output, format, code)
        }
        GoldCommands::Validate { silver } => {
            let (output, code) = commands::execute_validate(platform, &silver)?;
            print(&output, format, code)
        }
        GoldCommands::Compute { silver, date, metric } => {
            let (output, code) =
                commands::execute_compute(platform, &silver, date, metric.as_deref()).await?;
            print(&output, format, code)
        }
        GoldCommands::Rebuild {
            silver,
            from,
            to,
            metric,
        } => {
            let range = DateRange::new(from, to)?;
            let (output, code) =
                commands::execute_rebuild(platform, &silver, range, metric.as_deref()).await?;
            print(&output, format, code)
        }
        GoldCommands::Authorize {
            consumer_id,
            class,
            table,
            fields,
            from,
            to,
            grain,
        } => {
            let filters = commands::authorize_filters(from, to, grain)?;
            let (output, code) = commands::execute_authorize(
                platform,
                &consumer_id,
                class.into(),
                &table,
                &fields,
                &filters,
            )?;
            print(&output, format, code)
        }
        GoldCommands::Serve { silver, bind } => {
            commands::execute_serve(platform, silver.as_deref(), bind).await
        }
    }
}

/// Map a command error to its exit code, reporting it on stderr
pub fn report_error(err: &CliError) -> ExitCode {
    eprintln!("Error: {}", err);
    err.exit_code()
}
