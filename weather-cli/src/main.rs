//! Binary crate for the `weather-etl` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup and exit codes
//! - Human-friendly preview of the results

use clap::Parser;
use std::process::ExitCode;

mod cli;
mod logger;
mod preview;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = cli::Cli::parse();
    match cmd.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
