//! Lightning Search command line.
//!
//! Installs, runs and stops the search engine, builds fulltext indexes,
//! seeds demo data and runs searches through the same dispatch path
//! applications use.

mod commands;

use clap::{Parser, Subcommand};
use lightning_core::{LightningError, SearchMode, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lightning")]
#[command(about = "Manage and query the Lightning Search engine")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Check the toolchain, write the default config and build the engine
    Install,
    /// Run the engine (attached unless --daemon)
    Start {
        #[arg(long)]
        daemon: bool,
    },
    /// Stop running engine instances
    Stop,
    /// Stop the engine and remove installed binaries
    Uninstall {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Rebuild fulltext indexes from the current searchable fields
    Index {
        /// Entity type; all configured types when omitted
        entity_type: Option<String>,

        /// Remove the indexes instead
        #[arg(long)]
        drop: bool,
    },
    /// Build the engine and bulk-insert generated companies
    Seed {
        #[arg(default_value_t = 1_000_000)]
        count: usize,

        /// Use the installed binary as-is
        #[arg(long)]
        skip_compile: bool,

        /// Target table (engine default when omitted)
        #[arg(long)]
        table: Option<String>,
    },
    /// Search one entity type
    Search {
        entity_type: String,
        query: String,

        /// engine or embedded (configured default when omitted)
        #[arg(short, long)]
        mode: Option<SearchMode>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match commands::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Process exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<LightningError>()
        .map(|e| e.exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["lightning", "seed"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert_eq!(
            cli.command,
            Command::Seed {
                count: 1_000_000,
                skip_compile: false,
                table: None
            }
        );
    }

    #[test]
    fn test_parse_search_mode_aliases() {
        let cli =
            Cli::try_parse_from(["lightning", "search", "companies", "lon", "--mode", "eloquent"])
                .unwrap();
        assert_eq!(
            cli.command,
            Command::Search {
                entity_type: "companies".into(),
                query: "lon".into(),
                mode: Some(SearchMode::Embedded),
            }
        );
        assert!(Cli::try_parse_from(["lightning", "search", "c", "q", "--mode", "x"]).is_err());
    }

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let missing = anyhow::Error::new(LightningError::BinaryNotFound {
            path: PathBuf::from("bin/lightning-search"),
        });
        assert_eq!(exit_code(&missing), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
