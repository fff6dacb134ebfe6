//! Tierline CLI - Database migrations and maintenance jobs.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! tierline migrate
//!
//! # Refresh the catalog mirror for every active merchant
//! tierline sync catalog
//!
//! # Mark stale draft carts as abandoned
//! tierline sweep abandoned --older-than-hours 72
//! ```
//!
//! The `sync` and `sweep` commands run the same code as the API's
//! background workers, once.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tierline")]
#[command(author, version, about = "Tierline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Pull data from Shopify
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Maintenance sweeps
    Sweep {
        #[command(subcommand)]
        target: SweepTarget,
    },
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Refresh the variant catalog mirror for every active merchant
    Catalog,
}

#[derive(Subcommand)]
enum SweepTarget {
    /// Mark untouched draft carts as abandoned
    Abandoned {
        /// Staleness threshold (defaults to `CART_ABANDON_AFTER_HOURS`)
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tierline_api=info,tierline_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync {
            target: SyncTarget::Catalog,
        } => commands::sync::catalog().await?,
        Commands::Sweep {
            target: SweepTarget::Abandoned { older_than_hours },
        } => commands::sweep::abandoned(older_than_hours).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sweep_threshold() {
        let cli = Cli::try_parse_from(["tierline", "sweep", "abandoned", "--older-than-hours", "24"])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Sweep {
                target: SweepTarget::Abandoned {
                    older_than_hours: Some(24)
                }
            }
        ));
    }
}
