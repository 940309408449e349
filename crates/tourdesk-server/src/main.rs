use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use tourdesk_core::{quote, state_machine, AgencyId, ProposalId, ProposalStatus, QuoteRequest};
use tourdesk_server::{init_tracing, start_server, ServerConfig};
use tourdesk_store::{connect, migrations, CrmStore, StatusHistory};

/// Tourdesk - CRM for travel agencies
#[derive(Parser, Debug)]
#[command(name = "tourdesk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "TOURDESK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the expiry sweeper
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Print the proposal status transition table
    Transitions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Price a quote request read from a JSON file
    Quote {
        /// File holding `{"items": [...], "discount": ...}`
        file: PathBuf,
    },

    /// Check the hash chain of a proposal's status history
    VerifyHistory {
        #[arg(long)]
        agency: AgencyId,

        #[arg(long)]
        proposal: ProposalId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    match cli.command {
        Command::Serve => {
            init_tracing(config.log_format);
            for key in &config.defaulted {
                info!("{key} not set, using default");
            }
            start_server(config).await
        }
        Command::Migrate => {
            init_tracing(config.log_format);
            let pool = connect(&config.database_url, 1).await?;
            migrations::run_pending(&pool).await?;
            pool.close().await;
            println!("Migrations applied to {}", config.database_url);
            Ok(())
        }
        Command::Transitions { json } => {
            print_transitions(json)?;
            Ok(())
        }
        Command::Quote { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let request: QuoteRequest = serde_json::from_str(&text)
                .with_context(|| format!("invalid quote request in {}", file.display()))?;
            let quote = quote(&request)?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
            Ok(())
        }
        Command::VerifyHistory { agency, proposal } => {
            let pool = connect(&config.database_url, 1).await?;
            let store = CrmStore::new(pool);
            let report = store.verify_history(agency, proposal).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                bail!(
                    "status history of proposal {proposal} is broken at entry {}",
                    report.first_invalid_index.unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn print_transitions(json: bool) -> Result<()> {
    let table: IndexMap<ProposalStatus, Vec<ProposalStatus>> = ProposalStatus::ALL
        .into_iter()
        .map(|from| (from, state_machine::allowed_transitions(from)))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    for (from, allowed) in &table {
        let targets: Vec<_> = allowed.iter().map(ToString::to_string).collect();
        let targets = if targets.is_empty() {
            "(terminal)".to_string()
        } else {
            targets.join(", ")
        };
        println!("{from:<17} -> {targets}");
    }
    Ok(())
}
