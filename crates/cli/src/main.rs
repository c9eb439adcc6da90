//! Rightsizer CLI
//!
//! Submits optimize requests to the rightsizer service and renders
//! the recommendations, or checks service health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, optimize};
use std::path::PathBuf;

/// Rightsizer CLI
#[derive(Parser)]
#[command(name = "rsz")]
#[command(author, version, about = "CLI for the Rightsizer recommendation service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via RSZ_API_URL env var)
    #[arg(long, env = "RSZ_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a rightsizing recommendation for one resource
    Optimize {
        /// Kind of resource described by the input
        kind: optimize::ResourceKindArg,

        /// JSON request file, `-` for stdin
        #[arg(long, short)]
        input: PathBuf,

        /// Correlation id echoed by the service (generated if absent)
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Show service health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;
    if cli.verbose {
        output::print_info(&format!("Using API at {}", cli.api_url));
    }

    let result = match cli.command {
        Commands::Optimize {
            kind,
            input,
            request_id,
        } => optimize::optimize(&client, kind, &input, request_id, cli.format).await,
        Commands::Health => health::show_health(&client, cli.format).await,
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
