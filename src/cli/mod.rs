// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Fabstir embedding service CLI
#[derive(Parser, Debug)]
#[command(name = "embed-cli")]
#[command(version = "1.0.0")]
#[command(about = "Client tools for the Fabstir embedding service", long_about = None)]
pub struct Cli {
    /// Embedding service address, host:port or URL
    #[arg(
        long,
        global = true,
        env = "EMBEDDING_SERVER_ADDR",
        default_value = "http://localhost:50051"
    )]
    pub server: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed a single prompt
    Embed(commands::EmbedArgs),

    /// Embed several prompts in one request
    Batch(commands::BatchArgs),

    /// Show service health and the loaded model
    Health,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let client = commands::connect(&cli.server, cli.timeout_secs)?;
    match cli.command {
        Commands::Embed(args) => commands::embed(&client, args).await,
        Commands::Batch(args) => commands::batch(&client, args).await,
        Commands::Health => commands::health(&client).await,
    }
}
