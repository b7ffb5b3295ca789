// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;
use tracing::info;

use crate::api::{BatchPolicy, EmbeddingBatchRequest};
use crate::client::EmbeddingClient;

/// Values shown per vector
pub const PREVIEW_LEN: usize = 5;

/// Arguments for the embed command
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Text to embed
    pub prompt: String,

    /// Print the full vector instead of a preview
    #[arg(long)]
    pub full: bool,
}

/// Arguments for the batch command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Texts to embed, in order
    #[arg(required = true)]
    pub prompts: Vec<String>,

    /// Keep going when individual prompts fail
    #[arg(long)]
    pub partial: bool,

    /// Print full vectors instead of previews
    #[arg(long)]
    pub full: bool,
}

pub fn connect(server: &str, timeout_secs: u64) -> Result<EmbeddingClient> {
    EmbeddingClient::with_timeout(server, Duration::from_secs(timeout_secs))
        .with_context(|| format!("Failed to create client for {}", server))
}

/// Formats a vector for display, truncated unless `full`
pub fn preview(embedding: &[f32], full: bool) -> String {
    let shown = if full {
        embedding
    } else {
        &embedding[..embedding.len().min(PREVIEW_LEN)]
    };
    let values: Vec<String> = shown.iter().map(|v| format!("{:.6}", v)).collect();
    let suffix = if shown.len() < embedding.len() { ", ..." } else { "" };
    format!("[{}{}] ({} dims)", values.join(", "), suffix, embedding.len())
}

pub async fn embed(client: &EmbeddingClient, args: EmbedArgs) -> Result<()> {
    info!(server = client.base_url(), "Requesting embedding");
    let embedding = client
        .get_embedding(&args.prompt)
        .await
        .context("GetEmbedding failed")?;

    println!("{}", preview(&embedding, args.full));
    Ok(())
}

pub async fn batch(client: &EmbeddingClient, args: BatchArgs) -> Result<()> {
    let policy = if args.partial {
        BatchPolicy::PartialSuccess
    } else {
        BatchPolicy::FailFast
    };
    let request = EmbeddingBatchRequest::new(args.prompts.iter().cloned()).with_policy(policy);

    info!(
        server = client.base_url(),
        prompts = request.prompts.len(),
        "Requesting batch embedding"
    );
    let response = client
        .get_embedding_batch_with(&request)
        .await
        .context("GetEmbeddingBatch failed")?;

    for (prompt, slot) in args.prompts.iter().zip(&response.embeddings) {
        match &slot.error {
            None => println!("{:?}: {}", prompt, preview(&slot.embedding, args.full)),
            Some(err) => println!("{:?}: ❌ {} ({})", prompt, err.message, err.error_type),
        }
    }
    if response.failed_count() > 0 {
        println!(
            "\n⚠️  {} of {} prompts failed",
            response.failed_count(),
            response.len()
        );
    }
    Ok(())
}

pub async fn health(client: &EmbeddingClient) -> Result<()> {
    let health = client.health().await.context("Health check failed")?;
    println!("Status:     {}", health.status);
    println!("State:      {}", health.state);
    println!("Model:      {} ({}D)", health.model, health.dimensions);
    println!("Version:    {}", health.version);
    Ok(())
}
