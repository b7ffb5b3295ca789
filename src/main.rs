// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use fabstir_embedding_server::{
    api::{
        shutdown_signal, AppState, Lifecycle, LifecycleState, RequestHandler, ServiceEndpoint,
        ShutdownTrigger,
    },
    config::ServerConfig,
    embeddings::{BoundedEmbedder, EmbeddingModelConfig, EmbeddingModelManager},
    version,
};
use std::{env, process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::load();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🚀 Starting Fabstir Embedding Server...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!();

    let lifecycle = Lifecycle::new();

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        stop_without_serving(&lifecycle);
        return ExitCode::FAILURE;
    }
    info!(
        listen_address = %config.listen_address,
        max_concurrent_requests = config.max_concurrent_requests,
        embed_timeout_ms = config.embed_timeout_ms,
        model = %config.model_identifier,
        "Configuration loaded"
    );

    // Load the embedding model before binding, a missing model is fatal
    println!("🧠 Loading embedding model: {}", config.model_identifier);
    let manager = match EmbeddingModelConfig::from_identifier(
        &config.models_dir,
        &config.model_identifier,
    ) {
        Ok(model_config) => {
            match EmbeddingModelManager::load(model_config, config.pool_config()).await {
                Ok(manager) => manager,
                Err(e) => {
                    error!("Failed to load embedding model: {:#}", e);
                    stop_without_serving(&lifecycle);
                    return ExitCode::FAILURE;
                }
            }
        }
        Err(e) => {
            error!("Invalid model identifier: {:#}", e);
            stop_without_serving(&lifecycle);
            return ExitCode::FAILURE;
        }
    };

    let info = manager.model_info();
    println!(
        "✅ Embedding model loaded: {} ({}D, {} worker(s))",
        info.name, info.dimensions, info.workers
    );

    let embedder = BoundedEmbedder::new(
        manager.embedder(),
        config.max_concurrent_requests,
        config.embed_timeout(),
    );
    let handler = RequestHandler::new(
        Arc::new(embedder),
        config.request_limits(),
        config.max_batch_parallelism,
    );
    let state = AppState::new(handler, lifecycle.clone(), config.max_concurrent_requests)
        .with_model_manager(manager.clone());

    println!("\n🌐 Starting embedding service...");
    let endpoint =
        match ServiceEndpoint::bind(&config.listen_address, state, config.shutdown_grace()).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("{}", e);
                stop_without_serving(&lifecycle);
                return ExitCode::FAILURE;
            }
        };

    let addr = endpoint.local_addr();
    println!("  Embedding:    POST http://{}/v1/embedding", addr);
    println!("  Batch:        POST http://{}/v1/embedding/batch", addr);
    println!("  Health:       GET  http://{}/health", addr);
    println!("\nPress Ctrl+C to shutdown...\n");

    let crashed = manager.crash_token();
    let shutdown = async move {
        tokio::select! {
            _ = shutdown_signal() => {
                println!("\n⏹️  Shutting down...");
                ShutdownTrigger::Signal
            }
            _ = crashed.cancelled() => {
                error!("All inference workers have stopped, shutting down");
                ShutdownTrigger::EmbedderCrashed
            }
        }
    };

    match endpoint.serve(shutdown).await {
        Ok(report) => {
            info!(trigger = ?report.trigger, drained = report.drained, "Shutdown complete");
            if report.exit_code() == 0 {
                println!("👋 Goodbye!");
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!("Embedding service failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn stop_without_serving(lifecycle: &Lifecycle) {
    if let Err(e) = lifecycle.transition(LifecycleState::Stopped) {
        error!("{}", e);
    }
}
