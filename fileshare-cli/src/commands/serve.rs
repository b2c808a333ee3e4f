// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fileshare serve` command - Start the file servers.
//!
//! Serves one directory-backed store through HTTP, the broker, or both, until
//! Ctrl+C.

use std::path::Path;
use std::sync::Arc;

use fileshare_core::{
    AsyncRpcServer, FileHandler, HttpFileServer, LocalStorage, RpcServerOptions, TransportKind,
};

use super::{broker_connection, load_config};

pub async fn execute(
    config_path: Option<&Path>,
    only: Option<TransportKind>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Fail fast on invalid config
    let config = load_config(config_path)?;
    let wants = |kind: TransportKind| only.map_or(true, |only| only == kind);

    let storage = LocalStorage::open(config.storage.data_dir.clone())?;
    let handler = FileHandler::new(Arc::new(storage));
    tracing::info!(data_dir = %config.storage.data_dir.display(), "Storage ready");

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              FILESHARE SERVER                                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Data directory: {}", config.storage.data_dir.display());

    let http = if wants(TransportKind::Http) {
        let server = HttpFileServer::bind(config.http.listen_addr, handler.clone()).await?;
        println!("  ● http    → {}", server.url());
        Some(server)
    } else {
        None
    };

    let rpc = if wants(TransportKind::Broker) {
        let connection = broker_connection(&config.broker.url).await?;
        let options = RpcServerOptions {
            request_queue: config.broker.request_queue.clone(),
            prefetch: config.broker.prefetch,
        };
        let server = AsyncRpcServer::new(Arc::clone(&connection), handler, options)
            .start()
            .await?;
        println!(
            "  ● broker  → queue '{}' (prefetch {})",
            config.broker.request_queue.as_str(),
            config.broker.prefetch
        );
        Some((server, connection))
    } else {
        None
    };

    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    tokio::signal::ctrl_c().await?;

    println!();
    println!("Shutting down...");
    tracing::info!("Shutting down file servers");

    if let Some((server, connection)) = rpc {
        print!("  Stopping broker server... ");
        server.shutdown().await;
        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "Closing broker connection failed");
        }
        println!("done");
    }
    if let Some(server) = http {
        print!("  Stopping HTTP server... ");
        server.shutdown().await?;
        println!("done");
    }

    println!();
    println!("Fileshare stopped.");
    Ok(())
}
