// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fileshare list` command - List stored files.

use std::path::Path;

use fileshare_core::TransportKind;

use super::{connect, load_config};

pub async fn execute(
    config_path: Option<&Path>,
    transport: TransportKind,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let client = connect(&config, transport).await?;

    let reply = client.list().await;
    client.close().await?;
    let reply = reply?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }
    if !reply.success {
        return Err(reply.message.into());
    }

    let files = reply.files.unwrap_or_default();
    if files.is_empty() {
        println!("No files stored.");
        return Ok(());
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ STORED FILES ({:<6})                                        ║", transport.as_str());
    println!("╠══════════════════════════════════════════════════════════════╣");
    for file in &files {
        println!("║ {:<60} ║", file);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Total: {} file(s)", files.len());

    Ok(())
}
