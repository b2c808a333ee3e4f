// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fileshare upload` and `fileshare download` commands.

use std::path::{Path, PathBuf};

use fileshare_core::TransportKind;

use super::{connect, load_config};

pub async fn upload(
    config_path: Option<&Path>,
    transport: TransportKind,
    path: &Path,
    name: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => stored_name(path)?,
    };
    let data = tokio::fs::read(path).await?;
    tracing::info!(file = %name, bytes = data.len(), transport = %transport, "Uploading");

    let client = connect(&config, transport).await?;
    let reply = client.upload(&name, &data).await;
    client.close().await?;
    let reply = reply?;

    if !reply.success {
        eprintln!("✗ Upload failed: {}", reply.message);
        std::process::exit(1);
    }
    println!("✓ {} ({} bytes): {}", name, data.len(), reply.message);
    Ok(())
}

pub async fn download(
    config_path: Option<&Path>,
    transport: TransportKind,
    name: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let client = connect(&config, transport).await?;
    let reply = client.download(name).await;
    client.close().await?;
    let reply = reply?;

    if !reply.success {
        eprintln!("✗ Download failed: {}", reply.message);
        std::process::exit(1);
    }

    let data = reply.payload.unwrap_or_default();
    let target = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(name));
    tokio::fs::write(&target, &data).await?;
    println!("✓ {} → {} ({} bytes)", name, target.display(), data.len());
    Ok(())
}

/// Name a local file is stored under when none is given.
fn stored_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("cannot derive a file name from {}", path.display()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_name() {
        assert_eq!(stored_name(Path::new("/tmp/report.pdf")).unwrap(), "report.pdf");
        assert!(stored_name(Path::new("/")).is_err());
    }
}
