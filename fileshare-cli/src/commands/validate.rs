// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fileshare validate` command - Validate configuration file.

use std::path::Path;

use fileshare_core::ConfigLoader;

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Storage:");
            println!("  Data Directory:  {}", config.storage.data_dir.display());
            println!();
            println!("HTTP:");
            println!("  Listen Address:  {}", config.http.listen_addr);
            println!();
            println!("Broker:");
            println!("  URL:             {}", config.broker.url);
            println!("  Request Queue:   {}", config.broker.request_queue.as_str());
            println!("  Prefetch:        {}", config.broker.prefetch);
            println!(
                "  Reply Timeout:   {}ms",
                config.broker.reply_timeout.as_millis()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
