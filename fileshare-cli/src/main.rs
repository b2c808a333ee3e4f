// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fileshare CLI
//!
//! Command-line interface for serving and using the fileshare service.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fileshare_core::TransportKind;

mod commands;

/// Fileshare - file service over a message broker and HTTP
#[derive(Parser)]
#[command(name = "fileshare")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the file servers
    Serve {
        /// Serve only through this transport (both when omitted)
        #[arg(short, long)]
        transport: Option<TransportKind>,
    },

    /// List stored files
    List {
        /// Transport to call through
        #[arg(short, long, default_value = "http")]
        transport: TransportKind,

        /// Print the raw response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a local file
    Upload {
        /// Path of the file to send
        path: PathBuf,

        /// Name to store it under (the file name of `path` by default)
        #[arg(short, long)]
        name: Option<String>,

        /// Transport to call through
        #[arg(short, long, default_value = "http")]
        transport: TransportKind,
    },

    /// Download a stored file
    Download {
        /// Name of the stored file
        name: String,

        /// Where to write it (the stored name in the current directory by
        /// default)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Transport to call through
        #[arg(short, long, default_value = "http")]
        transport: TransportKind,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { transport } => commands::serve::execute(config, transport).await,
        Commands::List { transport, json } => {
            commands::list::execute(config, transport, json).await
        }
        Commands::Upload {
            path,
            name,
            transport,
        } => commands::transfer::upload(config, transport, &path, name.as_deref()).await,
        Commands::Download {
            name,
            output,
            transport,
        } => commands::transfer::download(config, transport, &name, output.as_deref()).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
