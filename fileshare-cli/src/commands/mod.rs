// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod list;
pub mod serve;
pub mod transfer;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use fileshare_core::{
    AsyncRpcClient, BrokerConnection, Config, ConfigLoader, FileTransport, FileshareResult,
    HttpFileClient, RpcClientOptions, TransportKind,
};

/// Load `path`, or the defaults when no file was given.
pub fn load_config(path: Option<&Path>) -> FileshareResult<Config> {
    match path {
        Some(path) => ConfigLoader::load_file(path),
        None => Ok(Config::default()),
    }
}

/// Open a client session through `kind`.
pub async fn connect(
    config: &Config,
    kind: TransportKind,
) -> Result<Box<dyn FileTransport>, Box<dyn std::error::Error>> {
    match kind {
        TransportKind::Http => {
            let url = format!("http://{}", config.http.listen_addr);
            tracing::debug!(url = %url, "Connecting over HTTP");
            Ok(Box::new(HttpFileClient::new(
                url,
                config.broker.reply_timeout,
            )?))
        }
        TransportKind::Broker => {
            let connection = broker_connection(&config.broker.url).await?;
            let options = RpcClientOptions {
                request_queue: config.broker.request_queue.clone(),
                reply_timeout: config.broker.reply_timeout,
            };
            Ok(Box::new(AsyncRpcClient::connect(connection, options).await?))
        }
    }
}

#[cfg(feature = "amqp")]
pub async fn broker_connection(
    url: &str,
) -> Result<Arc<dyn BrokerConnection>, Box<dyn std::error::Error>> {
    tracing::debug!(url = %url, "Connecting to broker");
    let connection = fileshare_core::broker::AmqpConnection::connect(url).await?;
    Ok(Arc::new(connection))
}

#[cfg(not(feature = "amqp"))]
pub async fn broker_connection(
    url: &str,
) -> Result<Arc<dyn BrokerConnection>, Box<dyn std::error::Error>> {
    Err(format!(
        "cannot reach broker at {}: fileshare was built without the `amqp` feature",
        url
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.http.listen_addr.port(), 50051);
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.yaml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fileshare.yaml");
        std::fs::write(&path, "http:\n  listen_addr: 127.0.0.1:8080\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.http.listen_addr.port(), 8080);
    }

    #[cfg(not(feature = "amqp"))]
    #[tokio::test]
    async fn test_broker_needs_amqp_feature() {
        assert!(broker_connection("amqp://localhost").await.is_err());
    }
}
