// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Client-side view of the file service, independent of the wire.

pub mod http;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, RpcResult};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// The transports the file service can be reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Synchronous request/response over HTTP.
    Http,
    /// Async request/reply over the message broker.
    Broker,
}

impl TransportKind {
    pub const ALL: [TransportKind; 2] = [TransportKind::Http, TransportKind::Broker];

    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Broker => "broker",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            // "grpc" names the synchronous baseline in older tooling
            "http" | "grpc" => Ok(TransportKind::Http),
            "broker" | "amqp" | "rabbit" => Ok(TransportKind::Broker),
            _ => Err(HardValidationError::InvalidFieldValue {
                field: "transport",
                value: s.to_string(),
                reason: "expected 'http' (or 'grpc') or 'broker' (or 'rabbit')".to_string(),
            }),
        }
    }
}

/// One client session against the file service.
///
/// Service-level failures (missing file, invalid name) come back as
/// `Ok` envelopes with `success == false`; `Err` means the exchange itself
/// failed.
#[async_trait]
pub trait FileTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn execute(&self, request: RequestEnvelope) -> RpcResult<ResponseEnvelope>;

    async fn list(&self) -> RpcResult<ResponseEnvelope> {
        self.execute(RequestEnvelope::list()).await
    }

    async fn upload(&self, name: &str, data: &[u8]) -> RpcResult<ResponseEnvelope> {
        self.execute(RequestEnvelope::upload(name, data.to_vec()))
            .await
    }

    async fn download(&self, name: &str) -> RpcResult<ResponseEnvelope> {
        self.execute(RequestEnvelope::download(name)).await
    }

    async fn close(&self) -> RpcResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("HTTP".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!("amqp".parse::<TransportKind>().unwrap(), TransportKind::Broker);
        assert_eq!("rabbit".parse::<TransportKind>().unwrap(), TransportKind::Broker);
        assert_eq!("grpc".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert!("zeromq".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Broker.to_string(), "broker");
    }
}
