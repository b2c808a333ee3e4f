// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fileshare Core Library
//!
//! A small file service (list, upload, download) reachable through two
//! transports: async request/reply over a message broker and synchronous
//! HTTP. Provides the envelopes, the broker abstraction with an in-process
//! broker, the RPC client and server, the HTTP server and client, storage
//! backends, and configuration parsing.

pub mod broker;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod rpc;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use broker::{BrokerConnection, BrokerConnector, MemoryBroker};
pub use config::{BrokerConfig, Config, ConfigLoader, HttpConfig, StorageConfig};
pub use error::{
    BrokerError, FileshareError, FileshareResult, HardValidationError, RpcError, RpcResult,
    StorageError,
};
pub use pool::ConnectionPool;
pub use protocol::{Operation, RequestEnvelope, ResponseEnvelope};
pub use rpc::{AsyncRpcClient, AsyncRpcServer, RpcClientOptions, RpcServerOptions};
pub use service::FileHandler;
pub use storage::{FileStore, LocalStorage, MemoryStorage};
pub use transport::http::{HttpFileClient, HttpFileServer};
pub use transport::{FileTransport, TransportKind};
pub use types::{CorrelationToken, FileName, QueueName};
