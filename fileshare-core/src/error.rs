// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for fileshare.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for fileshare.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum FileshareError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // =========================================================================
    // Broker Errors
    // =========================================================================
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    // =========================================================================
    // RPC Errors
    // =========================================================================
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors cause immediate process termination.
/// Used when configuration is invalid and the system cannot safely start.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid listen address: {value} - {reason}")]
    InvalidAddress { value: String, reason: String },
}

/// Errors reported by a file store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file name must not be empty")]
    EmptyName,

    #[error("invalid file name '{name}': must not contain path components")]
    InvalidName { name: String },

    #[error("file not found: {name}")]
    NotFound { name: String },

    #[error("storage IO error: {context} - {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Broker errors. A broker error never carries a half-processed message;
/// callers decide whether the operation is retried.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection is closed")]
    ConnectionClosed,

    #[error("Queue not found: {queue}")]
    QueueNotFound { queue: String },

    #[error("Failed to publish to '{queue}': {reason}")]
    PublishFailed { queue: String, reason: String },

    #[error("Failed to consume from '{queue}': {reason}")]
    ConsumeFailed { queue: String, reason: String },

    #[error("Failed to settle delivery: {reason}")]
    SettleFailed { reason: String },

    #[error("Broker connect failed for {address}: {reason}")]
    ConnectFailed { address: String, reason: String },
}

/// Errors observed by an RPC caller.
///
/// A `Timeout` says nothing about whether the server executed the request:
/// the request is neither retried nor cancelled once it has been published.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Timed out after {0:?} waiting for a reply")]
    Timeout(Duration),

    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Client is closed")]
    Closed,
}

impl From<BrokerError> for RpcError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::ConnectFailed { address, reason } => RpcError::Connect { address, reason },
            BrokerError::ConnectionClosed => RpcError::Closed,
            other => RpcError::Transport(other.to_string()),
        }
    }
}

/// Result type alias using FileshareError.
pub type FileshareResult<T> = Result<T, FileshareError>;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result type alias for RPC calls.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::MissingRequiredField {
            field: "request_queue",
            context: "broker section".to_string(),
        };
        assert!(err.to_string().contains("request_queue"));
        assert!(err.to_string().contains("broker section"));
    }

    #[test]
    fn test_error_chain() {
        let storage_err = StorageError::NotFound {
            name: "missing.dat".to_string(),
        };
        let err: FileshareError = storage_err.into();
        assert!(matches!(err, FileshareError::Storage(_)));
        assert!(err.to_string().contains("missing.dat"));
    }

    #[test]
    fn test_broker_error_maps_to_rpc_error() {
        let err: RpcError = BrokerError::ConnectFailed {
            address: "amqp://localhost".to_string(),
            reason: "refused".to_string(),
        }
        .into();
        assert!(matches!(err, RpcError::Connect { .. }));

        let err: RpcError = BrokerError::ConnectionClosed.into();
        assert!(matches!(err, RpcError::Closed));
    }
}
