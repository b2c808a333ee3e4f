// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Request dispatch shared by the broker and HTTP servers.
//!
//! Every outcome is a [`ResponseEnvelope`]: validation and storage failures
//! become `success: false` replies and never surface as transport faults.

use std::sync::Arc;

use crate::error::StorageError;
use crate::protocol::{Operation, RequestEnvelope, ResponseEnvelope};
use crate::storage::FileStore;
use crate::types::FileName;

/// Reply text for operations no handler implements.
pub const UNKNOWN_OPERATION: &str = "unknown operation";

/// Validates envelopes and dispatches them to a [`FileStore`].
#[derive(Clone)]
pub struct FileHandler {
    store: Arc<dyn FileStore>,
}

impl FileHandler {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// Handle one request. Storage calls run on the blocking pool.
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        match request.operation {
            Operation::List => self.list().await,
            Operation::Upload => {
                let name = request.file_name.unwrap_or_default();
                let payload = request.payload.unwrap_or_default();
                self.upload(name, payload).await
            }
            Operation::Download => {
                let name = request.file_name.unwrap_or_default();
                self.download(name).await
            }
        }
    }

    /// Reply for a request whose operation could not be recognised.
    pub fn unknown_operation(operation: &str) -> ResponseEnvelope {
        tracing::warn!(operation = %operation, "Rejecting unknown operation");
        ResponseEnvelope::failure(UNKNOWN_OPERATION)
    }

    async fn list(&self) -> ResponseEnvelope {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.list()).await {
            Ok(Ok(files)) => {
                tracing::debug!(count = files.len(), "Listed files");
                ResponseEnvelope::listing(files)
            }
            Ok(Err(e)) => ResponseEnvelope::failure(format!("failed to list files: {}", e)),
            Err(e) => ResponseEnvelope::failure(format!("storage task failed: {}", e)),
        }
    }

    async fn upload(&self, name: String, payload: Vec<u8>) -> ResponseEnvelope {
        if name.is_empty() {
            return ResponseEnvelope::failure(StorageError::EmptyName.to_string());
        }
        if payload.is_empty() {
            return ResponseEnvelope::failure("file data must not be empty");
        }
        let file_name = match FileName::new(name) {
            Ok(file_name) => file_name,
            Err(e) => return ResponseEnvelope::failure(e.to_string()),
        };

        let store = Arc::clone(&self.store);
        let size = payload.len();
        let stored = file_name.clone();
        match tokio::task::spawn_blocking(move || store.upload(&stored, &payload)).await {
            Ok(Ok(())) => {
                tracing::info!(file = %file_name, bytes = size, "Upload stored");
                ResponseEnvelope::uploaded(file_name.as_str())
            }
            Ok(Err(e)) => ResponseEnvelope::failure(format!("upload failed: {}", e)),
            Err(e) => ResponseEnvelope::failure(format!("storage task failed: {}", e)),
        }
    }

    async fn download(&self, name: String) -> ResponseEnvelope {
        let file_name = match FileName::new(name) {
            Ok(file_name) => file_name,
            Err(e) => return ResponseEnvelope::failure(e.to_string()),
        };

        let store = Arc::clone(&self.store);
        let requested = file_name.clone();
        match tokio::task::spawn_blocking(move || store.download(&requested)).await {
            Ok(Ok(data)) => {
                tracing::info!(file = %file_name, bytes = data.len(), "Download served");
                ResponseEnvelope::downloaded(file_name.as_str(), data)
            }
            Ok(Err(e)) => ResponseEnvelope::failure(format!("download failed: {}", e)),
            Err(e) => ResponseEnvelope::failure(format!("storage task failed: {}", e)),
        }
    }
}
