// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process file services for self-contained runs.
//!
//! Starts the HTTP server on an ephemeral loopback port and the broker RPC
//! server on an in-process broker, both over one shared store, so a run can
//! compare the transports without any external infrastructure.

use std::sync::Arc;

use fileshare_core::rpc::ServerHandle;
use fileshare_core::{
    AsyncRpcServer, FileHandler, FileStore, FileshareResult, HttpFileServer, MemoryBroker,
    MemoryStorage, RpcResult, RpcServerOptions,
};

/// Both file servers, running.
pub struct LocalServices {
    http: HttpFileServer,
    rpc: ServerHandle,
    broker: MemoryBroker,
    store: Arc<dyn FileStore>,
}

impl LocalServices {
    /// Start both servers over a fresh in-memory store.
    pub async fn start(options: RpcServerOptions) -> FileshareResult<Self> {
        Self::with_store(Arc::new(MemoryStorage::new()), options).await
    }

    /// Start both servers over `store`.
    pub async fn with_store(
        store: Arc<dyn FileStore>,
        options: RpcServerOptions,
    ) -> FileshareResult<Self> {
        let handler = FileHandler::new(Arc::clone(&store));
        let http = HttpFileServer::bind(([127, 0, 0, 1], 0).into(), handler.clone()).await?;

        let broker = MemoryBroker::new();
        let rpc = start_rpc(&broker, handler, options).await?;

        tracing::info!(http = %http.url(), "Local file services started");
        Ok(Self {
            http,
            rpc,
            broker,
            store,
        })
    }

    pub fn http_url(&self) -> String {
        self.http.url()
    }

    /// The in-process broker the RPC server consumes from.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    pub fn rpc_stats(&self) -> &fileshare_core::rpc::ServerStats {
        self.rpc.stats()
    }

    pub async fn shutdown(self) -> FileshareResult<()> {
        self.rpc.shutdown().await;
        self.http.shutdown().await?;
        tracing::info!("Local file services stopped");
        Ok(())
    }
}

async fn start_rpc(
    broker: &MemoryBroker,
    handler: FileHandler,
    options: RpcServerOptions,
) -> RpcResult<ServerHandle> {
    AsyncRpcServer::new(Arc::new(broker.connect()), handler, options)
        .start()
        .await
}
