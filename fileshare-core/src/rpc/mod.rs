// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Request/reply over a message broker.
//!
//! Clients publish requests to one shared durable queue, tagged with a fresh
//! correlation token and the address of a private reply queue. The server
//! consumes that queue and publishes each reply to the queue named by the
//! request, echoing its token.

mod client;
mod server;

pub use client::{AsyncRpcClient, RpcClientOptions};
pub use server::{AsyncRpcServer, RpcServerOptions, ServerHandle, ServerStats};

use std::time::Duration;

/// Request queue shared by every client and server.
pub const DEFAULT_REQUEST_QUEUE: &str = "rpc-file-requests";

/// How long a client waits for a reply by default.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
