// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Broker RPC client.
//!
//! One client owns one exclusive reply queue and one dispatcher task that
//! demultiplexes replies by correlation token, so a single client can carry
//! any number of concurrent calls. Each call moves from awaiting a reply to
//! either matched or timed out; a reply that arrives for a call that already
//! timed out, or for a token this client never issued, is dropped.
//!
//! Delivery semantics as observed by the caller are at most once: a timed-out
//! request is neither retried nor cancelled, and the server may still act on
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{DEFAULT_REPLY_TIMEOUT, DEFAULT_REQUEST_QUEUE};
use crate::broker::{BrokerConnection, ConsumeOptions, Consumer, Message, QueueSpec};
use crate::error::{RpcError, RpcResult};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::transport::{FileTransport, TransportKind};
use crate::types::{CorrelationToken, QueueName};

type ReplySlot = oneshot::Sender<RpcResult<ResponseEnvelope>>;
type PendingReplies = DashMap<CorrelationToken, ReplySlot>;

/// Client settings.
#[derive(Debug, Clone)]
pub struct RpcClientOptions {
    pub request_queue: QueueName,
    /// Timeout applied by the [`FileTransport`] methods.
    pub reply_timeout: Duration,
}

impl Default for RpcClientOptions {
    fn default() -> Self {
        Self {
            request_queue: QueueName::new(DEFAULT_REQUEST_QUEUE),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// Async request/reply client over a [`BrokerConnection`].
pub struct AsyncRpcClient {
    connection: Arc<dyn BrokerConnection>,
    options: RpcClientOptions,
    reply_queue: QueueName,
    pending: Arc<PendingReplies>,
    dispatcher: JoinHandle<()>,
    closed: AtomicBool,
}

impl AsyncRpcClient {
    /// Declare the request queue and a private reply queue, then start
    /// listening for replies.
    pub async fn connect(
        connection: Arc<dyn BrokerConnection>,
        options: RpcClientOptions,
    ) -> RpcResult<Self> {
        connection
            .declare_queue(QueueSpec::Durable(options.request_queue.clone()))
            .await?;
        let reply_queue = connection.declare_queue(QueueSpec::Exclusive).await?;
        let consumer = connection
            .consume(&reply_queue, ConsumeOptions::auto_ack())
            .await?;

        let pending: Arc<PendingReplies> = Arc::new(DashMap::new());
        let dispatcher = tokio::spawn(dispatch_replies(consumer, Arc::clone(&pending)));

        tracing::debug!(
            request_queue = %options.request_queue,
            reply_queue = %reply_queue,
            "RPC client ready"
        );

        Ok(Self {
            connection,
            options,
            reply_queue,
            pending,
            dispatcher,
            closed: AtomicBool::new(false),
        })
    }

    pub fn reply_queue(&self) -> &QueueName {
        &self.reply_queue
    }

    /// Calls still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send one request and wait up to `timeout` for its reply.
    pub async fn call(
        &self,
        request: RequestEnvelope,
        timeout: Duration,
    ) -> RpcResult<ResponseEnvelope> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RpcError::Closed);
        }

        let body = request
            .to_json()
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        let token = CorrelationToken::mint();
        let (slot, reply) = oneshot::channel();
        self.pending.insert(token.clone(), slot);
        let _pending = PendingGuard {
            pending: &self.pending,
            token: &token,
        };

        let message = Message::json(body)
            .with_correlation_id(token.clone())
            .with_reply_to(self.reply_queue.clone());
        self.connection
            .publish(&self.options.request_queue, message)
            .await?;

        tracing::debug!(
            correlation_id = %token,
            operation = %request.operation,
            "Request published"
        );

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                tracing::warn!(
                    correlation_id = %token,
                    operation = %request.operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for reply"
                );
                Err(RpcError::Timeout(timeout))
            }
        }
    }

    /// Stop listening and release the reply queue. The connection is closed
    /// as well unless something else still holds it.
    pub async fn close(&self) -> RpcResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.dispatcher.abort();
        self.pending.clear();

        if let Err(e) = self.connection.delete_queue(&self.reply_queue).await {
            tracing::debug!(reply_queue = %self.reply_queue, error = %e, "Reply queue delete failed");
        }
        if Arc::strong_count(&self.connection) == 1 {
            self.connection.close().await?;
        }
        Ok(())
    }
}

impl Drop for AsyncRpcClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

#[async_trait]
impl FileTransport for AsyncRpcClient {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    async fn execute(&self, request: RequestEnvelope) -> RpcResult<ResponseEnvelope> {
        self.call(request, self.options.reply_timeout).await
    }

    async fn close(&self) -> RpcResult<()> {
        AsyncRpcClient::close(self).await
    }
}

/// Removes a call's reply slot however the call ends.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    token: &'a CorrelationToken,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.token);
    }
}

async fn dispatch_replies(mut consumer: Consumer, pending: Arc<PendingReplies>) {
    while let Some(delivery) = consumer.recv().await {
        let message = delivery.message;
        let Some(token) = message.correlation_id else {
            tracing::debug!(reply_queue = %consumer.queue(), "Dropping reply without correlation id");
            continue;
        };

        let Some((_, slot)) = pending.remove(&token) else {
            tracing::debug!(correlation_id = %token, "Dropping reply for unknown or expired call");
            continue;
        };

        let result =
            ResponseEnvelope::from_json(&message.body).map_err(|e| RpcError::Decode(e.to_string()));
        // The caller may have given up between the lookup and now
        let _ = slot.send(result);
    }

    tracing::debug!(reply_queue = %consumer.queue(), "Reply consumer ended");
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    async fn client(broker: &MemoryBroker) -> AsyncRpcClient {
        AsyncRpcClient::connect(Arc::new(broker.connect()), RpcClientOptions::default())
            .await
            .unwrap()
    }

    fn reply_body(message: &str) -> Vec<u8> {
        ResponseEnvelope::failure(message).to_json().unwrap()
    }

    #[tokio::test]
    async fn test_replies_are_routed_by_token() {
        let broker = MemoryBroker::new();
        let client = Arc::new(client(&broker).await);

        let server = broker.connect();
        let queue = QueueName::new(DEFAULT_REQUEST_QUEUE);
        let mut requests = server
            .consume(&queue, ConsumeOptions::auto_ack())
            .await
            .unwrap();

        let first = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                client
                    .call(RequestEnvelope::download("a"), Duration::from_secs(5))
                    .await
            }
        });
        let a = requests.recv().await.unwrap().message;

        let second = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                client
                    .call(RequestEnvelope::download("b"), Duration::from_secs(5))
                    .await
            }
        });
        let b = requests.recv().await.unwrap().message;

        // A reply for a token nobody issued goes nowhere
        let stray = Message::json(reply_body("stray"))
            .with_correlation_id(CorrelationToken::mint());
        server.publish(client.reply_queue(), stray).await.unwrap();

        // Answer out of order
        for (request, text) in [(&b, "for b"), (&a, "for a")] {
            let reply = Message::json(reply_body(text))
                .with_correlation_id(request.correlation_id.clone().unwrap());
            server
                .publish(request.reply_to.as_ref().unwrap(), reply)
                .await
                .unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap().message, "for a");
        assert_eq!(second.await.unwrap().unwrap().message, "for b");
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timeout_without_server() {
        let broker = MemoryBroker::new();
        let client = client(&broker).await;

        let err = client
            .call(RequestEnvelope::list(), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout(_)));
        assert_eq!(client.in_flight(), 0);

        // The request stays queued; nothing cancels it
        assert_eq!(broker.queue_depth(DEFAULT_REQUEST_QUEUE), Some(1));
    }

    #[tokio::test]
    async fn test_undecodable_reply_is_a_decode_error() {
        let broker = MemoryBroker::new();
        let client = Arc::new(client(&broker).await);
        let server = broker.connect();
        let mut requests = server
            .consume(&QueueName::new(DEFAULT_REQUEST_QUEUE), ConsumeOptions::auto_ack())
            .await
            .unwrap();

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call(RequestEnvelope::list(), Duration::from_secs(5)).await }
        });
        let request = requests.recv().await.unwrap().message;
        let reply = Message::json(b"{not json".to_vec())
            .with_correlation_id(request.correlation_id.unwrap());
        server.publish(&request.reply_to.unwrap(), reply).await.unwrap();

        assert!(matches!(call.await.unwrap(), Err(RpcError::Decode(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_as_transport_error() {
        let broker = MemoryBroker::new();
        let client = client(&broker).await;

        broker.fail_next_publishes(1);
        let err = client
            .call(RequestEnvelope::list(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_reply_queue_and_connection() {
        let broker = MemoryBroker::new();
        let client = client(&broker).await;
        let reply_queue = client.reply_queue().clone();

        client.close().await.unwrap();
        assert!(!broker.queue_exists(reply_queue.as_str()));

        let err = client
            .call(RequestEnvelope::list(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Closed));
    }
}
