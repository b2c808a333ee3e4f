// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Broker RPC server.
//!
//! Acknowledgement policy:
//! - a request is acked only after its reply has been published
//! - a reply publish failure nacks with requeue, so the request is redelivered
//!   and may execute more than once
//! - a body that does not decode is nacked without requeue
//!
//! With the default prefetch of 1 the server holds at most one unacknowledged
//! request and handles requests in arrival order. A larger prefetch handles up
//! to that many requests concurrently and gives up the ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::DEFAULT_REQUEST_QUEUE;
use crate::broker::{BrokerConnection, ConsumeOptions, Delivery, Message, QueueSpec};
use crate::error::RpcResult;
use crate::protocol::{EnvelopeError, RequestEnvelope, ResponseEnvelope};
use crate::service::FileHandler;
use crate::types::QueueName;

/// Server settings.
#[derive(Debug, Clone)]
pub struct RpcServerOptions {
    pub request_queue: QueueName,
    pub prefetch: u16,
}

impl Default for RpcServerOptions {
    fn default() -> Self {
        Self {
            request_queue: QueueName::new(DEFAULT_REQUEST_QUEUE),
            prefetch: 1,
        }
    }
}

/// Counters for settled requests.
#[derive(Debug, Default)]
pub struct ServerStats {
    acked: AtomicU64,
    requeued: AtomicU64,
    rejected: AtomicU64,
}

impl ServerStats {
    /// Requests answered and acknowledged.
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Requests handed back to the broker after a failed reply publish.
    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    /// Undecodable requests dropped without requeue.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Consumes the request queue and answers through [`FileHandler`].
pub struct AsyncRpcServer {
    connection: Arc<dyn BrokerConnection>,
    handler: FileHandler,
    options: RpcServerOptions,
}

impl AsyncRpcServer {
    pub fn new(
        connection: Arc<dyn BrokerConnection>,
        handler: FileHandler,
        options: RpcServerOptions,
    ) -> Self {
        Self {
            connection,
            handler,
            options,
        }
    }

    /// Subscribe to the request queue and serve until the handle is shut
    /// down or the subscription ends.
    pub async fn start(self) -> RpcResult<ServerHandle> {
        let queue = self
            .connection
            .declare_queue(QueueSpec::Durable(self.options.request_queue.clone()))
            .await?;
        let mut consumer = self
            .connection
            .consume(&queue, ConsumeOptions::manual(self.options.prefetch))
            .await?;

        tracing::info!(
            queue = %queue,
            prefetch = self.options.prefetch,
            "RPC server consuming"
        );

        let stats = Arc::new(ServerStats::default());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let worker = Arc::new(Worker {
            connection: self.connection,
            handler: self.handler,
            stats: Arc::clone(&stats),
        });
        let sequential = self.options.prefetch <= 1;

        let task = tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    delivery = consumer.recv() => delivery,
                    _ = shutdown_rx.wait_for(|stop| *stop) => break,
                };
                let Some(delivery) = delivery else {
                    tracing::warn!(queue = %queue, "Request subscription ended");
                    break;
                };

                if sequential {
                    worker.process(delivery).await;
                } else {
                    let worker = Arc::clone(&worker);
                    tokio::spawn(async move { worker.process(delivery).await });
                }
            }
            tracing::info!(queue = %queue, "RPC server stopped");
        });

        Ok(ServerHandle {
            shutdown: shutdown_tx,
            task,
            stats,
        })
    }
}

/// Running server.
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<ServerStats>,
}

impl ServerHandle {
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Stop consuming. A request being handled when this is called finishes
    /// first; anything still queued stays on the broker.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "RPC server task failed");
        }
    }
}

struct Worker {
    connection: Arc<dyn BrokerConnection>,
    handler: FileHandler,
    stats: Arc<ServerStats>,
}

impl Worker {
    async fn process(&self, mut delivery: Delivery) {
        let correlation_id = delivery.message.correlation_id.clone();
        let correlation = correlation_id
            .as_ref()
            .map(|token| token.as_str())
            .unwrap_or("-");

        let reply = match RequestEnvelope::from_json(&delivery.message.body) {
            Ok(request) => {
                tracing::debug!(
                    correlation_id = %correlation,
                    operation = %request.operation,
                    redelivered = delivery.redelivered,
                    "Handling request"
                );
                self.handler.handle(request).await
            }
            Err(EnvelopeError::UnknownOperation(operation)) => {
                FileHandler::unknown_operation(&operation)
            }
            Err(e @ EnvelopeError::Malformed(_)) => {
                tracing::warn!(correlation_id = %correlation, error = %e, "Rejecting undecodable request");
                self.reply_best_effort(&delivery.message, ResponseEnvelope::failure(e.to_string()))
                    .await;
                if let Err(e) = delivery.nack(false).await {
                    tracing::warn!(correlation_id = %correlation, error = %e, "Nack failed");
                }
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let Some(reply_to) = delivery.message.reply_to.clone() else {
            tracing::warn!(correlation_id = %correlation, "Request has no reply address; dropping reply");
            self.settle_ack(&mut delivery, correlation).await;
            return;
        };

        let body = match reply.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(correlation_id = %correlation, error = %e, "Failed to encode reply");
                self.settle_requeue(&mut delivery, correlation).await;
                return;
            }
        };

        let mut message = Message::json(body);
        message.correlation_id = correlation_id.clone();

        match self.connection.publish(&reply_to, message).await {
            Ok(()) => self.settle_ack(&mut delivery, correlation).await,
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation,
                    reply_to = %reply_to,
                    error = %e,
                    "Reply publish failed; requeueing request"
                );
                self.settle_requeue(&mut delivery, correlation).await;
            }
        }
    }

    /// Error reply for a request we cannot decode; failures are only logged.
    async fn reply_best_effort(&self, request: &Message, reply: ResponseEnvelope) {
        let Some(reply_to) = request.reply_to.as_ref() else {
            return;
        };
        let Ok(body) = reply.to_json() else {
            return;
        };
        let mut message = Message::json(body);
        message.correlation_id = request.correlation_id.clone();
        if let Err(e) = self.connection.publish(reply_to, message).await {
            tracing::debug!(reply_to = %reply_to, error = %e, "Error reply not delivered");
        }
    }

    async fn settle_ack(&self, delivery: &mut Delivery, correlation: &str) {
        match delivery.ack().await {
            Ok(()) => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(correlation_id = %correlation, error = %e, "Ack failed"),
        }
    }

    async fn settle_requeue(&self, delivery: &mut Delivery, correlation: &str) {
        match delivery.nack(true).await {
            Ok(()) => {
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(correlation_id = %correlation, error = %e, "Nack failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    async fn start(broker: &MemoryBroker, storage: MemoryStorage) -> ServerHandle {
        AsyncRpcServer::new(
            Arc::new(broker.connect()),
            FileHandler::new(Arc::new(storage)),
            RpcServerOptions::default(),
        )
        .start()
        .await
        .unwrap()
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_without_requeue() {
        let broker = MemoryBroker::new();
        let server = start(&broker, MemoryStorage::new()).await;

        let producer = broker.connect();
        let reply_queue = producer.declare_queue(QueueSpec::Exclusive).await.unwrap();
        let mut replies = producer
            .consume(&reply_queue, ConsumeOptions::auto_ack())
            .await
            .unwrap();

        let poison = Message::json(b"garbage".to_vec()).with_reply_to(reply_queue.clone());
        producer
            .publish(&QueueName::new(DEFAULT_REQUEST_QUEUE), poison)
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let envelope = ResponseEnvelope::from_json(&reply.message.body).unwrap();
        assert!(!envelope.success);

        eventually(|| broker.dead_lettered() == 1).await;
        assert_eq!(server.stats().rejected(), 1);
        assert_eq!(broker.queue_depth(DEFAULT_REQUEST_QUEUE), Some(0));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_reply_publish_failure_redelivers_request() {
        let broker = MemoryBroker::new();
        let storage = MemoryStorage::new();

        let producer = broker.connect();
        let request_queue = producer
            .declare_queue(QueueSpec::Durable(QueueName::new(DEFAULT_REQUEST_QUEUE)))
            .await
            .unwrap();
        let reply_queue = producer.declare_queue(QueueSpec::Exclusive).await.unwrap();
        let mut replies = producer
            .consume(&reply_queue, ConsumeOptions::auto_ack())
            .await
            .unwrap();

        let body = RequestEnvelope::upload("f.dat", b"payload".to_vec())
            .to_json()
            .unwrap();
        producer
            .publish(&request_queue, Message::json(body).with_reply_to(reply_queue))
            .await
            .unwrap();

        // The first reply publish fails, the retry succeeds
        broker.fail_next_publishes(1);
        let server = start(&broker, storage.clone()).await;

        let reply = replies.recv().await.unwrap();
        assert!(ResponseEnvelope::from_json(&reply.message.body).unwrap().success);
        assert!(storage.contains("f.dat"));

        eventually(|| server.stats().acked() == 1).await;
        assert_eq!(server.stats().requeued(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_operation_gets_failure_reply() {
        let broker = MemoryBroker::new();
        let server = start(&broker, MemoryStorage::new()).await;

        let producer = broker.connect();
        let reply_queue = producer.declare_queue(QueueSpec::Exclusive).await.unwrap();
        let mut replies = producer
            .consume(&reply_queue, ConsumeOptions::auto_ack())
            .await
            .unwrap();
        producer
            .publish(
                &QueueName::new(DEFAULT_REQUEST_QUEUE),
                Message::json(br#"{"operation":"delete"}"#.to_vec()).with_reply_to(reply_queue),
            )
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let envelope = ResponseEnvelope::from_json(&reply.message.body).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message, crate::service::UNKNOWN_OPERATION);

        eventually(|| server.stats().acked() == 1).await;
        assert_eq!(broker.dead_lettered(), 0);
        server.shutdown().await;
    }
}
