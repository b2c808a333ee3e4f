// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Message broker abstraction.
//!
//! The RPC layer needs a small slice of AMQP semantics: named durable queues,
//! server-named exclusive reply queues, publish through the default exchange,
//! consumers with a prefetch window and explicit ack/nack. Anything that can
//! provide those implements [`BrokerConnection`].

mod memory;

#[cfg(feature = "amqp")]
mod amqp;

pub use memory::{MemoryBroker, MemoryConnection, MEMORY_ADDRESS};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpConnection, AmqpConnector};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BrokerResult;
use crate::types::{CorrelationToken, QueueName};

/// Content type used for every envelope body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message body plus the metadata the RPC layer routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub correlation_id: Option<CorrelationToken>,
    pub reply_to: Option<QueueName>,
    pub content_type: Option<String>,
}

impl Message {
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            body,
            correlation_id: None,
            reply_to: None,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
        }
    }

    pub fn with_correlation_id(mut self, token: CorrelationToken) -> Self {
        self.correlation_id = Some(token);
        self
    }

    pub fn with_reply_to(mut self, queue: QueueName) -> Self {
        self.reply_to = Some(queue);
        self
    }
}

/// Queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSpec {
    /// Named queue that outlives its declarer.
    Durable(QueueName),
    /// Broker-named queue private to the declaring connection, deleted when
    /// its last consumer goes away or the connection closes.
    Exclusive,
}

/// How a consumer receives deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Maximum unacknowledged deliveries held at once; `None` is unbounded.
    pub prefetch: Option<u16>,
    /// Deliveries count as acknowledged the moment they are handed out.
    pub auto_ack: bool,
}

impl ConsumeOptions {
    pub fn auto_ack() -> Self {
        Self {
            prefetch: None,
            auto_ack: true,
        }
    }

    pub fn manual(prefetch: u16) -> Self {
        Self {
            prefetch: Some(prefetch.max(1)),
            auto_ack: false,
        }
    }
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> BrokerResult<()>;
    async fn nack(self: Box<Self>, requeue: bool) -> BrokerResult<()>;
}

/// A message handed to a consumer.
pub struct Delivery {
    pub message: Message,
    pub redelivered: bool,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    pub fn new(message: Message, redelivered: bool, acker: Option<Box<dyn Acknowledger>>) -> Self {
        Self {
            message,
            redelivered,
            acker,
        }
    }

    /// Acknowledge the delivery. No-op for auto-ack consumers or when the
    /// delivery was already settled.
    pub async fn ack(&mut self) -> BrokerResult<()> {
        match self.acker.take() {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }

    /// Reject the delivery, optionally asking the broker to redeliver it.
    pub async fn nack(&mut self, requeue: bool) -> BrokerResult<()> {
        match self.acker.take() {
            Some(acker) => acker.nack(requeue).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("redelivered", &self.redelivered)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

/// Stream of deliveries from one queue. Dropping it cancels the consumer.
#[derive(Debug)]
pub struct Consumer {
    queue: QueueName,
    rx: mpsc::Receiver<Delivery>,
}

impl Consumer {
    pub fn new(queue: QueueName, rx: mpsc::Receiver<Delivery>) -> Self {
        Self { queue, rx }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Next delivery, or `None` once the consumer has been cancelled.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// One connection to a broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Address this connection was opened against.
    fn address(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn declare_queue(&self, spec: QueueSpec) -> BrokerResult<QueueName>;

    async fn delete_queue(&self, queue: &QueueName) -> BrokerResult<()>;

    /// Publish through the default exchange, routed by queue name.
    async fn publish(&self, queue: &QueueName, message: Message) -> BrokerResult<()>;

    async fn consume(&self, queue: &QueueName, options: ConsumeOptions) -> BrokerResult<Consumer>;

    async fn close(&self) -> BrokerResult<()>;
}

/// Opens broker connections by address.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, address: &str) -> BrokerResult<Arc<dyn BrokerConnection>>;
}
