// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! AMQP 0-9-1 connection backed by lapin.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::mpsc;

use super::{
    Acknowledger, BrokerConnection, BrokerConnector, ConsumeOptions, Consumer, Delivery, Message,
    QueueSpec,
};
use crate::error::{BrokerError, BrokerResult};
use crate::types::{CorrelationToken, QueueName};

const CONSUMER_BUFFER: usize = 256;

/// Connection plus one channel for declarations and publishes. Each consumer
/// gets its own channel so prefetch windows stay independent.
pub struct AmqpConnection {
    address: String,
    connection: Connection,
    channel: Channel,
}

impl AmqpConnection {
    pub async fn connect(address: &str) -> BrokerResult<Self> {
        let connection = Connection::connect(address, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(address = %address, "Connected to AMQP broker");
        Ok(Self {
            address: address.to_string(),
            connection,
            channel,
        })
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    async fn declare_queue(&self, spec: QueueSpec) -> BrokerResult<QueueName> {
        let (name, options) = match spec {
            QueueSpec::Durable(name) => (
                name.as_str().to_string(),
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
            ),
            QueueSpec::Exclusive => (
                String::new(),
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
            ),
        };

        let queue = self
            .channel
            .queue_declare(&name, options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::ConsumeFailed {
                queue: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(QueueName::new(queue.name().as_str()))
    }

    async fn delete_queue(&self, queue: &QueueName) -> BrokerResult<()> {
        self.channel
            .queue_delete(queue.as_str(), QueueDeleteOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::ConsumeFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, queue: &QueueName, message: Message) -> BrokerResult<()> {
        let mut properties = BasicProperties::default();
        if let Some(content_type) = message.content_type {
            properties = properties.with_content_type(ShortString::from(content_type));
        }
        if let Some(token) = message.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(token.as_str().to_string()));
        }
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to.as_str().to_string()));
        }

        let publish_failed = |e: lapin::Error| BrokerError::PublishFailed {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        self.channel
            .basic_publish(
                "",
                queue.as_str(),
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(publish_failed)?
            .await
            .map_err(publish_failed)?;
        Ok(())
    }

    async fn consume(&self, queue: &QueueName, options: ConsumeOptions) -> BrokerResult<Consumer> {
        let consume_failed = |e: lapin::Error| BrokerError::ConsumeFailed {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let channel = self.connection.create_channel().await.map_err(consume_failed)?;
        if let Some(prefetch) = options.prefetch {
            channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await
                .map_err(consume_failed)?;
        }

        let mut stream = channel
            .basic_consume(
                queue.as_str(),
                "",
                BasicConsumeOptions {
                    no_ack: options.auto_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(consume_failed)?;

        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        let queue_name = queue.clone();
        let auto_ack = options.auto_ack;
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    next = stream.next() => next,
                    _ = tx.closed() => break,
                };
                match next {
                    Some(Ok(delivery)) => {
                        if tx.send(convert(delivery, auto_ack)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(queue = %queue_name, error = %e, "Consumer stream failed");
                        break;
                    }
                    None => break,
                }
            }
            if let Err(e) = channel.close(200, "consumer cancelled").await {
                tracing::debug!(queue = %queue_name, error = %e, "Consumer channel close failed");
            }
        });

        Ok(Consumer::new(queue.clone(), rx))
    }

    async fn close(&self) -> BrokerResult<()> {
        self.connection
            .close(200, "closing")
            .await
            .map_err(|e| BrokerError::SettleFailed {
                reason: e.to_string(),
            })
    }
}

fn convert(delivery: lapin::message::Delivery, auto_ack: bool) -> Delivery {
    let lapin::message::Delivery {
        data,
        properties,
        redelivered,
        acker,
        ..
    } = delivery;

    let message = Message {
        body: data,
        correlation_id: properties
            .correlation_id()
            .as_ref()
            .map(|id| CorrelationToken::from_wire(id.as_str())),
        reply_to: properties
            .reply_to()
            .as_ref()
            .map(|queue| QueueName::new(queue.as_str())),
        content_type: properties.content_type().as_ref().map(|ct| ct.as_str().to_string()),
    };

    let acker: Option<Box<dyn Acknowledger>> = if auto_ack {
        None
    } else {
        Some(Box::new(AmqpAcker(acker)))
    };
    Delivery::new(message, redelivered, acker)
}

struct AmqpAcker(lapin::acker::Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(self: Box<Self>) -> BrokerResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::SettleFailed {
                reason: e.to_string(),
            })
    }

    async fn nack(self: Box<Self>, requeue: bool) -> BrokerResult<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                multiple: false,
            })
            .await
            .map_err(|e| BrokerError::SettleFailed {
                reason: e.to_string(),
            })
    }
}

/// Opens a fresh [`AmqpConnection`] per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpConnector;

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, address: &str) -> BrokerResult<Arc<dyn BrokerConnection>> {
        Ok(Arc::new(AmqpConnection::connect(address).await?))
    }
}
