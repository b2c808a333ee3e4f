// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process broker.
//!
//! Mirrors the AMQP behaviour the RPC layer relies on: durable and exclusive
//! auto-delete queues, per-consumer prefetch windows, ack/nack with requeue
//! and a redelivered flag, and requeue of deliveries that are dropped without
//! being settled. Publishing to a queue that does not exist drops the message,
//! like the default exchange does for unroutable messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify, OwnedSemaphorePermit, Semaphore};

use super::{
    Acknowledger, BrokerConnection, BrokerConnector, ConsumeOptions, Consumer, Delivery, Message,
    QueueSpec,
};
use crate::error::{BrokerError, BrokerResult};
use crate::types::QueueName;

/// Address reported by in-process connections.
pub const MEMORY_ADDRESS: &str = "memory://local";

/// Buffer between a queue pump and an auto-ack consumer.
const AUTO_ACK_BUFFER: usize = 256;

struct QueuedMessage {
    message: Message,
    redelivered: bool,
}

struct MemoryQueue {
    name: QueueName,
    owner: Option<u64>,
    auto_delete: bool,
    messages: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    consumers: AtomicUsize,
    deleted: AtomicBool,
}

impl MemoryQueue {
    fn new(name: QueueName, owner: Option<u64>, auto_delete: bool) -> Self {
        Self {
            name,
            owner,
            auto_delete,
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            consumers: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    fn push(&self, message: Message) {
        self.messages.lock().push_back(QueuedMessage {
            message,
            redelivered: false,
        });
        self.notify.notify_waiters();
    }

    fn requeue(&self, message: Message) {
        if self.deleted.load(Ordering::SeqCst) {
            return;
        }
        self.messages.lock().push_front(QueuedMessage {
            message,
            redelivered: true,
        });
        self.notify.notify_waiters();
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
        self.messages.lock().clear();
        self.notify.notify_waiters();
    }

    /// Wait for the next message. Cancel-safe: nothing is popped unless the
    /// future completes.
    async fn next(&self) -> Option<QueuedMessage> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.deleted.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(queued) = self.messages.lock().pop_front() {
                return Some(queued);
            }
            notified.await;
        }
    }

    fn depth(&self) -> usize {
        self.messages.lock().len()
    }
}

#[derive(Default)]
struct BrokerState {
    queues: DashMap<String, Arc<MemoryQueue>>,
    next_connection: AtomicU64,
    next_queue: AtomicU64,
    publish_faults: AtomicUsize,
    dead_letters: AtomicUsize,
}

impl BrokerState {
    fn remove_queue(&self, name: &QueueName) {
        if let Some((_, queue)) = self.queues.remove(name.as_str()) {
            queue.mark_deleted();
            tracing::debug!(queue = %name, "Queue deleted");
        }
    }

    fn take_publish_fault(&self) -> bool {
        self.publish_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-process broker shared through cheap clones.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection.
    pub fn connect(&self) -> MemoryConnection {
        let id = self.state.next_connection.fetch_add(1, Ordering::SeqCst);
        let (closed, _) = watch::channel(false);
        MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            closed,
            owned_queues: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` publishes fail, on any connection.
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.publish_faults.store(count, Ordering::SeqCst);
    }

    /// Messages rejected without requeue.
    pub fn dead_lettered(&self) -> usize {
        self.state.dead_letters.load(Ordering::SeqCst)
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.state.queues.contains_key(name)
    }

    /// Messages waiting in a queue (excluding unacknowledged deliveries).
    pub fn queue_depth(&self, name: &str) -> Option<usize> {
        self.state.queues.get(name).map(|q| q.depth())
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, _address: &str) -> BrokerResult<Arc<dyn BrokerConnection>> {
        Ok(Arc::new(MemoryBroker::connect(self)))
    }
}

/// Connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    id: u64,
    state: Arc<BrokerState>,
    closed: watch::Sender<bool>,
    owned_queues: Mutex<Vec<QueueName>>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> BrokerResult<()> {
        if *self.closed.borrow() {
            return Err(BrokerError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn address(&self) -> &str {
        MEMORY_ADDRESS
    }

    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    async fn declare_queue(&self, spec: QueueSpec) -> BrokerResult<QueueName> {
        self.ensure_open()?;

        match spec {
            QueueSpec::Durable(name) => {
                self.state
                    .queues
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| Arc::new(MemoryQueue::new(name.clone(), None, false)));
                Ok(name)
            }
            QueueSpec::Exclusive => {
                let n = self.state.next_queue.fetch_add(1, Ordering::SeqCst);
                let name = QueueName::new(format!("amq.gen-{}-{}", self.id, n));
                self.state.queues.insert(
                    name.as_str().to_string(),
                    Arc::new(MemoryQueue::new(name.clone(), Some(self.id), true)),
                );
                self.owned_queues.lock().push(name.clone());
                Ok(name)
            }
        }
    }

    async fn delete_queue(&self, queue: &QueueName) -> BrokerResult<()> {
        self.ensure_open()?;
        self.state.remove_queue(queue);
        self.owned_queues.lock().retain(|q| q != queue);
        Ok(())
    }

    async fn publish(&self, queue: &QueueName, message: Message) -> BrokerResult<()> {
        self.ensure_open()?;

        if self.state.take_publish_fault() {
            return Err(BrokerError::PublishFailed {
                queue: queue.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }

        match self.state.queues.get(queue.as_str()) {
            Some(target) => target.push(message),
            None => tracing::debug!(queue = %queue, "Dropping unroutable message"),
        }
        Ok(())
    }

    async fn consume(&self, queue: &QueueName, options: ConsumeOptions) -> BrokerResult<Consumer> {
        self.ensure_open()?;

        let target = self
            .state
            .queues
            .get(queue.as_str())
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue: queue.to_string(),
            })?;

        if matches!(target.owner, Some(owner) if owner != self.id) {
            return Err(BrokerError::ConsumeFailed {
                queue: queue.to_string(),
                reason: "queue is exclusive to another connection".to_string(),
            });
        }

        let capacity = options
            .prefetch
            .map(|p| usize::from(p).max(1))
            .unwrap_or(AUTO_ACK_BUFFER);
        let (tx, rx) = mpsc::channel(capacity);

        target.consumers.fetch_add(1, Ordering::SeqCst);
        let pump = QueuePump {
            queue: target,
            state: Arc::clone(&self.state),
            tx,
            options,
            closed: self.closed.subscribe(),
        };
        tokio::spawn(pump.run());

        Ok(Consumer::new(queue.clone(), rx))
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        let owned: Vec<QueueName> = std::mem::take(&mut *self.owned_queues.lock());
        for queue in &owned {
            self.state.remove_queue(queue);
        }
        tracing::debug!(connection = self.id, released = owned.len(), "Connection closed");
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.closed.send_replace(true);
        for queue in self.owned_queues.get_mut().drain(..) {
            self.state.remove_queue(&queue);
        }
    }
}

/// Moves messages from one queue to one consumer.
struct QueuePump {
    queue: Arc<MemoryQueue>,
    state: Arc<BrokerState>,
    tx: mpsc::Sender<Delivery>,
    options: ConsumeOptions,
    closed: watch::Receiver<bool>,
}

impl QueuePump {
    async fn run(mut self) {
        let window = self
            .options
            .prefetch
            .map(|p| Arc::new(Semaphore::new(usize::from(p).max(1))));

        loop {
            let permit = match &window {
                Some(window) => {
                    let acquire = Arc::clone(window).acquire_owned();
                    tokio::select! {
                        permit = acquire => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                        _ = self.tx.closed() => break,
                        _ = wait_closed(&mut self.closed) => break,
                    }
                }
                None => None,
            };

            let queued = tokio::select! {
                queued = self.queue.next() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
                _ = self.tx.closed() => break,
                _ = wait_closed(&mut self.closed) => break,
            };

            let delivery = self.delivery(queued, permit);
            if let Err(returned) = self.tx.send(delivery).await {
                // Consumer went away mid-handoff
                let mut delivery = returned.0;
                if self.options.auto_ack {
                    self.queue.requeue(delivery.message.clone());
                } else {
                    let _ = delivery.nack(true).await;
                }
                break;
            }
        }

        let remaining = self.queue.consumers.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.queue.auto_delete {
            self.state.remove_queue(&self.queue.name);
        }
    }

    fn delivery(&self, queued: QueuedMessage, permit: Option<OwnedSemaphorePermit>) -> Delivery {
        let acker: Option<Box<dyn Acknowledger>> = if self.options.auto_ack {
            None
        } else {
            Some(Box::new(MemoryAcker {
                queue: Arc::clone(&self.queue),
                state: Arc::clone(&self.state),
                message: Some(queued.message.clone()),
                _permit: permit,
            }))
        };
        Delivery::new(queued.message, queued.redelivered, acker)
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // A dropped sender means the connection is gone as well
    let _ = closed.wait_for(|is_closed| *is_closed).await;
}

/// Unsettled delivery; requeued if dropped before ack or nack.
struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    state: Arc<BrokerState>,
    message: Option<Message>,
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(mut self: Box<Self>) -> BrokerResult<()> {
        self.message = None;
        Ok(())
    }

    async fn nack(mut self: Box<Self>, requeue: bool) -> BrokerResult<()> {
        if let Some(message) = self.message.take() {
            if requeue {
                self.queue.requeue(message);
            } else {
                self.state.dead_letters.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            self.queue.requeue(message);
        }
    }
}
