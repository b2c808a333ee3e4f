// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Connections shared by address.
//!
//! Many virtual clients can ride one underlying connection. The pool hands
//! out the cached connection while it is healthy and dials a new one when it
//! is missing or has gone bad.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::broker::BrokerConnection;

/// Whether a pooled connection can still be handed out.
pub trait PoolHealth {
    fn is_healthy(&self) -> bool;
}

impl PoolHealth for dyn BrokerConnection {
    fn is_healthy(&self) -> bool {
        self.is_open()
    }
}

impl PoolHealth for reqwest::Client {
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Address-keyed connection cache.
pub struct ConnectionPool<T: ?Sized> {
    entries: DashMap<String, Arc<T>>,
    dialing: DashMap<String, Arc<Mutex<()>>>,
}

impl<T: ?Sized + PoolHealth + Send + Sync> ConnectionPool<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            dialing: DashMap::new(),
        }
    }

    /// Cached healthy connection for `address`, or a new one from `connect`.
    ///
    /// Dials for one address are serialized: callers that miss at the same
    /// time wait for the first dial and share its connection.
    pub async fn get_or_connect<F, Fut, E>(&self, address: &str, connect: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        if let Some(existing) = self.healthy(address) {
            return Ok(existing);
        }

        let gate = Arc::clone(
            self.dialing
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _dialing = gate.lock().await;

        if let Some(existing) = self.healthy(address) {
            return Ok(existing);
        }

        let fresh = connect().await?;
        tracing::debug!(address = %address, "Pooled new connection");
        self.entries.insert(address.to_string(), Arc::clone(&fresh));
        Ok(fresh)
    }

    fn healthy(&self, address: &str) -> Option<Arc<T>> {
        let entry = self.entries.get(address)?;
        if entry.is_healthy() {
            Some(Arc::clone(entry.value()))
        } else {
            None
        }
    }

    /// Forget the connection for `address`, returning it if present.
    pub fn invalidate(&self, address: &str) -> Option<Arc<T>> {
        self.entries.remove(address).map(|(_, conn)| conn)
    }

    /// Remove and return every pooled connection.
    pub fn drain(&self) -> Vec<Arc<T>> {
        let addresses: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        addresses
            .into_iter()
            .filter_map(|address| self.invalidate(&address))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized + PoolHealth + Send + Sync> Default for ConnectionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::error::BrokerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn dial(broker: MemoryBroker) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        Ok(Arc::new(broker.connect()))
    }

    async fn counted_dial(
        broker: MemoryBroker,
        dials: Arc<AtomicUsize>,
    ) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        dials.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Arc::new(broker.connect()))
    }

    async fn refuse() -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        Err(BrokerError::ConnectFailed {
            address: "amqp://nowhere".to_string(),
            reason: "refused".to_string(),
        })
    }

    #[tokio::test]
    async fn test_reuses_healthy_connection() {
        let broker = MemoryBroker::new();
        let pool: ConnectionPool<dyn BrokerConnection> = ConnectionPool::new();

        let first = pool
            .get_or_connect("memory://local", || dial(broker.clone()))
            .await
            .unwrap();
        let second = pool.get_or_connect("memory://local", refuse).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_replaces_closed_connection() {
        let broker = MemoryBroker::new();
        let pool: ConnectionPool<dyn BrokerConnection> = ConnectionPool::new();

        let first = pool
            .get_or_connect("memory://local", || dial(broker.clone()))
            .await
            .unwrap();
        first.close().await.unwrap();

        let second = pool
            .get_or_connect("memory://local", || dial(broker.clone()))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn test_concurrent_misses_dial_once() {
        let broker = MemoryBroker::new();
        let pool: Arc<ConnectionPool<dyn BrokerConnection>> = Arc::new(ConnectionPool::new());
        let dials = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            let broker = broker.clone();
            let dials = Arc::clone(&dials);
            tasks.spawn(async move {
                pool.get_or_connect("amqp://x", || counted_dial(broker, dials))
                    .await
                    .unwrap()
            });
        }

        let mut connections = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            connections.push(joined.unwrap());
        }

        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_error_is_returned() {
        let pool: ConnectionPool<dyn BrokerConnection> = ConnectionPool::new();

        assert!(pool.get_or_connect("amqp://nowhere", refuse).await.is_err());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_drain_empties_pool() {
        let broker = MemoryBroker::new();
        let pool: ConnectionPool<dyn BrokerConnection> = ConnectionPool::new();
        for address in ["a", "b"] {
            pool.get_or_connect(address, || dial(broker.clone()))
                .await
                .unwrap();
        }

        assert_eq!(pool.drain().len(), 2);
        assert!(pool.is_empty());
    }
}
