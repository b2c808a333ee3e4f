// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Concurrent benchmark executor.
//!
//! One task per virtual client. Every client opens its session and warms it
//! up, then all of them are released together by one start signal and
//! replay their own sequence in order until it is exhausted or the deadline
//! passes. A client that dies before it is ready counts as ready, so it can
//! never hold the others back. Nothing one client does can fail another:
//! every error becomes a failed [`ResultRecord`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fileshare_core::broker::{BrokerConnection, BrokerConnector};
use fileshare_core::{
    AsyncRpcClient, ConnectionPool, FileTransport, HttpFileClient, Operation, RpcClientOptions,
    RpcError, RpcResult, TransportKind,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{BenchmarkError, BenchmarkResult};
use crate::sink::{ResultRecord, ResultSink};
use crate::workload::{fixture_name, upload_name, OperationSequenceItem, Payloads};

/// Opens client sessions for one transport.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn open(&self, client_id: usize) -> RpcResult<Box<dyn FileTransport>>;
}

/// HTTP sessions sharing one pooled `reqwest` client per base URL.
pub struct HttpProvider {
    base_url: String,
    timeout: Duration,
    pool: Arc<ConnectionPool<reqwest::Client>>,
}

impl HttpProvider {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        pool: Arc<ConnectionPool<reqwest::Client>>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            pool,
        }
    }
}

#[async_trait]
impl TransportProvider for HttpProvider {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn open(&self, _client_id: usize) -> RpcResult<Box<dyn FileTransport>> {
        let timeout = self.timeout;
        let client = self
            .pool
            .get_or_connect(&self.base_url, || async move {
                reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map(Arc::new)
                    .map_err(|e| RpcError::Transport(e.to_string()))
            })
            .await?;

        Ok(Box::new(HttpFileClient::with_client(
            client.as_ref().clone(),
            self.base_url.clone(),
            self.timeout,
        )))
    }
}

/// Broker sessions: one RPC client, with its own reply queue, per virtual
/// client, all riding the pooled connection for the broker address.
pub struct BrokerProvider {
    address: String,
    connector: Arc<dyn BrokerConnector>,
    pool: Arc<ConnectionPool<dyn BrokerConnection>>,
    options: RpcClientOptions,
}

impl BrokerProvider {
    pub fn new(
        address: impl Into<String>,
        connector: Arc<dyn BrokerConnector>,
        pool: Arc<ConnectionPool<dyn BrokerConnection>>,
        options: RpcClientOptions,
    ) -> Self {
        Self {
            address: address.into(),
            connector,
            pool,
            options,
        }
    }
}

#[async_trait]
impl TransportProvider for BrokerProvider {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    async fn open(&self, _client_id: usize) -> RpcResult<Box<dyn FileTransport>> {
        let connector = Arc::clone(&self.connector);
        let address = self.address.clone();
        let connection = self
            .pool
            .get_or_connect(&self.address, || async move {
                connector.connect(&address).await
            })
            .await?;

        let client = AsyncRpcClient::connect(connection, self.options.clone()).await?;
        Ok(Box::new(client))
    }
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Stop issuing new operations after this long. In-flight operations
    /// still complete and are recorded.
    pub max_duration: Option<Duration>,
    /// Upper bound of the random pause between a client's operations.
    pub max_think_time: Duration,
    /// Seed for the pause generator.
    pub seed: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_duration: None,
            max_think_time: Duration::from_millis(10),
            seed: 42,
        }
    }
}

/// Timing of one completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub transport: TransportKind,
    pub wall_clock: Duration,
    pub planned: usize,
    pub executed: usize,
}

/// Drives virtual clients against one transport.
pub struct BenchmarkExecutor {
    provider: Arc<dyn TransportProvider>,
    payloads: Arc<Payloads>,
    sink: Arc<ResultSink>,
    config: ExecutorConfig,
}

impl BenchmarkExecutor {
    pub fn new(
        provider: Arc<dyn TransportProvider>,
        payloads: Arc<Payloads>,
        sink: Arc<ResultSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            payloads,
            sink,
            config,
        }
    }

    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    pub fn transport(&self) -> TransportKind {
        self.provider.kind()
    }

    /// Upload one fixture per size class so downloads have something to
    /// fetch. Nothing here is recorded.
    pub async fn seed_fixtures(&self) -> BenchmarkResult<()> {
        let session = self.provider.open(usize::MAX).await?;

        for size_kb in self.payloads.sizes() {
            let name = fixture_name(size_kb);
            let payload = self.payloads.get(size_kb).unwrap_or_default();
            let reply = session.upload(&name, payload).await.map_err(|e| {
                BenchmarkError::FixtureSeeding {
                    file: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !reply.success {
                return Err(BenchmarkError::FixtureSeeding {
                    file: name,
                    reason: reply.message,
                });
            }
            tracing::debug!(file = %name, transport = %self.provider.kind(), "Fixture seeded");
        }

        session.close().await?;
        Ok(())
    }

    /// Run every sequence concurrently, one task per client.
    pub async fn run(&self, sequences: Vec<Vec<OperationSequenceItem>>) -> RunSummary {
        let transport = self.provider.kind();
        let planned = sequences.iter().map(Vec::len).sum();
        let recorded_before = self.sink.len();
        // Each client holds a sender until it is ready; the channel closes
        // once every client is ready or gone.
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
        let (start_tx, start_rx) = watch::channel(false);

        tracing::info!(
            transport = %transport,
            clients = sequences.len(),
            planned,
            "Starting run"
        );

        let mut tasks = JoinSet::new();
        for (client_id, sequence) in sequences.into_iter().enumerate() {
            let client = VirtualClient {
                client_id,
                transport,
                provider: Arc::clone(&self.provider),
                payloads: Arc::clone(&self.payloads),
                sink: Arc::clone(&self.sink),
                ready: Some(ready_tx.clone()),
                start: start_rx.clone(),
                max_think_time: self.config.max_think_time,
                seed: self.config.seed.wrapping_add(client_id as u64),
            };
            tasks.spawn(client.run(sequence, self.config.max_duration));
        }

        drop(ready_tx);
        while ready_rx.recv().await.is_some() {}
        let started = Instant::now();
        let _ = start_tx.send(true);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(transport = %transport, error = %e, "Virtual client task failed");
            }
        }

        let wall_clock = started.elapsed();
        let executed = self.sink.len() - recorded_before;
        tracing::info!(
            transport = %transport,
            executed,
            wall_clock_ms = wall_clock.as_millis() as u64,
            "Run finished"
        );

        RunSummary {
            transport,
            wall_clock,
            planned,
            executed,
        }
    }
}

struct VirtualClient {
    client_id: usize,
    transport: TransportKind,
    provider: Arc<dyn TransportProvider>,
    payloads: Arc<Payloads>,
    sink: Arc<ResultSink>,
    ready: Option<mpsc::Sender<()>>,
    start: watch::Receiver<bool>,
    max_think_time: Duration,
    seed: u64,
}

impl VirtualClient {
    async fn run(mut self, sequence: Vec<OperationSequenceItem>, max_duration: Option<Duration>) {
        let session = match self.provider.open(self.client_id).await {
            Ok(session) => {
                // Warm-up is not recorded
                if let Err(e) = session.list().await {
                    tracing::debug!(client_id = self.client_id, error = %e, "Warm-up failed");
                }
                Some(session)
            }
            Err(e) => {
                tracing::warn!(
                    client_id = self.client_id,
                    transport = %self.transport,
                    error = %e,
                    "Failed to open session"
                );
                None
            }
        };

        self.ready.take();
        let released = self.start.wait_for(|started| *started).await.is_ok();
        let sequence = if released { sequence } else { Vec::new() };
        let deadline = max_duration.map(|d| Instant::now() + d);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for item in &sequence {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            let (rtt_ms, success) = match &session {
                Some(session) => self.execute(session.as_ref(), item).await,
                None => (0.0, false),
            };
            self.sink.record(ResultRecord {
                timestamp: Utc::now(),
                transport: self.transport,
                operation: item.operation,
                payload_size_kb: item.payload_size_kb,
                client_id: self.client_id,
                rtt_ms,
                success,
            });

            if session.is_some() && !self.max_think_time.is_zero() {
                let pause = rng.gen_range(Duration::ZERO..self.max_think_time);
                tokio::time::sleep(pause).await;
            }
        }

        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::debug!(client_id = self.client_id, error = %e, "Session close failed");
            }
        }
    }

    async fn execute(&self, session: &dyn FileTransport, item: &OperationSequenceItem) -> (f64, bool) {
        let started = Instant::now();
        let outcome = match item.operation {
            Operation::List => session.list().await,
            Operation::Upload => match self.payloads.get(item.payload_size_kb) {
                Some(payload) => {
                    session
                        .upload(&upload_name(item.payload_size_kb, self.client_id), payload)
                        .await
                }
                None => Err(RpcError::Transport(format!(
                    "no payload for size class {} KB",
                    item.payload_size_kb
                ))),
            },
            Operation::Download => session.download(&fixture_name(item.payload_size_kb)).await,
        };
        let rtt_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let success = match outcome {
            Ok(reply) if reply.success => true,
            Ok(reply) => {
                tracing::debug!(
                    client_id = self.client_id,
                    operation = %item.operation,
                    message = %reply.message,
                    "Operation rejected"
                );
                false
            }
            Err(e) => {
                tracing::debug!(
                    client_id = self.client_id,
                    operation = %item.operation,
                    error = %e,
                    "Operation failed"
                );
                false
            }
        };
        (rtt_ms, success)
    }
}
