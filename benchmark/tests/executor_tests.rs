// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Executor scenarios against in-process file services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fileshare_benchmark::sweep::steps;
use fileshare_benchmark::{
    compute, generate, run_sweep, BenchmarkExecutor, BrokerProvider, Distribution,
    ExecutorConfig, HttpProvider, LocalServices, OperationSequenceItem, Payloads, ResultSink,
    TransportProvider,
};
use fileshare_core::broker::{BrokerConnection, MEMORY_ADDRESS};
use fileshare_core::{
    ConnectionPool, FileTransport, Operation, RpcClientOptions, RpcError, RpcResult,
    RpcServerOptions, TransportKind,
};

const SIZES: [u32; 2] = [1, 4];

fn http_provider(services: &LocalServices) -> Arc<dyn TransportProvider> {
    Arc::new(HttpProvider::new(
        services.http_url(),
        Duration::from_secs(10),
        Arc::new(ConnectionPool::new()),
    ))
}

fn broker_provider(services: &LocalServices) -> Arc<dyn TransportProvider> {
    Arc::new(BrokerProvider::new(
        MEMORY_ADDRESS,
        Arc::new(services.broker().clone()),
        Arc::new(ConnectionPool::<dyn BrokerConnection>::new()),
        RpcClientOptions {
            reply_timeout: Duration::from_secs(10),
            ..RpcClientOptions::default()
        },
    ))
}

fn quick_config() -> ExecutorConfig {
    ExecutorConfig {
        max_duration: None,
        max_think_time: Duration::from_millis(1),
        seed: 7,
    }
}

fn executor(provider: Arc<dyn TransportProvider>, config: ExecutorConfig) -> BenchmarkExecutor {
    BenchmarkExecutor::new(
        provider,
        Arc::new(Payloads::new(&SIZES)),
        Arc::new(ResultSink::in_memory()),
        config,
    )
}

/// Fails to open a session for one client and delegates the rest.
struct FlakyProvider {
    inner: Arc<dyn TransportProvider>,
    failing_client: usize,
}

#[async_trait]
impl TransportProvider for FlakyProvider {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    async fn open(&self, client_id: usize) -> RpcResult<Box<dyn FileTransport>> {
        if client_id == self.failing_client {
            return Err(RpcError::Connect {
                address: "nowhere".to_string(),
                reason: "refused".to_string(),
            });
        }
        self.inner.open(client_id).await
    }
}

/// Panics while opening the session of one client.
struct PanickingProvider {
    inner: Arc<dyn TransportProvider>,
    panicking_client: usize,
}

#[async_trait]
impl TransportProvider for PanickingProvider {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    async fn open(&self, client_id: usize) -> RpcResult<Box<dyn FileTransport>> {
        if client_id == self.panicking_client {
            panic!("session setup crashed for client {}", client_id);
        }
        self.inner.open(client_id).await
    }
}

#[tokio::test]
async fn test_four_clients_ten_ops_on_both_transports() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(4, 10, Distribution::default(), &SIZES, 42);

    for provider in [http_provider(&services), broker_provider(&services)] {
        let kind = provider.kind();
        let executor = executor(provider, quick_config());
        executor.seed_fixtures().await.unwrap();

        let summary = executor.run(plan.clone()).await;
        assert_eq!(summary.planned, 40);
        assert_eq!(summary.executed, 40);

        let records = executor.sink().records();
        let stats = compute(kind, &records, summary.wall_clock);
        assert_eq!(stats.total_operations, 40, "{}", kind);
        assert_eq!(stats.successful, 40, "{}", kind);
        assert_eq!(stats.success_rate, 100.0);
        assert!(stats.throughput_ops_per_sec > 0.0);
        assert!(records.iter().all(|r| r.transport == kind));
    }

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_each_client_replays_its_plan_in_order() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(3, 12, Distribution::default(), &SIZES, 5);

    let executor = executor(broker_provider(&services), quick_config());
    executor.seed_fixtures().await.unwrap();
    executor.run(plan.clone()).await;

    let records = executor.sink().records();
    for (client_id, sequence) in plan.iter().enumerate() {
        let executed: Vec<(Operation, u32)> = records
            .iter()
            .filter(|r| r.client_id == client_id)
            .map(|r| (r.operation, r.payload_size_kb))
            .collect();
        let planned: Vec<(Operation, u32)> = sequence
            .iter()
            .map(|item: &OperationSequenceItem| (item.operation, item.payload_size_kb))
            .collect();
        assert_eq!(executed, planned);
    }

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_only_affects_that_client() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(3, 5, Distribution::default(), &SIZES, 11);

    let provider = Arc::new(FlakyProvider {
        inner: http_provider(&services),
        failing_client: 1,
    });
    let executor = executor(provider, quick_config());
    executor.seed_fixtures().await.unwrap();
    let summary = executor.run(plan).await;
    assert_eq!(summary.executed, 15);

    for record in executor.sink().records() {
        if record.client_id == 1 {
            assert!(!record.success);
            assert_eq!(record.rtt_ms, 0.0);
        } else {
            assert!(record.success, "client {} failed", record.client_id);
        }
    }

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_downloads_fail_without_fixtures() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(2, 10, Distribution::new(0, 0, 1), &SIZES, 3);

    let executor = executor(http_provider(&services), quick_config());
    let summary = executor.run(plan).await;

    let stats = compute(TransportKind::Http, &executor.sink().records(), summary.wall_clock);
    assert_eq!(stats.total_operations, 20);
    assert_eq!(stats.failed, 20);
    assert_eq!(stats.latency.count, 0);

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deadline_stops_new_operations() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(2, 1_000, Distribution::new(1, 0, 0), &SIZES, 1);

    let config = ExecutorConfig {
        max_duration: Some(Duration::from_millis(150)),
        max_think_time: Duration::from_millis(20),
        seed: 1,
    };
    let executor = executor(broker_provider(&services), config);
    let summary = executor.run(plan).await;

    assert!(summary.executed > 0);
    assert!(summary.executed < summary.planned);
    assert!(summary.wall_clock < Duration::from_secs(5));
    assert!(executor.sink().records().iter().all(|r| r.success));

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_crash_before_start_does_not_stall_run() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let plan = generate(3, 4, Distribution::new(1, 0, 0), &SIZES, 2);

    let provider = Arc::new(PanickingProvider {
        inner: http_provider(&services),
        panicking_client: 0,
    });
    let executor = executor(provider, quick_config());
    let summary = tokio::time::timeout(Duration::from_secs(10), executor.run(plan))
        .await
        .expect("run stalled waiting for a crashed client");

    assert_eq!(summary.executed, 8);
    let records = executor.sink().records();
    assert!(records.iter().all(|r| r.client_id != 0 && r.success));

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_broker_clients_share_one_pooled_connection() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let pool = Arc::new(ConnectionPool::<dyn BrokerConnection>::new());
    let provider = Arc::new(BrokerProvider::new(
        MEMORY_ADDRESS,
        Arc::new(services.broker().clone()),
        Arc::clone(&pool),
        RpcClientOptions::default(),
    ));

    let executor = executor(provider, quick_config());
    let summary = executor
        .run(generate(8, 3, Distribution::new(1, 0, 0), &SIZES, 4))
        .await;

    assert_eq!(summary.executed, 24);
    assert_eq!(pool.len(), 1);

    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_runs_every_step_on_both_transports() {
    let services = LocalServices::start(RpcServerOptions::default()).await.unwrap();
    let sweep = steps(&Operation::ALL, &SIZES);
    let sink = Arc::new(ResultSink::in_memory());

    for provider in [http_provider(&services), broker_provider(&services)] {
        let kind = provider.kind();
        let executor = BenchmarkExecutor::new(
            provider,
            Arc::new(Payloads::new(&SIZES)),
            Arc::clone(&sink),
            quick_config(),
        );
        executor.seed_fixtures().await.unwrap();

        let outcome = run_sweep(&executor, &sweep, 10, 3).await;
        assert_eq!(outcome.transport, kind);
        assert_eq!(outcome.steps.len(), 5);
        for result in &outcome.steps {
            assert_eq!(result.stats.total_operations, 10, "{:?}", result.step);
            assert_eq!(result.stats.successful, 10, "{:?}", result.step);
            assert_eq!(
                result.stats.by_operation.keys().copied().collect::<Vec<_>>(),
                vec![result.step.operation]
            );
        }
        assert_eq!(outcome.overall.total_operations, 50);
        assert_eq!(outcome.overall.successful, 50);
    }

    // One sink holds the whole sweep; within a step the first client takes
    // the remainder
    let records = sink.records();
    assert_eq!(records.len(), 100);
    let first_step: Vec<_> = records
        .iter()
        .filter(|r| r.transport == TransportKind::Http && r.operation == Operation::List)
        .collect();
    let per_client: Vec<usize> = (0..3)
        .map(|id| first_step.iter().filter(|r| r.client_id == id).count())
        .collect();
    assert_eq!(per_client, vec![4, 3, 3]);

    services.shutdown().await.unwrap();
}
