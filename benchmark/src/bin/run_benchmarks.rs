// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the fileshare benchmarks and generate reports.
//!
//! `--mode mixed` replays one weighted plan per transport. `--mode sweep`
//! measures each operation and payload size on its own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use fileshare_benchmark::sweep::steps;
use fileshare_benchmark::workload::{parse_size_classes, DEFAULT_SIZE_CLASSES_KB};
use fileshare_benchmark::{
    compute, generate, render_comparison, render_step, render_summary, run_sweep,
    BenchmarkExecutor, BenchmarkReport, BrokerProvider, Distribution, ExecutorConfig,
    HttpProvider, LocalServices, Payloads, Reporter, ResultSink, RunParameters,
    TransportProvider,
};
use fileshare_core::broker::{BrokerConnection, BrokerConnector, MEMORY_ADDRESS};
use fileshare_core::{
    Config, ConfigLoader, ConnectionPool, Operation, QueueName, RpcClientOptions,
    RpcServerOptions, TransportKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    #[value(alias = "grpc")]
    Http,
    #[value(alias = "rabbit", alias = "amqp")]
    Broker,
    All,
}

impl TransportArg {
    fn kinds(self) -> Vec<TransportKind> {
        match self {
            TransportArg::Http => vec![TransportKind::Http],
            TransportArg::Broker => vec![TransportKind::Broker],
            TransportArg::All => TransportKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One weighted plan of all operations per transport
    Mixed,
    /// One operation and payload size at a time
    Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OperationArg {
    List,
    Upload,
    Download,
    All,
}

impl OperationArg {
    fn operations(self) -> Vec<Operation> {
        match self {
            OperationArg::List => vec![Operation::List],
            OperationArg::Upload => vec![Operation::Upload],
            OperationArg::Download => vec![Operation::Download],
            OperationArg::All => Operation::ALL.to_vec(),
        }
    }
}

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Compare the broker and HTTP transports of fileshare")]
struct Args {
    /// Transport(s) to benchmark
    #[arg(short, long, value_enum)]
    transport: TransportArg,

    /// Benchmark shape
    #[arg(short, long, value_enum, default_value_t = Mode::Mixed)]
    mode: Mode,

    /// Number of concurrent virtual clients
    #[arg(short, long, default_value_t = 100)]
    clients: usize,

    /// Operations each client performs (mixed mode)
    #[arg(short, long, default_value_t = 1500)]
    ops_per_client: usize,

    /// Operations per sweep step, split across the clients (sweep mode)
    #[arg(long, default_value_t = 10_000)]
    ops: usize,

    /// Operation(s) to sweep (sweep mode)
    #[arg(long, value_enum, default_value_t = OperationArg::All)]
    operation: OperationArg,

    /// Single payload size to sweep in KB; 0 or absent sweeps every size
    /// class (sweep mode)
    #[arg(long)]
    file_size_kb: Option<u32>,

    /// Stop issuing operations after this many seconds
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Operation weights, e.g. list:30,upload:35,download:35 (mixed mode)
    #[arg(long, default_value = "list:30,upload:35,download:35")]
    distribution: String,

    /// Payload size classes in KB, comma separated
    #[arg(long)]
    sizes: Option<String>,

    /// Seed for the workload plan
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Configuration file supplying server addresses and broker settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the HTTP file server
    #[arg(long)]
    http_url: Option<String>,

    /// AMQP URL of the broker
    #[arg(long)]
    amqp_url: Option<String>,

    /// Queue the broker file server consumes
    #[arg(long)]
    request_queue: Option<String>,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Upper bound of the random pause between a client's operations, in ms
    #[arg(long, default_value_t = 10)]
    think_ms: u64,

    /// Output directory for CSV and JSON files
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Start in-process HTTP and broker file servers instead of using
    /// external ones
    #[arg(long)]
    local: bool,

    /// Prefetch window of the in-process broker file server
    #[arg(long, default_value_t = 1)]
    prefetch: u16,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Where the servers live and the pools every provider shares.
struct Endpoints {
    http_url: String,
    amqp_url: String,
    request_queue: QueueName,
    timeout: Duration,
    http_pool: Arc<ConnectionPool<reqwest::Client>>,
    broker_pool: Arc<ConnectionPool<dyn BrokerConnection>>,
}

impl Endpoints {
    fn provider(
        &self,
        kind: TransportKind,
        local: Option<&LocalServices>,
    ) -> anyhow::Result<Arc<dyn TransportProvider>> {
        let provider: Arc<dyn TransportProvider> = match kind {
            TransportKind::Http => Arc::new(HttpProvider::new(
                self.http_url.clone(),
                self.timeout,
                Arc::clone(&self.http_pool),
            )),
            TransportKind::Broker => {
                let (address, connector) = broker_connector(local, &self.amqp_url)?;
                Arc::new(BrokerProvider::new(
                    address,
                    connector,
                    Arc::clone(&self.broker_pool),
                    RpcClientOptions {
                        request_queue: self.request_queue.clone(),
                        reply_timeout: self.timeout,
                    },
                ))
            }
        };
        Ok(provider)
    }

    async fn close(&self) {
        for connection in self.broker_pool.drain() {
            if let Err(e) = connection.close().await {
                tracing::debug!(error = %e, "Closing pooled broker connection failed");
            }
        }
        self.http_pool.drain();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => ConfigLoader::load_file(path)?,
        None => Config::default(),
    };

    let mut size_classes = match &args.sizes {
        Some(sizes) => parse_size_classes(sizes)?,
        None => DEFAULT_SIZE_CLASSES_KB.to_vec(),
    };
    if args.mode == Mode::Sweep {
        if let Some(kb) = args.file_size_kb.filter(|&kb| kb > 0) {
            size_classes = vec![kb];
        }
    }
    let operations = args.operation.operations();
    let distribution: Distribution = match args.mode {
        Mode::Mixed => args.distribution.parse()?,
        Mode::Sweep => Distribution::new(
            u32::from(operations.contains(&Operation::List)),
            u32::from(operations.contains(&Operation::Upload)),
            u32::from(operations.contains(&Operation::Download)),
        ),
    };
    if args.clients == 0 {
        bail!("--clients must be at least 1");
    }

    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.broker.reply_timeout);
    let request_queue = args
        .request_queue
        .as_deref()
        .map(QueueName::new)
        .unwrap_or_else(|| config.broker.request_queue.clone());
    let max_duration = args.duration_secs.map(Duration::from_secs);

    match args.mode {
        Mode::Mixed => {
            println!("Fileshare Mixed Concurrency Benchmark");
            println!("=====================================");
        }
        Mode::Sweep => {
            println!("Fileshare Operation Sweep");
            println!("=========================");
        }
    }
    println!("Transports:      {:?}", args.transport);
    println!("Clients:         {}", args.clients);
    match args.mode {
        Mode::Mixed => {
            println!("Ops per client:  {}", args.ops_per_client);
            println!("Distribution:    {}", distribution);
        }
        Mode::Sweep => {
            println!("Ops per step:    {}", args.ops);
            println!("Operations:      {:?}", args.operation);
        }
    }
    if let Some(d) = max_duration {
        println!("Max duration:    {}s", d.as_secs());
    }
    println!("Size classes:    {:?} KB", size_classes);
    println!("Seed:            {}", args.seed);
    println!();

    let payloads = Arc::new(Payloads::new(&size_classes));
    let reporter = Reporter::new(&args.output_dir)?;

    let local = if args.local {
        let options = RpcServerOptions {
            request_queue: request_queue.clone(),
            prefetch: args.prefetch,
        };
        Some(LocalServices::start(options).await?)
    } else {
        None
    };

    let endpoints = Endpoints {
        http_url: match (&local, &args.http_url) {
            (Some(services), _) => services.http_url(),
            (None, Some(url)) => url.clone(),
            (None, None) => format!("http://{}", config.http.listen_addr),
        },
        amqp_url: args.amqp_url.clone().unwrap_or(config.broker.url.clone()),
        request_queue,
        timeout,
        http_pool: Arc::new(ConnectionPool::new()),
        broker_pool: Arc::new(ConnectionPool::new()),
    };

    let ops_per_client = match args.mode {
        Mode::Mixed => args.ops_per_client,
        Mode::Sweep => args.ops.div_ceil(args.clients),
    };
    let mut report = BenchmarkReport::new(RunParameters {
        clients: args.clients,
        ops_per_client,
        max_duration_secs: max_duration.map(|d| d.as_secs_f64()),
        distribution,
        size_classes_kb: size_classes.clone(),
        seed: args.seed,
    });

    let plan = match args.mode {
        Mode::Mixed => generate(
            args.clients,
            args.ops_per_client,
            distribution,
            &size_classes,
            args.seed,
        ),
        Mode::Sweep => Vec::new(),
    };
    let sweep_steps = steps(&operations, &size_classes);
    // A sweep writes every transport into one CSV
    let sweep_sink = match args.mode {
        Mode::Sweep => Some(Arc::new(ResultSink::with_csv(reporter.sweep_csv_path())?)),
        Mode::Mixed => None,
    };

    for kind in args.transport.kinds() {
        let provider = endpoints.provider(kind, local.as_ref())?;
        let sink = match &sweep_sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(ResultSink::with_csv(reporter.run_csv_path(kind))?),
        };
        let executor = BenchmarkExecutor::new(
            provider,
            Arc::clone(&payloads),
            Arc::clone(&sink),
            ExecutorConfig {
                max_duration,
                max_think_time: Duration::from_millis(args.think_ms),
                seed: args.seed,
            },
        );

        println!("Running {} benchmark...", kind);
        let needs_fixtures = match args.mode {
            Mode::Mixed => distribution.download > 0,
            Mode::Sweep => operations.contains(&Operation::Download),
        };
        if needs_fixtures {
            if let Err(e) = executor.seed_fixtures().await {
                tracing::warn!(transport = %kind, error = %e, "Fixture seeding failed; downloads will fail");
            }
        }

        let stats = match args.mode {
            Mode::Mixed => {
                let summary = executor.run(plan.clone()).await;
                compute(kind, &sink.records(), summary.wall_clock)
            }
            Mode::Sweep => {
                let outcome = run_sweep(&executor, &sweep_steps, args.ops, args.clients).await;
                for step in &outcome.steps {
                    println!("{}", render_step(step));
                }
                outcome.overall
            }
        };
        sink.flush()?;

        println!();
        print!("{}", render_summary(&stats));
        if let Some(path) = sink.csv_path() {
            println!("  records: {}", path.display());
        }
        println!();
        report.add_result(stats);
    }

    endpoints.close().await;

    let summary_path = reporter.save_summary(&report.results)?;
    let report_path = reporter.save_report(&report)?;

    let comparison = render_comparison(&report.results);
    if !comparison.is_empty() {
        println!("{}", comparison);
    }
    println!("Summary saved to: {}", summary_path.display());
    println!("Report saved to:  {}", report_path.display());

    if let Some(services) = local {
        services
            .shutdown()
            .await
            .context("stopping local file services")?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn broker_connector(
    local: Option<&LocalServices>,
    amqp_url: &str,
) -> anyhow::Result<(String, Arc<dyn BrokerConnector>)> {
    if let Some(services) = local {
        return Ok((
            MEMORY_ADDRESS.to_string(),
            Arc::new(services.broker().clone()),
        ));
    }
    amqp_connector(amqp_url)
}

#[cfg(feature = "amqp")]
fn amqp_connector(amqp_url: &str) -> anyhow::Result<(String, Arc<dyn BrokerConnector>)> {
    Ok((
        amqp_url.to_string(),
        Arc::new(fileshare_core::broker::AmqpConnector),
    ))
}

#[cfg(not(feature = "amqp"))]
fn amqp_connector(amqp_url: &str) -> anyhow::Result<(String, Arc<dyn BrokerConnector>)> {
    bail!(
        "cannot reach broker at {}: built without the `amqp` feature; use --local",
        amqp_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("run_benchmarks").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_transport_aliases() {
        assert_eq!(parse(&["--transport", "rabbit"]).transport, TransportArg::Broker);
        assert_eq!(parse(&["--transport", "amqp"]).transport, TransportArg::Broker);
        assert_eq!(parse(&["--transport", "grpc"]).transport, TransportArg::Http);
        assert_eq!(parse(&["-t", "all"]).transport.kinds(), TransportKind::ALL.to_vec());
    }

    #[test]
    fn test_transport_is_required() {
        assert!(Args::try_parse_from(["run_benchmarks", "--clients", "4"]).is_err());
        assert!(Args::try_parse_from(["run_benchmarks", "--transport", "zeromq"]).is_err());
    }

    #[test]
    fn test_sweep_arguments() {
        let args = parse(&[
            "--transport",
            "rabbit",
            "--mode",
            "sweep",
            "--operation",
            "upload",
            "--file-size-kb",
            "1024",
            "--ops",
            "10",
            "--clients",
            "3",
        ]);
        assert_eq!(args.mode, Mode::Sweep);
        assert_eq!(args.operation.operations(), vec![Operation::Upload]);
        assert_eq!(args.file_size_kb, Some(1024));
        assert_eq!(args.ops, 10);

        let defaults = parse(&["--transport", "http"]);
        assert_eq!(defaults.mode, Mode::Mixed);
        assert_eq!(defaults.operation.operations(), Operation::ALL.to_vec());
        assert_eq!(defaults.ops, 10_000);
    }
}
