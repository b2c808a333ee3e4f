// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fileshare Benchmarking Framework
//!
//! A reproducible, concurrent benchmark comparing the broker and HTTP
//! transports of the fileshare service under the same mixed workload.
//!
//! # Pipeline
//!
//! - **Workload**: a seeded plan of list/upload/download operations per
//!   virtual client, generated once and replayed against each transport
//! - **Executor**: one task per virtual client, released together by one
//!   start signal, every outcome captured as a result record
//! - **Sweep**: one operation and payload size at a time, a fixed operation
//!   count split across the clients
//! - **Statistics**: throughput, success rate and latency percentiles,
//!   overall and per operation and payload size
//! - **Reporting**: per-run record CSVs, a summary CSV, a JSON report and a
//!   console summary
//!
//! # Data Output
//!
//! All files of one invocation share a timestamp stamp in their names.

pub mod error;
pub mod executor;
pub mod local;
pub mod reporter;
pub mod sink;
pub mod stats;
pub mod sweep;
pub mod workload;

pub use error::{BenchmarkError, BenchmarkResult};
pub use executor::{
    BenchmarkExecutor, BrokerProvider, ExecutorConfig, HttpProvider, RunSummary,
    TransportProvider,
};
pub use local::LocalServices;
pub use reporter::{render_comparison, render_step, render_summary, Reporter};
pub use sink::{ResultRecord, ResultSink};
pub use stats::{compute, AggregateStatistics, BenchmarkReport, LatencyStats, RunParameters};
pub use sweep::{run_sweep, split_ops, StepResult, SweepOutcome, SweepStep};
pub use workload::{generate, Distribution, OperationSequenceItem, Payloads};
