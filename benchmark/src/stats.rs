// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Aggregate statistics over result records.
//!
//! Latency figures cover successful operations only. Percentiles interpolate
//! linearly between the two nearest ranked samples at index
//! `(n - 1) * rank / 100`. Standard deviation is the population one.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fileshare_core::{Operation, TransportKind};
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::sink::ResultRecord;
use crate::workload::Distribution;

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Statistics over unsorted samples; all zero when there are none.
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_by(f64::total_cmp);
        let len = samples.len();
        let mean_ms = samples.iter().sum::<f64>() / len as f64;
        let variance = samples
            .iter()
            .map(|&x| {
                let diff = x - mean_ms;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        Self {
            count: len,
            mean_ms,
            min_ms: samples[0],
            max_ms: samples[len - 1],
            std_dev_ms: variance.sqrt(),
            p50_ms: percentile(&samples, 50.0),
            p95_ms: percentile(&samples, 95.0),
            p99_ms: percentile(&samples, 99.0),
        }
    }

    /// Format milliseconds in human-readable form (auto-selects μs/ms/s).
    pub fn format_latency(ms: f64) -> String {
        if ms < 1.0 {
            format!("{:.2}μs", ms * 1_000.0)
        } else if ms < 1_000.0 {
            format!("{:.2}ms", ms)
        } else {
            format!("{:.2}s", ms / 1_000.0)
        }
    }
}

/// Interpolated percentile of ascending `sorted` samples at `rank` in 0..=100.
pub fn percentile(sorted: &[f64], rank: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let index = (len - 1) as f64 * rank.clamp(0.0, 100.0) / 100.0;
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            let weight = index - lower as f64;
            sorted[lower] * (1.0 - weight) + sorted[upper] * weight
        }
    }
}

/// Counts and latency for one slice of the records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub latency: LatencyStats,
}

impl DimensionStats {
    fn from_records<'a>(records: impl Iterator<Item = &'a ResultRecord>) -> Self {
        let mut total = 0;
        let mut samples = Vec::new();
        for record in records {
            total += 1;
            if record.success {
                samples.push(record.rtt_ms);
            }
        }
        let successful = samples.len();
        Self {
            total,
            successful,
            failed: total - successful,
            latency: LatencyStats::from_samples(samples),
        }
    }
}

/// Everything computed for one transport's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub transport: TransportKind,
    pub total_operations: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of successful operations, 0..=100.
    pub success_rate: f64,
    pub wall_clock_secs: f64,
    pub throughput_ops_per_sec: f64,
    pub latency: LatencyStats,
    pub by_operation: BTreeMap<Operation, DimensionStats>,
    /// Keyed by payload size class in KB; List operations are excluded.
    pub by_size_kb: BTreeMap<u32, DimensionStats>,
}

/// Compute statistics for `records` gathered over `wall_clock`.
///
/// Throughput counts every operation, failed ones included, over the whole
/// run span.
pub fn compute(
    transport: TransportKind,
    records: &[ResultRecord],
    wall_clock: Duration,
) -> AggregateStatistics {
    let overall = DimensionStats::from_records(records.iter());

    let by_operation = Operation::ALL
        .iter()
        .filter_map(|&operation| {
            let stats = DimensionStats::from_records(
                records.iter().filter(|r| r.operation == operation),
            );
            (stats.total > 0).then_some((operation, stats))
        })
        .collect();

    let mut sizes: Vec<u32> = records
        .iter()
        .filter(|r| r.operation.carries_payload())
        .map(|r| r.payload_size_kb)
        .collect();
    sizes.sort_unstable();
    sizes.dedup();
    let by_size_kb = sizes
        .into_iter()
        .map(|kb| {
            let stats = DimensionStats::from_records(
                records
                    .iter()
                    .filter(|r| r.operation.carries_payload() && r.payload_size_kb == kb),
            );
            (kb, stats)
        })
        .collect();

    let wall_clock_secs = wall_clock.as_secs_f64();
    let throughput_ops_per_sec = if wall_clock_secs > 0.0 {
        overall.total as f64 / wall_clock_secs
    } else {
        0.0
    };
    let success_rate = if overall.total > 0 {
        overall.successful as f64 * 100.0 / overall.total as f64
    } else {
        0.0
    };

    AggregateStatistics {
        transport,
        total_operations: overall.total,
        successful: overall.successful,
        failed: overall.failed,
        success_rate,
        wall_clock_secs,
        throughput_ops_per_sec,
        latency: overall.latency,
        by_operation,
        by_size_kb,
    }
}

/// System information captured at benchmark time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
    pub hostname: String,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Parameters a run was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParameters {
    pub clients: usize,
    pub ops_per_client: usize,
    pub max_duration_secs: Option<f64>,
    pub distribution: Distribution,
    pub size_classes_kb: Vec<u32>,
    pub seed: u64,
}

/// Complete benchmark report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark_suite: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub parameters: RunParameters,
    pub results: Vec<AggregateStatistics>,
}

impl BenchmarkReport {
    pub fn new(parameters: RunParameters) -> Self {
        Self {
            benchmark_suite: "fileshare-mixed-concurrency".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            parameters,
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: AggregateStatistics) {
        self.results.push(result);
    }
}
