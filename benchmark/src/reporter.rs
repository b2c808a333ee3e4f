// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Report generation for benchmark results.
//!
//! Every file a run writes shares one timestamp stamp, taken when the
//! reporter is created: the per-transport record CSVs, the summary CSV and
//! the JSON report.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fileshare_core::TransportKind;

use crate::error::{BenchmarkError, BenchmarkResult};
use crate::stats::{AggregateStatistics, BenchmarkReport, LatencyStats};
use crate::sweep::StepResult;

/// Header of the summary CSV file.
pub const SUMMARY_HEADER: &str = "system,total_operations,successful,failed,success_rate,\
mean_rtt_ms,p50_rtt_ms,p95_rtt_ms,p99_rtt_ms,throughput_ops_per_sec";

const FILE_PREFIX: &str = "mixed_concurrency";

/// Writes benchmark output files into one directory.
pub struct Reporter {
    output_dir: PathBuf,
    stamp: String,
}

impl Reporter {
    /// Create a reporter writing into `output_dir`, creating it if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> BenchmarkResult<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|source| BenchmarkError::Output {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            output_dir,
            stamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        })
    }

    /// Create a reporter using the crate's `results` directory.
    pub fn default_location() -> BenchmarkResult<Self> {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        Self::new(Path::new(manifest_dir).join("results"))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Where the record CSV for `transport` goes.
    pub fn run_csv_path(&self, transport: TransportKind) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}_{}.csv", FILE_PREFIX, transport, self.stamp))
    }

    /// Where the record CSV of a sweep goes; every transport shares it.
    pub fn sweep_csv_path(&self) -> PathBuf {
        self.output_dir.join(format!("operation_sweep_{}.csv", self.stamp))
    }

    pub fn summary_csv_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_summary_{}.csv", FILE_PREFIX, self.stamp))
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_report_{}.json", FILE_PREFIX, self.stamp))
    }

    /// Write one summary row per transport.
    pub fn save_summary(&self, results: &[AggregateStatistics]) -> BenchmarkResult<PathBuf> {
        let path = self.summary_csv_path();
        let output_error = |source| BenchmarkError::Output {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(output_error)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", SUMMARY_HEADER).map_err(output_error)?;
        for stats in results {
            writeln!(writer, "{}", summary_row(stats)).map_err(output_error)?;
        }
        writer.flush().map_err(output_error)?;

        Ok(path)
    }

    /// Save the full report as pretty JSON.
    pub fn save_report(&self, report: &BenchmarkReport) -> BenchmarkResult<PathBuf> {
        let path = self.report_path();
        let file = File::create(&path).map_err(|source| BenchmarkError::Output {
            path: path.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), report)?;
        Ok(path)
    }

    /// List all JSON reports in the output directory, oldest first.
    pub fn list_reports(&self) -> BenchmarkResult<Vec<PathBuf>> {
        let read_error = |source| BenchmarkError::Output {
            path: self.output_dir.clone(),
            source,
        };

        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if path.extension().is_some_and(|e| e == "json") {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    /// Load a previously saved report.
    pub fn load(path: impl AsRef<Path>) -> BenchmarkResult<BenchmarkReport> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| BenchmarkError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(file)?)
    }
}

fn summary_row(stats: &AggregateStatistics) -> String {
    format!(
        "{},{},{},{},{:.2},{:.3},{:.3},{:.3},{:.3},{:.2}",
        stats.transport,
        stats.total_operations,
        stats.successful,
        stats.failed,
        stats.success_rate,
        stats.latency.mean_ms,
        stats.latency.p50_ms,
        stats.latency.p95_ms,
        stats.latency.p99_ms,
        stats.throughput_ops_per_sec
    )
}

/// One console line for a finished sweep step.
pub fn render_step(result: &StepResult) -> String {
    let fmt = LatencyStats::format_latency;
    let stats = &result.stats;
    let size = if result.step.operation.carries_payload() {
        format!("{} KB", result.step.payload_size_kb)
    } else {
        "-".to_string()
    };
    format!(
        "  {:<6} {:<8} {:>8} {:>7} ops, {:>6.2}% ok, mean {}, p95 {}, {:.2} ops/s",
        stats.transport.as_str(),
        result.step.operation.as_str(),
        size,
        stats.total_operations,
        stats.success_rate,
        fmt(stats.latency.mean_ms),
        fmt(stats.latency.p95_ms),
        stats.throughput_ops_per_sec
    )
}

/// Console summary for one transport.
pub fn render_summary(stats: &AggregateStatistics) -> String {
    let fmt = LatencyStats::format_latency;
    let mut out = String::new();

    let _ = writeln!(out, "=== {} ===", stats.transport.as_str().to_uppercase());
    let _ = writeln!(
        out,
        "  operations: {} total, {} ok, {} failed ({:.2}% success)",
        stats.total_operations, stats.successful, stats.failed, stats.success_rate
    );
    let _ = writeln!(
        out,
        "  wall clock: {:.2}s, throughput: {:.2} ops/s",
        stats.wall_clock_secs, stats.throughput_ops_per_sec
    );
    let _ = writeln!(
        out,
        "  rtt: mean {} | p50 {} | p95 {} | p99 {} | min {} | max {} | std dev {}",
        fmt(stats.latency.mean_ms),
        fmt(stats.latency.p50_ms),
        fmt(stats.latency.p95_ms),
        fmt(stats.latency.p99_ms),
        fmt(stats.latency.min_ms),
        fmt(stats.latency.max_ms),
        fmt(stats.latency.std_dev_ms)
    );

    if !stats.by_operation.is_empty() {
        let _ = writeln!(out, "  by operation:");
        for (operation, dim) in &stats.by_operation {
            let _ = writeln!(
                out,
                "    {:<8} {:>7} ops, {:>7} failed, mean {}, p95 {}",
                operation.as_str(),
                dim.total,
                dim.failed,
                fmt(dim.latency.mean_ms),
                fmt(dim.latency.p95_ms)
            );
        }
    }
    if !stats.by_size_kb.is_empty() {
        let _ = writeln!(out, "  by payload size:");
        for (size_kb, dim) in &stats.by_size_kb {
            let _ = writeln!(
                out,
                "    {:>6} KB {:>7} ops, {:>7} failed, mean {}, p95 {}",
                size_kb,
                dim.total,
                dim.failed,
                fmt(dim.latency.mean_ms),
                fmt(dim.latency.p95_ms)
            );
        }
    }
    out
}

/// Side-by-side headline numbers when more than one transport ran.
pub fn render_comparison(results: &[AggregateStatistics]) -> String {
    let mut out = String::new();
    if results.len() < 2 {
        return out;
    }

    let _ = writeln!(
        out,
        "{:<8} {:>12} {:>10} {:>12} {:>12} {:>12}",
        "system", "throughput", "success", "mean", "p95", "p99"
    );
    for stats in results {
        let _ = writeln!(
            out,
            "{:<8} {:>8.2}/s {:>9.2}% {:>12} {:>12} {:>12}",
            stats.transport.as_str(),
            stats.throughput_ops_per_sec,
            stats.success_rate,
            LatencyStats::format_latency(stats.latency.mean_ms),
            LatencyStats::format_latency(stats.latency.p95_ms),
            LatencyStats::format_latency(stats.latency.p99_ms)
        );
    }
    out
}
