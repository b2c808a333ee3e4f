// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Append-only result collection.
//!
//! Every executed operation produces exactly one [`ResultRecord`]. The sink
//! keeps all of them in memory for statistics and, when backed by a file,
//! appends each one as a CSV row as it arrives.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use fileshare_core::{Operation, TransportKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BenchmarkError, BenchmarkResult};

/// Header of the per-run CSV file.
pub const CSV_HEADER: &str = "timestamp,system,operation,file_size_kb,client_id,rtt_ms,success";

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    pub transport: TransportKind,
    pub operation: Operation,
    pub payload_size_kb: u32,
    pub client_id: usize,
    pub rtt_ms: f64,
    pub success: bool,
}

impl ResultRecord {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{:.3},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.transport,
            self.operation,
            self.payload_size_kb,
            self.client_id,
            self.rtt_ms,
            self.success
        )
    }
}

struct SinkState {
    records: Vec<ResultRecord>,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

/// Thread-safe record collector.
pub struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    /// Sink that only keeps records in memory.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(SinkState {
                records: Vec::new(),
                writer: None,
                path: None,
            }),
        }
    }

    /// Sink that also streams records to a new CSV file at `path`.
    pub fn with_csv(path: impl AsRef<Path>) -> BenchmarkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let output_error = |source| BenchmarkError::Output {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(output_error)?;
        }
        let file = File::create(&path).map_err(output_error)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", CSV_HEADER).map_err(output_error)?;

        Ok(Self {
            state: Mutex::new(SinkState {
                records: Vec::new(),
                writer: Some(writer),
                path: Some(path),
            }),
        })
    }

    /// Append one record. A CSV write failure is logged and the file is
    /// abandoned; the record is still kept in memory.
    pub fn record(&self, record: ResultRecord) {
        let mut state = self.state.lock();

        let failed = match state.writer.as_mut() {
            Some(writer) => writeln!(writer, "{}", record.csv_row()).err(),
            None => None,
        };
        if let Some(e) = failed {
            tracing::warn!(path = ?state.path, error = %e, "Dropping CSV output after write failure");
            state.writer = None;
        }
        state.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Copy of every record collected so far, in arrival order.
    pub fn records(&self) -> Vec<ResultRecord> {
        self.state.lock().records.clone()
    }

    pub fn csv_path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    /// Flush buffered CSV rows to disk.
    pub fn flush(&self) -> BenchmarkResult<()> {
        let mut state = self.state.lock();
        let path = state.path.clone().unwrap_or_default();
        if let Some(writer) = state.writer.as_mut() {
            writer
                .flush()
                .map_err(|source| BenchmarkError::Output { path, source })?;
        }
        Ok(())
    }
}
