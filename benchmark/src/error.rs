// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Errors raised while preparing or running a benchmark.
//!
//! Per-operation failures never show up here: they are recorded as failed
//! results. These errors abort a run before or after the measured phase.

use std::path::PathBuf;

use fileshare_core::{FileshareError, RpcError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Invalid distribution '{input}': {reason}")]
    InvalidDistribution { input: String, reason: String },

    #[error("Invalid size classes '{input}': {reason}")]
    InvalidSizeClasses { input: String, reason: String },

    #[error("Failed to seed fixture {file}: {reason}")]
    FixtureSeeding { file: String, reason: String },

    #[error("Transport error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Service error: {0}")]
    Service(#[from] FileshareError),

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BenchmarkResult<T> = Result<T, BenchmarkError>;
