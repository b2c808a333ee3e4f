// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Single-operation sweep.
//!
//! Where the mixed run replays one weighted plan, a sweep measures one
//! operation and one payload size at a time. Each step splits a fixed number
//! of operations across the clients and is a complete executor run of its
//! own, so every step gets fresh sessions and its own unrecorded warm-up.
//! List steps ignore payload size and run once per transport.

use fileshare_core::{Operation, TransportKind};

use crate::executor::BenchmarkExecutor;
use crate::stats::{compute, AggregateStatistics};
use crate::workload::OperationSequenceItem;

/// One operation at one payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepStep {
    pub operation: Operation,
    /// 0 for List.
    pub payload_size_kb: u32,
}

/// Statistics of one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: SweepStep,
    pub stats: AggregateStatistics,
}

/// Every step of one transport plus the statistics across all of them.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub transport: TransportKind,
    pub steps: Vec<StepResult>,
    pub overall: AggregateStatistics,
}

/// Split `total` operations over `clients`; the first `total % clients`
/// clients take one extra.
pub fn split_ops(total: usize, clients: usize) -> Vec<usize> {
    if clients == 0 {
        return Vec::new();
    }
    let base = total / clients;
    let extra = total % clients;
    (0..clients)
        .map(|client_id| base + usize::from(client_id < extra))
        .collect()
}

/// Steps in sweep order: operation by operation, size by size.
pub fn steps(operations: &[Operation], size_classes: &[u32]) -> Vec<SweepStep> {
    operations
        .iter()
        .flat_map(|&operation| {
            let sizes = if operation.carries_payload() {
                size_classes.to_vec()
            } else {
                vec![0]
            };
            sizes.into_iter().map(move |payload_size_kb| SweepStep {
                operation,
                payload_size_kb,
            })
        })
        .collect()
}

/// Plan in which every client repeats `step` its share of times.
pub fn single_operation_plan(
    step: SweepStep,
    ops_per_client: &[usize],
) -> Vec<Vec<OperationSequenceItem>> {
    ops_per_client
        .iter()
        .enumerate()
        .map(|(client_id, &ops)| {
            (0..ops)
                .map(|sequence_index| OperationSequenceItem {
                    client_id,
                    sequence_index,
                    operation: step.operation,
                    payload_size_kb: step.payload_size_kb,
                })
                .collect()
        })
        .collect()
}

/// Run `steps` one after another on `executor`, `total_ops` operations per
/// step spread over `clients`.
///
/// Records go to the executor's sink, so one CSV collects the whole sweep.
/// The overall statistics span every step; their wall clock is the sum of
/// the measured step runs.
pub async fn run_sweep(
    executor: &BenchmarkExecutor,
    steps: &[SweepStep],
    total_ops: usize,
    clients: usize,
) -> SweepOutcome {
    let transport = executor.transport();
    let shares = split_ops(total_ops, clients);
    let first_record = executor.sink().len();
    let mut measured = std::time::Duration::ZERO;
    let mut results = Vec::with_capacity(steps.len());

    for &step in steps {
        tracing::info!(
            transport = %transport,
            operation = %step.operation,
            size_kb = step.payload_size_kb,
            clients,
            total_ops,
            "Sweep step"
        );

        let before = executor.sink().len();
        let summary = executor.run(single_operation_plan(step, &shares)).await;
        measured += summary.wall_clock;

        let records = executor.sink().records();
        let stats = compute(transport, &records[before..], summary.wall_clock);
        results.push(StepResult { step, stats });
    }

    let records = executor.sink().records();
    let overall = compute(transport, &records[first_record..], measured);

    SweepOutcome {
        transport,
        steps: results,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_gives_remainder_to_first_clients() {
        assert_eq!(split_ops(10, 3), vec![4, 3, 3]);
        assert_eq!(split_ops(9, 3), vec![3, 3, 3]);
        assert_eq!(split_ops(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_ops(10_000, 1), vec![10_000]);
        assert!(split_ops(5, 0).is_empty());
    }

    #[test]
    fn test_split_preserves_total() {
        for (total, clients) in [(10_000, 7), (1, 1), (0, 3), (101, 10)] {
            assert_eq!(split_ops(total, clients).iter().sum::<usize>(), total);
        }
    }

    #[test]
    fn test_list_runs_once_while_payload_ops_cover_every_size() {
        let steps = steps(&Operation::ALL, &[10, 1024]);
        let expected: Vec<(Operation, u32)> = vec![
            (Operation::List, 0),
            (Operation::Upload, 10),
            (Operation::Upload, 1024),
            (Operation::Download, 10),
            (Operation::Download, 1024),
        ];
        let actual: Vec<(Operation, u32)> = steps
            .iter()
            .map(|s| (s.operation, s.payload_size_kb))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_single_operation_plan_follows_shares() {
        let step = SweepStep {
            operation: Operation::Upload,
            payload_size_kb: 10,
        };
        let plan = single_operation_plan(step, &split_ops(10, 3));

        assert_eq!(plan.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 3, 3]);
        for (client_id, sequence) in plan.iter().enumerate() {
            for (index, item) in sequence.iter().enumerate() {
                assert_eq!(item.client_id, client_id);
                assert_eq!(item.sequence_index, index);
                assert_eq!(item.operation, Operation::Upload);
                assert_eq!(item.payload_size_kb, 10);
            }
        }
    }
}
