// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deterministic workload generation.
//!
//! A plan is generated once and replayed against every transport, so both
//! see exactly the same operations in the same per-client order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fileshare_core::Operation;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::BenchmarkError;

/// Payload size classes used when none are given: 10 KB, 1 MB, 10 MB.
pub const DEFAULT_SIZE_CLASSES_KB: [u32; 3] = [10, 1024, 10240];

/// Relative weights of the three operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub list: u32,
    pub upload: u32,
    pub download: u32,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            list: 30,
            upload: 35,
            download: 35,
        }
    }
}

impl Distribution {
    pub fn new(list: u32, upload: u32, download: u32) -> Self {
        Self {
            list,
            upload,
            download,
        }
    }

    /// All-zero weights fall back to the default mix.
    pub fn normalized(self) -> Self {
        if self.total() == 0 {
            Self::default()
        } else {
            self
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.list) + u64::from(self.upload) + u64::from(self.download)
    }

    /// Map a roll in `0..total()` onto an operation.
    pub fn pick(&self, roll: u64) -> Operation {
        if roll < u64::from(self.list) {
            Operation::List
        } else if roll < u64::from(self.list) + u64::from(self.upload) {
            Operation::Upload
        } else {
            Operation::Download
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "list:{},upload:{},download:{}",
            self.list, self.upload, self.download
        )
    }
}

impl FromStr for Distribution {
    type Err = BenchmarkError;

    /// Parse `list:W,upload:W,download:W`. Keys may appear in any order and
    /// missing keys keep their default weight.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| BenchmarkError::InvalidDistribution {
            input: s.to_string(),
            reason,
        };

        let mut distribution = Self::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| invalid(format!("'{}' is not key:weight", part)))?;
            let weight: u32 = value
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{}' is not a non-negative integer", value)))?;

            match key.trim().parse::<Operation>() {
                Ok(Operation::List) => distribution.list = weight,
                Ok(Operation::Upload) => distribution.upload = weight,
                Ok(Operation::Download) => distribution.download = weight,
                Err(_) => return Err(invalid(format!("unknown operation '{}'", key))),
            }
        }
        Ok(distribution)
    }
}

/// Parse a comma-separated list of size classes in KB, e.g. `10,1024`.
pub fn parse_size_classes(s: &str) -> Result<Vec<u32>, BenchmarkError> {
    let invalid = |reason: String| BenchmarkError::InvalidSizeClasses {
        input: s.to_string(),
        reason,
    };

    let mut sizes = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kb: u32 = part
            .parse()
            .map_err(|_| invalid(format!("'{}' is not a size in KB", part)))?;
        if kb == 0 {
            return Err(invalid("size classes must be at least 1 KB".to_string()));
        }
        if !sizes.contains(&kb) {
            sizes.push(kb);
        }
    }
    if sizes.is_empty() {
        return Err(invalid("at least one size class is required".to_string()));
    }
    Ok(sizes)
}

/// One planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSequenceItem {
    pub client_id: usize,
    pub sequence_index: usize,
    pub operation: Operation,
    /// Payload size class in KB; 0 for List.
    pub payload_size_kb: u32,
}

/// Generate one operation sequence per client.
///
/// A single RNG seeded from `seed` is advanced client by client, index by
/// index: one draw for the operation and, unless it is List, one draw for the
/// size class. The same arguments always produce the same plan.
pub fn generate(
    num_clients: usize,
    ops_per_client: usize,
    distribution: Distribution,
    size_classes: &[u32],
    seed: u64,
) -> Vec<Vec<OperationSequenceItem>> {
    let distribution = distribution.normalized();
    let total = distribution.total();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..num_clients)
        .map(|client_id| {
            (0..ops_per_client)
                .map(|sequence_index| {
                    let operation = distribution.pick(rng.gen_range(0..total));
                    let payload_size_kb = if operation.carries_payload() {
                        size_classes.choose(&mut rng).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    OperationSequenceItem {
                        client_id,
                        sequence_index,
                        operation,
                        payload_size_kb,
                    }
                })
                .collect()
        })
        .collect()
}

/// Name of the shared fixture a download of `size_kb` reads.
pub fn fixture_name(size_kb: u32) -> String {
    format!("test_{}kb.dat", size_kb)
}

/// Name a client uploads a `size_kb` payload to.
pub fn upload_name(size_kb: u32, client_id: usize) -> String {
    format!("test_{}kb_{}.dat", size_kb, client_id)
}

/// One deterministic payload per size class.
#[derive(Debug, Clone, Default)]
pub struct Payloads {
    by_size: BTreeMap<u32, Arc<[u8]>>,
}

impl Payloads {
    pub fn new(size_classes: &[u32]) -> Self {
        let by_size = size_classes
            .iter()
            .map(|&kb| {
                let bytes: Vec<u8> = (0..kb as usize * 1024).map(|i| (i % 256) as u8).collect();
                (kb, Arc::from(bytes))
            })
            .collect();
        Self { by_size }
    }

    pub fn get(&self, size_kb: u32) -> Option<&[u8]> {
        self.by_size.get(&size_kb).map(|bytes| &bytes[..])
    }

    pub fn sizes(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_size.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let sizes = DEFAULT_SIZE_CLASSES_KB;
        let a = generate(8, 50, Distribution::default(), &sizes, 42);
        let b = generate(8, 50, Distribution::default(), &sizes, 42);
        assert_eq!(a, b);

        let c = generate(8, 50, Distribution::default(), &sizes, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generate_shape_and_size_classes() {
        let sizes = [10, 1024];
        let plan = generate(3, 20, Distribution::default(), &sizes, 7);

        assert_eq!(plan.len(), 3);
        for (client_id, sequence) in plan.iter().enumerate() {
            assert_eq!(sequence.len(), 20);
            for (index, item) in sequence.iter().enumerate() {
                assert_eq!(item.client_id, client_id);
                assert_eq!(item.sequence_index, index);
                match item.operation {
                    Operation::List => assert_eq!(item.payload_size_kb, 0),
                    _ => assert!(sizes.contains(&item.payload_size_kb)),
                }
            }
        }
    }

    #[test]
    fn test_single_weight_distribution() {
        let plan = generate(2, 30, Distribution::new(0, 0, 5), &[10], 1);
        assert!(plan
            .iter()
            .flatten()
            .all(|item| item.operation == Operation::Download && item.payload_size_kb == 10));
    }

    #[test]
    fn test_zero_weights_use_default() {
        assert_eq!(Distribution::new(0, 0, 0).normalized(), Distribution::default());
        let plan = generate(1, 200, Distribution::new(0, 0, 0), &[10], 9);
        let lists = plan[0].iter().filter(|i| i.operation == Operation::List).count();
        assert!(lists > 0 && lists < 200);
    }

    #[test]
    fn test_pick_boundaries() {
        let d = Distribution::new(30, 35, 35);
        assert_eq!(d.pick(0), Operation::List);
        assert_eq!(d.pick(29), Operation::List);
        assert_eq!(d.pick(30), Operation::Upload);
        assert_eq!(d.pick(64), Operation::Upload);
        assert_eq!(d.pick(65), Operation::Download);
        assert_eq!(d.pick(99), Operation::Download);
    }

    #[test]
    fn test_parse_distribution() {
        let d: Distribution = "download:10, list:70".parse().unwrap();
        assert_eq!(d, Distribution::new(70, 35, 10));
        assert_eq!(d.to_string(), "list:70,upload:35,download:10");

        assert!("list=30".parse::<Distribution>().is_err());
        assert!("delete:5".parse::<Distribution>().is_err());
        assert!("list:-1".parse::<Distribution>().is_err());
    }

    #[test]
    fn test_parse_size_classes() {
        assert_eq!(parse_size_classes("10, 1024,10").unwrap(), vec![10, 1024]);
        assert!(parse_size_classes("").is_err());
        assert!(parse_size_classes("0").is_err());
        assert!(parse_size_classes("ten").is_err());
    }

    #[test]
    fn test_payload_pattern_and_names() {
        let payloads = Payloads::new(&[1]);
        let bytes = payloads.get(1).unwrap();
        assert_eq!(bytes.len(), 1024);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[255], 255);
        assert_eq!(bytes[256], 0);
        assert!(payloads.get(2).is_none());

        assert_eq!(fixture_name(10), "test_10kb.dat");
        assert_eq!(upload_name(10, 3), "test_10kb_3.dat");
    }
}
