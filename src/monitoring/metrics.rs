// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Creating or registering a collector failed.
    #[error("prometheus: {0}")]
    Prom(#[from] prometheus::Error),
}

/// State-machine metrics.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Height of the last applied block.
    pub block_height: IntGauge,
    /// Size of the current validator set.
    pub validators: IntGauge,
    /// Total voting power of the current validator set.
    pub validators_power: IntGauge,
    /// Blocks whose application changed the validator set.
    pub validator_set_updates_total: IntCounter,
    /// Blocks whose application changed the consensus params.
    pub consensus_param_updates_total: IntCounter,
    /// Blocks that failed validation.
    pub blocks_rejected_total: IntCounter,

    /// Evidence waiting in the gossip queue.
    pub evidence_pending: IntGauge,
    /// Evidence accepted into the pool.
    pub evidence_added_total: IntCounter,
    /// Evidence that failed verification.
    pub evidence_rejected_total: IntCounter,
    /// Evidence included in applied blocks.
    pub evidence_committed_total: IntCounter,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let g = IntGauge::new(name, help)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl Metrics {
    /// Create and register metrics on a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let block_height = gauge(&registry, "amunchain_state_block_height", "Height of the last applied block")?;
        let validators = gauge(&registry, "amunchain_state_validators", "Number of validators")?;
        let validators_power = gauge(
            &registry,
            "amunchain_state_validators_power",
            "Total voting power of the validator set",
        )?;
        let validator_set_updates_total = counter(
            &registry,
            "amunchain_state_validator_set_updates_total",
            "Blocks that changed the validator set",
        )?;
        let consensus_param_updates_total = counter(
            &registry,
            "amunchain_state_consensus_param_updates_total",
            "Blocks that changed the consensus params",
        )?;
        let blocks_rejected_total = counter(
            &registry,
            "amunchain_state_blocks_rejected_total",
            "Blocks that failed validation",
        )?;

        let evidence_pending = gauge(&registry, "amunchain_evidence_pending", "Queued evidence")?;
        let evidence_added_total =
            counter(&registry, "amunchain_evidence_added_total", "Verified evidence added")?;
        let evidence_rejected_total =
            counter(&registry, "amunchain_evidence_rejected_total", "Rejected evidence")?;
        let evidence_committed_total =
            counter(&registry, "amunchain_evidence_committed_total", "Committed evidence")?;

        Ok(Self {
            registry,
            block_height,
            validators,
            validators_power,
            validator_set_updates_total,
            consensus_param_updates_total,
            blocks_rejected_total,
            evidence_pending,
            evidence_added_total,
            evidence_rejected_total,
            evidence_committed_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_collectors_registered() {
        let m = Metrics::new().unwrap();
        m.block_height.set(5);
        m.evidence_added_total.inc();
        let families = m.registry.gather();
        assert_eq!(families.len(), 10);
        assert!(families.iter().any(|f| f.get_name() == "amunchain_state_block_height"));
    }
}
