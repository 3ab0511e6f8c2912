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

//! Block executor: validates a block, runs it through the application,
//! derives and persists the next state.
//!
//! The executor is the single writer of chain state; `apply_block` takes
//! `&mut self` so two applies cannot overlap. Nothing is written before the
//! state store save, so any earlier error leaves persisted state untouched.

use crate::core::{
    block::{Block, BlockId, BlockMeta, Header},
    events::{Event, EventBus, NopEventBus},
    evidence::EvidenceError,
    params::{ConsensusParams, ParamsError},
    state::{
        latest::LatestBlockState,
        services::{
            BlockStore, BlockStoreError, BlockTxsResult, CommitInfo, EvidencePool,
            ValidatorUpdate, VoteInfo,
        },
        store::{Store, StoreError},
        validation::{validate_block, BlockValidationError},
    },
    types::PubKey,
    validator::{Validator, ValidatorSet, ValidatorSetError},
};
use crate::monitoring::metrics::Metrics;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Block execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] BlockValidationError),
    /// Invariant violation. The node must halt.
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("state store: {0}")]
    Store(#[from] StoreError),
    #[error("application: {0}")]
    App(#[from] BlockStoreError),
    #[error("invalid validator update: {0}")]
    InvalidValidatorUpdate(String),
    #[error("error changing validator set: {0}")]
    ValidatorSet(#[from] ValidatorSetError),
    #[error("invalid consensus params update: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("evidence pool: {0}")]
    Evidence(#[from] EvidenceError),
}

impl ExecError {
    /// True for conditions that must stop the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            ExecError::Fatal(_) => true,
            ExecError::Store(e) => e.is_fatal(),
            ExecError::InvalidBlock(e) => e.is_fatal(),
            ExecError::Evidence(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Single-writer block executor.
pub struct BlockExecutor<B: BlockStore, P: EvidencePool> {
    store: Store,
    block_store: B,
    evpool: P,
    event_bus: Arc<dyn EventBus>,
    metrics: Option<Metrics>,
}

impl<B: BlockStore, P: EvidencePool> BlockExecutor<B, P> {
    /// Executor publishing to a no-op event bus.
    pub fn new(store: Store, block_store: B, evpool: P) -> Self {
        Self {
            store,
            block_store,
            evpool,
            event_bus: Arc::new(NopEventBus),
            metrics: None,
        }
    }

    /// Publish block events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    /// Report to `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// State store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Evidence pool.
    pub fn evpool(&self) -> &P {
        &self.evpool
    }

    /// Check `block` against `state` without side effects.
    pub fn validate_block(
        &self,
        state: &LatestBlockState,
        block: &Block,
    ) -> Result<(), BlockValidationError> {
        validate_block(state, block, &self.evpool)
    }

    /// Validate, execute and commit `block`, returning the next state.
    pub fn apply_block(
        &mut self,
        state: &LatestBlockState,
        block_id: BlockId,
        block: &Block,
    ) -> Result<LatestBlockState, ExecError> {
        let height = block.header.height;
        if let Err(e) = self.validate_block(state, block) {
            warn!(height, err = %e, "rejected block");
            if let Some(m) = self.metrics.as_ref() {
                m.blocks_rejected_total.inc();
            }
            return Err(e.into());
        }

        let byzantine = self.evpool.byzantine_evidence(block);
        let commit_info = self.last_commit_info(state, block)?;

        let result = self
            .block_store
            .commit_and_validate_block_txs(block, &commit_info, &byzantine)?;

        validate_validator_updates(&result.validator_updates, &state.consensus_params)?;
        let delta = validator_delta(&state.next_validators, &result.validator_updates);
        if !delta.is_empty() {
            info!(height, changes = delta.len(), "updates to validators");
        }

        let params_update = match result.consensus_param_updates.as_ref() {
            Some(p) => {
                p.validate()?;
                Some(p.clone())
            }
            None => None,
        };

        let mut next = update_state(state, block_id, &block.header, &delta, params_update)?;
        next.app_hash = result.app_hash;

        if let Err(e) = self.store.save(&next) {
            error!(height, err = %e, "failed to save state");
            return Err(e.into());
        }

        if let Err(e) = self.evpool.update(&next, &block.evidence) {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!(height, err = %e, "evidence pool update failed");
        }

        if let Some(m) = self.metrics.as_ref() {
            m.block_height.set(height as i64);
            m.validators.set(next.validators.size() as i64);
            m.validators_power.set(next.validators.total_voting_power());
            if !delta.is_empty() {
                m.validator_set_updates_total.inc();
            }
            if result.consensus_param_updates.is_some() {
                m.consensus_param_updates_total.inc();
            }
        }

        self.fire_events(block, block_id, result);
        info!(height, txs = block.txs.len(), app_hash = %next.app_hash, "committed state");
        Ok(next)
    }

    /// Signers of the previous block. Empty at the initial height.
    fn last_commit_info(
        &self,
        state: &LatestBlockState,
        block: &Block,
    ) -> Result<CommitInfo, ExecError> {
        let commit = &block.last_commit;
        if block.header.height <= state.initial_height {
            return Ok(CommitInfo {
                round: commit.round,
                votes: Vec::new(),
            });
        }
        let prev_height = block.header.height - 1;
        let last_vals = self.store.load_validators(prev_height)?;
        if commit.size() != last_vals.size() {
            let msg = format!(
                "commit size ({}) doesn't match validator set length ({}) at height {}",
                commit.size(),
                last_vals.size(),
                prev_height
            );
            error!(height = block.header.height, "{msg}");
            return Err(ExecError::Fatal(msg));
        }
        let votes = last_vals
            .validators()
            .iter()
            .zip(commit.signatures.iter())
            .map(|(v, sig)| VoteInfo {
                address: v.address,
                power: v.voting_power,
                signed_last_block: !sig.is_absent(),
            })
            .collect();
        Ok(CommitInfo {
            round: commit.round,
            votes,
        })
    }

    fn fire_events(&self, block: &Block, block_id: BlockId, result: BlockTxsResult) {
        let meta = BlockMeta::from_block(block);
        let events = [
            Event::NewBlock {
                block: Arc::new(block.clone()),
                block_id,
                result: Arc::new(result),
            },
            Event::NewBlockHeader {
                header: meta.header,
                num_txs: meta.num_txs,
            },
        ];
        for ev in events {
            if let Err(e) = self.event_bus.publish(ev) {
                warn!(height = block.header.height, err = %e, "failed publishing event");
            }
        }
    }
}

/// Reject negative powers, repeated keys and key types the params forbid.
pub fn validate_validator_updates(
    updates: &[ValidatorUpdate],
    params: &ConsensusParams,
) -> Result<(), ExecError> {
    let mut seen: BTreeSet<PubKey> = BTreeSet::new();
    for u in updates {
        if u.power < 0 {
            return Err(ExecError::InvalidValidatorUpdate(format!(
                "voting power can't be negative: {} {}",
                u.pub_key, u.power
            )));
        }
        if !seen.insert(u.pub_key) {
            return Err(ExecError::InvalidValidatorUpdate(format!(
                "duplicate validator {}",
                u.pub_key
            )));
        }
        if u.power == 0 {
            continue;
        }
        if !params.allows_pub_key_type(&u.key_type) {
            return Err(ExecError::InvalidValidatorUpdate(format!(
                "validator {} is using pubkey {}, which is unsupported for consensus",
                u.pub_key, u.key_type
            )));
        }
    }
    Ok(())
}

/// Minimal change set turning `current` into the validator list `updates`.
///
/// An empty list means "no change". Otherwise the list is the full new set:
/// unchanged powers are dropped, members missing from the list are removed
/// (power 0), and zero-power entries for non-members are ignored.
pub fn validator_delta(current: &ValidatorSet, updates: &[ValidatorUpdate]) -> Vec<Validator> {
    if updates.is_empty() {
        return Vec::new();
    }
    let listed: BTreeMap<_, _> = updates.iter().map(|u| (u.pub_key.address(), u)).collect();

    let mut delta = Vec::new();
    for u in updates {
        match current.get_by_address(&u.pub_key.address()) {
            Some((_, v)) if v.voting_power == u.power => {}
            None if u.power == 0 => {}
            _ => delta.push(Validator::new(u.pub_key, u.power)),
        }
    }
    for v in current.validators() {
        if !listed.contains_key(&v.address) {
            delta.push(Validator::new(v.pub_key, 0));
        }
    }
    delta
}

/// Derive the state after the block with `header`. Validator changes apply
/// to a copy of `next_validators` and take effect at `height + 2`; params
/// changes take effect at `height + 1`. The app hash is left for the caller.
pub fn update_state(
    state: &LatestBlockState,
    block_id: BlockId,
    header: &Header,
    delta: &[Validator],
    params_update: Option<ConsensusParams>,
) -> Result<LatestBlockState, ExecError> {
    let mut next_vals = state.next_validators.clone();
    let mut last_height_vals_changed = state.last_height_validators_changed;
    if !delta.is_empty() {
        next_vals.update_with_change_set(delta)?;
        last_height_vals_changed = header.height + 2;
    }
    next_vals.increment_proposer_priority(1);

    let (params, last_height_params_changed) = match params_update {
        Some(p) => (p, header.height + 1),
        None => (
            state.consensus_params.clone(),
            state.last_height_consensus_params_changed,
        ),
    };

    Ok(LatestBlockState {
        chain_id: state.chain_id.clone(),
        initial_height: state.initial_height,
        last_block_height: header.height,
        last_block_id: block_id,
        last_block_time_ms: header.time_ms,
        next_validators: next_vals,
        validators: state.next_validators.clone(),
        last_validators: state.validators.clone(),
        last_height_validators_changed: last_height_vals_changed,
        consensus_params: params,
        last_height_consensus_params_changed: last_height_params_changed,
        app_hash: state.app_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(powers: &[i64]) -> ValidatorSet {
        ValidatorSet::new(
            powers
                .iter()
                .enumerate()
                .map(|(i, p)| Validator::new(PubKey([i as u8 + 1; 32]), *p))
                .collect(),
        )
        .unwrap()
    }

    fn upd(i: u8, power: i64) -> ValidatorUpdate {
        ValidatorUpdate::ed25519(PubKey([i; 32]), power)
    }

    #[test]
    fn empty_updates_mean_no_change() {
        assert!(validator_delta(&set(&[1, 2]), &[]).is_empty());
    }

    #[test]
    fn delta_is_minimal() {
        let current = set(&[10, 20, 30]);
        // key 1 unchanged, key 2 changed, key 3 dropped, key 4 new, key 5 zero and unknown
        let delta = validator_delta(
            &current,
            &[upd(1, 10), upd(2, 25), upd(4, 5), upd(5, 0)],
        );
        let mut got: Vec<(u8, i64)> = delta.iter().map(|v| (v.pub_key.0[0], v.voting_power)).collect();
        got.sort();
        assert_eq!(got, vec![(2, 25), (3, 0), (4, 5)]);
    }

    #[test]
    fn update_checks() {
        let params = ConsensusParams::default();
        assert!(validate_validator_updates(&[upd(1, 5), upd(2, 0)], &params).is_ok());
        assert!(matches!(
            validate_validator_updates(&[upd(1, -1)], &params),
            Err(ExecError::InvalidValidatorUpdate(_))
        ));
        assert!(matches!(
            validate_validator_updates(&[upd(1, 5), upd(1, 6)], &params),
            Err(ExecError::InvalidValidatorUpdate(_))
        ));
        let mut bad = upd(3, 5);
        bad.key_type = "secp256k1".into();
        assert!(matches!(
            validate_validator_updates(&[bad], &params),
            Err(ExecError::InvalidValidatorUpdate(_))
        ));
    }

    #[test]
    fn rotation_without_changes() {
        let vals = set(&[1, 1, 1]);
        let state = LatestBlockState {
            chain_id: "c".into(),
            initial_height: 1,
            next_validators: vals.copy_increment_proposer_priority(1),
            validators: vals.clone(),
            last_height_validators_changed: 1,
            last_height_consensus_params_changed: 1,
            ..Default::default()
        };
        let header = Header {
            height: 1,
            time_ms: 9,
            ..Default::default()
        };
        let next = update_state(&state, BlockId::default(), &header, &[], None).unwrap();
        assert_eq!(next.validators, state.next_validators);
        assert_eq!(next.last_validators, state.validators);
        assert_eq!(next.next_validators, state.next_validators.copy_increment_proposer_priority(1));
        assert_eq!(next.last_height_validators_changed, 1);
        assert_eq!(next.last_block_time_ms, 9);
    }

    #[test]
    fn changes_take_effect_two_blocks_later() {
        let vals = set(&[1, 1]);
        let state = LatestBlockState {
            next_validators: vals.clone(),
            validators: vals,
            last_height_validators_changed: 1,
            ..Default::default()
        };
        let header = Header {
            height: 5,
            ..Default::default()
        };
        let delta = vec![Validator::new(PubKey([9; 32]), 10)];
        let mut params = ConsensusParams::default();
        params.block.max_bytes = 1_000_000;
        let next = update_state(&state, BlockId::default(), &header, &delta, Some(params.clone())).unwrap();
        assert_eq!(next.last_height_validators_changed, 7);
        assert!(next.next_validators.has_address(&PubKey([9; 32]).address()));
        assert!(!next.validators.has_address(&PubKey([9; 32]).address()));
        assert_eq!(next.consensus_params, params);
        assert_eq!(next.last_height_consensus_params_changed, 6);
    }
}
