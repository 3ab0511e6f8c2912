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

//! Persistent chain state with sparse validator-set and params history.
//!
//! Key layout:
//! - `stateKey` → versioned `LatestBlockState`
//! - `validatorsKey:` ++ be64(height) → `ValidatorsInfo`
//! - `consensusParamsKey:` ++ be64(height) → `ConsensusParamsInfo`
//!
//! A full validator set is written only at the height it changed or at a
//! multiple of `VAL_SET_CHECKPOINT_INTERVAL`; every other height stores a
//! back-pointer and is rebuilt by replaying proposer-priority rounds.
//!
//! `save` issues its writes separately, not as one transaction. A crash in
//! between leaves the history ahead of the state blob, which rollback repairs.

use crate::core::{
    params::ConsensusParams,
    state::{
        kv::{KvError, KvStore},
        latest::{make_genesis_state, GenesisDoc, GenesisError, LatestBlockState},
    },
    types::{decode_canonical_limited, encode_canonical, CodecError},
    validator::ValidatorSet,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Stride at which full validator sets are checkpointed.
pub const VAL_SET_CHECKPOINT_INTERVAL: u64 = 100_000;

const STATE_KEY: &[u8] = b"stateKey";
const VALIDATORS_PREFIX: &[u8] = b"validatorsKey:";
const CONSENSUS_PARAMS_PREFIX: &[u8] = b"consensusParamsKey:";

/// Decode cap for history records.
const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// State store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no validator set stored for height {0}")]
    NoValSetForHeight(u64),
    #[error("no consensus params stored for height {0}")]
    NoConsensusParamsForHeight(u64),
    #[error("no state found")]
    NoState,
    #[error("last height changed {last_changed} is above record height {height}")]
    InvalidChangeHeight { height: u64, last_changed: u64 },
    /// A persisted blob failed to decode. The node must halt.
    #[error("corrupted record at {key}: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: CodecError,
    },
    /// A back-pointer names a change height above its own record. The node
    /// must halt.
    #[error("validator record at {height} points forward to {last_changed}")]
    BrokenBackPointer { height: u64, last_changed: u64 },
    #[error("genesis: {0}")]
    Genesis(#[from] GenesisError),
    #[error("kv: {0}")]
    Kv(#[from] KvError),
    #[error("encode: {0}")]
    Encode(CodecError),
}

impl StoreError {
    /// True for conditions that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupted { .. } | StoreError::BrokenBackPointer { .. }
        )
    }
}

/// Validator history record: a full set or a back-pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorsInfo {
    /// Present at change and checkpoint heights.
    pub validator_set: Option<ValidatorSet>,
    /// Height at which the set last changed.
    pub last_height_changed: u64,
}

/// Params history record: full params or a back-pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParamsInfo {
    /// Present at change heights.
    pub consensus_params: Option<ConsensusParams>,
    /// Height at which the params last changed.
    pub last_height_changed: u64,
}

fn height_key(prefix: &[u8], height: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + 8);
    k.extend_from_slice(prefix);
    k.extend_from_slice(&height.to_be_bytes());
    k
}

fn corrupted(key: &[u8], source: CodecError) -> StoreError {
    let key = String::from_utf8_lossy(key).into_owned();
    error!(%key, err = %source, "state store record corrupted");
    StoreError::Corrupted { key, source }
}

/// Checkpoint or change height a back-pointer at `height` resolves to.
fn last_stored_height_for(height: u64, last_height_changed: u64) -> u64 {
    let checkpoint = height - height % VAL_SET_CHECKPOINT_INTERVAL;
    checkpoint.max(last_height_changed)
}

/// State store over an injected key-value handle.
#[derive(Clone)]
pub struct Store {
    db: Arc<dyn KvStore>,
}

impl Store {
    /// Wrap a key-value handle.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    /// Latest state, or the zero value when nothing is persisted.
    pub fn load(&self) -> Result<LatestBlockState, StoreError> {
        match self.db.get(STATE_KEY)? {
            None => Ok(LatestBlockState::default()),
            Some(bytes) => {
                LatestBlockState::from_bytes(&bytes).map_err(|e| corrupted(STATE_KEY, e))
            }
        }
    }

    /// Persisted state, or the genesis state (which is then persisted).
    pub fn load_from_db_or_genesis_doc(
        &self,
        genesis: &GenesisDoc,
    ) -> Result<LatestBlockState, StoreError> {
        let state = self.load()?;
        if !state.is_empty() {
            return Ok(state);
        }
        let state = make_genesis_state(genesis)?;
        self.save(&state)?;
        Ok(state)
    }

    /// Persist validators, params and the state blob, in that order.
    pub fn save(&self, state: &LatestBlockState) -> Result<(), StoreError> {
        let mut next_height = state.last_block_height + 1;
        if next_height == 1 {
            next_height = state.initial_height;
            // Validator changes are delayed one block, so the first block's
            // signers are recorded here.
            self.save_validators_info(next_height, next_height, &state.validators)?;
        }
        self.save_validators_info(
            next_height + 1,
            state.last_height_validators_changed,
            &state.next_validators,
        )?;
        self.save_consensus_params_info(
            next_height,
            state.last_height_consensus_params_changed,
            &state.consensus_params,
        )?;

        let bytes = state.to_bytes().map_err(StoreError::Encode)?;
        self.db.put(STATE_KEY, &bytes)?;
        self.db.flush()?;
        debug!(height = state.last_block_height, "state saved");
        Ok(())
    }

    /// Write the validator record for `height`. The full set is kept only at
    /// change and checkpoint heights.
    pub fn save_validators_info(
        &self,
        height: u64,
        last_height_changed: u64,
        set: &ValidatorSet,
    ) -> Result<(), StoreError> {
        if last_height_changed > height {
            return Err(StoreError::InvalidChangeHeight {
                height,
                last_changed: last_height_changed,
            });
        }
        let full = height == last_height_changed || height % VAL_SET_CHECKPOINT_INTERVAL == 0;
        let info = ValidatorsInfo {
            validator_set: full.then(|| set.clone()),
            last_height_changed,
        };
        let bytes = encode_canonical(&info).map_err(StoreError::Encode)?;
        self.db.put(&height_key(VALIDATORS_PREFIX, height), &bytes)?;
        Ok(())
    }

    fn save_consensus_params_info(
        &self,
        next_height: u64,
        change_height: u64,
        params: &ConsensusParams,
    ) -> Result<(), StoreError> {
        let info = ConsensusParamsInfo {
            consensus_params: (change_height == next_height).then(|| params.clone()),
            last_height_changed: change_height,
        };
        let bytes = encode_canonical(&info).map_err(StoreError::Encode)?;
        self.db.put(&height_key(CONSENSUS_PARAMS_PREFIX, next_height), &bytes)?;
        Ok(())
    }

    /// Raw validator record at `height`.
    pub fn load_validators_info(&self, height: u64) -> Result<Option<ValidatorsInfo>, StoreError> {
        let key = height_key(VALIDATORS_PREFIX, height);
        match self.db.get(&key)? {
            None => Ok(None),
            Some(bytes) => decode_canonical_limited(&bytes, MAX_RECORD_BYTES)
                .map(Some)
                .map_err(|e| corrupted(&key, e)),
        }
    }

    /// Raw params record at `height`.
    pub fn load_consensus_params_info(
        &self,
        height: u64,
    ) -> Result<Option<ConsensusParamsInfo>, StoreError> {
        let key = height_key(CONSENSUS_PARAMS_PREFIX, height);
        match self.db.get(&key)? {
            None => Ok(None),
            Some(bytes) => decode_canonical_limited(&bytes, MAX_RECORD_BYTES)
                .map(Some)
                .map_err(|e| corrupted(&key, e)),
        }
    }

    /// Validator set that signs block `height`, with the proposer priority it
    /// had at that height.
    pub fn load_validators(&self, height: u64) -> Result<ValidatorSet, StoreError> {
        let info = self
            .load_validators_info(height)?
            .ok_or(StoreError::NoValSetForHeight(height))?;
        if let Some(set) = info.validator_set {
            return Ok(set);
        }

        if info.last_height_changed > height {
            error!(height, last_changed = info.last_height_changed, "validator back-pointer points forward");
            return Err(StoreError::BrokenBackPointer {
                height,
                last_changed: info.last_height_changed,
            });
        }
        let stored_at = last_stored_height_for(height, info.last_height_changed);
        let mut set = self
            .load_validators_info(stored_at)?
            .and_then(|i| i.validator_set)
            .ok_or_else(|| {
                error!(height, stored_at, "validator back-pointer has no full set behind it");
                StoreError::NoValSetForHeight(height)
            })?;
        // stored_at >= height - height % interval, so the gap is below the interval
        let rounds = u32::try_from(height - stored_at).map_err(|_| StoreError::BrokenBackPointer {
            height,
            last_changed: info.last_height_changed,
        })?;
        set.increment_proposer_priority(rounds);
        Ok(set)
    }

    /// Consensus params in force at `height`.
    pub fn load_consensus_params(&self, height: u64) -> Result<ConsensusParams, StoreError> {
        let info = self
            .load_consensus_params_info(height)?
            .ok_or(StoreError::NoConsensusParamsForHeight(height))?;
        if let Some(params) = info.consensus_params {
            return Ok(params);
        }
        self.load_consensus_params_info(info.last_height_changed)?
            .and_then(|i| i.consensus_params)
            .ok_or(StoreError::NoConsensusParamsForHeight(height))
    }
}
