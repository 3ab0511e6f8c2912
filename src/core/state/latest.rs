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

//! Latest committed chain state and its genesis derivation.
//!
//! Three validator sets are tracked because validator changes take effect
//! with a one-block delay:
//! - `last_validators` signed the commit for `last_block_id`;
//! - `validators` sign the next block;
//! - `next_validators` sign the block after that.
//!
//! At the initial height `last_validators` is the empty set.

use crate::core::{
    block::{Block, BlockId, Commit, Header, MAX_CHAIN_ID_LEN},
    consensus::median::median_time,
    evidence::Evidence,
    params::{ConsensusParams, ParamsError},
    types::{decode_canonical_limited, encode_canonical, Address, CodecError, PubKey, H256},
    validator::{Validator, ValidatorSet, ValidatorSetError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version tag of the persisted state envelope.
pub const STATE_VERSION: u16 = 1;

/// Decode cap for a persisted state blob.
pub const MAX_STATE_BYTES: usize = 64 * 1024 * 1024;

/// Genesis validation errors.
#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("invalid chain id {0:?}")]
    InvalidChainId(String),
    #[error("genesis has no validators")]
    NoValidators,
    #[error("genesis validator {name:?} has non-positive power {power}")]
    NonPositivePower { name: String, power: i64 },
    #[error("ed25519 keys are not allowed by the genesis params")]
    KeyTypeNotAllowed,
    #[error("genesis params: {0}")]
    Params(#[from] ParamsError),
    #[error("genesis validators: {0}")]
    Validators(#[from] ValidatorSetError),
}

/// Validator entry of a genesis document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Consensus key.
    pub pub_key: PubKey,
    /// Initial voting power.
    pub power: i64,
    /// Human-readable name.
    pub name: String,
}

/// Genesis document. Loading it from disk is the caller's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    /// Genesis time in ms since UNIX epoch; the block time of the initial height.
    pub genesis_time_ms: u64,
    /// Chain identifier.
    pub chain_id: String,
    /// First block height (0 is read as 1).
    pub initial_height: u64,
    /// Consensus params (defaults when absent).
    pub consensus_params: Option<ConsensusParams>,
    /// Initial validators.
    pub validators: Vec<GenesisValidator>,
    /// Application hash before the first block.
    pub app_hash: H256,
}

impl GenesisDoc {
    /// Fill defaults and reject unusable documents.
    pub fn validate_and_complete(&mut self) -> Result<(), GenesisError> {
        if self.chain_id.is_empty() || self.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(GenesisError::InvalidChainId(self.chain_id.clone()));
        }
        if self.initial_height == 0 {
            self.initial_height = 1;
        }
        let params = self.consensus_params.get_or_insert_with(ConsensusParams::default);
        params.validate()?;
        if !params.allows_pub_key_type(PubKey::TYPE_ED25519) {
            return Err(GenesisError::KeyTypeNotAllowed);
        }
        if self.validators.is_empty() {
            return Err(GenesisError::NoValidators);
        }
        for v in self.validators.iter() {
            if v.power <= 0 {
                return Err(GenesisError::NonPositivePower {
                    name: v.name.clone(),
                    power: v.power,
                });
            }
        }
        Ok(())
    }
}

/// Latest committed chain state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestBlockState {
    /// Chain identifier, immutable for the life of the chain.
    pub chain_id: String,
    /// First block height of the chain.
    pub initial_height: u64,

    /// Height of the last committed block (0 before the first block).
    pub last_block_height: u64,
    /// Id of the last committed block.
    pub last_block_id: BlockId,
    /// Time of the last committed block (genesis time at height 0).
    pub last_block_time_ms: u64,

    /// Validators for the block after next.
    pub next_validators: ValidatorSet,
    /// Validators for the next block.
    pub validators: ValidatorSet,
    /// Validators that signed `last_block_id`.
    pub last_validators: ValidatorSet,
    /// Height at which `validators` last changed.
    pub last_height_validators_changed: u64,

    /// Params in force for the next block.
    pub consensus_params: ConsensusParams,
    /// Height at which `consensus_params` last changed.
    pub last_height_consensus_params_changed: u64,

    /// App hash after executing the last block.
    pub app_hash: H256,
}

impl LatestBlockState {
    /// True for the zero value (nothing persisted yet).
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Versioned canonical encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode_canonical(&(STATE_VERSION, self))
    }

    /// Inverse of `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (version, state): (u16, LatestBlockState) =
            decode_canonical_limited(bytes, MAX_STATE_BYTES)?;
        if version != STATE_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        Ok(state)
    }

    /// Build a proposal block on top of this state.
    ///
    /// The block time is the genesis time at the initial height and the
    /// weighted median of `last_commit` otherwise.
    pub fn make_block(
        &self,
        height: u64,
        txs: Vec<Vec<u8>>,
        last_commit: Commit,
        evidence: Vec<Evidence>,
        proposer_address: Address,
    ) -> Block {
        let time_ms = if height == self.initial_height {
            self.last_block_time_ms
        } else {
            median_time(&last_commit, &self.last_validators)
        };
        let mut block = Block {
            header: Header {
                chain_id: self.chain_id.clone(),
                height,
                time_ms,
                last_block_id: self.last_block_id,
                validators_hash: self.validators.hash(),
                next_validators_hash: self.next_validators.hash(),
                consensus_hash: self.consensus_params.hash(),
                app_hash: self.app_hash,
                proposer_address,
                ..Default::default()
            },
            txs,
            evidence,
            last_commit,
        };
        block.fill_header();
        block
    }
}

/// Derive the state before the first block.
pub fn make_genesis_state(genesis: &GenesisDoc) -> Result<LatestBlockState, GenesisError> {
    let mut doc = genesis.clone();
    doc.validate_and_complete()?;

    let vals: Vec<Validator> = doc
        .validators
        .iter()
        .map(|v| Validator::new(v.pub_key, v.power))
        .collect();
    let validators = ValidatorSet::new(vals)?;
    let next_validators = validators.copy_increment_proposer_priority(1);

    Ok(LatestBlockState {
        chain_id: doc.chain_id,
        initial_height: doc.initial_height,
        last_block_height: 0,
        last_block_id: BlockId::default(),
        last_block_time_ms: doc.genesis_time_ms,
        next_validators,
        validators,
        last_validators: ValidatorSet::empty(),
        last_height_validators_changed: doc.initial_height,
        consensus_params: doc.consensus_params.unwrap_or_default(),
        last_height_consensus_params_changed: doc.initial_height,
        app_hash: doc.app_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis(n: u8) -> GenesisDoc {
        GenesisDoc {
            genesis_time_ms: 1_700_000_000_000,
            chain_id: "amun-test".into(),
            initial_height: 0,
            consensus_params: None,
            validators: (1..=n)
                .map(|i| GenesisValidator {
                    pub_key: PubKey([i; 32]),
                    power: 10,
                    name: format!("v{i}"),
                })
                .collect(),
            app_hash: H256::zero(),
        }
    }

    #[test]
    fn genesis_state_shape() {
        let st = make_genesis_state(&genesis(3)).unwrap();
        assert_eq!(st.initial_height, 1);
        assert_eq!(st.last_block_height, 0);
        assert_eq!(st.last_height_validators_changed, 1);
        assert!(st.last_validators.is_empty());
        assert_eq!(st.validators.hash(), st.next_validators.hash());
        assert_eq!(st.next_validators, st.validators.copy_increment_proposer_priority(1));
    }

    #[test]
    fn genesis_rejects_bad_docs() {
        let mut g = genesis(0);
        assert!(matches!(make_genesis_state(&g), Err(GenesisError::NoValidators)));
        g = genesis(2);
        g.validators[1].power = 0;
        assert!(matches!(make_genesis_state(&g), Err(GenesisError::NonPositivePower { .. })));
        g = genesis(2);
        g.chain_id.clear();
        assert!(matches!(make_genesis_state(&g), Err(GenesisError::InvalidChainId(_))));
        g = genesis(2);
        g.validators[1].pub_key = g.validators[0].pub_key;
        assert!(matches!(make_genesis_state(&g), Err(GenesisError::Validators(_))));
    }

    #[test]
    fn height_zero_roundtrip_keeps_empty_last_validators() {
        let st = make_genesis_state(&genesis(2)).unwrap();
        let back = LatestBlockState::from_bytes(&st.to_bytes().unwrap()).unwrap();
        assert_eq!(back, st);
        assert!(back.last_validators.is_empty());
        assert!(!back.is_empty());
    }

    #[test]
    fn unknown_version_rejected() {
        let st = LatestBlockState::default();
        let bytes = encode_canonical(&(STATE_VERSION + 1, &st)).unwrap();
        assert!(matches!(
            LatestBlockState::from_bytes(&bytes),
            Err(CodecError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn first_block_uses_genesis_time() {
        let st = make_genesis_state(&genesis(1)).unwrap();
        let proposer = st.validators.proposer().unwrap().address;
        let b = st.make_block(1, vec![b"tx".to_vec()], Commit::default(), Vec::new(), proposer);
        assert_eq!(b.header.time_ms, st.last_block_time_ms);
        assert_eq!(b.header.validators_hash, st.validators.hash());
        assert!(b.validate_basic().is_ok());
    }
}
