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

//! Collaborator seams of the state core: the block store / application and
//! the evidence pool.

use crate::core::{
    block::{Block, BlockMeta, Commit},
    evidence::{Evidence, EvidenceError},
    params::ConsensusParams,
    state::latest::LatestBlockState,
    types::{Address, PubKey, H256},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Block store / application errors.
#[derive(Debug, Error)]
pub enum BlockStoreError {
    /// The application rejected or failed to execute the block.
    #[error("application: {0}")]
    App(String),
    /// The block store could not read or write.
    #[error("storage: {0}")]
    Storage(String),
}

/// One validator of the previous block's set and whether it signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    /// Validator address.
    pub address: Address,
    /// Voting power at the previous height.
    pub power: i64,
    /// True if its slot in the last commit is not absent.
    pub signed_last_block: bool,
}

/// Signers of the previous block, handed to the application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Round of the last commit.
    pub round: u32,
    /// One entry per validator, in set order.
    pub votes: Vec<VoteInfo>,
}

/// Kind of misbehavior reported to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MisbehaviorKind {
    /// Two conflicting votes at the same height/round/step.
    DuplicateVote,
}

/// Misbehavior proven by committed evidence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misbehavior {
    /// Kind.
    pub kind: MisbehaviorKind,
    /// Offender.
    pub validator_address: Address,
    /// Offender power at `height`.
    pub validator_power: i64,
    /// Height of the offence.
    pub height: u64,
    /// Block time at `height`.
    pub time_ms: u64,
    /// Total power of the set at `height`.
    pub total_voting_power: i64,
}

/// Validator change requested by the application. Power 0 removes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Key type name (must be allowed by the consensus params).
    pub key_type: String,
    /// Consensus key.
    pub pub_key: PubKey,
    /// New power.
    pub power: i64,
}

impl ValidatorUpdate {
    /// Ed25519 update.
    pub fn ed25519(pub_key: PubKey, power: i64) -> Self {
        Self {
            key_type: PubKey::TYPE_ED25519.to_string(),
            pub_key,
            power,
        }
    }
}

/// What the application returns after executing a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTxsResult {
    /// Validator list (empty means no change).
    pub validator_updates: Vec<ValidatorUpdate>,
    /// App hash after the block.
    pub app_hash: H256,
    /// New consensus params, effective from the next height.
    pub consensus_param_updates: Option<ConsensusParams>,
}

/// Block storage and application execution.
pub trait BlockStore: Send + Sync {
    /// Height of the latest stored block (0 when empty).
    fn height(&self) -> u64;
    /// Meta of the block at `height`.
    fn load_block_meta(&self, height: u64) -> Option<BlockMeta>;
    /// Commit stored for the block at `height`.
    fn load_block_commit(&self, height: u64) -> Option<Commit>;
    /// Run the block's transactions in the application.
    fn commit_and_validate_block_txs(
        &self,
        block: &Block,
        commit_info: &CommitInfo,
        byzantine: &[Misbehavior],
    ) -> Result<BlockTxsResult, BlockStoreError>;
    /// Point the head of the chain at `hash`.
    fn write_head_block_hash(&self, hash: H256) -> Result<(), BlockStoreError>;
}

impl<T: BlockStore + ?Sized> BlockStore for Arc<T> {
    fn height(&self) -> u64 {
        (**self).height()
    }
    fn load_block_meta(&self, height: u64) -> Option<BlockMeta> {
        (**self).load_block_meta(height)
    }
    fn load_block_commit(&self, height: u64) -> Option<Commit> {
        (**self).load_block_commit(height)
    }
    fn commit_and_validate_block_txs(
        &self,
        block: &Block,
        commit_info: &CommitInfo,
        byzantine: &[Misbehavior],
    ) -> Result<BlockTxsResult, BlockStoreError> {
        (**self).commit_and_validate_block_txs(block, commit_info, byzantine)
    }
    fn write_head_block_hash(&self, hash: H256) -> Result<(), BlockStoreError> {
        (**self).write_head_block_hash(hash)
    }
}

/// What block validation and execution need from the evidence pool.
pub trait EvidencePool: Send + Sync {
    /// Verify a block's evidence list without storing it.
    fn check_evidence(&self, evidence: &[Evidence]) -> Result<(), EvidenceError>;
    /// Misbehaviors proven by the evidence in `block`.
    fn byzantine_evidence(&self, block: &Block) -> Vec<Misbehavior>;
    /// State advanced; `committed` was included in the applied block.
    fn update(&self, state: &LatestBlockState, committed: &[Evidence]) -> Result<(), EvidenceError>;
}

impl<T: EvidencePool + ?Sized> EvidencePool for Arc<T> {
    fn check_evidence(&self, evidence: &[Evidence]) -> Result<(), EvidenceError> {
        (**self).check_evidence(evidence)
    }
    fn byzantine_evidence(&self, block: &Block) -> Vec<Misbehavior> {
        (**self).byzantine_evidence(block)
    }
    fn update(&self, state: &LatestBlockState, committed: &[Evidence]) -> Result<(), EvidenceError> {
        (**self).update(state, committed)
    }
}

/// Pool that accepts everything and tracks nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyEvidencePool;

impl EvidencePool for EmptyEvidencePool {
    fn check_evidence(&self, _evidence: &[Evidence]) -> Result<(), EvidenceError> {
        Ok(())
    }
    fn byzantine_evidence(&self, _block: &Block) -> Vec<Misbehavior> {
        Vec::new()
    }
    fn update(&self, _state: &LatestBlockState, _committed: &[Evidence]) -> Result<(), EvidenceError> {
        Ok(())
    }
}
