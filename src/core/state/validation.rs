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

//! Block acceptance rule: a pure check of a candidate block against state.

use crate::core::{
    block::{Block, BlockError, BlockId},
    consensus::median::median_time,
    evidence::EvidenceError,
    params::max_evidence_per_block,
    state::{latest::LatestBlockState, services::EvidencePool},
    types::{Address, H256},
    validator::CommitError,
};
use thiserror::Error;

/// Why a block was rejected. One variant per check.
#[derive(Debug, Error)]
pub enum BlockValidationError {
    #[error("block: {0}")]
    Block(#[from] BlockError),
    #[error("wrong chain id: expected {expected:?}, got {got:?}")]
    WrongChainId { expected: String, got: String },
    #[error("wrong height for initial block: expected {expected}, got {got}")]
    WrongInitialHeight { expected: u64, got: u64 },
    #[error("wrong height: expected {expected}, got {got}")]
    WrongHeight { expected: u64, got: u64 },
    #[error("wrong last block id: expected {expected}, got {got}")]
    WrongLastBlockId { expected: BlockId, got: BlockId },
    #[error("wrong app hash: expected {expected}, got {got}")]
    WrongAppHash { expected: H256, got: H256 },
    #[error("wrong validators hash: expected {expected}, got {got}")]
    WrongValidatorsHash { expected: H256, got: H256 },
    #[error("wrong next validators hash: expected {expected}, got {got}")]
    WrongNextValidatorsHash { expected: H256, got: H256 },
    #[error("wrong consensus params hash: expected {expected}, got {got}")]
    WrongConsensusHash { expected: H256, got: H256 },
    #[error("initial block can't have last commit signatures, got {0}")]
    InitialCommitNotEmpty(usize),
    #[error("invalid last commit: {0}")]
    InvalidLastCommit(#[from] CommitError),
    #[error("initial block time {got} is not the genesis time {expected}")]
    WrongGenesisTime { expected: u64, got: u64 },
    #[error("block time {got} is not after last block time {last}")]
    TimeNotIncreasing { last: u64, got: u64 },
    #[error("block time {got} is not the median time {expected}")]
    WrongMedianTime { expected: u64, got: u64 },
    #[error("too much evidence: max {max} items, got {got}")]
    TooMuchEvidence { max: i64, got: i64 },
    #[error("evidence overflow: max {max} bytes, got {got}")]
    EvidenceOverflow { max: i64, got: i64 },
    #[error("proposer {0} is not a validator")]
    UnknownProposer(Address),
    #[error("evidence: {0}")]
    Evidence(#[from] EvidenceError),
}

impl BlockValidationError {
    /// True for conditions that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlockValidationError::Evidence(e) if e.is_fatal())
    }
}

/// Decide whether `block` may extend `state`. Nothing is mutated; the only
/// reads beyond `state` are the evidence pool's history lookups.
pub fn validate_block<P: EvidencePool + ?Sized>(
    state: &LatestBlockState,
    block: &Block,
    evpool: &P,
) -> Result<(), BlockValidationError> {
    let h = &block.header;

    block.validate_basic()?;
    if h.chain_id != state.chain_id {
        return Err(BlockValidationError::WrongChainId {
            expected: state.chain_id.clone(),
            got: h.chain_id.clone(),
        });
    }

    if state.last_block_height == 0 {
        if h.height != state.initial_height {
            return Err(BlockValidationError::WrongInitialHeight {
                expected: state.initial_height,
                got: h.height,
            });
        }
    } else if h.height != state.last_block_height + 1 {
        return Err(BlockValidationError::WrongHeight {
            expected: state.last_block_height + 1,
            got: h.height,
        });
    }

    if h.last_block_id != state.last_block_id {
        return Err(BlockValidationError::WrongLastBlockId {
            expected: state.last_block_id,
            got: h.last_block_id,
        });
    }

    if h.app_hash != state.app_hash {
        return Err(BlockValidationError::WrongAppHash {
            expected: state.app_hash,
            got: h.app_hash,
        });
    }

    let vals_hash = state.validators.hash();
    if h.validators_hash != vals_hash {
        return Err(BlockValidationError::WrongValidatorsHash {
            expected: vals_hash,
            got: h.validators_hash,
        });
    }
    let next_hash = state.next_validators.hash();
    if h.next_validators_hash != next_hash {
        return Err(BlockValidationError::WrongNextValidatorsHash {
            expected: next_hash,
            got: h.next_validators_hash,
        });
    }
    let params_hash = state.consensus_params.hash();
    if h.consensus_hash != params_hash {
        return Err(BlockValidationError::WrongConsensusHash {
            expected: params_hash,
            got: h.consensus_hash,
        });
    }

    let initial = h.height == state.initial_height;
    if initial {
        if !block.last_commit.signatures.is_empty() {
            return Err(BlockValidationError::InitialCommitNotEmpty(
                block.last_commit.signatures.len(),
            ));
        }
    } else {
        state.last_validators.verify_commit(
            &state.chain_id,
            &state.last_block_id,
            h.height - 1,
            &block.last_commit,
        )?;
    }

    if initial {
        if h.time_ms != state.last_block_time_ms {
            return Err(BlockValidationError::WrongGenesisTime {
                expected: state.last_block_time_ms,
                got: h.time_ms,
            });
        }
    } else {
        if h.time_ms <= state.last_block_time_ms {
            return Err(BlockValidationError::TimeNotIncreasing {
                last: state.last_block_time_ms,
                got: h.time_ms,
            });
        }
        let median = median_time(&block.last_commit, &state.last_validators);
        if h.time_ms != median {
            return Err(BlockValidationError::WrongMedianTime {
                expected: median,
                got: h.time_ms,
            });
        }
    }

    let (max_num, _) = max_evidence_per_block(state.consensus_params.block.max_bytes);
    let got = block.evidence.len() as i64;
    if got > max_num {
        return Err(BlockValidationError::TooMuchEvidence { max: max_num, got });
    }
    let ev_bytes: i64 = block.evidence.iter().map(|e| e.bytes().len() as i64).sum();
    let max_bytes = state.consensus_params.evidence.max_bytes;
    if ev_bytes > max_bytes {
        return Err(BlockValidationError::EvidenceOverflow { max: max_bytes, got: ev_bytes });
    }

    if !state.validators.has_address(&h.proposer_address) {
        return Err(BlockValidationError::UnknownProposer(h.proposer_address));
    }

    evpool.check_evidence(&block.evidence)?;
    Ok(())
}
