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

//! Verification of a single evidence item against chain history.

use crate::core::{
    consensus::signing::verify_vote,
    evidence::{DuplicateVoteEvidence, Evidence, EvidenceError, EvidenceInfo},
    params::EvidenceParams,
    state::{latest::LatestBlockState, services::BlockStore, store::Store},
    validator::ValidatorSet,
};

/// Evidence is expired only when it is older than both the block-count and
/// the duration bound. Either bound alone keeps it alive.
pub fn is_expired(
    params: &EvidenceParams,
    last_block_height: u64,
    last_block_time_ms: u64,
    height: u64,
    time_ms: u64,
) -> bool {
    let age_blocks = last_block_height.saturating_sub(height);
    let age_ms = last_block_time_ms.saturating_sub(time_ms);
    age_ms > params.max_age_duration_ms && age_blocks > params.max_age_num_blocks
}

/// Verify `ev` against `state` and history. On success the returned info
/// carries the accused validator's power as priority.
pub fn verify_evidence<B: BlockStore + ?Sized>(
    state: &LatestBlockState,
    state_store: &Store,
    block_store: &B,
    ev: &Evidence,
) -> Result<EvidenceInfo, EvidenceError> {
    let height = ev.height();
    let meta = block_store
        .load_block_meta(height)
        .ok_or(EvidenceError::MissingBlockMeta(height))?;
    let block_time = meta.header.time_ms;
    if ev.time_ms() != block_time {
        return Err(EvidenceError::TimeMismatch {
            evidence: ev.time_ms(),
            block: block_time,
        });
    }

    let params = &state.consensus_params.evidence;
    if is_expired(params, state.last_block_height, state.last_block_time_ms, height, block_time) {
        return Err(EvidenceError::Expired {
            height,
            age_blocks: state.last_block_height.saturating_sub(height),
            age_ms: state.last_block_time_ms.saturating_sub(block_time),
        });
    }

    let priority = match ev {
        Evidence::DuplicateVote(dve) => {
            let val_set = state_store.load_validators(height)?;
            verify_duplicate_vote(dve, &state.chain_id, &val_set)?
        }
    };
    Ok(EvidenceInfo {
        evidence: ev.clone(),
        priority,
        committed: false,
    })
}

/// Check a duplicate vote against the set that was active at its height.
/// Returns the accused validator's voting power.
pub fn verify_duplicate_vote(
    e: &DuplicateVoteEvidence,
    chain_id: &str,
    val_set: &ValidatorSet,
) -> Result<i64, EvidenceError> {
    let (a, b) = (&e.vote_a, &e.vote_b);
    let (_, val) = val_set
        .get_by_address(&a.validator_address)
        .ok_or(EvidenceError::NotAValidator {
            address: a.validator_address,
            height: a.height,
        })?;

    if a.height != b.height || a.round != b.round || a.vote_type != b.vote_type {
        return Err(EvidenceError::HeightRoundTypeMismatch {
            a_height: a.height,
            a_round: a.round,
            b_height: b.height,
            b_round: b.round,
        });
    }
    if a.validator_address != b.validator_address {
        return Err(EvidenceError::AddressMismatch(a.validator_address, b.validator_address));
    }
    if a.block_id == b.block_id {
        return Err(EvidenceError::NotDuplicate(a.block_id));
    }
    if val.voting_power != e.validator_power {
        return Err(EvidenceError::ValidatorPowerMismatch {
            evidence: e.validator_power,
            state: val.voting_power,
        });
    }
    if val_set.total_voting_power() != e.total_voting_power {
        return Err(EvidenceError::TotalPowerMismatch {
            evidence: e.total_voting_power,
            state: val_set.total_voting_power(),
        });
    }

    verify_vote(&val.pub_key, chain_id, a).map_err(|_| EvidenceError::BadSignature("vote a"))?;
    verify_vote(&val.pub_key, chain_id, b).map_err(|_| EvidenceError::BadSignature("vote b"))?;
    Ok(val.voting_power)
}
