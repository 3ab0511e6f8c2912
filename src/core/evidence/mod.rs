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

//! Byzantine evidence: types, persistence, verification and the pool.
//!
//! Evidence kinds form a closed set. Adding a kind means adding a variant to
//! `Evidence` and a verification arm in `verify`.

pub mod pool;
pub mod queue;
pub mod store;
pub mod verify;

use crate::core::{
    block::{BlockError, BlockId, Vote},
    state::{
        kv::KvError,
        services::{Misbehavior, MisbehaviorKind},
        store::StoreError,
    },
    types::{encode_canonical, Address, CodecError, H256},
    validator::ValidatorSet,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Evidence errors (verification, storage, pool).
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("invalid evidence: {0}")]
    Invalid(String),
    #[error("don't have block meta for height {0}")]
    MissingBlockMeta(u64),
    #[error("evidence time {evidence} differs from block time {block}")]
    TimeMismatch { evidence: u64, block: u64 },
    #[error("evidence from height {height} is too old ({age_blocks} blocks, {age_ms} ms)")]
    Expired { height: u64, age_blocks: u64, age_ms: u64 },
    #[error("address {address} was not a validator at height {height}")]
    NotAValidator { address: Address, height: u64 },
    #[error("h/r/s does not match: {a_height}/{a_round} vs {b_height}/{b_round}")]
    HeightRoundTypeMismatch {
        a_height: u64,
        a_round: u32,
        b_height: u64,
        b_round: u32,
    },
    #[error("validator addresses do not match: {0} vs {1}")]
    AddressMismatch(Address, Address),
    #[error("block IDs are the same ({0}) - not a real duplicate vote")]
    NotDuplicate(BlockId),
    #[error("validator power mismatch: evidence {evidence}, state {state}")]
    ValidatorPowerMismatch { evidence: i64, state: i64 },
    #[error("total voting power mismatch: evidence {evidence}, state {state}")]
    TotalPowerMismatch { evidence: i64, state: i64 },
    #[error("verifying {0}: invalid signature")]
    BadSignature(&'static str),
    #[error("evidence {0} was already committed")]
    AlreadyCommitted(H256),
    #[error("duplicate evidence {0} in list")]
    DuplicateInList(H256),
    #[error("state height {got} does not advance past {current}")]
    StaleState { current: u64, got: u64 },
    /// A persisted evidence record failed to decode. The node must halt.
    #[error("corrupted evidence record: {0}")]
    Corrupted(CodecError),
    #[error("encode: {0}")]
    Encode(CodecError),
    #[error("kv: {0}")]
    Kv(#[from] KvError),
    #[error("state store: {0}")]
    Store(#[from] StoreError),
}

impl EvidenceError {
    /// True for conditions that must stop the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            EvidenceError::Corrupted(_) => true,
            EvidenceError::Store(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Two conflicting votes signed by the same validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateVoteEvidence {
    /// Vote with the lower block-id key.
    pub vote_a: Vote,
    /// Vote with the higher block-id key.
    pub vote_b: Vote,
    /// Total power of the set at the vote height.
    pub total_voting_power: i64,
    /// Offender power at the vote height.
    pub validator_power: i64,
    /// Block time at the vote height.
    pub timestamp_ms: u64,
}

impl DuplicateVoteEvidence {
    /// Build from two conflicting votes, ordering them by block id.
    pub fn new(
        vote1: Vote,
        vote2: Vote,
        block_time_ms: u64,
        val_set: &ValidatorSet,
    ) -> Result<Self, EvidenceError> {
        let (_, val) = val_set
            .get_by_address(&vote1.validator_address)
            .ok_or(EvidenceError::NotAValidator {
                address: vote1.validator_address,
                height: vote1.height,
            })?;
        let validator_power = val.voting_power;
        let (vote_a, vote_b) = if vote1.block_id.key() < vote2.block_id.key() {
            (vote1, vote2)
        } else {
            (vote2, vote1)
        };
        Ok(Self {
            vote_a,
            vote_b,
            total_voting_power: val_set.total_voting_power(),
            validator_power,
            timestamp_ms: block_time_ms,
        })
    }

    fn validate_basic(&self) -> Result<(), EvidenceError> {
        let invalid = |which: &str, e: BlockError| EvidenceError::Invalid(format!("{which}: {e}"));
        self.vote_a.validate_basic().map_err(|e| invalid("vote a", e))?;
        self.vote_b.validate_basic().map_err(|e| invalid("vote b", e))?;
        if self.vote_a.block_id == self.vote_b.block_id {
            return Err(EvidenceError::NotDuplicate(self.vote_a.block_id));
        }
        if self.vote_a.block_id.key() > self.vote_b.block_id.key() {
            return Err(EvidenceError::Invalid("duplicate votes in invalid order".into()));
        }
        Ok(())
    }
}

/// Evidence of validator misbehavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evidence {
    /// Equivocation.
    DuplicateVote(DuplicateVoteEvidence),
}

impl Evidence {
    /// Height of the offence.
    pub fn height(&self) -> u64 {
        match self {
            Evidence::DuplicateVote(e) => e.vote_a.height,
        }
    }

    /// Block time at the offence height.
    pub fn time_ms(&self) -> u64 {
        match self {
            Evidence::DuplicateVote(e) => e.timestamp_ms,
        }
    }

    /// Offender.
    pub fn address(&self) -> Address {
        match self {
            Evidence::DuplicateVote(e) => e.vote_a.validator_address,
        }
    }

    /// Canonical encoding.
    pub fn bytes(&self) -> Vec<u8> {
        encode_canonical(self).unwrap_or_default()
    }

    /// Content hash.
    pub fn hash(&self) -> H256 {
        H256::digest(&self.bytes())
    }

    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<(), EvidenceError> {
        match self {
            Evidence::DuplicateVote(e) => e.validate_basic(),
        }
    }

    /// What this evidence proves, in the form the application consumes.
    pub fn misbehaviors(&self) -> Vec<Misbehavior> {
        match self {
            Evidence::DuplicateVote(e) => vec![Misbehavior {
                kind: MisbehaviorKind::DuplicateVote,
                validator_address: e.vote_a.validator_address,
                validator_power: e.validator_power,
                height: e.vote_a.height,
                time_ms: e.timestamp_ms,
                total_voting_power: e.total_voting_power,
            }],
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::DuplicateVote(e) => write!(
                f,
                "DuplicateVote{{{} h={} r={} {} vs {}}}",
                e.vote_a.validator_address,
                e.vote_a.height,
                e.vote_a.round,
                e.vote_a.block_id.hash,
                e.vote_b.block_id.hash
            ),
        }
    }
}

/// Persisted evidence record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceInfo {
    /// The evidence.
    pub evidence: Evidence,
    /// Gossip/inclusion priority (0 once committed).
    pub priority: i64,
    /// Included in a committed block.
    pub committed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::SignedMsgType;
    use crate::core::consensus::signing::sign_vote;
    use crate::core::security::keystore::{MemoryEd25519Backend, SignerBackend};
    use crate::core::validator::Validator;

    fn vote(signer: &MemoryEd25519Backend, hash: u8) -> Vote {
        let mut v = Vote {
            vote_type: SignedMsgType::Prevote,
            height: 3,
            round: 0,
            block_id: BlockId::new(H256::from_bytes([hash; 32]), 1, H256::from_bytes([hash; 32])),
            timestamp_ms: 10,
            validator_address: signer.public_key().address(),
            validator_index: 0,
            signature: Default::default(),
        };
        sign_vote(signer, "amun", &mut v).unwrap();
        v
    }

    #[test]
    fn votes_are_ordered_by_block_id() {
        let k = MemoryEd25519Backend::from_seed(&[1u8; 32]).unwrap();
        let set = ValidatorSet::new(vec![Validator::new(k.public_key(), 7)]).unwrap();
        let ev = DuplicateVoteEvidence::new(vote(&k, 9), vote(&k, 2), 55, &set).unwrap();
        assert_eq!(ev.vote_a.block_id.hash, H256::from_bytes([2u8; 32]));
        assert_eq!(ev.validator_power, 7);
        assert_eq!(ev.total_voting_power, 7);

        let ev = Evidence::DuplicateVote(ev);
        assert!(ev.validate_basic().is_ok());
        assert_eq!(ev.height(), 3);
        assert_eq!(ev.time_ms(), 55);
        assert_eq!(ev.misbehaviors()[0].validator_power, 7);
    }

    #[test]
    fn swapped_votes_fail_basic_validation() {
        let k = MemoryEd25519Backend::from_seed(&[1u8; 32]).unwrap();
        let set = ValidatorSet::new(vec![Validator::new(k.public_key(), 7)]).unwrap();
        let mut ev = DuplicateVoteEvidence::new(vote(&k, 1), vote(&k, 2), 55, &set).unwrap();
        std::mem::swap(&mut ev.vote_a, &mut ev.vote_b);
        assert!(matches!(
            Evidence::DuplicateVote(ev).validate_basic(),
            Err(EvidenceError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_validator_cannot_be_accused() {
        let k = MemoryEd25519Backend::from_seed(&[1u8; 32]).unwrap();
        let other = MemoryEd25519Backend::from_seed(&[2u8; 32]).unwrap();
        let set = ValidatorSet::new(vec![Validator::new(other.public_key(), 7)]).unwrap();
        assert!(matches!(
            DuplicateVoteEvidence::new(vote(&k, 1), vote(&k, 2), 55, &set),
            Err(EvidenceError::NotAValidator { .. })
        ));
    }
}
