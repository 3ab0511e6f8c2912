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

//! Blocks, headers, votes and commits.

use crate::core::{
    consensus::signing::{vote_signing_bytes, SigningError},
    evidence::Evidence,
    merkle::merkle_root,
    types::{encode_canonical, Address, Signature, H256},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum chain id length in bytes.
pub const MAX_CHAIN_ID_LEN: usize = 50;

/// Ed25519 signature length.
const SIGNATURE_LEN: usize = 64;

/// Structural block errors (self-consistency, no state involved).
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("invalid chain id {0:?}")]
    InvalidChainId(String),
    #[error("zero height")]
    ZeroHeight,
    #[error("invalid vote: {0}")]
    InvalidVote(&'static str),
    #[error("invalid commit: {0}")]
    InvalidCommit(&'static str),
    #[error("wrong last commit hash: expected {expected}, got {got}")]
    WrongLastCommitHash { expected: H256, got: H256 },
    #[error("wrong data hash: expected {expected}, got {got}")]
    WrongDataHash { expected: H256, got: H256 },
    #[error("wrong evidence hash: expected {expected}, got {got}")]
    WrongEvidenceHash { expected: H256, got: H256 },
    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),
    #[error("missing proposer address")]
    MissingProposer,
}

/// Header of the part set a block was gossiped as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartSetHeader {
    /// Number of parts.
    pub total: u32,
    /// Merkle root of the parts.
    pub hash: H256,
}

/// Identity of a block: header hash plus part-set header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    /// Header hash.
    pub hash: H256,
    /// Part-set header.
    pub part_set_header: PartSetHeader,
}

impl BlockId {
    /// Construct from parts.
    pub fn new(hash: H256, total: u32, parts_hash: H256) -> Self {
        Self {
            hash,
            part_set_header: PartSetHeader {
                total,
                hash: parts_hash,
            },
        }
    }

    /// True for the "nil" block id (genesis / nil vote).
    pub fn is_zero(&self) -> bool {
        self.hash.is_zero() && self.part_set_header == PartSetHeader::default()
    }

    /// Byte key used to order conflicting votes deterministically.
    pub fn key(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 4 + 32);
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.part_set_header.total.to_be_bytes());
        out.extend_from_slice(self.part_set_header.hash.as_bytes());
        out
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.hash, self.part_set_header.total, self.part_set_header.hash
        )
    }
}

/// Vote step.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignedMsgType {
    /// First voting step.
    Prevote = 1,
    /// Second voting step; precommits for a block form its commit.
    Precommit = 2,
}

/// Signed consensus vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Step.
    pub vote_type: SignedMsgType,
    /// Block height.
    pub height: u64,
    /// Consensus round (height-bound).
    pub round: u32,
    /// Voted block (zero for nil).
    pub block_id: BlockId,
    /// Signer wall-clock time in milliseconds since UNIX epoch.
    pub timestamp_ms: u64,
    /// Voter address.
    pub validator_address: Address,
    /// Voter index in the validator set.
    pub validator_index: u32,
    /// Signature over `sign_bytes`.
    pub signature: Signature,
}

impl Vote {
    /// Bytes the voter signs.
    pub fn sign_bytes(&self, chain_id: &str) -> Result<Vec<u8>, SigningError> {
        vote_signing_bytes(
            chain_id,
            self.vote_type,
            self.height,
            self.round,
            &self.block_id,
            self.timestamp_ms,
            &self.validator_address,
        )
    }

    /// Stateless sanity checks.
    pub fn validate_basic(&self) -> Result<(), BlockError> {
        if self.height == 0 {
            return Err(BlockError::InvalidVote("zero height"));
        }
        if !self.block_id.is_zero() && self.block_id.hash.is_zero() {
            return Err(BlockError::InvalidVote("partial block id"));
        }
        if self.signature.0.len() != SIGNATURE_LEN {
            return Err(BlockError::InvalidVote("signature length"));
        }
        Ok(())
    }
}

/// What a commit slot records about its validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockIdFlag {
    /// No vote received.
    Absent,
    /// Voted for the committed block.
    Commit,
    /// Voted nil.
    Nil,
}

/// One validator's slot in a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSig {
    /// Slot kind.
    pub block_id_flag: BlockIdFlag,
    /// Signer address (zero when absent).
    pub validator_address: Address,
    /// Vote timestamp (0 when absent).
    pub timestamp_ms: u64,
    /// Precommit signature (empty when absent).
    pub signature: Signature,
}

impl CommitSig {
    /// Slot for a validator that did not vote.
    pub fn absent() -> Self {
        Self {
            block_id_flag: BlockIdFlag::Absent,
            validator_address: Address::default(),
            timestamp_ms: 0,
            signature: Signature::default(),
        }
    }

    /// Slot for a precommit on the committed block.
    pub fn for_block(validator_address: Address, timestamp_ms: u64, signature: Signature) -> Self {
        Self {
            block_id_flag: BlockIdFlag::Commit,
            validator_address,
            timestamp_ms,
            signature,
        }
    }

    /// No vote recorded.
    pub fn is_absent(&self) -> bool {
        self.block_id_flag == BlockIdFlag::Absent
    }

    /// Vote was for the committed block.
    pub fn is_for_block(&self) -> bool {
        self.block_id_flag == BlockIdFlag::Commit
    }

    /// The block id this slot's vote was cast for.
    pub fn block_id(&self, commit_block_id: &BlockId) -> BlockId {
        match self.block_id_flag {
            BlockIdFlag::Commit => *commit_block_id,
            BlockIdFlag::Absent | BlockIdFlag::Nil => BlockId::default(),
        }
    }

    fn validate_basic(&self) -> Result<(), BlockError> {
        match self.block_id_flag {
            BlockIdFlag::Absent => {
                if self.validator_address != Address::default() || !self.signature.is_empty() {
                    return Err(BlockError::InvalidCommit("absent slot carries data"));
                }
            }
            BlockIdFlag::Commit | BlockIdFlag::Nil => {
                if self.signature.0.len() != SIGNATURE_LEN {
                    return Err(BlockError::InvalidCommit("signature length"));
                }
            }
        }
        Ok(())
    }
}

/// Precommit signatures for one block, one slot per validator in set order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Committed height.
    pub height: u64,
    /// Round the block was committed in.
    pub round: u32,
    /// Committed block.
    pub block_id: BlockId,
    /// Slots in validator-set order.
    pub signatures: Vec<CommitSig>,
}

impl Commit {
    /// Number of slots.
    pub fn size(&self) -> usize {
        self.signatures.len()
    }

    /// Reconstruct the precommit vote behind slot `idx`.
    pub fn get_vote(&self, idx: usize) -> Option<Vote> {
        let sig = self.signatures.get(idx)?;
        Some(Vote {
            vote_type: SignedMsgType::Precommit,
            height: self.height,
            round: self.round,
            block_id: sig.block_id(&self.block_id),
            timestamp_ms: sig.timestamp_ms,
            validator_address: sig.validator_address,
            validator_index: idx as u32,
            signature: sig.signature.clone(),
        })
    }

    /// Sign bytes of the vote behind slot `idx`.
    pub fn vote_sign_bytes(&self, chain_id: &str, idx: usize) -> Result<Vec<u8>, SigningError> {
        let vote = self.get_vote(idx).ok_or(SigningError::Codec)?;
        vote.sign_bytes(chain_id)
    }

    /// Merkle root over the encoded slots.
    pub fn hash(&self) -> H256 {
        let items: Vec<Vec<u8>> = self
            .signatures
            .iter()
            .map(|s| encode_canonical(s).unwrap_or_default())
            .collect();
        merkle_root(&items)
    }

    /// Stateless sanity checks.
    pub fn validate_basic(&self) -> Result<(), BlockError> {
        if self.height > 0 {
            if self.block_id.is_zero() {
                return Err(BlockError::InvalidCommit("commit cannot be for nil block"));
            }
            if self.signatures.is_empty() {
                return Err(BlockError::InvalidCommit("no signatures"));
            }
        }
        for s in self.signatures.iter() {
            s.validate_basic()?;
        }
        Ok(())
    }
}

/// Block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Chain identifier.
    pub chain_id: String,
    /// Height.
    pub height: u64,
    /// Block time (weighted median of the last commit), ms since UNIX epoch.
    pub time_ms: u64,
    /// Previous block.
    pub last_block_id: BlockId,
    /// Hash of `Block::last_commit`.
    pub last_commit_hash: H256,
    /// Transaction root.
    pub data_hash: H256,
    /// Hash of the validators signing this block.
    pub validators_hash: H256,
    /// Hash of the validators signing the next block.
    pub next_validators_hash: H256,
    /// Hash of the consensus params in force.
    pub consensus_hash: H256,
    /// App hash produced after executing the previous block.
    pub app_hash: H256,
    /// Hash of `Block::evidence`.
    pub evidence_hash: H256,
    /// Proposer.
    pub proposer_address: Address,
}

impl Header {
    /// Header hash (identity of the block).
    pub fn hash(&self) -> H256 {
        H256::digest(&encode_canonical(self).unwrap_or_default())
    }
}

/// Block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Header.
    pub header: Header,
    /// Opaque transactions.
    pub txs: Vec<Vec<u8>>,
    /// Byzantine evidence included by the proposer.
    pub evidence: Vec<Evidence>,
    /// Commit for the previous block.
    pub last_commit: Commit,
}

/// Transaction root.
pub fn txs_root(txs: &[Vec<u8>]) -> H256 {
    merkle_root(txs)
}

/// Root over evidence hashes.
pub fn evidence_root(evidence: &[Evidence]) -> H256 {
    let items: Vec<[u8; 32]> = evidence.iter().map(|e| *e.hash().as_bytes()).collect();
    merkle_root(&items)
}

impl Block {
    /// Header hash.
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Block id. Blocks travel as a single part here.
    pub fn block_id(&self) -> BlockId {
        let parts_hash = H256::digest(&encode_canonical(self).unwrap_or_default());
        BlockId::new(self.hash(), 1, parts_hash)
    }

    /// Recompute the content hashes in the header.
    pub fn fill_header(&mut self) {
        self.header.last_commit_hash = self.last_commit.hash();
        self.header.data_hash = txs_root(&self.txs);
        self.header.evidence_hash = evidence_root(&self.evidence);
    }

    /// Self-consistency checks, independent of chain state.
    pub fn validate_basic(&self) -> Result<(), BlockError> {
        let h = &self.header;
        if h.chain_id.is_empty() || h.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(BlockError::InvalidChainId(h.chain_id.clone()));
        }
        if h.height == 0 {
            return Err(BlockError::ZeroHeight);
        }
        if h.proposer_address == Address::default() {
            return Err(BlockError::MissingProposer);
        }

        self.last_commit.validate_basic()?;
        let commit_hash = self.last_commit.hash();
        if h.last_commit_hash != commit_hash {
            return Err(BlockError::WrongLastCommitHash {
                expected: commit_hash,
                got: h.last_commit_hash,
            });
        }

        let data_hash = txs_root(&self.txs);
        if h.data_hash != data_hash {
            return Err(BlockError::WrongDataHash {
                expected: data_hash,
                got: h.data_hash,
            });
        }

        for ev in self.evidence.iter() {
            ev.validate_basic()
                .map_err(|e| BlockError::InvalidEvidence(e.to_string()))?;
        }
        let ev_hash = evidence_root(&self.evidence);
        if h.evidence_hash != ev_hash {
            return Err(BlockError::WrongEvidenceHash {
                expected: ev_hash,
                got: h.evidence_hash,
            });
        }
        Ok(())
    }
}

/// Summary a block store keeps per height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Block id.
    pub block_id: BlockId,
    /// Header.
    pub header: Header,
    /// Transaction count.
    pub num_txs: u64,
}

impl BlockMeta {
    /// Meta for `block`.
    pub fn from_block(block: &Block) -> Self {
        Self {
            block_id: block.block_id(),
            header: block.header.clone(),
            num_txs: block.txs.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let mut b = Block {
            header: Header {
                chain_id: "amun-test".into(),
                height: 1,
                time_ms: 1_000,
                proposer_address: Address([1u8; 20]),
                ..Default::default()
            },
            txs: vec![b"a=1".to_vec(), b"b=2".to_vec()],
            evidence: Vec::new(),
            last_commit: Commit::default(),
        };
        b.fill_header();
        b
    }

    #[test]
    fn filled_block_is_self_consistent() {
        let b = sample_block();
        assert!(b.validate_basic().is_ok());
    }

    #[test]
    fn tampered_txs_fail_data_hash() {
        let mut b = sample_block();
        b.txs.push(b"c=3".to_vec());
        assert!(matches!(b.validate_basic(), Err(BlockError::WrongDataHash { .. })));
    }

    #[test]
    fn block_id_tracks_header() {
        let a = sample_block();
        let mut b = sample_block();
        b.header.time_ms += 1;
        assert_ne!(a.block_id().hash, b.block_id().hash);
        assert_eq!(a.block_id(), sample_block().block_id());
    }

    #[test]
    fn absent_slot_must_be_empty() {
        let mut c = Commit {
            height: 1,
            round: 0,
            block_id: BlockId::new(H256::from_bytes([1u8; 32]), 1, H256::zero()),
            signatures: vec![CommitSig::absent()],
        };
        assert!(c.validate_basic().is_ok());
        c.signatures[0].validator_address = Address([2u8; 20]);
        assert!(c.validate_basic().is_err());
    }
}
