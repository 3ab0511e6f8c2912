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

//! Consensus parameters, versioned by height alongside the validator set.

use crate::core::types::{encode_canonical, PubKey, H256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling on `BlockParams::max_bytes` (100 MiB).
pub const MAX_BLOCK_SIZE_BYTES: i64 = 104_857_600;

/// Upper bound on the encoded size of one evidence item.
pub const MAX_EVIDENCE_BYTES: i64 = 484;

/// Evidence may use at most `1 / MAX_EVIDENCE_BYTES_DENOMINATOR` of a block.
pub const MAX_EVIDENCE_BYTES_DENOMINATOR: i64 = 10;

/// Parameter validation errors.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("block.max_bytes must be in 1..={max}, got {got}")]
    BlockMaxBytes { got: i64, max: i64 },
    #[error("block.max_gas must be >= -1, got {0}")]
    BlockMaxGas(i64),
    #[error("block.time_iota_ms must be > 0")]
    TimeIota,
    #[error("evidence.max_age_num_blocks must be > 0")]
    EvidenceMaxAgeBlocks,
    #[error("evidence.max_age_duration_ms must be > 0")]
    EvidenceMaxAgeDuration,
    #[error("evidence.max_bytes must be in 0..=block.max_bytes, got {0}")]
    EvidenceMaxBytes(i64),
    #[error("validator.pub_key_types must not be empty")]
    NoPubKeyTypes,
    #[error("unknown pub key type {0:?}")]
    UnknownPubKeyType(String),
}

/// Block limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    /// Maximum block size in bytes.
    pub max_bytes: i64,
    /// Maximum gas per block (-1 = unlimited).
    pub max_gas: i64,
    /// Minimum spacing between consecutive block times.
    pub time_iota_ms: u64,
}

/// Evidence admission limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
    /// Age in blocks after which evidence may expire.
    pub max_age_num_blocks: u64,
    /// Age in time after which evidence may expire.
    pub max_age_duration_ms: u64,
    /// Maximum evidence bytes per block.
    pub max_bytes: i64,
}

/// Validator key policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorParams {
    /// Accepted public key types.
    pub pub_key_types: Vec<String>,
}

/// Full parameter set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Block limits.
    pub block: BlockParams,
    /// Evidence limits.
    pub evidence: EvidenceParams,
    /// Validator key policy.
    pub validator: ValidatorParams,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            max_bytes: 22_020_096, // 21 MiB
            max_gas: -1,
            time_iota_ms: 1_000,
        }
    }
}

impl Default for EvidenceParams {
    fn default() -> Self {
        Self {
            max_age_num_blocks: 100_000,
            max_age_duration_ms: 48 * 60 * 60 * 1_000,
            max_bytes: 1_048_576,
        }
    }
}

impl Default for ValidatorParams {
    fn default() -> Self {
        Self {
            pub_key_types: vec![PubKey::TYPE_ED25519.to_string()],
        }
    }
}

impl ConsensusParams {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.block.max_bytes <= 0 || self.block.max_bytes > MAX_BLOCK_SIZE_BYTES {
            return Err(ParamsError::BlockMaxBytes {
                got: self.block.max_bytes,
                max: MAX_BLOCK_SIZE_BYTES,
            });
        }
        if self.block.max_gas < -1 {
            return Err(ParamsError::BlockMaxGas(self.block.max_gas));
        }
        if self.block.time_iota_ms == 0 {
            return Err(ParamsError::TimeIota);
        }
        if self.evidence.max_age_num_blocks == 0 {
            return Err(ParamsError::EvidenceMaxAgeBlocks);
        }
        if self.evidence.max_age_duration_ms == 0 {
            return Err(ParamsError::EvidenceMaxAgeDuration);
        }
        if self.evidence.max_bytes < 0 || self.evidence.max_bytes > self.block.max_bytes {
            return Err(ParamsError::EvidenceMaxBytes(self.evidence.max_bytes));
        }
        if self.validator.pub_key_types.is_empty() {
            return Err(ParamsError::NoPubKeyTypes);
        }
        for t in self.validator.pub_key_types.iter() {
            if t != PubKey::TYPE_ED25519 {
                return Err(ParamsError::UnknownPubKeyType(t.clone()));
            }
        }
        Ok(())
    }

    /// Hash committed in block headers. Only the fields that affect block
    /// validity are hashed.
    pub fn hash(&self) -> H256 {
        let bytes = encode_canonical(&(self.block.max_bytes, self.block.max_gas)).unwrap_or_default();
        H256::digest(&bytes)
    }

    /// True if `key_type` is accepted for validators.
    pub fn allows_pub_key_type(&self, key_type: &str) -> bool {
        self.validator.pub_key_types.iter().any(|t| t == key_type)
    }
}

/// Maximum number of evidence items and evidence bytes a block may carry.
pub fn max_evidence_per_block(block_max_bytes: i64) -> (i64, i64) {
    let max_bytes = block_max_bytes / MAX_EVIDENCE_BYTES_DENOMINATOR;
    let max_num = max_bytes / MAX_EVIDENCE_BYTES;
    (max_num, max_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ConsensusParams::default().validate().is_ok());
    }

    #[test]
    fn evidence_bytes_cannot_exceed_block() {
        let mut p = ConsensusParams::default();
        p.evidence.max_bytes = p.block.max_bytes + 1;
        assert!(matches!(p.validate(), Err(ParamsError::EvidenceMaxBytes(_))));
    }

    #[test]
    fn unknown_key_type_rejected() {
        let mut p = ConsensusParams::default();
        p.validator.pub_key_types.push("secp256k1".into());
        assert!(matches!(p.validate(), Err(ParamsError::UnknownPubKeyType(_))));
    }

    #[test]
    fn evidence_budget_scales_with_block_size() {
        let (num, bytes) = max_evidence_per_block(4_840);
        assert_eq!(bytes, 484);
        assert_eq!(num, 1);
        assert_eq!(max_evidence_per_block(0), (0, 0));
    }

    #[test]
    fn hash_ignores_evidence_params() {
        let a = ConsensusParams::default();
        let mut b = a.clone();
        b.evidence.max_age_num_blocks += 1;
        assert_eq!(a.hash(), b.hash());
        b.block.max_bytes -= 1;
        assert_ne!(a.hash(), b.hash());
    }
}
