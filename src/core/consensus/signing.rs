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
#![deny(missing_docs)]

//! Domain-separated signing bytes for consensus votes.

use crate::core::{
    block::{BlockId, SignedMsgType, Vote},
    security::keystore::{verify_pubkey_bytes, SignerBackend},
    types::{encode_canonical, Address, PubKey},
};
use thiserror::Error;

/// Signing error.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Payload could not be encoded.
    #[error("codec")]
    Codec,
    /// Backend refused or failed to sign.
    #[error("signer backend")]
    Backend,
    /// Signature did not verify against the key.
    #[error("invalid signature")]
    BadSignature,
}

/// Vote signing payload:
/// domain || chain_id || type || height || round || block_id || timestamp_ms || validator
///
/// Commit signatures are the signatures of the corresponding precommit votes,
/// so commits are verified against this same payload.
pub fn vote_signing_bytes(
    chain_id: &str,
    vote_type: SignedMsgType,
    height: u64,
    round: u32,
    block_id: &BlockId,
    timestamp_ms: u64,
    validator: &Address,
) -> Result<Vec<u8>, SigningError> {
    let mut out = Vec::with_capacity(32 + chain_id.len() + 1 + 8 + 4 + 32 + 4 + 32 + 8 + 28);
    out.extend_from_slice(b"Amunchain-Vote-v1");
    let cb = encode_canonical(&chain_id).map_err(|_| SigningError::Codec)?;
    out.extend_from_slice(&cb);
    out.push(vote_type as u8);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&round.to_be_bytes());
    out.extend_from_slice(block_id.hash.as_bytes());
    out.extend_from_slice(&block_id.part_set_header.total.to_be_bytes());
    out.extend_from_slice(block_id.part_set_header.hash.as_bytes());
    out.extend_from_slice(&timestamp_ms.to_be_bytes());
    let vb = encode_canonical(validator).map_err(|_| SigningError::Codec)?;
    out.extend_from_slice(&vb);
    Ok(out)
}

/// Sign `vote` in place.
pub fn sign_vote<B: SignerBackend + ?Sized>(
    signer: &B,
    chain_id: &str,
    vote: &mut Vote,
) -> Result<(), SigningError> {
    let msg = vote.sign_bytes(chain_id)?;
    vote.signature = signer.sign(&msg).map_err(|_| SigningError::Backend)?;
    Ok(())
}

/// Verify `vote.signature` against `pub_key`.
pub fn verify_vote(pub_key: &PubKey, chain_id: &str, vote: &Vote) -> Result<(), SigningError> {
    let msg = vote.sign_bytes(chain_id)?;
    verify_pubkey_bytes(pub_key.as_bytes(), &msg, &vote.signature)
        .map_err(|_| SigningError::BadSignature)
}
