#![forbid(unsafe_code)]
#![deny(missing_docs)]
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

//! Ed25519 signing backends and raw-key signature verification.
//!
//! Verification is what the state core needs: commit signatures and the two
//! votes of duplicate-vote evidence are checked against validator keys
//! recorded in the validator-set history. Signing is exposed through the
//! `SignerBackend` seam so an HSM or remote signer can stand in for the
//! in-memory backend.

use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use thiserror::Error;

use crate::core::types::{PubKey, Signature};

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Key bytes could not be parsed or generated.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Signature did not verify.
    #[error("bad signature")]
    BadSignature,
}

/// Signer backend abstraction (HSM compatible).
pub trait SignerBackend: Send + Sync {
    /// Return public key.
    fn public_key(&self) -> PubKey;
    /// Sign message bytes.
    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError>;
}

/// In-memory Ed25519 backend.
pub struct MemoryEd25519Backend {
    keypair: Ed25519KeyPair,
}

impl MemoryEd25519Backend {
    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, KeystoreError> {
        let keypair =
            Ed25519KeyPair::from_seed_unchecked(seed).map_err(|_| KeystoreError::InvalidKey)?;
        Ok(Self { keypair })
    }

    /// Fresh random key.
    pub fn generate() -> Result<Self, KeystoreError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| KeystoreError::InvalidKey)?;
        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| KeystoreError::InvalidKey)?;
        Ok(Self { keypair })
    }
}

impl SignerBackend for MemoryEd25519Backend {
    fn public_key(&self) -> PubKey {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        PubKey(out)
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, KeystoreError> {
        let sig = self.keypair.sign(msg);
        Ok(Signature(sig.as_ref().to_vec()))
    }
}

/// Verify signature given raw pubkey bytes.
pub fn verify_pubkey_bytes(pk_bytes: &[u8; 32], msg: &[u8], sig: &Signature) -> Result<(), KeystoreError> {
    // ring requires signature length 64 for Ed25519
    if sig.0.len() != 64 {
        return Err(KeystoreError::BadSignature);
    }
    let pk = UnparsedPublicKey::new(&ED25519, pk_bytes);
    pk.verify(msg, &sig.0).map_err(|_| KeystoreError::BadSignature)
}
