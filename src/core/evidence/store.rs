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

//! Evidence persistence with pending / priority / committed views.
//!
//! Keys are a one-byte tag followed by `%016X(height) "/" HEX(hash)`:
//! - `0x00` committed
//! - `0x01` pending (ascending height)
//! - `0x02` priority; the suffix is prefixed with `%016X(i64::MAX - priority) "/"`
//!   so ascending key order is priority descending, then height ascending.
//!
//! Records are never deleted; committed evidence keeps its `0x00` record.

use crate::core::{
    evidence::{Evidence, EvidenceError, EvidenceInfo},
    state::kv::{KvOp, KvStore},
    types::{decode_canonical_limited, encode_canonical},
};
use std::sync::Arc;

const TAG_COMMITTED: u8 = 0x00;
const TAG_PENDING: u8 = 0x01;
const TAG_PRIORITY: u8 = 0x02;

const MAX_INFO_BYTES: usize = 64 * 1024;

fn key_suffix(ev: &Evidence) -> String {
    format!("{:016X}/{}", ev.height(), ev.hash())
}

fn key_committed(ev: &Evidence) -> Vec<u8> {
    let mut k = vec![TAG_COMMITTED];
    k.extend_from_slice(key_suffix(ev).as_bytes());
    k
}

fn key_pending(ev: &Evidence) -> Vec<u8> {
    let mut k = vec![TAG_PENDING];
    k.extend_from_slice(key_suffix(ev).as_bytes());
    k
}

fn key_priority(ev: &Evidence, priority: i64) -> Vec<u8> {
    let inverted = (i64::MAX - priority.max(0)) as u64;
    let mut k = vec![TAG_PRIORITY];
    k.extend_from_slice(format!("{inverted:016X}/").as_bytes());
    k.extend_from_slice(key_suffix(ev).as_bytes());
    k
}

fn decode_info(bytes: &[u8]) -> Result<EvidenceInfo, EvidenceError> {
    decode_canonical_limited(bytes, MAX_INFO_BYTES).map_err(EvidenceError::Corrupted)
}

/// Evidence store over an injected key-value handle.
#[derive(Clone)]
pub struct EvidenceStore {
    db: Arc<dyn KvStore>,
}

impl EvidenceStore {
    /// Wrap a key-value handle.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        Self { db }
    }

    /// Record of `ev`, committed record first.
    pub fn get_info(&self, ev: &Evidence) -> Result<Option<EvidenceInfo>, EvidenceError> {
        if let Some(b) = self.db.get(&key_committed(ev))? {
            return decode_info(&b).map(Some);
        }
        match self.db.get(&key_pending(ev))? {
            Some(b) => decode_info(&b).map(Some),
            None => Ok(None),
        }
    }

    /// Known in any state.
    pub fn has(&self, ev: &Evidence) -> Result<bool, EvidenceError> {
        Ok(self.is_committed(ev)? || self.is_pending(ev)?)
    }

    /// Stored and not yet committed.
    pub fn is_pending(&self, ev: &Evidence) -> Result<bool, EvidenceError> {
        Ok(self.db.get(&key_pending(ev))?.is_some())
    }

    /// Included in a committed block.
    pub fn is_committed(&self, ev: &Evidence) -> Result<bool, EvidenceError> {
        Ok(self.db.get(&key_committed(ev))?.is_some())
    }

    /// Store new evidence as pending with `priority`. Returns false if the
    /// evidence is already known, pending or committed.
    pub fn add_new_evidence(&self, ev: &Evidence, priority: i64) -> Result<bool, EvidenceError> {
        if self.has(ev)? {
            return Ok(false);
        }
        let info = EvidenceInfo {
            evidence: ev.clone(),
            priority,
            committed: false,
        };
        let bytes = encode_canonical(&info).map_err(EvidenceError::Encode)?;
        self.db.write_batch(vec![
            KvOp::Put {
                key: key_priority(ev, priority),
                value: bytes.clone(),
            },
            KvOp::Put {
                key: key_pending(ev),
                value: bytes,
            },
        ])?;
        Ok(true)
    }

    /// Move `ev` out of the pending and priority views and record it as
    /// committed with priority 0.
    pub fn mark_evidence_as_committed(&self, ev: &Evidence) -> Result<(), EvidenceError> {
        let mut ops = Vec::with_capacity(3);
        if let Some(b) = self.db.get(&key_pending(ev))? {
            let pending = decode_info(&b)?;
            ops.push(KvOp::Del {
                key: key_priority(ev, pending.priority),
            });
            ops.push(KvOp::Del { key: key_pending(ev) });
        }
        let info = EvidenceInfo {
            evidence: ev.clone(),
            priority: 0,
            committed: true,
        };
        ops.push(KvOp::Put {
            key: key_committed(ev),
            value: encode_canonical(&info).map_err(EvidenceError::Encode)?,
        });
        self.db.write_batch(ops)?;
        Ok(())
    }

    /// Pending evidence in height order, up to `max_bytes` of encoded
    /// evidence (`max_bytes < 0` means unlimited). Also returns the bytes used.
    pub fn pending_evidence(&self, max_bytes: i64) -> Result<(Vec<Evidence>, i64), EvidenceError> {
        let mut out = Vec::new();
        let mut total: i64 = 0;
        for (_, v) in self.db.scan_prefix(&[TAG_PENDING])? {
            let info = decode_info(&v)?;
            let size = info.evidence.bytes().len() as i64;
            if max_bytes >= 0 && total + size > max_bytes {
                break;
            }
            total += size;
            out.push(info.evidence);
        }
        Ok((out, total))
    }

    /// Pending evidence by priority descending, then height ascending.
    pub fn priority_evidence(&self) -> Result<Vec<Evidence>, EvidenceError> {
        self.db
            .scan_prefix(&[TAG_PRIORITY])?
            .into_iter()
            .map(|(_, v)| decode_info(&v).map(|i| i.evidence))
            .collect()
    }
}
