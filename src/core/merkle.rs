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

//! Deterministic Merkle roots over ordered byte items.
//!
//! Used for the transaction root, last-commit hash, evidence hash and the
//! validator-set hash carried in block headers.
//!
//! leaf = H( "Amunchain-Leaf-v1" || item )
//! node = H( "Amunchain-Node-v1" || left || right )

use crate::core::types::H256;
use ring::digest;

const LEAF_DOMAIN: &[u8] = b"Amunchain-Leaf-v1";
const NODE_DOMAIN: &[u8] = b"Amunchain-Node-v1";

fn h(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

fn hash_leaf(item: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(LEAF_DOMAIN.len() + item.len());
    buf.extend_from_slice(LEAF_DOMAIN);
    buf.extend_from_slice(item);
    h(&buf)
}

fn hash_node(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(NODE_DOMAIN.len() + 32 + 32);
    buf.extend_from_slice(NODE_DOMAIN);
    buf.extend_from_slice(&left);
    buf.extend_from_slice(&right);
    h(&buf)
}

/// Merkle root of `items` in the given order.
/// If empty, returns the zero hash.
pub fn merkle_root<T: AsRef<[u8]>>(items: &[T]) -> H256 {
    if items.is_empty() {
        return H256::zero();
    }
    let mut level: Vec<[u8; 32]> = items.iter().map(|i| hash_leaf(i.as_ref())).collect();
    while level.len() > 1 {
        let mut next: Vec<[u8; 32]> = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0usize;
        while i < level.len() {
            let left = level[i];
            let right = if i + 1 < level.len() {
                level[i + 1]
            } else {
                level[i]
            };
            next.push(hash_node(left, right));
            i += 2;
        }
        level = next;
    }
    H256::from_bytes(level[0])
}
