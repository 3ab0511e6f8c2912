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

//! Outbound evidence queue: one producer, any number of gossip consumers.
//!
//! Entries carry increasing sequence numbers. Each consumer owns a cursor
//! and waits on a `watch` channel for the producer to publish a new
//! sequence, so idle consumers sleep instead of polling. Removed entries are
//! simply skipped by cursors that have not reached them yet.

use crate::core::evidence::Evidence;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Default)]
struct QueueInner {
    next_seq: u64,
    entries: BTreeMap<u64, Evidence>,
}

fn lock(inner: &Mutex<QueueInner>) -> MutexGuard<'_, QueueInner> {
    // entries stay consistent even if a holder panicked
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Producer side.
pub struct EvidenceQueue {
    inner: Arc<Mutex<QueueInner>>,
    tx: watch::Sender<u64>,
}

impl Default for EvidenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceQueue {
    /// Empty queue.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            tx,
        }
    }

    /// Append `ev` and wake waiting cursors.
    pub fn push(&self, ev: Evidence) -> u64 {
        let seq = {
            let mut q = lock(&self.inner);
            let seq = q.next_seq;
            q.next_seq += 1;
            q.entries.insert(seq, ev);
            seq
        };
        self.tx.send_replace(seq + 1);
        seq
    }

    /// Keep only the entries for which `keep` returns true. Returns the
    /// number removed.
    pub fn retain<F: FnMut(&Evidence) -> bool>(&self, mut keep: F) -> usize {
        let mut q = lock(&self.inner);
        let before = q.entries.len();
        q.entries.retain(|_, ev| keep(ev));
        before - q.entries.len()
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued evidence in insertion order.
    pub fn snapshot(&self) -> Vec<Evidence> {
        lock(&self.inner).entries.values().cloned().collect()
    }

    /// Cursor starting at the front of the queue.
    pub fn subscribe(&self) -> EvidenceCursor {
        EvidenceCursor {
            inner: Arc::clone(&self.inner),
            rx: self.tx.subscribe(),
            next: 0,
        }
    }
}

/// Consumer side; each gossip task owns one.
pub struct EvidenceCursor {
    inner: Arc<Mutex<QueueInner>>,
    rx: watch::Receiver<u64>,
    next: u64,
}

impl EvidenceCursor {
    /// Next entry past the cursor, waiting until one is pushed. Returns
    /// `None` once the queue is dropped and everything left has been read.
    pub async fn next(&mut self) -> Option<Evidence> {
        loop {
            // mark the current version seen before looking, so a push that
            // lands after the lookup still wakes `changed`
            self.rx.borrow_and_update();
            if let Some(ev) = self.try_next() {
                return Some(ev);
            }
            if self.rx.changed().await.is_err() {
                return self.try_next();
            }
        }
    }

    /// Next entry past the cursor without waiting.
    pub fn try_next(&mut self) -> Option<Evidence> {
        let q = lock(&self.inner);
        let (seq, ev) = q.entries.range(self.next..).next()?;
        self.next = seq + 1;
        Some(ev.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{BlockId, SignedMsgType, Vote};
    use crate::core::evidence::DuplicateVoteEvidence;
    use crate::core::types::{Address, Signature, H256};
    use std::time::Duration;

    fn ev(height: u64) -> Evidence {
        let vote = |h: u8| Vote {
            vote_type: SignedMsgType::Prevote,
            height,
            round: 0,
            block_id: BlockId::new(H256::from_bytes([h; 32]), 1, H256::zero()),
            timestamp_ms: 0,
            validator_address: Address([1; 20]),
            validator_index: 0,
            signature: Signature(vec![0; 64]),
        };
        Evidence::DuplicateVote(DuplicateVoteEvidence {
            vote_a: vote(1),
            vote_b: vote(2),
            total_voting_power: 1,
            validator_power: 1,
            timestamp_ms: 0,
        })
    }

    #[test]
    fn cursors_read_independently_and_skip_removed() {
        let q = EvidenceQueue::new();
        let mut c1 = q.subscribe();
        q.push(ev(1));
        q.push(ev(2));
        q.push(ev(3));

        assert_eq!(c1.try_next().map(|e| e.height()), Some(1));
        assert_eq!(q.retain(|e| e.height() != 2), 1);

        let mut c2 = q.subscribe();
        assert_eq!(c1.try_next().map(|e| e.height()), Some(3));
        assert!(c1.try_next().is_none());
        assert_eq!(c2.try_next().map(|e| e.height()), Some(1));
        assert_eq!(c2.try_next().map(|e| e.height()), Some(3));
    }

    #[tokio::test]
    async fn waiting_cursor_wakes_on_push() {
        let q = EvidenceQueue::new();
        let mut cursor = q.subscribe();
        let waiter = tokio::spawn(async move { cursor.next().await.map(|e| e.height()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(ev(7));

        let got = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("cursor did not wake")
            .unwrap();
        assert_eq!(got, Some(7));
    }

    #[tokio::test]
    async fn cursor_drains_then_ends_when_queue_dropped() {
        let q = EvidenceQueue::new();
        let mut cursor = q.subscribe();
        q.push(ev(1));
        drop(q);
        assert_eq!(cursor.next().await.map(|e| e.height()), Some(1));
        assert!(cursor.next().await.is_none());
    }
}
