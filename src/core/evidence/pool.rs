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

//! Evidence pool: verifies and stores incoming evidence, checks block
//! evidence, and feeds the gossip queue.

use crate::core::{
    block::Block,
    evidence::{
        queue::{EvidenceCursor, EvidenceQueue},
        store::EvidenceStore,
        verify::{is_expired, verify_evidence},
        Evidence, EvidenceError,
    },
    state::{
        kv::KvStore,
        latest::LatestBlockState,
        services::{BlockStore, EvidencePool, Misbehavior},
        store::Store,
    },
    types::H256,
};
use crate::monitoring::metrics::Metrics;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

/// Evidence pool over a block store `B`.
pub struct Pool<B: BlockStore> {
    store: EvidenceStore,
    state_store: Store,
    block_store: B,
    state: RwLock<LatestBlockState>,
    queue: EvidenceQueue,
    metrics: Option<Metrics>,
}

impl<B: BlockStore> Pool<B> {
    /// Open the pool on `evidence_db`, loading the latest state from
    /// `state_store`. Pending evidence left from a previous run is queued
    /// for gossip again.
    pub fn new(
        evidence_db: Arc<dyn KvStore>,
        state_store: Store,
        block_store: B,
    ) -> Result<Self, EvidenceError> {
        let state = state_store.load()?;
        let pool = Self {
            store: EvidenceStore::new(evidence_db),
            state_store,
            block_store,
            state: RwLock::new(state),
            queue: EvidenceQueue::new(),
            metrics: None,
        };
        let (pending, _) = pool.pending_evidence(-1)?;
        if !pending.is_empty() {
            info!(count = pending.len(), "re-queued pending evidence");
        }
        for ev in pending {
            pool.queue.push(ev);
        }
        Ok(pool)
    }

    /// Report to `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        metrics.evidence_pending.set(self.queue.len() as i64);
        self.metrics = Some(metrics);
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LatestBlockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the state the pool verifies against.
    pub fn state(&self) -> LatestBlockState {
        self.read_state().clone()
    }

    fn expired(&self, state: &LatestBlockState, ev: &Evidence) -> bool {
        is_expired(
            &state.consensus_params.evidence,
            state.last_block_height,
            state.last_block_time_ms,
            ev.height(),
            ev.time_ms(),
        )
    }

    fn reject(&self, ev: &Evidence, err: EvidenceError) -> EvidenceError {
        warn!(evidence = %ev, %err, "rejected evidence");
        if let Some(m) = self.metrics.as_ref() {
            m.evidence_rejected_total.inc();
        }
        err
    }

    /// Verify and store `ev`. Returns false when it is already known.
    pub fn add_evidence(&self, ev: Evidence) -> Result<bool, EvidenceError> {
        if let Err(e) = ev.validate_basic() {
            return Err(self.reject(&ev, e));
        }
        if self.store.has(&ev)? {
            debug!(evidence = %ev, "evidence already known");
            return Ok(false);
        }

        let state = self.state();
        let verified = verify_evidence(&state, &self.state_store, &self.block_store, &ev);
        let info = match verified {
            Ok(info) => info,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Err(self.reject(&ev, e)),
        };

        let added = self.store.add_new_evidence(&ev, info.priority)?;
        if added {
            info!(evidence = %ev, priority = info.priority, "verified new evidence of byzantine behaviour");
            self.queue.push(ev);
            if let Some(m) = self.metrics.as_ref() {
                m.evidence_added_total.inc();
                m.evidence_pending.set(self.queue.len() as i64);
            }
        }
        Ok(added)
    }

    /// Verify a block's evidence list without storing anything. Pending
    /// evidence was verified on admission and is accepted as is.
    pub fn check_evidence(&self, list: &[Evidence]) -> Result<(), EvidenceError> {
        let state = self.state();
        let mut seen: BTreeSet<H256> = BTreeSet::new();
        for ev in list {
            if !self.store.is_pending(ev)? {
                if self.store.is_committed(ev)? {
                    return Err(EvidenceError::AlreadyCommitted(ev.hash()));
                }
                ev.validate_basic()?;
                verify_evidence(&state, &self.state_store, &self.block_store, ev)?;
            }
            let hash = ev.hash();
            if !seen.insert(hash) {
                return Err(EvidenceError::DuplicateInList(hash));
            }
        }
        Ok(())
    }

    /// Unexpired pending evidence in height order, up to `max_bytes`
    /// (`max_bytes < 0` means unlimited). Also returns the bytes used.
    pub fn pending_evidence(&self, max_bytes: i64) -> Result<(Vec<Evidence>, i64), EvidenceError> {
        let state = self.state();
        let (all, _) = self.store.pending_evidence(-1)?;
        let mut out = Vec::new();
        let mut total: i64 = 0;
        for ev in all.into_iter().filter(|ev| !self.expired(&state, ev)) {
            let size = ev.bytes().len() as i64;
            if max_bytes >= 0 && total + size > max_bytes {
                break;
            }
            total += size;
            out.push(ev);
        }
        Ok((out, total))
    }

    /// Pending evidence by priority descending, then height ascending.
    pub fn priority_evidence(&self) -> Result<Vec<Evidence>, EvidenceError> {
        self.store.priority_evidence()
    }

    /// Adopt `state` after a block was applied. `committed` evidence leaves
    /// the pending views; committed and expired entries leave the gossip
    /// queue.
    pub fn update(&self, state: &LatestBlockState, committed: &[Evidence]) -> Result<(), EvidenceError> {
        {
            let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.last_block_height <= guard.last_block_height {
                return Err(EvidenceError::StaleState {
                    current: guard.last_block_height,
                    got: state.last_block_height,
                });
            }
            *guard = state.clone();
        }

        let mut committed_hashes = BTreeSet::new();
        for ev in committed {
            self.store.mark_evidence_as_committed(ev)?;
            committed_hashes.insert(ev.hash());
        }
        let removed = self
            .queue
            .retain(|ev| !committed_hashes.contains(&ev.hash()) && !self.expired(state, ev));
        if removed > 0 {
            debug!(height = state.last_block_height, removed, "pruned evidence queue");
        }
        if let Some(m) = self.metrics.as_ref() {
            m.evidence_committed_total.inc_by(committed.len() as u64);
            m.evidence_pending.set(self.queue.len() as i64);
        }
        Ok(())
    }

    /// Misbehaviors proven by `block`'s evidence.
    pub fn byzantine_evidence(&self, block: &Block) -> Vec<Misbehavior> {
        block.evidence.iter().flat_map(|ev| ev.misbehaviors()).collect()
    }

    /// Gossip cursor over queued evidence.
    pub fn subscribe(&self) -> EvidenceCursor {
        self.queue.subscribe()
    }

    /// Entries waiting in the gossip queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl<B: BlockStore> EvidencePool for Pool<B> {
    fn check_evidence(&self, evidence: &[Evidence]) -> Result<(), EvidenceError> {
        Pool::check_evidence(self, evidence)
    }

    fn byzantine_evidence(&self, block: &Block) -> Vec<Misbehavior> {
        Pool::byzantine_evidence(self, block)
    }

    fn update(&self, state: &LatestBlockState, committed: &[Evidence]) -> Result<(), EvidenceError> {
        Pool::update(self, state, committed)
    }
}
