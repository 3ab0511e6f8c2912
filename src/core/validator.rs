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

//! Weighted validator set with round-robin proposer priority.
//!
//! Validators are kept sorted by voting power (descending) then address
//! (ascending) so every node iterates them in the same order. Each round
//! every validator's priority grows by its power and the validator with the
//! highest priority is elected proposer and pays back the total power, so
//! over time each validator proposes in proportion to its power.
//!
//! Sets are plain values. Anything that hands out a set the caller may
//! mutate hands out an owned copy (`Clone`, `copy_increment_proposer_priority`);
//! read access goes through borrowed slices.

use crate::core::{
    block::{BlockId, Commit},
    merkle::merkle_root,
    security::keystore::verify_pubkey_bytes,
    types::{encode_canonical, Address, PubKey, H256},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use thiserror::Error;

/// Upper bound on the total voting power of a set. Leaves headroom so
/// priority arithmetic cannot overflow.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

/// Priorities are kept within `PRIORITY_WINDOW_SIZE_FACTOR * total_power`.
pub const PRIORITY_WINDOW_SIZE_FACTOR: i64 = 2;

/// Validator-set construction and update errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidatorSetError {
    #[error("duplicate validator {0}")]
    DuplicateAddress(Address),
    #[error("negative voting power {power} for {address}")]
    NegativePower { address: Address, power: i64 },
    #[error("voting power {power} for {address} exceeds the maximum")]
    PowerTooHigh { address: Address, power: i64 },
    #[error("total voting power would exceed {MAX_TOTAL_VOTING_POWER}")]
    TotalTooHigh,
    #[error("cannot remove unknown validator {0}")]
    UnknownRemoval(Address),
    #[error("removals not allowed when building a new set")]
    RemovalsNotAllowed,
    #[error("applying the validator changes would result in an empty set")]
    EmptySet,
    #[error("validator {0} is out of order")]
    OutOfOrder(Address),
    #[error("address {0} does not match its key")]
    KeyMismatch(Address),
    #[error("proposer {0} is not in the set")]
    UnknownProposer(Address),
}

/// Commit verification errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("invalid commit: {expected} validators, {got} signatures")]
    SizeMismatch { expected: usize, got: usize },
    #[error("invalid commit height: expected {expected}, got {got}")]
    WrongHeight { expected: u64, got: u64 },
    #[error("invalid commit: wrong block id, expected {expected}, got {got}")]
    WrongBlockId { expected: BlockId, got: BlockId },
    #[error("commit slot {0} signed by a different validator")]
    SignerMismatch(usize),
    #[error("wrong signature in commit slot {0}")]
    BadSignature(usize),
    #[error("insufficient voting power: got {got}, needed more than {needed}")]
    InsufficientPower { got: i64, needed: i64 },
}

/// Validator with voting power and proposer priority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Address derived from `pub_key`.
    pub address: Address,
    /// Consensus key.
    pub pub_key: PubKey,
    /// Voting power (0 in a change set means removal).
    pub voting_power: i64,
    /// Proposer priority accumulator.
    pub proposer_priority: i64,
}

impl Validator {
    /// Validator with zero priority.
    pub fn new(pub_key: PubKey, voting_power: i64) -> Self {
        Self {
            address: pub_key.address(),
            pub_key,
            voting_power,
            proposer_priority: 0,
        }
    }

    /// Bytes hashed into the set hash. Priority is excluded.
    fn hash_bytes(&self) -> Vec<u8> {
        encode_canonical(&(self.pub_key, self.voting_power)).unwrap_or_default()
    }

    /// Higher priority wins; ties go to the lower address.
    fn has_priority_over(&self, other: &Validator) -> bool {
        match self.proposer_priority.cmp(&other.proposer_priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.address < other.address,
        }
    }
}

fn by_voting_power(a: &Validator, b: &Validator) -> Ordering {
    b.voting_power
        .cmp(&a.voting_power)
        .then_with(|| a.address.cmp(&b.address))
}

#[derive(Clone, Serialize, Deserialize)]
struct ValidatorSetRecord {
    validators: Vec<Validator>,
    proposer: Option<Address>,
}

/// Ordered, weighted validator set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ValidatorSetRecord", into = "ValidatorSetRecord")]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    proposer: Option<Address>,
    total_voting_power: i64,
}

impl TryFrom<ValidatorSetRecord> for ValidatorSet {
    type Error = ValidatorSetError;

    fn try_from(r: ValidatorSetRecord) -> Result<Self, Self::Error> {
        let mut seen = BTreeSet::new();
        for (i, v) in r.validators.iter().enumerate() {
            if v.address != v.pub_key.address() {
                return Err(ValidatorSetError::KeyMismatch(v.address));
            }
            if !seen.insert(v.address) {
                return Err(ValidatorSetError::DuplicateAddress(v.address));
            }
            if i > 0 && by_voting_power(&r.validators[i - 1], v) != Ordering::Less {
                return Err(ValidatorSetError::OutOfOrder(v.address));
            }
        }
        if let Some(p) = r.proposer.filter(|p| !seen.contains(p)) {
            return Err(ValidatorSetError::UnknownProposer(p));
        }

        let mut total: i64 = 0;
        for v in r.validators.iter() {
            if v.voting_power < 0 {
                return Err(ValidatorSetError::NegativePower {
                    address: v.address,
                    power: v.voting_power,
                });
            }
            total = total
                .checked_add(v.voting_power)
                .filter(|t| *t <= MAX_TOTAL_VOTING_POWER)
                .ok_or(ValidatorSetError::TotalTooHigh)?;
        }
        Ok(Self {
            validators: r.validators,
            proposer: r.proposer,
            total_voting_power: total,
        })
    }
}

impl From<ValidatorSet> for ValidatorSetRecord {
    fn from(s: ValidatorSet) -> Self {
        Self {
            validators: s.validators,
            proposer: s.proposer,
        }
    }
}

impl ValidatorSet {
    /// Build a set from an initial list and elect the first proposer.
    ///
    /// Zero powers are rejected here; removals only make sense against an
    /// existing set.
    pub fn new(validators: Vec<Validator>) -> Result<Self, ValidatorSetError> {
        let mut set = Self::default();
        if validators.is_empty() {
            return Ok(set);
        }
        set.apply_change_set(&validators, false)?;
        set.increment_proposer_priority(1);
        Ok(set)
    }

    /// The empty set (e.g. `last_validators` before the first block).
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the set has no validators.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Number of validators.
    pub fn size(&self) -> usize {
        self.validators.len()
    }

    /// Validators in set order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Sum of voting powers.
    pub fn total_voting_power(&self) -> i64 {
        self.total_voting_power
    }

    /// True if `address` is a member.
    pub fn has_address(&self, address: &Address) -> bool {
        self.validators.iter().any(|v| v.address == *address)
    }

    /// Index and validator for `address`.
    pub fn get_by_address(&self, address: &Address) -> Option<(usize, &Validator)> {
        self.validators
            .iter()
            .enumerate()
            .find(|(_, v)| v.address == *address)
    }

    /// Validator at `idx` in set order.
    pub fn get_by_index(&self, idx: usize) -> Option<&Validator> {
        self.validators.get(idx)
    }

    /// Current proposer.
    pub fn proposer(&self) -> Option<&Validator> {
        if let Some(addr) = self.proposer.as_ref() {
            if let Some((_, v)) = self.get_by_address(addr) {
                return Some(v);
            }
        }
        self.find_proposer()
    }

    fn find_proposer(&self) -> Option<&Validator> {
        let mut best: Option<&Validator> = None;
        for v in self.validators.iter() {
            best = match best {
                Some(b) if !v.has_priority_over(b) => Some(b),
                _ => Some(v),
            };
        }
        best
    }

    /// Merkle root over `(pub_key, voting_power)` of each validator.
    pub fn hash(&self) -> H256 {
        let items: Vec<Vec<u8>> = self.validators.iter().map(|v| v.hash_bytes()).collect();
        merkle_root(&items)
    }

    /// Advance proposer priority by `times` rounds and elect the proposer.
    pub fn increment_proposer_priority(&mut self, times: u32) {
        if self.is_empty() || times == 0 {
            return;
        }
        let diff_max = PRIORITY_WINDOW_SIZE_FACTOR.saturating_mul(self.total_voting_power);
        self.rescale_priorities(diff_max);
        self.shift_by_avg_proposer_priority();

        let mut proposer = None;
        for _ in 0..times {
            proposer = self.increment_once();
        }
        self.proposer = proposer;
    }

    /// Owned copy advanced by `times` rounds.
    pub fn copy_increment_proposer_priority(&self, times: u32) -> Self {
        let mut copy = self.clone();
        copy.increment_proposer_priority(times);
        copy
    }

    fn increment_once(&mut self) -> Option<Address> {
        for v in self.validators.iter_mut() {
            v.proposer_priority = v.proposer_priority.saturating_add(v.voting_power);
        }
        let total = self.total_voting_power;
        let mut idx = 0usize;
        for (i, v) in self.validators.iter().enumerate().skip(1) {
            if v.has_priority_over(&self.validators[idx]) {
                idx = i;
            }
        }
        let chosen = self.validators.get_mut(idx)?;
        chosen.proposer_priority = chosen.proposer_priority.saturating_sub(total);
        Some(chosen.address)
    }

    /// Shrink priorities so that `max - min <= diff_max`.
    fn rescale_priorities(&mut self, diff_max: i64) {
        if diff_max <= 0 || self.is_empty() {
            return;
        }
        let mut max = i64::MIN;
        let mut min = i64::MAX;
        for v in self.validators.iter() {
            max = max.max(v.proposer_priority);
            min = min.min(v.proposer_priority);
        }
        let diff = (max as i128) - (min as i128);
        let diff_max = diff_max as i128;
        if diff > diff_max {
            let ratio = (diff + diff_max - 1) / diff_max;
            for v in self.validators.iter_mut() {
                v.proposer_priority = ((v.proposer_priority as i128) / ratio) as i64;
            }
        }
    }

    fn shift_by_avg_proposer_priority(&mut self) {
        if self.is_empty() {
            return;
        }
        let sum: i128 = self
            .validators
            .iter()
            .map(|v| v.proposer_priority as i128)
            .sum();
        // Floor-style division keeps the average stable for negative sums.
        let avg = sum.div_euclid(self.validators.len() as i128) as i64;
        for v in self.validators.iter_mut() {
            v.proposer_priority = v.proposer_priority.saturating_sub(avg);
        }
    }

    /// Apply a change set: power 0 removes, anything else adds or updates.
    ///
    /// New validators start at `-(P + P/8)` where `P` is the total power after
    /// updates and before removals, so they do not propose immediately. The
    /// set is left untouched on error.
    pub fn update_with_change_set(&mut self, changes: &[Validator]) -> Result<(), ValidatorSetError> {
        self.apply_change_set(changes, true)
    }

    fn apply_change_set(
        &mut self,
        changes: &[Validator],
        allow_deletes: bool,
    ) -> Result<(), ValidatorSetError> {
        if changes.is_empty() {
            return Ok(());
        }
        let (mut updates, deletes) = process_changes(changes)?;
        if !allow_deletes && !deletes.is_empty() {
            return Err(ValidatorSetError::RemovalsNotAllowed);
        }

        let new_count = updates.iter().filter(|u| !self.has_address(&u.address)).count();
        if new_count == 0 && self.validators.len() == deletes.len() {
            return Err(ValidatorSetError::EmptySet);
        }

        let removed_power = self.verify_removals(&deletes)?;
        let tvp_after_updates_before_removals = self.verify_updates(&updates, removed_power)?;

        for u in updates.iter_mut() {
            u.proposer_priority = match self.get_by_address(&u.address) {
                Some((_, existing)) => existing.proposer_priority,
                None => -(tvp_after_updates_before_removals + (tvp_after_updates_before_removals >> 3)),
            };
        }

        for u in updates {
            match self.validators.iter_mut().find(|v| v.address == u.address) {
                Some(slot) => *slot = u,
                None => self.validators.push(u),
            }
        }
        self.validators.retain(|v| !deletes.contains(&v.address));
        self.total_voting_power = self.validators.iter().map(|v| v.voting_power).sum();
        if self.proposer.map(|p| deletes.contains(&p)).unwrap_or(false) {
            self.proposer = None;
        }

        let diff_max = PRIORITY_WINDOW_SIZE_FACTOR.saturating_mul(self.total_voting_power);
        self.rescale_priorities(diff_max);
        self.shift_by_avg_proposer_priority();
        self.validators.sort_by(by_voting_power);
        Ok(())
    }

    fn verify_removals(&self, deletes: &BTreeSet<Address>) -> Result<i64, ValidatorSetError> {
        let mut removed: i64 = 0;
        for addr in deletes.iter() {
            match self.get_by_address(addr) {
                Some((_, v)) => removed += v.voting_power,
                None => return Err(ValidatorSetError::UnknownRemoval(*addr)),
            }
        }
        Ok(removed)
    }

    /// Total power after updates and before removals. Updates are applied in
    /// ascending order of their power delta so the running total peaks last.
    fn verify_updates(&self, updates: &[Validator], removed_power: i64) -> Result<i64, ValidatorSetError> {
        let delta = |u: &Validator| match self.get_by_address(&u.address) {
            Some((_, v)) => u.voting_power - v.voting_power,
            None => u.voting_power,
        };
        let mut deltas: Vec<i64> = updates.iter().map(delta).collect();
        deltas.sort_unstable();

        let mut tvp_after_removals = self.total_voting_power - removed_power;
        for d in deltas {
            tvp_after_removals = tvp_after_removals
                .checked_add(d)
                .filter(|t| *t <= MAX_TOTAL_VOTING_POWER)
                .ok_or(ValidatorSetError::TotalTooHigh)?;
        }
        Ok(tvp_after_removals + removed_power)
    }

    /// Check that `commit` carries more than 2/3 of this set's power for
    /// `block_id` at `height`. Every present signature must verify.
    pub fn verify_commit(
        &self,
        chain_id: &str,
        block_id: &BlockId,
        height: u64,
        commit: &Commit,
    ) -> Result<(), CommitError> {
        if self.size() != commit.size() {
            return Err(CommitError::SizeMismatch {
                expected: self.size(),
                got: commit.size(),
            });
        }
        if height != commit.height {
            return Err(CommitError::WrongHeight {
                expected: height,
                got: commit.height,
            });
        }
        if *block_id != commit.block_id {
            return Err(CommitError::WrongBlockId {
                expected: *block_id,
                got: commit.block_id,
            });
        }

        let needed = self.total_voting_power * 2 / 3;
        let mut tallied: i64 = 0;
        for (idx, (sig, val)) in commit.signatures.iter().zip(self.validators.iter()).enumerate() {
            if sig.is_absent() {
                continue;
            }
            if sig.validator_address != val.address {
                return Err(CommitError::SignerMismatch(idx));
            }
            let msg = commit
                .vote_sign_bytes(chain_id, idx)
                .map_err(|_| CommitError::BadSignature(idx))?;
            verify_pubkey_bytes(val.pub_key.as_bytes(), &msg, &sig.signature)
                .map_err(|_| CommitError::BadSignature(idx))?;
            if sig.block_id(&commit.block_id) == *block_id {
                tallied += val.voting_power;
            }
        }
        if tallied <= needed {
            return Err(CommitError::InsufficientPower { got: tallied, needed });
        }
        Ok(())
    }
}

/// Split a change list into updates and removals. Rejects duplicates and
/// out-of-range powers.
fn process_changes(changes: &[Validator]) -> Result<(Vec<Validator>, BTreeSet<Address>), ValidatorSetError> {
    let mut sorted: Vec<&Validator> = changes.iter().collect();
    sorted.sort_by(|a, b| a.address.cmp(&b.address));

    let mut updates = Vec::new();
    let mut deletes = BTreeSet::new();
    let mut prev: Option<Address> = None;
    for c in sorted {
        if prev == Some(c.address) {
            return Err(ValidatorSetError::DuplicateAddress(c.address));
        }
        prev = Some(c.address);
        if c.voting_power < 0 {
            return Err(ValidatorSetError::NegativePower {
                address: c.address,
                power: c.voting_power,
            });
        }
        if c.voting_power > MAX_TOTAL_VOTING_POWER {
            return Err(ValidatorSetError::PowerTooHigh {
                address: c.address,
                power: c.voting_power,
            });
        }
        if c.voting_power == 0 {
            deletes.insert(c.address);
        } else {
            updates.push(c.clone());
        }
    }
    Ok((updates, deletes))
}
