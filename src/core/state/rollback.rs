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

//! Rewind persisted state by one block.
//!
//! State and blocks are not persisted atomically. After a crash the block
//! store may be one block ahead of the state, which is consistent and needs
//! no work. When both are at the same height the state is rebuilt from the
//! history kept in the state store and the block metas.

use crate::core::{
    block::BlockId,
    state::{
        latest::LatestBlockState,
        services::{BlockStore, BlockStoreError},
        store::{Store, StoreError},
    },
    types::H256,
    validator::ValidatorSet,
};
use thiserror::Error;
use tracing::{error, info};

/// Rollback errors.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Nothing to roll back.
    #[error("no state found")]
    NoState,
    /// Block store and state store disagree by more than one block.
    #[error("state store height ({state}) is not one below or equal to block store height ({block_store})")]
    HeightMismatch {
        /// Last height in the state store.
        state: u64,
        /// Block store height.
        block_store: u64,
    },
    /// The block store has no meta for a height it should have.
    #[error("block at height {0} not found")]
    MissingBlockMeta(u64),
    /// The stored commit does not reference the block being restored.
    #[error("commit at height {height} references {got}, expected {expected}")]
    CommitMismatch {
        /// Height of the commit.
        height: u64,
        /// Block id of the block meta.
        expected: BlockId,
        /// Block id in the commit.
        got: BlockId,
    },
    /// State store failure.
    #[error("state store: {0}")]
    Store(#[from] StoreError),
    /// Block store failure.
    #[error("block store: {0}")]
    BlockStore(#[from] BlockStoreError),
}

impl RollbackError {
    /// True for conditions that must stop the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            RollbackError::HeightMismatch { .. } => true,
            RollbackError::Store(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Roll the persisted state back one height. Returns the height and app
/// hash of the resulting state.
pub fn rollback<B: BlockStore + ?Sized>(
    block_store: &B,
    store: &Store,
) -> Result<(u64, H256), RollbackError> {
    let invalid = store.load()?;
    if invalid.is_empty() {
        return Err(RollbackError::NoState);
    }

    let height = block_store.height();
    if height == invalid.last_block_height + 1 {
        info!(height = invalid.last_block_height, "block store is one ahead, nothing to roll back");
        return Ok((invalid.last_block_height, invalid.app_hash));
    }
    if height != invalid.last_block_height {
        let err = RollbackError::HeightMismatch {
            state: invalid.last_block_height,
            block_store: height,
        };
        error!(%err, "cannot roll back");
        return Err(err);
    }

    let rollback_height = invalid.last_block_height.saturating_sub(1);
    let rollback_block = block_store
        .load_block_meta(rollback_height)
        .ok_or(RollbackError::MissingBlockMeta(rollback_height))?;
    // the app hash for a height is only agreed upon in the following block
    let latest_block = block_store
        .load_block_meta(invalid.last_block_height)
        .ok_or(RollbackError::MissingBlockMeta(invalid.last_block_height))?;

    if let Some(commit) = block_store.load_block_commit(rollback_height) {
        if commit.block_id != rollback_block.block_id {
            return Err(RollbackError::CommitMismatch {
                height: rollback_height,
                expected: rollback_block.block_id,
                got: commit.block_id,
            });
        }
    }

    let previous_last_validators = if rollback_height >= invalid.initial_height {
        store.load_validators(rollback_height)?
    } else {
        ValidatorSet::empty()
    };
    let previous_params = store.load_consensus_params(rollback_height + 1)?;

    // The records saved together with the state at the rollback height carry
    // its exact change heights. Without them, cap at the first height the
    // discarded block could have influenced.
    let vals_changed = match store.load_validators_info(rollback_height + 2)? {
        Some(info) => info.last_height_changed,
        None => invalid.last_height_validators_changed.min(rollback_height + 1),
    };
    let params_changed = match store.load_consensus_params_info(rollback_height + 1)? {
        Some(info) => info.last_height_changed,
        None => invalid
            .last_height_consensus_params_changed
            .min(rollback_height + 1),
    };

    let rolled_back = LatestBlockState {
        chain_id: invalid.chain_id.clone(),
        initial_height: invalid.initial_height,
        last_block_height: rollback_block.header.height,
        last_block_id: rollback_block.block_id,
        last_block_time_ms: rollback_block.header.time_ms,
        next_validators: invalid.validators.clone(),
        validators: invalid.last_validators.clone(),
        last_validators: previous_last_validators,
        last_height_validators_changed: vals_changed,
        consensus_params: previous_params,
        last_height_consensus_params_changed: params_changed,
        app_hash: latest_block.header.app_hash,
    };

    store.save(&rolled_back)?;
    block_store.write_head_block_hash(rollback_block.block_id.hash)?;

    info!(
        height = rolled_back.last_block_height,
        app_hash = %rolled_back.app_hash,
        "rolled back state"
    );
    Ok((rolled_back.last_block_height, rolled_back.app_hash))
}
