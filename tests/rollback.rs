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

mod common;

use amunchain_state::core::{
    block::BlockId,
    security::keystore::SignerBackend,
    state::{
        kv::MemoryKv,
        rollback::{rollback, RollbackError},
        services::{BlockStore, BlockTxsResult, ValidatorUpdate},
        store::Store,
    },
    types::H256,
};
use common::{app_hash_for, MockBlockStore, TestChain};
use std::sync::Arc;

#[test]
fn empty_store_has_nothing_to_roll_back() {
    let store = Store::new(Arc::new(MemoryKv::new()));
    let blocks = MockBlockStore::new();
    assert!(matches!(rollback(&blocks, &store), Err(RollbackError::NoState)));
}

#[test]
fn block_store_one_ahead_is_a_no_op() {
    let mut chain = TestChain::new(&[1, 1, 1]);
    chain.advance_to(4);
    let before = chain.store.load().expect("load");

    // block 5 reached the block store but its state was never saved
    let block = chain.propose(Vec::new(), Vec::new());
    chain.block_store.save_block(&block);
    assert_eq!(chain.block_store.height(), 5);

    let (height, app_hash) = rollback(chain.block_store.as_ref(), &chain.store).expect("rollback");
    assert_eq!(height, 4);
    assert_eq!(app_hash, before.app_hash);
    assert_eq!(chain.store.load().expect("load"), before);
    assert!(chain.block_store.head().is_none());
}

#[test]
fn equal_heights_rewind_one_block() {
    let mut chain = TestChain::new(&[1, 2, 3]);
    chain.advance_to(4);
    let at4 = chain.state.clone();
    chain.advance();
    assert_eq!(chain.block_store.height(), 5);

    let (height, app_hash) = rollback(chain.block_store.as_ref(), &chain.store).expect("rollback");
    assert_eq!(height, 4);
    // block 5's header carries the app hash produced by block 4
    assert_eq!(app_hash, app_hash_for(4));

    let rolled = chain.store.load().expect("load");
    assert_eq!(rolled, at4);
    let meta4 = chain.block_store.load_block_meta(4).expect("meta 4");
    assert_eq!(chain.block_store.head(), Some(meta4.block_id.hash));
}

#[test]
fn rollback_across_a_validator_change() {
    let mut chain = TestChain::new(&[10, 10, 10]);
    chain.advance_to(2);
    let newcomer = chain.add_key(7).public_key();
    let mut updates: Vec<ValidatorUpdate> = chain
        .state
        .next_validators
        .validators()
        .iter()
        .map(|v| ValidatorUpdate::ed25519(v.pub_key, v.voting_power))
        .collect();
    updates.push(ValidatorUpdate::ed25519(newcomer, 5));
    let at2 = chain.state.clone();
    chain.block_store.push_result(BlockTxsResult {
        validator_updates: updates,
        ..Default::default()
    });
    chain.advance();
    assert_eq!(chain.state.last_height_validators_changed, 5);

    rollback(chain.block_store.as_ref(), &chain.store).expect("rollback");
    let rolled = chain.store.load().expect("load");
    assert_eq!(rolled, at2);
    assert!(!rolled.next_validators.has_address(&newcomer.address()));
    // history above the rollback height resolves to the old set again
    assert_eq!(chain.store.load_validators(4).expect("h4"), at2.next_validators);
}

#[test]
fn height_gap_is_fatal() {
    let mut chain = TestChain::new(&[1]);
    chain.advance_to(3);
    chain.block_store.remove_block(3);
    chain.block_store.remove_block(2);
    let err = rollback(chain.block_store.as_ref(), &chain.store).expect_err("gap");
    assert!(matches!(err, RollbackError::HeightMismatch { state: 3, block_store: 1 }));
    assert!(err.is_fatal());
}

#[test]
fn missing_meta_is_reported() {
    let mut chain = TestChain::new(&[1]);
    chain.advance_to(3);
    chain.block_store.remove_block(2);
    assert!(matches!(
        rollback(chain.block_store.as_ref(), &chain.store),
        Err(RollbackError::MissingBlockMeta(2))
    ));
}

#[test]
fn commit_for_another_block_is_rejected() {
    let mut chain = TestChain::new(&[1]);
    chain.advance_to(3);
    let mut commit = chain.block_store.load_block_commit(2).expect("commit 2");
    commit.block_id = BlockId::new(H256::digest(b"fork"), 1, H256::zero());
    chain.block_store.save_commit(2, commit);
    let before = chain.store.load().expect("load");
    assert!(matches!(
        rollback(chain.block_store.as_ref(), &chain.store),
        Err(RollbackError::CommitMismatch { height: 2, .. })
    ));
    assert_eq!(chain.store.load().expect("load"), before);
}
