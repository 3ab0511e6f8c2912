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
#![allow(dead_code)]

use amunchain_state::core::{
    block::{Block, BlockId, BlockMeta, Commit, CommitSig, SignedMsgType, Vote},
    consensus::signing::sign_vote,
    evidence::{pool::Pool, DuplicateVoteEvidence, Evidence},
    security::keystore::{MemoryEd25519Backend, SignerBackend},
    state::{
        execution::{BlockExecutor, ExecError},
        kv::{KvStore, MemoryKv},
        latest::{GenesisDoc, GenesisValidator, LatestBlockState},
        services::{
            BlockStore, BlockStoreError, BlockTxsResult, CommitInfo, EmptyEvidencePool,
            EvidencePool, Misbehavior,
        },
        store::Store,
    },
    types::{Address, H256},
    validator::ValidatorSet,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const CHAIN_ID: &str = "amun-test";
pub const GENESIS_TIME_MS: u64 = 1_700_000_000_000;
pub const BLOCK_INTERVAL_MS: u64 = 1_000;

/// Deterministic key for seed byte `i`.
pub fn signer(i: u8) -> MemoryEd25519Backend {
    MemoryEd25519Backend::from_seed(&[i; 32]).expect("seed key")
}

pub fn genesis_doc(powers: &[i64]) -> GenesisDoc {
    GenesisDoc {
        genesis_time_ms: GENESIS_TIME_MS,
        chain_id: CHAIN_ID.to_string(),
        initial_height: 1,
        consensus_params: None,
        validators: powers
            .iter()
            .enumerate()
            .map(|(i, p)| GenesisValidator {
                pub_key: signer(i as u8 + 1).public_key(),
                power: *p,
                name: format!("val{}", i + 1),
            })
            .collect(),
        app_hash: H256::zero(),
    }
}

/// App hash the mock application reports for `height`.
pub fn app_hash_for(height: u64) -> H256 {
    H256::digest(&height.to_be_bytes())
}

/// Application call as seen by the mock.
#[derive(Clone, Debug)]
pub struct AppCall {
    pub height: u64,
    pub commit_info: CommitInfo,
    pub byzantine: Vec<Misbehavior>,
}

#[derive(Default)]
struct MockInner {
    metas: BTreeMap<u64, BlockMeta>,
    commits: BTreeMap<u64, Commit>,
    head: Option<H256>,
    results: VecDeque<BlockTxsResult>,
    fail_next: Option<String>,
    calls: Vec<AppCall>,
}

/// In-memory block store with a scripted application.
#[derive(Default)]
pub struct MockBlockStore {
    inner: Mutex<MockInner>,
}

impl MockBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().expect("mock lock")
    }

    pub fn save_block(&self, block: &Block) {
        let mut g = self.lock();
        g.metas.insert(block.header.height, BlockMeta::from_block(block));
        if block.header.height > 1 && !block.last_commit.signatures.is_empty() {
            g.commits
                .insert(block.header.height - 1, block.last_commit.clone());
        }
    }

    pub fn save_commit(&self, height: u64, commit: Commit) {
        self.lock().commits.insert(height, commit);
    }

    pub fn remove_block(&self, height: u64) {
        let mut g = self.lock();
        g.metas.remove(&height);
        g.commits.remove(&height);
    }

    /// Queue the result for the next block the application executes.
    pub fn push_result(&self, result: BlockTxsResult) {
        self.lock().results.push_back(result);
    }

    pub fn fail_next(&self, msg: &str) {
        self.lock().fail_next = Some(msg.to_string());
    }

    pub fn head(&self) -> Option<H256> {
        self.lock().head
    }

    pub fn calls(&self) -> Vec<AppCall> {
        self.lock().calls.clone()
    }
}

impl BlockStore for MockBlockStore {
    fn height(&self) -> u64 {
        self.lock().metas.keys().next_back().copied().unwrap_or(0)
    }

    fn load_block_meta(&self, height: u64) -> Option<BlockMeta> {
        self.lock().metas.get(&height).cloned()
    }

    fn load_block_commit(&self, height: u64) -> Option<Commit> {
        self.lock().commits.get(&height).cloned()
    }

    fn commit_and_validate_block_txs(
        &self,
        block: &Block,
        commit_info: &CommitInfo,
        byzantine: &[Misbehavior],
    ) -> Result<BlockTxsResult, BlockStoreError> {
        let mut g = self.lock();
        if let Some(msg) = g.fail_next.take() {
            return Err(BlockStoreError::App(msg));
        }
        g.calls.push(AppCall {
            height: block.header.height,
            commit_info: commit_info.clone(),
            byzantine: byzantine.to_vec(),
        });
        let mut result = g.results.pop_front().unwrap_or_default();
        if result.app_hash.is_zero() {
            result.app_hash = app_hash_for(block.header.height);
        }
        Ok(result)
    }

    fn write_head_block_hash(&self, hash: H256) -> Result<(), BlockStoreError> {
        self.lock().head = Some(hash);
        Ok(())
    }
}

/// Precommit-sign `block_id` at `height` with every known key in `vals`.
/// Validators without a key, or listed in `absent`, get an absent slot.
pub fn sign_commit(
    keys: &BTreeMap<Address, MemoryEd25519Backend>,
    vals: &ValidatorSet,
    height: u64,
    block_id: BlockId,
    time_ms: u64,
    absent: &[Address],
) -> Commit {
    let signatures = vals
        .validators()
        .iter()
        .enumerate()
        .map(|(idx, v)| match keys.get(&v.address) {
            Some(key) if !absent.contains(&v.address) => {
                let mut vote = Vote {
                    vote_type: SignedMsgType::Precommit,
                    height,
                    round: 0,
                    block_id,
                    timestamp_ms: time_ms,
                    validator_address: v.address,
                    validator_index: idx as u32,
                    signature: Default::default(),
                };
                sign_vote(key, CHAIN_ID, &mut vote).expect("sign precommit");
                CommitSig::for_block(v.address, time_ms, vote.signature)
            }
            _ => CommitSig::absent(),
        })
        .collect();
    Commit {
        height,
        round: 0,
        block_id,
        signatures,
    }
}

/// Chain driven block by block through a real executor.
pub struct TestChain<P: EvidencePool> {
    pub keys: BTreeMap<Address, MemoryEd25519Backend>,
    pub db: Arc<dyn KvStore>,
    pub store: Store,
    pub block_store: Arc<MockBlockStore>,
    pub executor: BlockExecutor<Arc<MockBlockStore>, P>,
    pub state: LatestBlockState,
    pub last_commit: Commit,
}

pub type PoolChain = TestChain<Arc<Pool<Arc<MockBlockStore>>>>;

fn bootstrap(
    genesis: &GenesisDoc,
) -> (BTreeMap<Address, MemoryEd25519Backend>, Arc<dyn KvStore>, Store, LatestBlockState) {
    let keys: BTreeMap<_, _> = (0..genesis.validators.len())
        .map(|i| {
            let k = signer(i as u8 + 1);
            (k.public_key().address(), k)
        })
        .collect();
    let db: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let store = Store::new(Arc::clone(&db));
    let state = store
        .load_from_db_or_genesis_doc(genesis)
        .expect("genesis state");
    (keys, db, store, state)
}

impl TestChain<EmptyEvidencePool> {
    pub fn new(powers: &[i64]) -> Self {
        let (keys, db, store, state) = bootstrap(&genesis_doc(powers));
        let block_store = Arc::new(MockBlockStore::new());
        let executor = BlockExecutor::new(store.clone(), Arc::clone(&block_store), EmptyEvidencePool);
        Self {
            keys,
            db,
            store,
            block_store,
            executor,
            state,
            last_commit: Commit::default(),
        }
    }
}

impl PoolChain {
    pub fn with_pool(powers: &[i64]) -> Self {
        Self::with_pool_genesis(&genesis_doc(powers))
    }

    pub fn with_pool_genesis(genesis: &GenesisDoc) -> Self {
        let (keys, db, store, state) = bootstrap(genesis);
        let block_store = Arc::new(MockBlockStore::new());
        let evidence_db: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let pool = Pool::new(evidence_db, store.clone(), Arc::clone(&block_store)).expect("pool");
        let executor = BlockExecutor::new(store.clone(), Arc::clone(&block_store), Arc::new(pool));
        Self {
            keys,
            db,
            store,
            block_store,
            executor,
            state,
            last_commit: Commit::default(),
        }
    }

    pub fn pool(&self) -> &Pool<Arc<MockBlockStore>> {
        self.executor.evpool()
    }

    /// Evidence that the validator with seed `seed` prevoted for two blocks
    /// at `height` (which must already be committed).
    pub fn duplicate_vote(&self, seed: u8, height: u64) -> Evidence {
        let key = signer(seed);
        let vals = self.store.load_validators(height).expect("validators at height");
        let (idx, _) = vals
            .get_by_address(&key.public_key().address())
            .expect("accused is a validator");
        let vote = |b: u8| {
            let mut v = Vote {
                vote_type: SignedMsgType::Prevote,
                height,
                round: 0,
                block_id: BlockId::new(H256::from_bytes([b; 32]), 1, H256::from_bytes([b; 32])),
                timestamp_ms: 0,
                validator_address: key.public_key().address(),
                validator_index: idx as u32,
                signature: Default::default(),
            };
            sign_vote(&key, CHAIN_ID, &mut v).expect("sign vote");
            v
        };
        let block_time = self
            .block_store
            .load_block_meta(height)
            .expect("block meta")
            .header
            .time_ms;
        Evidence::DuplicateVote(
            DuplicateVoteEvidence::new(vote(1), vote(2), block_time, &vals).expect("evidence"),
        )
    }
}

impl<P: EvidencePool> TestChain<P> {
    pub fn next_height(&self) -> u64 {
        if self.state.last_block_height == 0 {
            self.state.initial_height
        } else {
            self.state.last_block_height + 1
        }
    }

    /// Proposal on top of the current state by the expected proposer.
    pub fn propose(&self, txs: Vec<Vec<u8>>, evidence: Vec<Evidence>) -> Block {
        let proposer = self
            .state
            .validators
            .proposer()
            .map(|v| v.address)
            .unwrap_or_default();
        self.state.make_block(
            self.next_height(),
            txs,
            self.last_commit.clone(),
            evidence,
            proposer,
        )
    }

    /// Store `block`, apply it, then sign its commit with the validators
    /// that were expected to sign it.
    pub fn commit(&mut self, block: &Block) -> Result<LatestBlockState, ExecError> {
        self.block_store.save_block(block);
        let block_id = block.block_id();
        let signers = self.state.validators.clone();
        let next = self.executor.apply_block(&self.state, block_id, block)?;
        self.last_commit = sign_commit(
            &self.keys,
            &signers,
            block.header.height,
            block_id,
            block.header.time_ms + BLOCK_INTERVAL_MS,
            &[],
        );
        self.state = next.clone();
        Ok(next)
    }

    /// Propose and commit an empty block.
    pub fn advance(&mut self) -> LatestBlockState {
        let block = self.propose(Vec::new(), Vec::new());
        self.commit(&block).expect("apply block")
    }

    pub fn advance_to(&mut self, height: u64) {
        while self.state.last_block_height < height {
            self.advance();
        }
    }

    pub fn add_key(&mut self, seed: u8) -> MemoryEd25519Backend {
        let k = signer(seed);
        self.keys.insert(k.public_key().address(), signer(seed));
        k
    }
}
