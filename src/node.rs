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

//! Bootstrap: open storage, load or create state, and wire the evidence
//! pool and block executor around a caller-supplied block store.

use crate::core::{
    config::StateConfig,
    events::BroadcastEventBus,
    evidence::pool::Pool,
    state::{
        execution::BlockExecutor, latest::GenesisDoc, latest::LatestBlockState,
        services::BlockStore, store::Store,
    },
};
use crate::monitoring::metrics::Metrics;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

/// Evidence pool as wired by [`open_state`].
pub type SharedPool<B> = Arc<Pool<Arc<B>>>;

/// Everything a consensus driver needs to apply blocks.
pub struct StateNode<B: BlockStore> {
    /// Latest persisted state.
    pub state: LatestBlockState,
    /// Block executor; owns the write path.
    pub executor: BlockExecutor<Arc<B>, SharedPool<B>>,
    /// Evidence pool, shared with the executor.
    pub pool: SharedPool<B>,
    /// Block event fan-out.
    pub events: BroadcastEventBus,
    /// Metrics registered by the executor and pool.
    pub metrics: Metrics,
}

/// Open the configured database and return the persisted state, or the
/// genesis state on first start. A persisted state for another chain id is
/// refused.
pub fn open_state<B: BlockStore>(
    cfg: &StateConfig,
    genesis: &GenesisDoc,
    block_store: Arc<B>,
) -> Result<StateNode<B>> {
    let db = cfg.open_kv().context("opening state database")?;
    let store = Store::new(Arc::clone(&db));

    let state = store
        .load_from_db_or_genesis_doc(genesis)
        .context("loading state")?;
    if state.chain_id != genesis.chain_id {
        bail!(
            "database holds chain {:?}, genesis is for {:?}",
            state.chain_id,
            genesis.chain_id
        );
    }

    let metrics = Metrics::new().context("registering metrics")?;
    metrics.block_height.set(state.last_block_height as i64);
    metrics.validators.set(state.validators.size() as i64);
    metrics.validators_power.set(state.validators.total_voting_power());

    // evidence keys are tag-prefixed binary and never collide with the
    // ASCII state keys, so both stores share one database
    let pool = Pool::new(db, store.clone(), Arc::clone(&block_store))
        .context("opening evidence pool")?
        .with_metrics(metrics.clone());
    let pool = Arc::new(pool);

    let events = BroadcastEventBus::new(cfg.events.capacity);
    let executor = BlockExecutor::new(store, block_store, Arc::clone(&pool))
        .with_event_bus(Arc::new(events.clone()))
        .with_metrics(metrics.clone());

    info!(
        chain_id = %state.chain_id,
        height = state.last_block_height,
        app_hash = %state.app_hash,
        "state opened"
    );
    Ok(StateNode {
        state,
        executor,
        pool,
        events,
        metrics,
    })
}
