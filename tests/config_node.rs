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

use amunchain_state::core::config::StateConfig;
use amunchain_state::node::open_state;
use common::{genesis_doc, MockBlockStore, CHAIN_ID};
use std::sync::Arc;

fn sled_config(dir: &tempfile::TempDir) -> StateConfig {
    let mut cfg = StateConfig::default();
    cfg.storage.db_path = dir.path().join("state").to_string_lossy().into_owned();
    cfg
}

#[test]
fn config_file_is_read_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.toml");
    std::fs::write(
        &path,
        "[storage]\ndb_path = \"/var/lib/amun\"\n\n[events]\ncapacity = 16\n",
    )
    .unwrap();

    let cfg = StateConfig::load(&path).unwrap();
    assert_eq!(cfg.storage.db_path, "/var/lib/amun");
    assert_eq!(cfg.events.capacity, 16);
    assert_eq!(cfg.logging.level, "info");

    std::fs::write(&path, "[storage]\ndb_path = \"  \"\n").unwrap();
    let err = StateConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("db_path"));

    let missing = dir.path().join("absent.toml");
    let err = StateConfig::load(&missing).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn first_start_persists_genesis_state() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sled_config(&dir);
    let genesis = genesis_doc(&[10, 20, 30]);

    let node = open_state(&cfg, &genesis, Arc::new(MockBlockStore::new())).unwrap();
    assert_eq!(node.state.chain_id, CHAIN_ID);
    assert_eq!(node.state.last_block_height, 0);
    assert_eq!(node.state.validators.size(), 3);
    assert_eq!(node.metrics.validators.get(), 3);
    assert_eq!(node.metrics.validators_power.get(), 60);
    assert_eq!(node.executor.store().load().unwrap(), node.state);
    assert_eq!(node.pool.state(), node.state);
    let first = node.state.clone();
    drop(node);

    // reopening reads the stored state instead of genesis
    let mut other_genesis = genesis_doc(&[1]);
    other_genesis.chain_id = CHAIN_ID.to_string();
    let node = open_state(&cfg, &other_genesis, Arc::new(MockBlockStore::new())).unwrap();
    assert_eq!(node.state, first);
}

#[test]
fn stored_state_for_another_chain_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sled_config(&dir);
    drop(open_state(&cfg, &genesis_doc(&[5]), Arc::new(MockBlockStore::new())).unwrap());

    let mut foreign = genesis_doc(&[5]);
    foreign.chain_id = "amun-other".to_string();
    let err = open_state(&cfg, &foreign, Arc::new(MockBlockStore::new()))
        .err()
        .expect("chain id mismatch");
    assert!(err.to_string().contains("amun-other"));
}

#[test]
fn temporary_storage_starts_empty() {
    let cfg = StateConfig::from_toml_str("[storage]\ntemporary = true\n").unwrap();
    let node = open_state(&cfg, &genesis_doc(&[1, 1]), Arc::new(MockBlockStore::new())).unwrap();
    assert_eq!(node.pool.queue_len(), 0);
    assert_eq!(node.state.last_validators.size(), 0);
    let _events = node.events.subscribe();
}
