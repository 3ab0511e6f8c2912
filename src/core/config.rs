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

//! Node-side configuration for the state machine, read from TOML.
//!
//! ```toml
//! [storage]
//! db_path = "./data/state"
//! temporary = false
//!
//! [events]
//! capacity = 1024
//!
//! [logging]
//! level = "info"
//! json = true
//! ```

use crate::core::state::kv::{KvError, KvStore, PersistentState};
use crate::monitoring::logging::{init_logging, parse_level, LoggingError};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Storage section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// sled directory.
    pub db_path: String,
    /// Use a throwaway database (tests, dry runs).
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/state".to_string(),
            temporary: false,
        }
    }
}

/// Event bus section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it lags.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Logging section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn or error.
    pub level: String,
    /// JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// State machine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Storage.
    pub storage: StorageConfig,
    /// Event bus.
    pub events: EventsConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl StateConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse and validate TOML text. Missing sections take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: StateConfig = toml::from_str(raw).context("invalid TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.events.capacity == 0 {
            bail!("events.capacity must be positive");
        }
        if !self.storage.temporary && self.storage.db_path.trim().is_empty() {
            bail!("storage.db_path is empty");
        }
        parse_level(&self.logging.level)?;
        Ok(())
    }

    /// Install the global log subscriber described by the logging section.
    pub fn init_logging(&self) -> Result<(), LoggingError> {
        init_logging(&self.logging.level, self.logging.json)
    }

    /// Open the configured key-value store.
    pub fn open_kv(&self) -> Result<Arc<dyn KvStore>, KvError> {
        let db = if self.storage.temporary {
            PersistentState::open_temporary()?
        } else {
            PersistentState::open(&self.storage.db_path)?
        };
        Ok(Arc::new(db))
    }
}
