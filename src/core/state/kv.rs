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

//! Byte-oriented key-value capability consumed by the state and evidence stores.
//!
//! `PersistentState` backs it with sled; `MemoryKv` is an in-process map for
//! tests and throwaway nodes.

use sled::transaction::ConflictableTransactionError;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Key-value errors.
#[derive(Debug, Error)]
pub enum KvError {
    /// The database could not be opened.
    #[error("db open")]
    DbOpen,
    /// Read or write failed.
    #[error("db io")]
    DbIo,
    /// A batch lost a transaction conflict.
    #[error("tx conflict")]
    TxConflict,
    /// A holder of the in-memory lock panicked.
    #[error("lock poisoned")]
    Poisoned,
}

/// Batched write operation.
#[derive(Clone, Debug)]
pub enum KvOp {
    /// Put key/value.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete key.
    Del { key: Vec<u8> },
}

/// Storage capability. Implementations must be safe to share between the
/// single writer and concurrent readers.
pub trait KvStore: Send + Sync {
    /// Get value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;
    /// Put value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;
    /// Delete key (no-op when absent).
    fn delete(&self, key: &[u8]) -> Result<(), KvError>;
    /// Apply all ops or none.
    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), KvError>;
    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;
    /// Make previous writes durable.
    fn flush(&self) -> Result<(), KvError> {
        Ok(())
    }
}

/// Sled-backed store.
#[derive(Clone)]
pub struct PersistentState {
    db: sled::Db,
}

impl PersistentState {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, KvError> {
        let db = sled::open(path).map_err(|_| KvError::DbOpen)?;
        Ok(Self { db })
    }

    /// Open a sled DB that is removed when dropped.
    pub fn open_temporary() -> Result<Self, KvError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|_| KvError::DbOpen)?;
        Ok(Self { db })
    }
}

impl KvStore for PersistentState {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let v = self.db.get(key).map_err(|_| KvError::DbIo)?;
        Ok(v.map(|iv| iv.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.db.insert(key, value).map_err(|_| KvError::DbIo)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        self.db.remove(key).map_err(|_| KvError::DbIo)?;
        Ok(())
    }

    /// Atomic commit using sled transactions.
    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), KvError> {
        let tree = &self.db;
        let res: Result<(), ConflictableTransactionError<KvError>> = (|| {
            tree.transaction(|t| {
                for op in ops.iter() {
                    match op {
                        KvOp::Put { key, value } => {
                            t.insert(key.as_slice(), value.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(KvError::DbIo)
                            })?;
                        }
                        KvOp::Del { key } => {
                            t.remove(key.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(KvError::DbIo)
                            })?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(se) => {
                    ConflictableTransactionError::Abort(se)
                }
                sled::transaction::TransactionError::Storage(_) => {
                    ConflictableTransactionError::Abort(KvError::DbIo)
                }
            })
        })();

        match res {
            Ok(()) => Ok(()),
            Err(ConflictableTransactionError::Abort(e)) => Err(e),
            Err(ConflictableTransactionError::Conflict) => Err(KvError::TxConflict),
            Err(ConflictableTransactionError::Storage(_)) => Err(KvError::DbIo),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (k, v) = item.map_err(|_| KvError::DbIo)?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn flush(&self) -> Result<(), KvError> {
        self.db.flush().map_err(|_| KvError::DbIo)?;
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let m = self.inner.read().map_err(|_| KvError::Poisoned)?;
        Ok(m.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let mut m = self.inner.write().map_err(|_| KvError::Poisoned)?;
        m.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        let mut m = self.inner.write().map_err(|_| KvError::Poisoned)?;
        m.remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), KvError> {
        let mut m = self.inner.write().map_err(|_| KvError::Poisoned)?;
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    m.insert(key, value);
                }
                KvOp::Del { key } => {
                    m.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let m = self.inner.read().map_err(|_| KvError::Poisoned)?;
        Ok(m.range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(kv: &dyn KvStore) {
        kv.write_batch(vec![
            KvOp::Put { key: b"p/2".to_vec(), value: b"two".to_vec() },
            KvOp::Put { key: b"p/1".to_vec(), value: b"one".to_vec() },
            KvOp::Put { key: b"q/1".to_vec(), value: b"other".to_vec() },
        ])
        .unwrap();

        let scanned = kv.scan_prefix(b"p/").unwrap();
        let keys: Vec<&[u8]> = scanned.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"p/1".as_slice(), b"p/2".as_slice()]);

        kv.write_batch(vec![KvOp::Del { key: b"p/1".to_vec() }]).unwrap();
        assert_eq!(kv.get(b"p/1").unwrap(), None);
        assert_eq!(kv.get(b"p/2").unwrap(), Some(b"two".to_vec()));

        kv.put(b"k", b"v").unwrap();
        kv.delete(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
        kv.flush().unwrap();
    }

    #[test]
    fn memory_kv_semantics() {
        exercise(&MemoryKv::new());
    }

    #[test]
    fn sled_kv_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let st = PersistentState::open(dir.path().to_str().unwrap()).unwrap();
        exercise(&st);
    }
}
