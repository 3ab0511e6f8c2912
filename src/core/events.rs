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

//! Best-effort notifications for applied blocks.

use crate::core::{
    block::{Block, BlockId, Header},
    state::services::BlockTxsResult,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Event bus errors.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Nobody is subscribed.
    #[error("no subscribers")]
    NoSubscribers,
}

/// Event published after a block is applied.
#[derive(Clone, Debug)]
pub enum Event {
    /// Full block with the application result.
    NewBlock {
        /// Applied block.
        block: Arc<Block>,
        /// Its id.
        block_id: BlockId,
        /// Application result.
        result: Arc<BlockTxsResult>,
    },
    /// Header only.
    NewBlockHeader {
        /// Applied header.
        header: Header,
        /// Number of transactions in the block.
        num_txs: u64,
    },
}

/// Publish side of the event bus.
pub trait EventBus: Send + Sync {
    /// Publish `event`.
    fn publish(&self, event: Event) -> Result<(), EventBusError>;
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopEventBus;

impl EventBus for NopEventBus {
    fn publish(&self, _event: Event) -> Result<(), EventBusError> {
        Ok(())
    }
}

/// Fan-out over a tokio broadcast channel. Slow subscribers lag and lose
/// the oldest events.
#[derive(Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastEventBus {
    /// Bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: Event) -> Result<(), EventBusError> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| EventBusError::NoSubscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_headers() {
        let bus = BroadcastEventBus::new(4);
        let header = Header {
            height: 3,
            ..Default::default()
        };
        assert!(matches!(
            bus.publish(Event::NewBlockHeader { header: header.clone(), num_txs: 0 }),
            Err(EventBusError::NoSubscribers)
        ));

        let mut rx = bus.subscribe();
        bus.publish(Event::NewBlockHeader { header, num_txs: 2 }).unwrap();
        match rx.recv().await.unwrap() {
            Event::NewBlockHeader { header, num_txs } => {
                assert_eq!(header.height, 3);
                assert_eq!(num_txs, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
