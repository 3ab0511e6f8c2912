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

//! Amunchain state machine - the replicated state-transition core.
//!
//! This crate provides:
//! - Block validation against the latest committed state
//! - Block execution through an external application, with validator-set
//!   and consensus-param updates
//! - Validator and params history queryable at any past height, stored
//!   sparsely with periodic checkpoints
//! - One-block state rollback
//! - A duplicate-vote evidence pool with persistent pending/committed tracking
//! - Monitoring via Prometheus metrics and structured JSON logging

/// Core protocol primitives (types, blocks, validators, state, evidence).
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Bootstrap wiring for node binaries.
pub mod node;
