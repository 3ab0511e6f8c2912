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

#![no_main]
#![forbid(unsafe_code)]

use amunchain_state::core::types::PubKey;
use amunchain_state::core::validator::{Validator, ValidatorSet};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct Input {
    initial: Vec<(u8, u16)>,
    changes: Vec<(u8, i64)>,
    rounds: u8,
}

fuzz_target!(|inp: Input| {
    let initial: Vec<Validator> = inp
        .initial
        .iter()
        .map(|(k, p)| Validator::new(PubKey([*k; 32]), i64::from(*p) + 1))
        .collect();
    let Ok(mut set) = ValidatorSet::new(initial) else { return };
    let before = set.clone();
    let changes: Vec<Validator> = inp
        .changes
        .iter()
        .map(|(k, p)| Validator::new(PubKey([*k; 32]), *p))
        .collect();
    if set.update_with_change_set(&changes).is_err() {
        assert_eq!(set, before);
        return;
    }
    set.increment_proposer_priority(u32::from(inp.rounds).max(1));
    assert!(set.proposer().is_some());
});
