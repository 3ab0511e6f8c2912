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
#![deny(missing_docs)]

//! Voting-power weighted median of commit timestamps (block time).

use crate::core::{block::Commit, validator::ValidatorSet};

/// A timestamp carrying the voting power of its signer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedTime {
    /// Milliseconds since UNIX epoch.
    pub time_ms: u64,
    /// Signer voting power.
    pub weight: i64,
}

/// Weighted median of `times`: the first time (ascending) at which the
/// accumulated weight reaches half of `total_voting_power`. On an exact
/// split the earlier time wins. Returns 0 when `times` is empty.
pub fn weighted_median(mut times: Vec<WeightedTime>, total_voting_power: i64) -> u64 {
    times.sort_by_key(|t| t.time_ms);
    let total = i128::from(total_voting_power);
    let mut acc: i128 = 0;
    for t in times {
        acc += i128::from(t.weight);
        // compare doubled to keep odd totals exact
        if acc * 2 >= total {
            return t.time_ms;
        }
    }
    0
}

/// Block time for the block following `commit`: the weighted median of the
/// non-absent vote timestamps, weighted by the signers' power in `validators`.
/// Signers not in `validators` are ignored.
pub fn median_time(commit: &Commit, validators: &ValidatorSet) -> u64 {
    let mut total: i64 = 0;
    let mut times = Vec::with_capacity(commit.signatures.len());
    for sig in commit.signatures.iter().filter(|s| !s.is_absent()) {
        if let Some((_, v)) = validators.get_by_address(&sig.validator_address) {
            total += v.voting_power;
            times.push(WeightedTime {
                time_ms: sig.timestamp_ms,
                weight: v.voting_power,
            });
        }
    }
    weighted_median(times, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{BlockId, CommitSig};
    use crate::core::types::{PubKey, Signature};
    use crate::core::validator::Validator;

    fn wt(time_ms: u64, weight: i64) -> WeightedTime {
        WeightedTime { time_ms, weight }
    }

    #[test]
    fn equal_weights_give_plain_median() {
        let times = vec![wt(30, 1), wt(10, 1), wt(20, 1)];
        assert_eq!(weighted_median(times, 3), 20);
    }

    #[test]
    fn heavy_signer_pulls_the_median() {
        let times = vec![wt(10, 1), wt(20, 1), wt(90, 5)];
        assert_eq!(weighted_median(times, 7), 90);
    }

    #[test]
    fn exact_split_takes_the_earlier_time() {
        let four = vec![wt(40, 1), wt(10, 1), wt(30, 1), wt(20, 1)];
        assert_eq!(weighted_median(four, 4), 20);
        assert_eq!(weighted_median(vec![wt(200, 1), wt(100, 1)], 2), 100);
        assert_eq!(weighted_median(vec![wt(100, 5), wt(200, 5)], 10), 100);
        // one more unit of power on the later side moves it
        assert_eq!(weighted_median(vec![wt(100, 5), wt(200, 6)], 11), 200);
    }

    #[test]
    fn no_power_is_zero() {
        assert_eq!(weighted_median(Vec::new(), 0), 0);
    }

    #[test]
    fn absent_and_unknown_signers_are_ignored() {
        let keys: Vec<PubKey> = (1..=3u8).map(|i| PubKey([i; 32])).collect();
        let set = ValidatorSet::new(keys.iter().map(|k| Validator::new(*k, 1)).collect()).unwrap();
        let mut sigs: Vec<CommitSig> = set
            .validators()
            .iter()
            .enumerate()
            .map(|(i, v)| CommitSig::for_block(v.address, 100 * (i as u64 + 1), Signature(vec![0; 64])))
            .collect();
        sigs[2] = CommitSig::absent();
        sigs.push(CommitSig::for_block(PubKey([77; 32]).address(), 5, Signature(vec![0; 64])));
        let commit = Commit {
            height: 1,
            round: 0,
            block_id: BlockId::default(),
            signatures: sigs,
        };
        // two known signers of equal weight split the power: the earlier time wins
        assert_eq!(median_time(&commit, &set), 100);

        let all_absent = Commit {
            signatures: vec![CommitSig::absent(); 3],
            ..commit
        };
        assert_eq!(median_time(&all_absent, &set), 0);
    }
}
