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

use amunchain_state::core::evidence::Evidence;
use amunchain_state::core::types::decode_canonical_limited;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(ev) = decode_canonical_limited::<Evidence>(data, 64 * 1024) {
        let _ = ev.validate_basic();
        let _ = ev.misbehaviors();
        let back: Evidence = decode_canonical_limited(&ev.bytes(), 64 * 1024).unwrap();
        assert_eq!(back, ev);
    }
});
