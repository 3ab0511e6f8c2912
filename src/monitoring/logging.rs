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

//! Structured logging setup.

use thiserror::Error;
use tracing::Level;

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Level string is not one of trace, debug, info, warn, error.
    #[error("unknown log level {0:?}")]
    BadLevel(String),
    /// A global subscriber is already installed.
    #[error("subscriber init: {0}")]
    Init(String),
}

/// Parse a level name, case-insensitively.
pub fn parse_level(level: &str) -> Result<Level, LoggingError> {
    level
        .trim()
        .parse::<Level>()
        .map_err(|_| LoggingError::BadLevel(level.to_string()))
}

/// Install the global fmt subscriber, JSON lines or compact text.
pub fn init_logging(level: &str, json: bool) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level);
    let res = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    res.map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::WARN);
        assert!(matches!(parse_level("loud"), Err(LoggingError::BadLevel(_))));
    }
}
