// Copyright 2025 Billchat Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Document-store error classification.

use crate::resilience::Retryable;
use thiserror::Error;

/// Postgres statement_timeout.
pub const CODE_STATEMENT_TIMEOUT: &str = "57014";
/// Postgres serialization_failure.
pub const CODE_SERIALIZATION_FAILURE: &str = "40001";
/// Postgres deadlock_detected.
pub const CODE_DEADLOCK_DETECTED: &str = "40P01";

/// Error from the external document/embedding store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-level error with an SQLSTATE-style code.
    #[error("store error {code}: {message}")]
    Database { code: String, message: String },

    /// The store did not respond within the timeout.
    #[error("store request timed out")]
    Timeout,

    /// Transport-level failure reaching the store.
    #[error("store unreachable: {0}")]
    Transport(String),

    /// The store answered with a malformed payload.
    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl Retryable for StoreError {
    /// Transient classes: statement/query timeout, serialization
    /// failure, deadlock. Everything else propagates immediately.
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database { code, .. } => matches!(
                code.as_str(),
                CODE_STATEMENT_TIMEOUT | CODE_SERIALIZATION_FAILURE | CODE_DEADLOCK_DETECTED
            ),
            StoreError::Timeout => true,
            StoreError::Transport(_) => false,
            StoreError::Malformed(_) => false,
        }
    }
}
