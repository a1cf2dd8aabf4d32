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

//! Core domain types for Billchat: bill-record normalization, the
//! packageId grammar, and the retry/backoff resilience primitives
//! shared by the server's remote clients.

pub mod bill;
pub mod error;
pub mod resilience;

pub use bill::{parse_package_id, BillRecord, PackageIdParts};
pub use error::StoreError;
pub use resilience::{retry_with_policy, Retryable, RetryError, RetryPolicy};
