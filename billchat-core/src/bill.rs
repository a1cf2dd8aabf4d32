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

//! Bill records and the GovInfo packageId grammar.
//!
//! A packageId is a compound identifier of the form
//! `<collection>-<congress><billType><billNumber><version>`, e.g.
//! `BILLS-118hr10150ih` encodes collection BILLS, congress 118, bill
//! type `hr`, bill number 10150, and version stage `ih`. Parsing is
//! total: a malformed id yields documented placeholder fields instead
//! of an error, so one bad record never aborts a result batch.

use serde::{Deserialize, Serialize};

/// Placeholder used when the congress segment cannot be recovered.
pub const UNKNOWN_CONGRESS: &str = "Unknown";

/// Placeholder used when the upstream record carries no title.
pub const UNTITLED: &str = "Untitled";

/// Placeholder used when the upstream record carries no issue date.
pub const DATE_UNKNOWN: &str = "Date unknown";

/// Structured fields decomposed from a packageId.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdParts {
    /// Collection code before the first `-` (e.g. "BILLS").
    pub collection: String,
    /// Congress session number, or [`UNKNOWN_CONGRESS`].
    pub congress: String,
    /// Bill type letters (e.g. "hr", "s"), or empty.
    pub bill_type: String,
    /// Bill sequence number digits, or empty.
    pub bill_number: String,
    /// Version-stage letters (e.g. "ih", "enr"), or empty.
    pub version: String,
}

/// Decompose a packageId into its structured fields.
///
/// Grammar, applied to the remainder after the first `-`:
/// leading digit run = congress, following letter run = bill type,
/// following digit run = bill number, trailing letter run = version.
/// Any missing segment defaults to [`UNKNOWN_CONGRESS`] for the
/// congress and `""` for the rest. Never fails.
pub fn parse_package_id(package_id: &str) -> PackageIdParts {
    let (collection, rest) = match package_id.split_once('-') {
        Some((c, r)) => (c.to_string(), r),
        None => (package_id.to_string(), ""),
    };

    let chars: Vec<char> = rest.chars().collect();
    let mut pos = 0;

    let congress: String = chars[pos..]
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    pos += congress.len();

    let bill_type: String = chars[pos..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    pos += bill_type.len();

    let bill_number: String = chars[pos..]
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    pos += bill_number.len();

    let version: String = chars[pos..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    PackageIdParts {
        collection,
        congress: if congress.is_empty() {
            UNKNOWN_CONGRESS.to_string()
        } else {
            congress
        },
        bill_type,
        bill_number,
        version,
    }
}

/// Normalized bill record handed to the model as a tool result.
///
/// Serialized camelCase: the shape mirrors the upstream API so the
/// model sees familiar field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    pub title: String,
    pub congress: String,
    pub date_issued: String,
    pub package_id: String,
    pub bill_number: String,
    pub bill_type: String,
    pub version: String,
    pub url: String,
    pub summary: String,
}

impl BillRecord {
    /// Build a record from the raw fields of one search hit.
    ///
    /// Missing title/date degrade to placeholders; the packageId is
    /// decomposed through [`parse_package_id`] so an unparsable id
    /// still produces a usable record.
    pub fn from_raw(
        package_id: &str,
        title: Option<&str>,
        date_issued: Option<&str>,
        result_link: Option<&str>,
    ) -> Self {
        let parts = parse_package_id(package_id);

        Self {
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or(UNTITLED)
                .to_string(),
            congress: parts.congress,
            date_issued: date_issued
                .filter(|d| !d.is_empty())
                .unwrap_or(DATE_UNKNOWN)
                .to_string(),
            package_id: package_id.to_string(),
            bill_number: parts.bill_number,
            bill_type: parts.bill_type,
            version: parts.version,
            url: details_url(package_id),
            summary: result_link.unwrap_or("").to_string(),
        }
    }
}

/// Public details page for a package.
pub fn details_url(package_id: &str) -> String {
    format!("https://www.govinfo.gov/app/details/{}", package_id)
}
