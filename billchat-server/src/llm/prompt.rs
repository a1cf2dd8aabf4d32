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

/// Fixed system instruction for the bills assistant.
pub const SYSTEM_PROMPT: &str = "\
- you are a friendly government bills and legislation assistant
- your responses are concise and conversational
- present results in a natural, flowing way
- always mention the total number of results found
- for each bill, include: title, bill number, congress, date, and URL
- briefly explain what the bills represent
- when users ask follow-up questions about specific bills:
  - use get_bill_details for more information about a bill
  - use get_bill_summary to get the bill's summary
- ask if they'd like more details about any specific bill
";
