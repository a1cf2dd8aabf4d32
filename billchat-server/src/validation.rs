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

//! Inbound message-list validation.

use crate::llm::ChatMessage;

const MAX_MESSAGES: usize = 100;
const MAX_CONTENT_LEN: usize = 32_768;

/// Validate the inbound conversation before any model work happens.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), String> {
    if messages.is_empty() {
        return Err("messages must not be empty".to_string());
    }

    if messages.len() > MAX_MESSAGES {
        return Err(format!(
            "too many messages: {} (maximum {})",
            messages.len(),
            MAX_MESSAGES
        ));
    }

    for (i, message) in messages.iter().enumerate() {
        match message.role.as_str() {
            "system" | "user" | "assistant" => {}
            other => {
                return Err(format!("message {} has unsupported role '{}'", i, other));
            }
        }

        if message.content.trim().is_empty() {
            return Err(format!("message {} has empty content", i));
        }

        if message.content.len() > MAX_CONTENT_LEN {
            return Err(format!("message {} exceeds the content size limit", i));
        }
    }

    // Generation only makes sense off a user turn
    if messages
        .last()
        .map(|m| m.role != "user")
        .unwrap_or(true)
    {
        return Err("last message must be from the user".to_string());
    }

    Ok(())
}
