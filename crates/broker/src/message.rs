// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// This file is part of Relay.
//
// Relay is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Relay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Relay. If not, see <https://www.gnu.org/licenses/>.

//! Message types and shared helpers.

use crate::error::{BrokerError, BrokerResult};

pub use relay_codec::{MessageMetadata, MetaField, MetadataPatch, ATTEMPTS_UNBOUNDED};

/// Current wall-clock time as epoch millis.
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Validate a topic name against the `[A-Za-z0-9_-]+` grammar.
pub fn validate_topic_name(name: &str) -> BrokerResult<()> {
    if name.is_empty() {
        return Err(BrokerError::InvalidArgument(
            "topic name must not be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(BrokerError::InvalidArgument(format!(
            "topic name '{}' contains characters outside [A-Za-z0-9_-]",
            name
        )));
    }
    Ok(())
}
