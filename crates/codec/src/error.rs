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

//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding messages and metadata.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Buffer ended before a required field
    #[error("Metadata buffer truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required to decode the field
        needed: usize,
        /// Bytes actually available
        have: usize,
    },

    /// A variable-width field held invalid UTF-8
    #[error("Invalid UTF-8 in field '{0}'")]
    InvalidUtf8(&'static str),

    /// A variable-width field exceeds the u16 length prefix
    #[error("Field '{field}' too long: {len} bytes")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Offending length
        len: usize,
    },

    /// Payload JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistence envelope decode error
    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),
}
