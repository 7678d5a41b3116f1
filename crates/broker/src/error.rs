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

//! Error types for broker operations.

use relay_codec::CodecError;
use relay_keyvalue::KVError;
use thiserror::Error;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur during broker operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Malformed input: bad topic name, unknown schema, oversize message,
    /// capacity exhausted
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Topic or client id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Topic create collision
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Client id exists but holds a different role
    #[error("Client type mismatch: {0}")]
    TypeMismatch(String),

    /// Schema rejected the payload
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Flush/put/get failure in the persistence layer
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Encode/decode failure
    #[error("Codec failure: {0}")]
    Codec(String),

    /// Cooperative cancellation; a clean stop, not a failure
    #[error("Aborted")]
    Aborted,

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<KVError> for BrokerError {
    fn from(err: KVError) -> Self {
        BrokerError::Storage(err.to_string())
    }
}

impl From<CodecError> for BrokerError {
    fn from(err: CodecError) -> Self {
        BrokerError::Codec(err.to_string())
    }
}
