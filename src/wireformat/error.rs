//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Wire-format layer error types.
//!
//! Protocol errors indicate the byte stream and the codec disagree. Apart
//! from plain I/O failures they mean the two peers are desynchronized, so
//! the transport instance that produced one is torn down rather than
//! retried.

use std::io;
use thiserror::Error;

/// Errors produced while encoding or decoding commands.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes on the wire do not form a valid frame.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// What was wrong with the frame.
        reason: String,
    },

    /// A frame announced a size beyond the configured limit.
    #[error("frame size {size} exceeds maximum allowed size {limit}")]
    FrameTooLarge {
        /// The announced size.
        size: u64,
        /// The configured limit.
        limit: u64,
    },

    /// A frame carried a command this protocol does not define.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// The command verb as it appeared on the wire.
        name: String,
    },

    /// The command cannot be expressed in this wire protocol.
    #[error("command {command} has no representation in this wire format")]
    UnsupportedCommand {
        /// Payload type name of the offending command.
        command: &'static str,
    },

    /// A command body failed to encode.
    #[error("encode failed: {reason}")]
    Encode {
        /// The serializer's failure description.
        reason: String,
    },

    /// A command body failed to decode.
    #[error("decode failed: {reason}")]
    Decode {
        /// The deserializer's failure description.
        reason: String,
    },

    /// Reading or writing the underlying stream failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl ProtocolError {
    /// Returns `true` if this error is a plain I/O failure rather than a
    /// codec disagreement. I/O failures are the transport's business
    /// (connection lost, recoverable via failover); everything else is
    /// fatal desynchronization.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io { .. })
    }
}
