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

//! Transport layer error types.
//!
//! Transport errors represent failures in command-level communication with
//! the broker. Their classification drives failover policy: recoverable
//! errors trigger reconnection, the rest tear the transport down and are
//! surfaced to the application's exception listener.

use crate::wireformat::ProtocolError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the remote endpoint.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An established connection was lost or became unusable.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was lost.
        reason: String,
        /// The underlying I/O error, if available.
        #[source]
        source: Option<io::Error>,
    },

    /// Reading from the transport failed.
    #[error("read failed: {source}")]
    ReadFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing to the transport failed.
    #[error("write failed: {source}")]
    WriteFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A request did not complete within its deadline.
    ///
    /// The request may still complete on the broker; only the caller's
    /// wait is abandoned.
    #[error("request timed out after {duration:?}")]
    Timeout {
        /// The deadline that was exceeded.
        duration: Duration,
    },

    /// Wire-format negotiation did not complete.
    #[error("wire format negotiation failed: {reason}")]
    NegotiationFailed {
        /// Why negotiation failed.
        reason: String,
    },

    /// A transport URI could not be parsed or names an unknown scheme.
    #[error("invalid transport URI {uri:?}: {reason}")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The transport has been stopped and cannot be used again.
    #[error("transport is closed")]
    Closed,

    /// The transport has not (yet) been connected.
    #[error("transport is not connected")]
    NotConnected,

    /// This layer cannot wait for responses.
    ///
    /// `request()` is only available above a response correlator; calling
    /// it on a lower layer yields this typed result rather than a panic.
    #[error("this transport does not support request/response")]
    RequestsUnsupported,

    /// The byte stream and the wire format disagree.
    ///
    /// Always fatal to this transport instance: the peers are
    /// desynchronized and no further frame boundary can be trusted.
    #[error("protocol error: {source}")]
    Protocol {
        /// The codec failure.
        #[from]
        source: ProtocolError,
    },
}

impl TransportError {
    /// Returns `true` if this error may succeed on retry through failover.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::Timeout { .. }
            | TransportError::NegotiationFailed { .. }
            | TransportError::NotConnected => true,

            TransportError::ReadFailed { source } | TransportError::WriteFailed { source } => {
                matches!(
                    source.kind(),
                    io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                )
            }

            TransportError::InvalidUri { .. }
            | TransportError::Closed
            | TransportError::RequestsUnsupported
            | TransportError::Protocol { .. } => false,
        }
    }

    /// Returns `true` if the transport instance that produced this error
    /// must be torn down.
    pub fn should_close_transport(&self) -> bool {
        match self {
            TransportError::ConnectionLost { .. }
            | TransportError::Closed
            | TransportError::Protocol { .. } => true,

            TransportError::ReadFailed { source } | TransportError::WriteFailed { source } => {
                !matches!(
                    source.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                )
            }

            TransportError::ConnectionFailed { .. }
            | TransportError::Timeout { .. }
            | TransportError::NegotiationFailed { .. }
            | TransportError::InvalidUri { .. }
            | TransportError::NotConnected
            | TransportError::RequestsUnsupported => false,
        }
    }

    /// Clones the failure description into a value that can be handed to
    /// every waiter affected by it.
    ///
    /// `TransportError` is not `Clone` because it carries `io::Error`
    /// causes; fan-out sites replicate the description instead.
    #[must_use]
    pub fn replicate(&self) -> TransportError {
        TransportError::ConnectionLost {
            reason: self.to_string(),
            source: None,
        }
    }
}
