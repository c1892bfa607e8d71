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

//! Top-level error type for MQLink.
//!
//! The layers compose: [`ProtocolError`](crate::wireformat::ProtocolError)
//! (codec) feeds [`TransportError`](crate::transport::TransportError)
//! (connection), and the application-facing [`MqlinkError`] adds what only
//! the session layer knows — peer-reported failures, operations on closed
//! resources, and API misuse.

use crate::transport::TransportError;
use std::error::Error as StdError;
use std::fmt;

/// Application-facing error for MQLink operations.
#[derive(Debug)]
pub enum MqlinkError {
    /// The transport layer failed: connectivity, timeouts, protocol
    /// desynchronization.
    Transport(TransportError),

    /// The broker answered with an exception response.
    Remote {
        /// Peer-supplied failure description.
        message: String,
        /// Broker-side error class, when reported.
        exception_class: Option<String>,
    },

    /// The operation targeted a connection, session, consumer or producer
    /// that has been closed. Never retried; the resource is gone.
    Closed {
        /// Which resource the operation targeted.
        resource: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// The API was used outside its contract, e.g. committing a
    /// non-transacted session.
    Usage {
        /// What the caller did wrong.
        message: String,
    },
}

impl MqlinkError {
    /// Builds a [`MqlinkError::Closed`] for `resource`/`operation`.
    pub fn closed(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        MqlinkError::Closed {
            resource: resource.into(),
            operation: operation.into(),
        }
    }

    /// Builds a [`MqlinkError::Usage`].
    pub fn usage(message: impl Into<String>) -> Self {
        MqlinkError::Usage {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transport-layer failure.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, MqlinkError::Transport(_))
    }

    /// Returns `true` if the broker reported the failure.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, MqlinkError::Remote { .. })
    }

    /// Returns `true` if the operation hit a closed resource.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, MqlinkError::Closed { .. })
    }

    /// Returns `true` if retrying the operation may succeed.
    ///
    /// Only transient transport failures qualify; remote failures, closed
    /// resources and usage errors never do.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            MqlinkError::Transport(error) => error.is_recoverable(),
            MqlinkError::Remote { .. }
            | MqlinkError::Closed { .. }
            | MqlinkError::Usage { .. } => false,
        }
    }
}

impl fmt::Display for MqlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqlinkError::Transport(error) => write!(f, "transport error: {}", error),
            MqlinkError::Remote {
                message,
                exception_class: Some(class),
            } => write!(f, "broker error [{}]: {}", class, message),
            MqlinkError::Remote {
                message,
                exception_class: None,
            } => write!(f, "broker error: {}", message),
            MqlinkError::Closed {
                resource,
                operation,
            } => write!(f, "{} on closed {}", operation, resource),
            MqlinkError::Usage { message } => write!(f, "usage error: {}", message),
        }
    }
}

impl StdError for MqlinkError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            MqlinkError::Transport(error) => Some(error),
            _ => None,
        }
    }
}

impl From<TransportError> for MqlinkError {
    fn from(error: TransportError) -> Self {
        MqlinkError::Transport(error)
    }
}
