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

//! The transport abstraction and its filter chain.
//!
//! A [`Transport`] exchanges [`Command`]s with a broker. Raw transports
//! ([`TcpTransport`], [`MockTransport`]) move commands over a byte stream or
//! an in-memory channel; filters wrap an inner transport and add behavior:
//!
//! - [`ResponseCorrelator`]: request/response matching by correlation id
//! - [`WireFormatNegotiator`]: option handshake before any other traffic
//! - [`InactivityMonitor`]: keepalives and dead-peer detection
//! - [`LoggingTransport`]: command tracing, pure pass-through
//! - [`FailoverTransport`]: reconnection across candidate brokers with
//!   state replay
//!
//! Filters compose by ownership: each filter holds its inner transport and
//! registers itself as the inner transport's listener, so inbound traffic
//! climbs the chain innermost to outermost:
//!
//! ```text
//! ResponseCorrelator(Logging(Failover(Negotiator(Inactivity(Tcp)))))
//! ```
//!
//! A chain is assembled from a URI by the [`TransportRegistry`].

mod correlator;
mod discovery;
mod error;
mod failover;
mod inactivity;
mod logging;
mod mock;
mod negotiator;
mod registry;
mod tcp;
mod uri;

pub use correlator::{CommandIdGenerator, ResponseCorrelator};
pub use negotiator::{WireFormatNegotiator, DEFAULT_NEGOTIATION_TIMEOUT};
pub use discovery::{DiscoveryAgent, DiscoveryEvent, DiscoveryListener, StaticDiscoveryAgent};
pub use error::TransportError;
pub use failover::{FailoverConfig, FailoverTransport, ReconnectBackoff, UriPool};
pub use inactivity::InactivityMonitor;
pub use logging::LoggingTransport;
pub use mock::{MockTransport, Responder};
pub use registry::{MockConnector, TcpConnector, TransportConnector, TransportRegistry};
pub use tcp::TcpTransport;
pub use uri::TransportUri;

use crate::commands::{Command, Response};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Command-level abstraction over a broker connection.
///
/// Outbound calls flow outermost to innermost through the filter chain;
/// inbound commands are delivered to the registered [`TransportListener`]
/// on the transport's read task.
///
/// Per-transport ordering: commands handed to [`oneway`](Self::oneway) or
/// [`request`](Self::request) by a single task reach the wire in call
/// order; concurrent senders are serialized by the transport's write lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts the transport: spawns the read task and, for filters,
    /// performs any startup handshake. The listener must be registered
    /// before this is called.
    async fn start(&self) -> Result<(), TransportError>;

    /// Stops the transport. Pending requests are failed, not abandoned.
    /// Idempotent.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Sends a command without waiting for an answer.
    async fn oneway(&self, command: Command) -> Result<(), TransportError>;

    /// Sends a command and waits for the matching [`Response`].
    ///
    /// Only available on chains containing a [`ResponseCorrelator`]; other
    /// layers report [`TransportError::RequestsUnsupported`].
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] if no response arrives in time; a late
    /// response is then dropped, never delivered twice.
    async fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let _ = (command, timeout);
        Err(TransportError::RequestsUnsupported)
    }

    /// Registers the listener receiving inbound commands and events.
    /// Exactly one listener is active; registering replaces the previous
    /// one.
    fn set_listener(&self, listener: Arc<dyn TransportListener>);

    /// Returns `true` while the transport can carry traffic.
    fn is_connected(&self) -> bool;

    /// Human-readable remote endpoint description, for logs.
    fn remote_address(&self) -> String;
}

/// Receives inbound traffic and lifecycle events from a [`Transport`].
///
/// Callbacks run on the transport's read task and must not block; anything
/// slow belongs on a dedicated task downstream.
pub trait TransportListener: Send + Sync {
    /// An inbound command arrived.
    fn on_command(&self, command: Command);

    /// The transport failed. The transport is unusable afterwards unless a
    /// failover layer above replaces it.
    fn on_exception(&self, error: TransportError);

    /// The underlying connection dropped; a failover layer is attempting
    /// to reconnect. Outbound calls will stall until resumed.
    fn transport_interrupted(&self) {}

    /// The connection was reestablished and broker-side state replayed.
    fn transport_resumed(&self) {}
}

/// Holder for the registered listener of a transport or filter.
///
/// Forwarding through an empty slot drops the event with a trace log;
/// that only happens before wiring completes or during teardown.
pub(crate) struct ListenerSlot {
    listener: RwLock<Option<Arc<dyn TransportListener>>>,
}

impl ListenerSlot {
    pub(crate) fn new() -> Self {
        Self {
            listener: RwLock::new(None),
        }
    }

    pub(crate) fn set(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.write() = Some(listener);
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.read().clone()
    }

    pub(crate) fn on_command(&self, command: Command) {
        match self.get() {
            Some(listener) => listener.on_command(command),
            None => tracing::trace!("no listener registered, dropping inbound command"),
        }
    }

    pub(crate) fn on_exception(&self, error: TransportError) {
        match self.get() {
            Some(listener) => listener.on_exception(error),
            None => tracing::trace!(%error, "no listener registered, dropping exception"),
        }
    }

    pub(crate) fn transport_interrupted(&self) {
        if let Some(listener) = self.get() {
            listener.transport_interrupted();
        }
    }

    pub(crate) fn transport_resumed(&self) {
        if let Some(listener) = self.get() {
            listener.transport_resumed();
        }
    }
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("registered", &self.get().is_some())
            .finish()
    }
}
