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

//! Wire-format negotiation filter.
//!
//! On startup the negotiator sends the local [`WireFormatInfo`] and blocks
//! until the peer's arrives — a single-element rendezvous with a timeout
//! that fails the connection attempt if the peer never negotiates. The
//! agreed options (piecewise minimum/conjunction, see
//! [`WireFormatInfo::negotiate`]) are applied to the shared [`WireFormat`]
//! before any other traffic is let through.

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, CommandPayload, Response, WireFormatInfo};
use crate::wireformat::WireFormat;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Default window granted to the peer to answer negotiation.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Transport filter performing the wire-format handshake.
pub struct WireFormatNegotiator {
    next: Arc<dyn Transport>,
    wire_format: Arc<dyn WireFormat>,
    timeout: Duration,
    rendezvous: Mutex<Option<oneshot::Sender<WireFormatInfo>>>,
    negotiated: watch::Sender<bool>,
    listener: ListenerSlot,
}

impl WireFormatNegotiator {
    /// Wraps `next` with the default negotiation timeout.
    #[must_use]
    pub fn new(next: Arc<dyn Transport>, wire_format: Arc<dyn WireFormat>) -> Arc<Self> {
        Self::with_timeout(next, wire_format, DEFAULT_NEGOTIATION_TIMEOUT)
    }

    /// Wraps `next` with an explicit negotiation timeout.
    #[must_use]
    pub fn with_timeout(
        next: Arc<dyn Transport>,
        wire_format: Arc<dyn WireFormat>,
        timeout: Duration,
    ) -> Arc<Self> {
        let (negotiated, _) = watch::channel(false);
        let filter = Arc::new(Self {
            next,
            wire_format,
            timeout,
            rendezvous: Mutex::new(None),
            negotiated,
            listener: ListenerSlot::new(),
        });
        filter
            .next
            .set_listener(filter.clone() as Arc<dyn TransportListener>);
        filter
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub fn is_negotiated(&self) -> bool {
        *self.negotiated.borrow()
    }

    /// Suspends the caller until negotiation completes, bounded by the
    /// negotiation timeout.
    async fn await_negotiated(&self) -> Result<(), TransportError> {
        let mut watcher = self.negotiated.subscribe();
        if *watcher.borrow() {
            return Ok(());
        }
        let wait = async {
            loop {
                if watcher.changed().await.is_err() {
                    return false;
                }
                if *watcher.borrow() {
                    return true;
                }
            }
        };
        match tokio::time::timeout(self.timeout, wait).await {
            Ok(true) => Ok(()),
            _ => Err(TransportError::NegotiationFailed {
                reason: "traffic gated: wire format not negotiated".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transport for WireFormatNegotiator {
    async fn start(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        *self.rendezvous.lock() = Some(tx);

        // The read task must be running before the peer can answer.
        self.next.start().await?;

        let local = self.wire_format.preferred_wire_format_info();
        debug!(version = local.version, "sending wire format info");
        self.next
            .oneway(Command::new(CommandPayload::WireFormatInfo(local.clone())))
            .await?;

        let peer = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(peer)) => peer,
            Ok(Err(_)) => {
                return Err(TransportError::NegotiationFailed {
                    reason: "transport failed during negotiation".to_string(),
                })
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "wire format negotiation timed out");
                let _ = self.next.stop().await;
                return Err(TransportError::NegotiationFailed {
                    reason: format!("no wire format info received within {:?}", self.timeout),
                });
            }
        };

        let agreed = local.negotiate(&peer);
        debug!(
            version = agreed.version,
            tight_encoding = agreed.tight_encoding,
            max_inactivity_ms = agreed.max_inactivity_duration_ms,
            "wire format negotiated"
        );
        self.wire_format.configure(&agreed);
        self.negotiated.send_replace(true);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        // Drop a pending rendezvous so a concurrent start() fails fast.
        self.rendezvous.lock().take();
        self.next.stop().await
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        // Negotiation info bypasses the gate; everything else waits.
        if !command.is_wire_format_info() {
            self.await_negotiated().await?;
        }
        self.next.oneway(command).await
    }

    async fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        self.next.request(command, timeout).await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listener.set(listener);
    }

    fn is_connected(&self) -> bool {
        self.next.is_connected() && self.is_negotiated()
    }

    fn remote_address(&self) -> String {
        self.next.remote_address()
    }
}

impl TransportListener for WireFormatNegotiator {
    fn on_command(&self, command: Command) {
        if let CommandPayload::WireFormatInfo(info) = command.payload() {
            match self.rendezvous.lock().take() {
                Some(tx) => {
                    let _ = tx.send(info.clone());
                }
                None => debug!("dropping unexpected wire format info"),
            }
            // Consumed by the handshake, never forwarded upward.
            return;
        }
        self.listener.on_command(command);
    }

    fn on_exception(&self, error: TransportError) {
        // Failing the rendezvous unblocks a handshake in progress.
        self.rendezvous.lock().take();
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}

impl std::fmt::Debug for WireFormatNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFormatNegotiator")
            .field("negotiated", &self.is_negotiated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::wireformat::OpenWireFormat;

    #[tokio::test]
    async fn test_handshake_configures_wire_format() {
        let mock = MockTransport::auto_responding("broker");
        let wire_format = Arc::new(OpenWireFormat::new());
        let negotiator = WireFormatNegotiator::new(mock.clone(), wire_format.clone());

        negotiator.start().await.unwrap();

        assert!(negotiator.is_negotiated());
        // The mock peer proposes a 30s window and cache enabled; ours wins
        // where smaller, theirs where smaller.
        let agreed = wire_format.current_wire_format_info();
        assert_eq!(agreed.version, 1);
        assert!(!agreed.cache_enabled); // ours is false
        assert_eq!(agreed.max_inactivity_duration_ms, 30_000);
    }

    #[tokio::test]
    async fn test_handshake_timeout_fails_start() {
        let mock = MockTransport::new("silent-broker");
        let wire_format = Arc::new(OpenWireFormat::new());
        let negotiator =
            WireFormatNegotiator::with_timeout(mock, wire_format, Duration::from_millis(30));

        let result = negotiator.start().await;
        assert!(matches!(
            result,
            Err(TransportError::NegotiationFailed { .. })
        ));
        assert!(!negotiator.is_negotiated());
    }

    #[tokio::test]
    async fn test_traffic_gated_until_negotiated() {
        let mock = MockTransport::new("silent-broker");
        let wire_format = Arc::new(OpenWireFormat::new());
        let negotiator = WireFormatNegotiator::with_timeout(
            mock.clone(),
            wire_format,
            Duration::from_millis(30),
        );

        // Never started: the gate is closed and times out.
        let result = negotiator
            .oneway(Command::new(CommandPayload::KeepAliveInfo))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::NegotiationFailed { .. })
        ));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_info_not_forwarded_to_listener() {
        let mock = MockTransport::auto_responding("broker");
        let wire_format = Arc::new(OpenWireFormat::new());
        let negotiator = WireFormatNegotiator::new(mock.clone(), wire_format);

        struct Sink(parking_lot::Mutex<Vec<Command>>);
        impl TransportListener for Sink {
            fn on_command(&self, command: Command) {
                self.0.lock().push(command);
            }
            fn on_exception(&self, _: TransportError) {}
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(Vec::new())));
        negotiator.set_listener(sink.clone());
        negotiator.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.0.lock().is_empty());
    }
}
