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

//! Scheme registry and chain assembly.
//!
//! The registry maps URI schemes to [`TransportConnector`]s and builds the
//! filter chain a URI asks for. It is an explicit object — constructed
//! once, passed by reference to whatever resolves URIs — rather than a
//! process-global table, so embedders can register custom schemes without
//! hidden shared state.
//!
//! Chain shape, outermost first:
//!
//! ```text
//! ResponseCorrelator → [Logging] → [Failover →] Negotiator → Inactivity → Tcp
//! ```
//!
//! The correlator is always outermost so `request()` works uniformly; the
//! per-broker chain (negotiation, inactivity) is rebuilt from scratch on
//! every failover attempt because wire-format options are negotiated per
//! connection.

use super::failover::{FailoverConfig, FailoverTransport};
use super::uri::TransportUri;
use super::{
    InactivityMonitor, LoggingTransport, MockTransport, ResponseCorrelator, TcpTransport,
    Transport, TransportError, WireFormatNegotiator,
};
use crate::commands::WireFormatInfo;
use crate::wireformat::{OpenWireFormat, StompWireFormat, WireFormat};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Connects a single URI to a ready-to-start transport.
///
/// Implementations own the whole per-broker chain: the failover layer
/// calls [`connect`](Self::connect) afresh for every attempt and expects
/// negotiation and inactivity filters to come back already wired.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Builds and connects a transport for `uri`.
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Maps URI schemes to connectors and assembles filter chains.
pub struct TransportRegistry {
    schemes: RwLock<HashMap<String, Arc<dyn TransportConnector>>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemes: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry with the built-in schemes: `tcp` and `mock`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("tcp", Arc::new(TcpConnector));
        registry.register("mock", Arc::new(MockConnector));
        registry
    }

    /// Registers (or replaces) the connector for a scheme.
    pub fn register(&self, scheme: &str, connector: Arc<dyn TransportConnector>) {
        self.schemes.write().insert(scheme.to_string(), connector);
    }

    /// Builds the full transport chain for `raw`.
    ///
    /// Non-failover URIs connect immediately; `failover:` URIs connect
    /// during [`start`](Transport::start). Either way the returned
    /// transport still needs a listener and a `start()` call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] for malformed URIs or
    /// unknown schemes, and connection errors for unreachable brokers.
    pub async fn create(
        self: &Arc<Self>,
        raw: &str,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let uri = TransportUri::parse(raw)?;

        let transport: Arc<dyn Transport> = if uri.scheme() == "failover" {
            let config = FailoverConfig::from_uri(&uri)?;
            let connector = Arc::new(RegistryConnector {
                registry: self.clone(),
            });
            FailoverTransport::new(connector, uri.composite().to_vec(), config)
        } else {
            self.connect_scheme(&uri).await?
        };

        let transport: Arc<dyn Transport> = if uri.bool_option("trace", false)? {
            LoggingTransport::new(transport)
        } else {
            transport
        };

        Ok(ResponseCorrelator::new(transport))
    }

    /// Connects one non-composite URI through its scheme connector.
    pub(crate) async fn connect_scheme(
        &self,
        uri: &TransportUri,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let connector = self.schemes.read().get(uri.scheme()).cloned();
        match connector {
            Some(connector) => connector.connect(uri).await,
            None => Err(TransportError::InvalidUri {
                uri: uri.as_str().to_string(),
                reason: format!("unknown transport scheme {:?}", uri.scheme()),
            }),
        }
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Dispatches failover candidates back through the owning registry.
struct RegistryConnector {
    registry: Arc<TransportRegistry>,
}

#[async_trait]
impl TransportConnector for RegistryConnector {
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError> {
        self.registry.connect_scheme(uri).await
    }
}

/// Builds the TCP chain: socket, inactivity monitor, negotiator.
pub struct TcpConnector;

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError> {
        let connect_timeout =
            uri.duration_option("connectTimeout", super::tcp::DEFAULT_CONNECT_TIMEOUT)?;

        match uri.option("wireFormat").unwrap_or("openwire") {
            "openwire" => {
                let preferred = WireFormatInfo {
                    version: crate::wireformat::OPENWIRE_VERSION,
                    tight_encoding: true,
                    cache_enabled: false,
                    max_inactivity_duration_ms: uri.u64_option(
                        "maxInactivityDuration",
                        crate::wireformat::DEFAULT_MAX_INACTIVITY_MS,
                    )?,
                };
                let wire_format: Arc<dyn WireFormat> =
                    Arc::new(OpenWireFormat::with_preferred(preferred));
                let tcp =
                    TcpTransport::connect_timeout(uri.address(), wire_format.clone(), connect_timeout)
                        .await?;
                let monitored = InactivityMonitor::new(tcp, wire_format.clone());
                let negotiation_window = uri
                    .duration_option("soTimeout", super::negotiator::DEFAULT_NEGOTIATION_TIMEOUT)?;
                Ok(WireFormatNegotiator::with_timeout(
                    monitored,
                    wire_format,
                    negotiation_window,
                ) as Arc<dyn Transport>)
            }
            "stomp" => {
                // STOMP has no option negotiation and carries its own
                // heartbeat convention; the chain is just the socket.
                let wire_format: Arc<dyn WireFormat> = Arc::new(StompWireFormat::new());
                let tcp =
                    TcpTransport::connect_timeout(uri.address(), wire_format, connect_timeout)
                        .await?;
                Ok(tcp as Arc<dyn Transport>)
            }
            other => Err(TransportError::InvalidUri {
                uri: uri.as_str().to_string(),
                reason: format!("unknown wire format {:?}", other),
            }),
        }
    }
}

/// Builds auto-responding in-memory transports for `mock://` URIs.
///
/// Meant for tests and demos: the "broker" acknowledges everything.
pub struct MockConnector;

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(MockTransport::auto_responding(uri.address()) as Arc<dyn Transport>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, CommandPayload};

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let registry = Arc::new(TransportRegistry::with_defaults());
        let result = registry.create("ssl://broker:61617").await;
        assert!(matches!(result, Err(TransportError::InvalidUri { .. })));
    }

    #[tokio::test]
    async fn test_mock_chain_supports_request() {
        let registry = Arc::new(TransportRegistry::with_defaults());
        let transport = registry.create("mock://broker").await.unwrap();
        transport.start().await.unwrap();

        let response = transport
            .request(
                Command::new(CommandPayload::KeepAliveInfo),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(response.correlation_id(), 1);
        transport.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failover_over_mock_scheme() {
        let registry = Arc::new(TransportRegistry::with_defaults());
        let transport = registry
            .create("failover:(mock://a,mock://b)?randomize=false&initialReconnectDelay=5")
            .await
            .unwrap();
        transport.start().await.unwrap();
        assert!(transport.is_connected());
        transport.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_scheme_registration() {
        struct Fixed(Arc<MockTransport>);
        #[async_trait]
        impl TransportConnector for Fixed {
            async fn connect(
                &self,
                _uri: &TransportUri,
            ) -> Result<Arc<dyn Transport>, TransportError> {
                Ok(self.0.clone())
            }
        }

        let mock = MockTransport::new("fixed");
        let registry = Arc::new(TransportRegistry::new());
        registry.register("fixed", Arc::new(Fixed(mock.clone())));

        let transport = registry.create("fixed://anything").await.unwrap();
        transport
            .oneway(Command::new(CommandPayload::KeepAliveInfo))
            .await
            .unwrap();
        assert_eq!(mock.sent().len(), 1);
    }
}
