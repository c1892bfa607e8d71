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

//! The application-facing connection.
//!
//! A [`Connection`] owns the transport chain, the dispatch engine and the
//! id generators everything below it derives from. It sits at the top of
//! the chain as its [`TransportListener`]: message dispatches go to the
//! [`Dispatcher`], transport failures go to the application's
//! [`ExceptionListener`], and destination advisories feed the
//! [`DestinationListener`].

use super::advisory;
use super::dispatcher::Dispatcher;
use super::session::{AckMode, Session, SessionCore};
use crate::commands::{
    Command, CommandPayload, ConnectionId, ConnectionIdGenerator, ConnectionInfo, ConsumerId,
    ConsumerInfo, Destination, RemoveInfo, Response, SequenceGenerator, SessionInfo,
};
use crate::error::MqlinkError;
use crate::transport::{Transport, TransportError, TransportListener, TransportRegistry};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default deadline for synchronous requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives connection-fatal failures.
///
/// Fired when the transport chain gives up: failover exhausted its
/// attempts, the broker shut the connection down, or the protocol
/// desynchronized. The connection is unusable afterwards.
pub trait ExceptionListener: Send + Sync {
    /// The connection failed.
    fn on_exception(&self, error: &MqlinkError);
}

/// Receives broker advisories about destinations appearing and
/// disappearing.
pub trait DestinationListener: Send + Sync {
    /// A destination was created on the broker.
    fn on_destination_added(&self, destination: &Destination) {
        let _ = destination;
    }
    /// A destination was removed from the broker.
    fn on_destination_removed(&self, destination: &Destination) {
        let _ = destination;
    }
}

/// Configures and opens a [`Connection`].
///
/// # Example
///
/// ```rust,no_run
/// use mqlink::core::ConnectionBuilder;
///
/// # async fn example() -> Result<(), mqlink::MqlinkError> {
/// let connection = ConnectionBuilder::new("tcp://broker:61616")
///     .client_id("inventory-worker")
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionBuilder {
    uri: String,
    client_id: Option<String>,
    request_timeout: Option<Duration>,
    registry: Option<Arc<TransportRegistry>>,
}

impl ConnectionBuilder {
    /// Starts a builder for the given transport URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: None,
            request_timeout: None,
            registry: None,
        }
    }

    /// Sets the client identity announced to the broker. Defaults to the
    /// generated connection id.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the deadline for synchronous requests. Defaults to the
    /// `requestTimeout` URI option, then 30 seconds.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Uses a custom scheme registry instead of the built-in defaults.
    #[must_use]
    pub fn registry(mut self, registry: Arc<TransportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the transport chain, connects, and announces the
    /// connection to the broker.
    ///
    /// # Errors
    ///
    /// Fails on unreachable brokers, negotiation timeouts, or a broker
    /// rejecting the connection.
    pub async fn connect(self) -> Result<Connection, MqlinkError> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(TransportRegistry::with_defaults()));
        let transport = registry.create(&self.uri).await?;

        let request_timeout = match self.request_timeout {
            Some(timeout) => timeout,
            None => crate::transport::TransportUri::parse(&self.uri)?
                .duration_option("requestTimeout", DEFAULT_REQUEST_TIMEOUT)?,
        };

        let connection_id = ConnectionIdGenerator::new().next();
        let client_id = self
            .client_id
            .unwrap_or_else(|| connection_id.value().to_string());

        let core = Arc::new(ConnectionCore {
            connection_id: connection_id.clone(),
            client_id: client_id.clone(),
            transport,
            dispatcher: Arc::new(Dispatcher::new()),
            request_timeout,
            session_seq: SequenceGenerator::new(),
            transaction_seq: SequenceGenerator::new(),
            exception_listener: RwLock::new(None),
            destination_listener: RwLock::new(None),
            sessions: Mutex::new(Vec::new()),
            advisory_consumer_id: connection_id.session_id(0).consumer_id(1),
            advisory_task: Mutex::new(None),
            closed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        });

        core.transport
            .set_listener(Arc::new(ConnectionListener {
                core: Arc::downgrade(&core),
            }));
        core.transport.start().await?;

        // The broker must accept the connection before anything else.
        if let Err(error) = core
            .request(CommandPayload::ConnectionInfo(ConnectionInfo {
                connection_id: connection_id.clone(),
                client_id: client_id.clone(),
            }))
            .await
        {
            let _ = core.transport.stop().await;
            return Err(error);
        }

        // The connection session (id 0) hosts connection-level consumers;
        // creating it through the normal path keeps failover replay
        // complete.
        core.oneway(CommandPayload::SessionInfo(SessionInfo {
            session_id: connection_id.session_id(0),
        }))
        .await?;
        core.oneway(CommandPayload::ConsumerInfo(ConsumerInfo {
            consumer_id: core.advisory_consumer_id.clone(),
            destination: Destination::topic(Destination::ADVISORY_TOPIC),
            selector: None,
            prefetch_size: 1000,
            no_local: false,
        }))
        .await?;
        let advisory_rx = core.dispatcher.register(core.advisory_consumer_id.clone());
        *core.advisory_task.lock() = Some(advisory::spawn(Arc::downgrade(&core), advisory_rx));

        info!(connection = %connection_id, client_id, "connection established");
        Ok(Connection { core })
    }
}

/// A live connection to a broker.
///
/// Dropping a connection does not tear it down; call
/// [`close`](Connection::close) for an orderly shutdown.
pub struct Connection {
    core: Arc<ConnectionCore>,
}

impl Connection {
    /// Creates a session with the given acknowledgment mode.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed or the broker is unreachable.
    pub async fn create_session(&self, ack_mode: AckMode) -> Result<Session, MqlinkError> {
        self.core.check_open("create_session")?;
        let session_id = self.core.connection_id.session_id(self.core.session_seq.next());
        let info = SessionInfo {
            session_id: session_id.clone(),
        };

        let session = SessionCore::new(info.clone(), ack_mode, self.core.clone());
        self.core.sessions.lock().push(Arc::downgrade(&session));

        self.core
            .oneway(CommandPayload::SessionInfo(info))
            .await?;
        if ack_mode == AckMode::Transacted {
            SessionCore::begin_transaction(&session).await?;
        }
        debug!(session = %session_id, ?ack_mode, "session created");
        Ok(Session::from_core(session))
    }

    /// Registers the listener for connection-fatal failures.
    pub fn set_exception_listener(&self, listener: Arc<dyn ExceptionListener>) {
        *self.core.exception_listener.write() = Some(listener);
    }

    /// Registers the listener for destination advisories.
    pub fn set_destination_listener(&self, listener: Arc<dyn DestinationListener>) {
        *self.core.destination_listener.write() = Some(listener);
    }

    /// The id this connection announced to the broker.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.core.connection_id
    }

    /// The client identity announced to the broker.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.core.client_id
    }

    /// Returns `true` while the transport chain can carry traffic.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.core.closed.load(Ordering::SeqCst)
            && !self.core.failed.load(Ordering::SeqCst)
            && self.core.transport.is_connected()
    }

    /// Closes the connection: sessions first, then an orderly goodbye to
    /// the broker, then the transport chain. Idempotent.
    ///
    /// Blocked `receive()` calls and pending requests return promptly
    /// with closed/failed errors.
    pub async fn close(&self) -> Result<(), MqlinkError> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(connection = %self.core.connection_id, "closing connection");

        let sessions: Vec<_> = self.core.sessions.lock().drain(..).collect();
        for session in sessions.iter().filter_map(Weak::upgrade) {
            if let Err(error) = SessionCore::close(&session).await {
                warn!(%error, "session close failed during connection close");
            }
        }

        if let Some(task) = self.core.advisory_task.lock().take() {
            task.abort();
        }
        self.core
            .dispatcher
            .unregister(&self.core.advisory_consumer_id);

        // Best-effort goodbye; the broker cleans up on socket close anyway.
        let _ = self
            .core
            .transport
            .oneway(Command::new(CommandPayload::RemoveInfo(
                RemoveInfo::Connection(self.core.connection_id.clone()),
            )))
            .await;
        let _ = self
            .core
            .transport
            .oneway(Command::new(CommandPayload::ShutdownInfo))
            .await;

        self.core.dispatcher.shutdown();
        self.core.transport.stop().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.core.connection_id)
            .field("client_id", &self.core.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Shared connection internals.
pub(crate) struct ConnectionCore {
    pub(crate) connection_id: ConnectionId,
    pub(crate) client_id: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) request_timeout: Duration,
    pub(crate) session_seq: SequenceGenerator,
    pub(crate) transaction_seq: SequenceGenerator,
    pub(crate) exception_listener: RwLock<Option<Arc<dyn ExceptionListener>>>,
    pub(crate) destination_listener: RwLock<Option<Arc<dyn DestinationListener>>>,
    sessions: Mutex<Vec<Weak<SessionCore>>>,
    advisory_consumer_id: ConsumerId,
    advisory_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    failed: AtomicBool,
}

impl ConnectionCore {
    /// Fails with a closed error if the connection can no longer be used.
    pub(crate) fn check_open(&self, operation: &str) -> Result<(), MqlinkError> {
        if self.closed.load(Ordering::SeqCst) || self.failed.load(Ordering::SeqCst) {
            return Err(MqlinkError::closed("connection", operation));
        }
        Ok(())
    }

    /// Sends a command without waiting.
    pub(crate) async fn oneway(&self, payload: CommandPayload) -> Result<(), MqlinkError> {
        self.transport
            .oneway(Command::new(payload))
            .await
            .map_err(MqlinkError::from)
    }

    /// Sends a command and waits for its response, converting broker
    /// exception responses into [`MqlinkError::Remote`].
    pub(crate) async fn request(&self, payload: CommandPayload) -> Result<Response, MqlinkError> {
        let response = self
            .transport
            .request(Command::new(payload), self.request_timeout)
            .await?;
        match response.error() {
            Some(error) => Err(MqlinkError::Remote {
                message: error.message.clone(),
                exception_class: error.exception_class.clone(),
            }),
            None => Ok(response),
        }
    }

    /// Handles a fatal transport failure: wake everything, tell the
    /// application.
    fn on_transport_failure(&self, error: TransportError) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(%error, connection = %self.connection_id, "connection failed");
        self.dispatcher.shutdown();
        let listener = self.exception_listener.read().clone();
        if let Some(listener) = listener {
            listener.on_exception(&MqlinkError::Transport(error));
        }
    }
}

impl std::fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// The connection's seat at the top of the transport chain.
struct ConnectionListener {
    core: Weak<ConnectionCore>,
}

impl TransportListener for ConnectionListener {
    fn on_command(&self, command: Command) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        match command.into_payload() {
            CommandPayload::MessageDispatch(dispatch) => core.dispatcher.dispatch(dispatch),
            CommandPayload::ShutdownInfo => {
                core.on_transport_failure(TransportError::ConnectionLost {
                    reason: "broker initiated shutdown".to_string(),
                    source: None,
                });
            }
            CommandPayload::KeepAliveInfo => {}
            other => {
                debug!(command = other.type_name(), "ignoring unexpected command");
            }
        }
    }

    fn on_exception(&self, error: TransportError) {
        if let Some(core) = self.core.upgrade() {
            core.on_transport_failure(error);
        }
    }

    fn transport_interrupted(&self) {
        if let Some(core) = self.core.upgrade() {
            info!(connection = %core.connection_id, "transport interrupted, failover in progress");
        }
    }

    fn transport_resumed(&self) {
        if let Some(core) = self.core.upgrade() {
            info!(connection = %core.connection_id, "transport resumed");
        }
    }
}
