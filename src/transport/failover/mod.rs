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

//! Failover transport.
//!
//! Maintains a pool of candidate brokers and keeps exactly one inner
//! transport connected. When the inner transport fails, outbound calls
//! stall, `transport_interrupted` fires, and a background task cycles the
//! candidates with jittered exponential backoff. After reconnecting it
//! replays the tracked state tree (connection, sessions, consumers,
//! producers, open transactions — in creation order) through the new
//! transport before announcing `transport_resumed`; replay failure counts
//! as a failed attempt. Exhausting the attempt limit surfaces a fatal
//! exception to the listener.

mod backoff;
mod uris;

pub use backoff::ReconnectBackoff;
pub use uris::UriPool;

use super::registry::TransportConnector;
use super::uri::TransportUri;
use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, Response};
use crate::state::ConnectionStateTracker;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Failover policy knobs, parsed from the composite URI options.
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Delay before the first reconnect round.
    pub initial_reconnect_delay: Duration,
    /// Cap on the delay between rounds.
    pub max_reconnect_delay: Duration,
    /// Grow delays exponentially between rounds.
    pub use_exponential_backoff: bool,
    /// Exponential growth factor.
    pub backoff_multiplier: f64,
    /// Give up after this many rounds once connected before;
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Give up after this many rounds if never connected;
    /// `None` falls back to `max_reconnect_attempts`.
    pub startup_max_reconnect_attempts: Option<u32>,
    /// Shuffle candidates each round.
    pub randomize: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            max_reconnect_attempts: None,
            startup_max_reconnect_attempts: None,
            randomize: true,
        }
    }
}

impl FailoverConfig {
    /// Reads the policy from a `failover:` URI's options. Attempt counts
    /// of zero mean unlimited, matching the documented option contract.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] on malformed option values.
    pub fn from_uri(uri: &TransportUri) -> Result<Self, TransportError> {
        let defaults = Self::default();
        let attempts = |raw: u64| if raw == 0 { None } else { Some(raw as u32) };
        Ok(Self {
            initial_reconnect_delay: uri
                .duration_option("initialReconnectDelay", defaults.initial_reconnect_delay)?,
            max_reconnect_delay: uri
                .duration_option("maxReconnectDelay", defaults.max_reconnect_delay)?,
            use_exponential_backoff: uri.bool_option("useExponentialBackOff", true)?,
            backoff_multiplier: uri.f64_option("backOffMultiplier", 2.0)?,
            max_reconnect_attempts: attempts(uri.u64_option("maxReconnectAttempts", 0)?),
            startup_max_reconnect_attempts: attempts(
                uri.u64_option("startupMaxReconnectAttempts", 0)?,
            ),
            randomize: uri.bool_option("randomize", true)?,
        })
    }

    fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(self.initial_reconnect_delay, self.max_reconnect_delay)
            .multiplier(self.backoff_multiplier)
            .exponential(self.use_exponential_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Connected,
    Failed,
}

/// Transport filter providing transparent reconnection and state replay.
pub struct FailoverTransport {
    connector: Arc<dyn TransportConnector>,
    pool: Arc<UriPool>,
    config: FailoverConfig,
    backoff: ReconnectBackoff,
    tracker: Arc<ConnectionStateTracker>,
    listener: ListenerSlot,
    inner: RwLock<Option<Arc<dyn Transport>>>,
    link: watch::Sender<LinkState>,
    reconnect: Arc<Notify>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
    ever_connected: AtomicBool,
    weak: Weak<Self>,
}

impl FailoverTransport {
    /// Creates a failover transport over `candidates`, connecting through
    /// `connector`.
    #[must_use]
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        candidates: Vec<TransportUri>,
        config: FailoverConfig,
    ) -> Arc<Self> {
        let pool = Arc::new(UriPool::new(candidates, config.randomize));
        let (link, _) = watch::channel(LinkState::Disconnected);
        Arc::new_cyclic(|weak| Self {
            connector,
            backoff: config.backoff(),
            pool,
            config,
            tracker: Arc::new(ConnectionStateTracker::new()),
            listener: ListenerSlot::new(),
            inner: RwLock::new(None),
            link,
            reconnect: Arc::new(Notify::new()),
            reconnect_task: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            weak: weak.clone(),
        })
    }

    /// The state registry replayed after every reconnect.
    #[must_use]
    pub fn state_tracker(&self) -> Arc<ConnectionStateTracker> {
        self.tracker.clone()
    }

    /// The candidate pool; a discovery agent's listener target.
    #[must_use]
    pub fn uri_pool(&self) -> Arc<UriPool> {
        self.pool.clone()
    }

    /// Wires a discovery agent into the candidate pool and starts it:
    /// discovered brokers join the pool, withdrawn ones leave it.
    ///
    /// # Errors
    ///
    /// Propagates the agent's start failure.
    pub async fn attach_discovery_agent(
        &self,
        agent: Arc<dyn super::DiscoveryAgent>,
    ) -> Result<(), TransportError> {
        agent.set_listener(self.pool.clone() as Arc<dyn super::DiscoveryListener>);
        agent.start().await
    }

    /// Suspends until the link is usable, the policy gave up, or the
    /// transport closed.
    async fn await_connected(&self) -> Result<(), TransportError> {
        let mut link = self.link.subscribe();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            match *link.borrow() {
                LinkState::Connected => return Ok(()),
                LinkState::Failed => {
                    return Err(TransportError::ConnectionLost {
                        reason: "failover exhausted reconnect attempts".to_string(),
                        source: None,
                    })
                }
                LinkState::Disconnected => {}
            }
            if link.changed().await.is_err() {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Reacts to an inner transport failure: tear it down, stall outbound
    /// traffic, wake the reconnect loop.
    fn handle_failure(&self, error: &TransportError) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let was_connected = {
            let mut inner = self.inner.write();
            let old = inner.take();
            if let Some(old) = old {
                tokio::spawn(async move {
                    let _ = old.stop().await;
                });
            }
            self.link.send_replace(LinkState::Disconnected) == LinkState::Connected
        };
        if was_connected {
            warn!(%error, "transport failed, beginning failover");
            self.listener.transport_interrupted();
            self.reconnect.notify_one();
        }
    }

    /// One connection attempt against a single candidate.
    async fn try_connect(self: &Arc<Self>, uri: &TransportUri) -> Result<(), TransportError> {
        debug!(uri = %uri, "attempting broker connection");
        let transport = self.connector.connect(uri).await?;
        transport.set_listener(self.clone() as Arc<dyn TransportListener>);
        if let Err(error) = transport.start().await {
            let _ = transport.stop().await;
            return Err(error);
        }
        // Replay is all-or-nothing: a half-restored broker is treated as
        // a failed attempt, never exposed to the application.
        if let Err(error) = self.tracker.restore(&transport).await {
            let _ = transport.stop().await;
            return Err(error);
        }
        *self.inner.write() = Some(transport);
        let reconnected = self.ever_connected.swap(true, Ordering::SeqCst);
        self.link.send_replace(LinkState::Connected);
        info!(uri = %uri, reconnected, "broker connection established");
        if reconnected {
            self.listener.transport_resumed();
        }
        Ok(())
    }

    fn attempt_limit(&self) -> Option<u32> {
        if self.ever_connected.load(Ordering::SeqCst) {
            self.config.max_reconnect_attempts
        } else {
            self.config
                .startup_max_reconnect_attempts
                .or(self.config.max_reconnect_attempts)
        }
    }

    async fn reconnect_loop(weak: Weak<Self>, reconnect: Arc<Notify>) {
        let mut round: u32 = 0;
        loop {
            let Some(this) = weak.upgrade() else { break };
            if this.closed.load(Ordering::SeqCst) {
                break;
            }
            if *this.link.borrow() == LinkState::Connected {
                round = 0;
                drop(this);
                reconnect.notified().await;
                continue;
            }

            let candidates = this.pool.candidates();
            let mut connected = false;
            for uri in &candidates {
                if this.closed.load(Ordering::SeqCst) {
                    return;
                }
                match this.try_connect(uri).await {
                    Ok(()) => {
                        connected = true;
                        break;
                    }
                    Err(failure) => {
                        debug!(uri = %uri, %failure, "candidate unavailable");
                    }
                }
            }
            if connected {
                round = 0;
                continue;
            }

            round += 1;
            if let Some(limit) = this.attempt_limit() {
                if round >= limit {
                    error!(rounds = round, "failover exhausted reconnect attempts");
                    this.link.send_replace(LinkState::Failed);
                    this.listener.on_exception(TransportError::ConnectionLost {
                        reason: format!("unable to reach any broker after {} attempts", round),
                        source: None,
                    });
                    break;
                }
            }
            let delay = this.backoff.delay_for(round - 1);
            debug!(round, delay = ?delay, "waiting before next reconnect round");
            drop(this);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for FailoverTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let task = tokio::spawn(Self::reconnect_loop(
            self.weak.clone(),
            self.reconnect.clone(),
        ));
        *self.reconnect_task.lock() = Some(task);
        // Start is complete only once the first broker is reachable (or
        // the startup policy gave up).
        self.await_connected().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.link.send_replace(LinkState::Failed);
        self.reconnect.notify_one();
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
        let inner = self.inner.write().take();
        if let Some(inner) = inner {
            inner.stop().await?;
        }
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        // Registration precedes the wire send: a failure below still
        // leaves the resource marked as "should exist" for replay.
        self.tracker.track(&command);
        loop {
            self.await_connected().await?;
            let Some(transport) = self.inner.read().clone() else {
                continue;
            };
            match transport.oneway(command.clone()).await {
                Ok(()) => return Ok(()),
                // A failed write means the socket died under us: stall and
                // retry on the replacement. Codec errors are not retried —
                // resending the same command cannot help.
                Err(failure)
                    if failure.is_recoverable()
                        || matches!(failure, TransportError::WriteFailed { .. }) =>
                {
                    self.handle_failure(&failure);
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    async fn request(
        &self,
        _command: Command,
        _timeout: Duration,
    ) -> Result<Response, TransportError> {
        // The correlator sits above this filter; a request reaching the
        // failover layer directly is a chain-assembly bug.
        Err(TransportError::RequestsUnsupported)
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listener.set(listener);
    }

    fn is_connected(&self) -> bool {
        *self.link.borrow() == LinkState::Connected
    }

    fn remote_address(&self) -> String {
        match self.inner.read().as_ref() {
            Some(inner) => inner.remote_address(),
            None => "failover:(disconnected)".to_string(),
        }
    }
}

impl TransportListener for FailoverTransport {
    fn on_command(&self, command: Command) {
        self.listener.on_command(command);
    }

    fn on_exception(&self, error: TransportError) {
        // Inner failures are failover's business; only exhausted retries
        // ever reach the application.
        self.handle_failure(&error);
    }

    fn transport_interrupted(&self) {}

    fn transport_resumed(&self) {}
}

impl std::fmt::Debug for FailoverTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverTransport")
            .field("state", &*self.link.borrow())
            .field("candidates", &self.pool.len())
            .finish()
    }
}
