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

//! Response correlation: synchronous-looking request/response over an
//! asynchronous, multiplexed transport.
//!
//! Every outbound command gets a process-unique, monotonically increasing
//! command id before it reaches the wire. A `request()` registers a
//! single-assignment completion slot under that id, sends, and suspends
//! the caller; when the matching [`Response`] arrives on the read task the
//! slot is fulfilled exactly once and removed. Late responses — after a
//! timeout deregistered the slot — are dropped, not an error.
//!
//! Once the transport fails, a latched error fails all pending slots and
//! every later request immediately: no caller is ever left blocked.

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, CommandPayload, Response};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Generates the per-connection command id sequence.
///
/// Ids start at 1 and increase monotonically; id 0 marks commands that
/// never expect correlation. The u32 space is large enough that an id
/// cannot wrap around while its request is still pending under any
/// reasonable connection lifetime; a debug assertion in the correlator
/// backs that up.
#[derive(Debug)]
pub struct CommandIdGenerator {
    next_id: AtomicU32,
}

impl CommandIdGenerator {
    /// Creates a generator starting at id 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }

    /// Returns the next command id.
    #[must_use]
    pub fn next(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CommandIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

type CompletionSlot = oneshot::Sender<Result<Response, TransportError>>;

/// Pending request map plus the error latch.
///
/// One lock covers both: a request must observe either "no prior error,
/// slot registered" or "prior error, fail fast" — never a torn state
/// where a slot is registered after the map was flushed.
#[derive(Default)]
struct CorrelatorState {
    pending: HashMap<u32, CompletionSlot>,
    prior_error: Option<String>,
}

/// Transport filter matching responses to requests by correlation id.
///
/// Place it outermost in the chain (above failover), so replayed and
/// retried traffic gets correlated exactly like first-attempt traffic.
pub struct ResponseCorrelator {
    next: Arc<dyn Transport>,
    ids: CommandIdGenerator,
    state: Mutex<CorrelatorState>,
    listener: ListenerSlot,
}

impl ResponseCorrelator {
    /// Wraps `next`, registering this filter as its listener.
    #[must_use]
    pub fn new(next: Arc<dyn Transport>) -> Arc<Self> {
        let correlator = Arc::new(Self {
            next,
            ids: CommandIdGenerator::new(),
            state: Mutex::new(CorrelatorState::default()),
            listener: ListenerSlot::new(),
        });
        correlator
            .next
            .set_listener(correlator.clone() as Arc<dyn TransportListener>);
        correlator
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Registers a completion slot for `command_id`.
    ///
    /// Fails immediately if the transport already failed.
    fn register(
        &self,
        command_id: u32,
    ) -> Result<oneshot::Receiver<Result<Response, TransportError>>, TransportError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if let Some(reason) = &state.prior_error {
            return Err(TransportError::ConnectionLost {
                reason: reason.clone(),
                source: None,
            });
        }
        debug_assert!(
            !state.pending.contains_key(&command_id),
            "command id {} reused while still pending",
            command_id
        );
        state.pending.insert(command_id, tx);
        Ok(rx)
    }

    /// Removes the slot for `command_id`, if it is still registered.
    fn deregister(&self, command_id: u32) {
        self.state.lock().pending.remove(&command_id);
    }

    /// Latches `error` and fails every pending request with it.
    ///
    /// Only the first call latches; later calls are no-ops.
    fn dispose(&self, error: &TransportError) {
        let flushed: Vec<CompletionSlot> = {
            let mut state = self.state.lock();
            if state.prior_error.is_some() {
                return;
            }
            state.prior_error = Some(error.to_string());
            state.pending.drain().map(|(_, slot)| slot).collect()
        };
        if !flushed.is_empty() {
            tracing::debug!(
                pending = flushed.len(),
                %error,
                "failing pending requests"
            );
            for slot in flushed {
                let _ = slot.send(Err(error.replicate()));
            }
        }
    }
}

#[async_trait]
impl Transport for ResponseCorrelator {
    async fn start(&self) -> Result<(), TransportError> {
        self.next.start().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.dispose(&TransportError::Closed);
        self.next.stop().await
    }

    async fn oneway(&self, mut command: Command) -> Result<(), TransportError> {
        command.set_command_id(self.ids.next());
        command.set_response_required(false);
        self.next.oneway(command).await
    }

    async fn request(
        &self,
        mut command: Command,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let command_id = self.ids.next();
        command.set_command_id(command_id);
        command.set_response_required(true);

        let receiver = self.register(command_id)?;

        if let Err(error) = self.next.oneway(command).await {
            // The slot must not outlive a failed send.
            self.deregister(command_id);
            return Err(error);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::ConnectionLost {
                reason: "correlator dropped pending request".to_string(),
                source: None,
            }),
            Err(_) => {
                // Deregister before surfacing the timeout so a late
                // response cannot complete a caller that has moved on.
                self.deregister(command_id);
                Err(TransportError::Timeout { duration: timeout })
            }
        }
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listener.set(listener);
    }

    fn is_connected(&self) -> bool {
        self.next.is_connected()
    }

    fn remote_address(&self) -> String {
        self.next.remote_address()
    }
}

impl TransportListener for ResponseCorrelator {
    fn on_command(&self, command: Command) {
        if !command.is_response() {
            self.listener.on_command(command);
            return;
        }
        let response = match command.into_payload() {
            CommandPayload::Response(response) => response,
            _ => unreachable!("is_response guarantees a response payload"),
        };
        let slot = self.state.lock().pending.remove(&response.correlation_id());
        match slot {
            Some(slot) => {
                let _ = slot.send(Ok(response));
            }
            None => {
                tracing::debug!(
                    correlation_id = response.correlation_id(),
                    "dropping late or unknown response"
                );
            }
        }
    }

    fn on_exception(&self, error: TransportError) {
        self.dispose(&error);
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        // Reconnection policy belongs to the failover layer below; pending
        // requests stay registered and either complete after replay or
        // time out.
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}

impl std::fmt::Debug for ResponseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCorrelator")
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn keepalive() -> Command {
        Command::new(CommandPayload::KeepAliveInfo)
    }

    #[test]
    fn test_id_generator_starts_at_one() {
        let ids = CommandIdGenerator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[tokio::test]
    async fn test_oneway_assigns_increasing_ids() {
        let mock = MockTransport::new("broker");
        let correlator = ResponseCorrelator::new(mock.clone());

        correlator.oneway(keepalive()).await.unwrap();
        correlator.oneway(keepalive()).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent[0].command_id(), 1);
        assert_eq!(sent[1].command_id(), 2);
        assert!(!sent[0].response_required());
    }

    #[tokio::test]
    async fn test_request_receives_matching_response() {
        let mock = MockTransport::auto_responding("broker");
        let correlator = ResponseCorrelator::new(mock.clone());
        correlator.start().await.unwrap();

        let response = correlator
            .request(keepalive(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.correlation_id(), 1);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_correlate() {
        let mock = MockTransport::auto_responding("broker");
        let correlator = ResponseCorrelator::new(mock.clone());
        correlator.start().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let correlator = correlator.clone();
            handles.push(tokio::spawn(async move {
                correlator
                    .request(keepalive(), Duration::from_secs(1))
                    .await
                    .unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let response = handle.await.unwrap();
            assert!(seen.insert(response.correlation_id()));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_slot_and_drops_late_response() {
        let mock = MockTransport::new("broker"); // never responds
        let correlator = ResponseCorrelator::new(mock.clone());
        correlator.start().await.unwrap();

        let result = correlator
            .request(keepalive(), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert_eq!(correlator.pending_count(), 0);

        // A late response for the deregistered id is dropped silently.
        mock.inject_command(Response::ok(1).into_command());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_exception_fails_pending_and_later_requests() {
        let mock = MockTransport::new("broker");
        let correlator = ResponseCorrelator::new(mock.clone());
        correlator.start().await.unwrap();

        let pending = {
            let correlator = correlator.clone();
            tokio::spawn(
                async move { correlator.request(keepalive(), Duration::from_secs(5)).await },
            )
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(correlator.pending_count(), 1);

        mock.inject_exception("broker went away");
        let result = pending.await.unwrap();
        assert!(matches!(
            result,
            Err(TransportError::ConnectionLost { .. })
        ));

        // The latched error fails later requests without touching the wire.
        let result = correlator
            .request(keepalive(), Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionLost { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_response_commands_pass_through() {
        let mock = MockTransport::new("broker");
        let correlator = ResponseCorrelator::new(mock.clone());

        struct Sink(parking_lot::Mutex<Vec<Command>>);
        impl TransportListener for Sink {
            fn on_command(&self, command: Command) {
                self.0.lock().push(command);
            }
            fn on_exception(&self, _: TransportError) {}
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(Vec::new())));
        correlator.set_listener(sink.clone());
        correlator.start().await.unwrap();

        mock.inject_command(keepalive());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.0.lock().len(), 1);
    }
}
