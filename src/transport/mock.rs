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

//! In-memory transport for tests.
//!
//! The mock records every command "written to the wire" and can play the
//! broker's role through a scripted responder. Inbound traffic and
//! failures are injected explicitly, so tests drive the exact interleaving
//! they need:
//!
//! ```rust
//! use mqlink::transport::{MockTransport, Transport};
//! use mqlink::commands::{Command, CommandPayload};
//!
//! # async fn example() {
//! let mock = MockTransport::auto_responding("broker");
//! mock.start().await.unwrap();
//! mock.oneway(Command::new(CommandPayload::KeepAliveInfo)).await.unwrap();
//! assert_eq!(mock.sent().len(), 1);
//! # }
//! ```

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, CommandPayload, Response, WireFormatInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Broker behavior script: maps an outbound command to an optional reply.
pub type Responder = Box<dyn Fn(&Command) -> Option<Command> + Send + Sync>;

enum InboundEvent {
    Command(Command),
    Exception(String),
}

/// Command-level in-memory transport playing the broker side.
pub struct MockTransport {
    name: String,
    listener: Arc<ListenerSlot>,
    sent: Mutex<Vec<Command>>,
    responder: Mutex<Option<Responder>>,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// Creates a silent mock: commands are recorded, nothing answers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: name.into(),
            listener: Arc::new(ListenerSlot::new()),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            read_task: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(true)),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Creates a mock with a scripted broker behavior.
    #[must_use]
    pub fn with_responder(name: impl Into<String>, responder: Responder) -> Arc<Self> {
        let mock = Self::new(name);
        *mock.responder.lock() = Some(responder);
        mock
    }

    /// Creates a mock behaving like a well-behaved broker: every command
    /// requiring a response gets a plain success response, and wire-format
    /// info is answered with the peer's own info.
    #[must_use]
    pub fn auto_responding(name: impl Into<String>) -> Arc<Self> {
        Self::with_responder(
            name,
            Box::new(|command| {
                if command.is_wire_format_info() {
                    return Some(Command::new(CommandPayload::WireFormatInfo(
                        WireFormatInfo {
                            version: 1,
                            tight_encoding: true,
                            cache_enabled: true,
                            max_inactivity_duration_ms: 30_000,
                        },
                    )));
                }
                if command.response_required() {
                    return Some(Response::ok(command.command_id()).into_command());
                }
                None
            }),
        )
    }

    /// Snapshot of every command sent through this transport, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    /// Clears the recorded wire trace.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Feeds a command to the registered listener, as if read from the
    /// wire. Queued until [`start`](Transport::start) if injected early.
    pub fn inject_command(&self, command: Command) {
        let _ = self.inbound_tx.send(InboundEvent::Command(command));
    }

    /// Raises a transport failure on the read path.
    pub fn inject_exception(&self, reason: &str) {
        let _ = self
            .inbound_tx
            .send(InboundEvent::Exception(reason.to_string()));
    }

    /// Makes subsequent sends fail with a broken pipe, simulating an
    /// outage the sender discovers.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let Some(mut rx) = self.inbound_rx.lock().take() else {
            return Ok(()); // already started
        };
        let listener = self.listener.clone();
        let connected = self.connected.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    InboundEvent::Command(command) => listener.on_command(command),
                    InboundEvent::Exception(reason) => {
                        connected.store(false, Ordering::SeqCst);
                        listener.on_exception(TransportError::ConnectionLost {
                            reason,
                            source: None,
                        });
                    }
                }
            }
        });
        *self.read_task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "simulated outage"),
            });
        }
        self.sent.lock().push(command.clone());
        let reply = self
            .responder
            .lock()
            .as_ref()
            .and_then(|responder| responder(&command));
        if let Some(reply) = reply {
            let _ = self.inbound_tx.send(InboundEvent::Command(reply));
        }
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listener.set(listener);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_address(&self) -> String {
        format!("mock://{}", self.name)
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}
