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

//! TCP transport.
//!
//! Owns a connected socket split into halves: a dedicated read task
//! decodes commands through the shared [`WireFormat`] and feeds them to
//! the listener in wire order; writes are serialized under one async lock
//! so commands from concurrent senders reach the wire whole and in send
//! order.

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::Command;
use crate::wireformat::{ProtocolError, WireFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default connect deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport over a TCP socket.
pub struct TcpTransport {
    wire_format: Arc<dyn WireFormat>,
    remote: String,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    listener: Arc<ListenerSlot>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Connects to `address` with the default deadline.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the peer cannot be
    /// reached.
    pub async fn connect(
        address: impl Into<String>,
        wire_format: Arc<dyn WireFormat>,
    ) -> Result<Arc<Self>, TransportError> {
        Self::connect_timeout(address, wire_format, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connects to `address`, failing after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] on refusal and
    /// [`TransportError::Timeout`] if the deadline passes first.
    pub async fn connect_timeout(
        address: impl Into<String>,
        wire_format: Arc<dyn WireFormat>,
        timeout: Duration,
    ) -> Result<Arc<Self>, TransportError> {
        let address = address.into();
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::ConnectionFailed { address, source });
            }
            Err(_) => return Err(TransportError::Timeout { duration: timeout }),
        };
        stream.set_nodelay(true).map_err(|source| {
            TransportError::ConnectionFailed {
                address: address.clone(),
                source,
            }
        })?;
        info!(%address, "TCP connection established");
        Ok(Self::from_stream(stream, wire_format, address))
    }

    /// Wraps an already-connected stream. Used by tests and by servers
    /// handing off accepted sockets.
    #[must_use]
    pub fn from_stream(
        stream: TcpStream,
        wire_format: Arc<dyn WireFormat>,
        remote: String,
    ) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        Arc::new(Self {
            wire_format,
            remote,
            reader: Mutex::new(Some(BufReader::new(read_half))),
            writer: tokio::sync::Mutex::new(write_half),
            read_task: Mutex::new(None),
            listener: Arc::new(ListenerSlot::new()),
            connected: Arc::new(AtomicBool::new(true)),
            closed: AtomicBool::new(false),
        })
    }

    fn map_read_error(error: ProtocolError, remote: &str) -> TransportError {
        match error {
            ProtocolError::Io { source } => TransportError::ConnectionLost {
                reason: format!("read from {} failed", remote),
                source: Some(source),
            },
            other => TransportError::Protocol { source: other },
        }
    }

    fn map_write_error(error: ProtocolError) -> TransportError {
        match error {
            ProtocolError::Io { source } => TransportError::WriteFailed { source },
            other => TransportError::Protocol { source: other },
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let Some(mut reader) = self.reader.lock().take() else {
            return Ok(()); // already started
        };
        let wire_format = self.wire_format.clone();
        let listener = self.listener.clone();
        let connected = self.connected.clone();
        let remote = self.remote.clone();

        let task = tokio::spawn(async move {
            loop {
                match wire_format.read_command(&mut reader).await {
                    Ok(command) => {
                        // Inbound commands are delivered synchronously on
                        // this task, preserving wire order.
                        listener.on_command(command);
                    }
                    Err(error) => {
                        connected.store(false, Ordering::SeqCst);
                        debug!(%remote, %error, "read loop terminated");
                        listener.on_exception(TcpTransport::map_read_error(error, &remote));
                        break;
                    }
                }
            }
        });
        *self.read_task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.read_task.lock().take() {
            task.abort();
        }
        use tokio::io::AsyncWriteExt;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        debug!(remote = %self.remote, "TCP transport stopped");
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        // One writer at a time: frames must not interleave.
        let mut writer = self.writer.lock().await;
        self.wire_format
            .write_command(&command, &mut *writer)
            .await
            .map_err(Self::map_write_error)
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.listener.set(listener);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn remote_address(&self) -> String {
        format!("tcp://{}", self.remote)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote", &self.remote)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, CommandPayload, Response};
    use crate::wireformat::OpenWireFormat;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Arc<TcpTransport>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let wire_format = Arc::new(OpenWireFormat::new());
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let transport = TcpTransport::connect(address, wire_format)
            .await
            .unwrap();
        let peer = accept.await.unwrap();
        (transport, peer)
    }

    #[tokio::test]
    async fn test_write_reaches_peer_in_order() {
        let (transport, peer) = connected_pair().await;
        let wire_format = OpenWireFormat::new();

        let mut first = Command::new(CommandPayload::KeepAliveInfo);
        first.set_command_id(1);
        let mut second = Command::new(CommandPayload::ShutdownInfo);
        second.set_command_id(2);
        transport.oneway(first.clone()).await.unwrap();
        transport.oneway(second.clone()).await.unwrap();

        let mut reader = BufReader::new(peer);
        let decoded_first = wire_format.read_command(&mut reader).await.unwrap();
        let decoded_second = wire_format.read_command(&mut reader).await.unwrap();
        assert_eq!(decoded_first, first);
        assert_eq!(decoded_second, second);
    }

    #[tokio::test]
    async fn test_read_loop_delivers_to_listener() {
        let (transport, peer) = connected_pair().await;

        struct Sink(parking_lot::Mutex<Vec<Command>>);
        impl TransportListener for Sink {
            fn on_command(&self, command: Command) {
                self.0.lock().push(command);
            }
            fn on_exception(&self, _: TransportError) {}
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(Vec::new())));
        transport.set_listener(sink.clone());
        transport.start().await.unwrap();

        let wire_format = OpenWireFormat::new();
        let mut peer = peer;
        wire_format
            .write_command(&Response::ok(5).into_command(), &mut peer)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !sink.0.lock().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("command never delivered");
        assert!(sink.0.lock()[0].is_response());
    }

    #[tokio::test]
    async fn test_peer_close_raises_exception() {
        let (transport, peer) = connected_pair().await;

        struct Sink(parking_lot::Mutex<Option<String>>);
        impl TransportListener for Sink {
            fn on_command(&self, _: Command) {}
            fn on_exception(&self, error: TransportError) {
                *self.0.lock() = Some(error.to_string());
            }
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(None)));
        transport.set_listener(sink.clone());
        transport.start().await.unwrap();

        drop(peer);

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if sink.0.lock().is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("exception never raised");
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let wire_format: Arc<dyn crate::wireformat::WireFormat> = Arc::new(OpenWireFormat::new());
        // Bind-then-drop yields a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpTransport::connect(address, wire_format).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. }) | Err(TransportError::Timeout { .. })
        ));
    }
}
