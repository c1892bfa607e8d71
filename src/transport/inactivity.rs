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

//! Inactivity monitoring filter.
//!
//! Tracks the last instants the transport read and wrote. If nothing has
//! been written for half the negotiated window, a keepalive goes out so
//! the peer sees a live connection; if nothing has been read for the full
//! window, the peer is declared dead and a transport exception is raised,
//! which the failover layer above turns into a reconnect.
//!
//! The window is read from the shared wire format on every check, so the
//! monitor picks up the negotiated value without re-wiring. A window of
//! zero disables monitoring entirely.

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, CommandPayload, Response};
use crate::wireformat::WireFormat;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Transport filter sending keepalives and detecting dead peers.
pub struct InactivityMonitor {
    next: Arc<dyn Transport>,
    wire_format: Arc<dyn WireFormat>,
    last_read: Mutex<Instant>,
    last_write: Mutex<Instant>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    listener: ListenerSlot,
    weak: Weak<Self>,
}

impl InactivityMonitor {
    /// Wraps `next`, registering this filter as its listener.
    #[must_use]
    pub fn new(next: Arc<dyn Transport>, wire_format: Arc<dyn WireFormat>) -> Arc<Self> {
        let filter = Arc::new_cyclic(|weak| Self {
            next,
            wire_format,
            last_read: Mutex::new(Instant::now()),
            last_write: Mutex::new(Instant::now()),
            monitor_task: Mutex::new(None),
            listener: ListenerSlot::new(),
            weak: weak.clone(),
        });
        filter
            .next
            .set_listener(filter.clone() as Arc<dyn TransportListener>);
        filter
    }

    fn window(&self) -> Duration {
        Duration::from_millis(
            self.wire_format
                .current_wire_format_info()
                .max_inactivity_duration_ms,
        )
    }

    /// One monitor pass: keepalive on a quiet write side, exception on a
    /// dead read side. Returns `false` once the transport is declared dead.
    async fn check(self: &Arc<Self>) -> bool {
        let window = self.window();
        if window.is_zero() {
            return true;
        }

        let read_idle = self.last_read.lock().elapsed();
        if read_idle > window {
            warn!(
                idle = ?read_idle,
                window = ?window,
                "no inbound traffic within inactivity window, declaring peer dead"
            );
            self.listener.on_exception(TransportError::ConnectionLost {
                reason: format!("channel inactive for {:?}", read_idle),
                source: None,
            });
            return false;
        }

        let write_idle = self.last_write.lock().elapsed();
        if write_idle >= window / 2 {
            debug!("write side idle, sending keepalive");
            let keepalive = Command::new(CommandPayload::KeepAliveInfo);
            if let Err(error) = self.next.oneway(keepalive).await {
                self.listener.on_exception(error);
                return false;
            }
            *self.last_write.lock() = Instant::now();
        }
        true
    }
}

#[async_trait]
impl Transport for InactivityMonitor {
    async fn start(&self) -> Result<(), TransportError> {
        self.next.start().await?;
        *self.last_read.lock() = Instant::now();
        *self.last_write.lock() = Instant::now();

        let weak = self.weak.clone();
        let task = tokio::spawn(async move {
            loop {
                let nap = match weak.upgrade() {
                    Some(monitor) => {
                        let window = monitor.window();
                        if !monitor.check().await {
                            break;
                        }
                        if window.is_zero() {
                            Duration::from_millis(500)
                        } else {
                            (window / 4).max(Duration::from_millis(10))
                        }
                    }
                    None => break,
                };
                tokio::time::sleep(nap).await;
            }
        });
        *self.monitor_task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if let Some(task) = self.monitor_task.lock().take() {
            task.abort();
        }
        self.next.stop().await
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        self.next.oneway(command).await?;
        *self.last_write.lock() = Instant::now();
        Ok(())
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
        self.next.is_connected()
    }

    fn remote_address(&self) -> String {
        self.next.remote_address()
    }
}

impl TransportListener for InactivityMonitor {
    fn on_command(&self, command: Command) {
        *self.last_read.lock() = Instant::now();
        // Keepalives exist only to feed this clock.
        if matches!(command.payload(), CommandPayload::KeepAliveInfo) {
            return;
        }
        self.listener.on_command(command);
    }

    fn on_exception(&self, error: TransportError) {
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}

impl std::fmt::Debug for InactivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InactivityMonitor")
            .field("window", &self.window())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::WireFormatInfo;
    use crate::transport::MockTransport;
    use crate::wireformat::OpenWireFormat;

    fn wire_format_with_window(window_ms: u64) -> Arc<OpenWireFormat> {
        Arc::new(OpenWireFormat::with_preferred(WireFormatInfo {
            version: 1,
            tight_encoding: true,
            cache_enabled: false,
            max_inactivity_duration_ms: window_ms,
        }))
    }

    #[tokio::test]
    async fn test_keepalive_sent_when_write_side_idle() {
        let mock = MockTransport::new("broker");
        let monitor = InactivityMonitor::new(mock.clone(), wire_format_with_window(80));
        monitor.start().await.unwrap();

        // Keep the read side alive so only the write check fires.
        for _ in 0..6 {
            mock.inject_command(Command::new(CommandPayload::KeepAliveInfo));
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let keepalives = mock
            .sent()
            .into_iter()
            .filter(|c| matches!(c.payload(), CommandPayload::KeepAliveInfo))
            .count();
        assert!(keepalives >= 1, "expected at least one keepalive");
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_peer_raises_exception() {
        let mock = MockTransport::new("broker");
        let monitor = InactivityMonitor::new(mock.clone(), wire_format_with_window(40));

        struct Sink(parking_lot::Mutex<Vec<String>>);
        impl TransportListener for Sink {
            fn on_command(&self, _: Command) {}
            fn on_exception(&self, error: TransportError) {
                self.0.lock().push(error.to_string());
            }
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(Vec::new())));
        monitor.set_listener(sink.clone());
        monitor.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(
            sink.0.lock().iter().any(|e| e.contains("inactive")),
            "expected an inactivity exception"
        );
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_window_disables_monitoring() {
        let mock = MockTransport::new("broker");
        let monitor = InactivityMonitor::new(mock.clone(), wire_format_with_window(0));
        monitor.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(mock.sent().is_empty());
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalives_consumed_not_forwarded() {
        let mock = MockTransport::new("broker");
        let monitor = InactivityMonitor::new(mock.clone(), wire_format_with_window(0));

        struct Sink(parking_lot::Mutex<usize>);
        impl TransportListener for Sink {
            fn on_command(&self, _: Command) {
                *self.0.lock() += 1;
            }
            fn on_exception(&self, _: TransportError) {}
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(0)));
        monitor.set_listener(sink.clone());
        monitor.start().await.unwrap();

        mock.inject_command(Command::new(CommandPayload::KeepAliveInfo));
        mock.inject_command(Command::new(CommandPayload::ShutdownInfo));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*sink.0.lock(), 1);
        monitor.stop().await.unwrap();
    }
}
