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

//! Command tracing filter.
//!
//! Pure pass-through: records every outbound and inbound command through
//! `tracing` without altering ordering or payloads. Enabled per transport
//! with the `trace=true` URI option.

use super::{ListenerSlot, Transport, TransportError, TransportListener};
use crate::commands::{Command, Response};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transport filter logging every command crossing it.
pub struct LoggingTransport {
    next: Arc<dyn Transport>,
    listener: ListenerSlot,
}

impl LoggingTransport {
    /// Wraps `next`, registering this filter as its listener.
    #[must_use]
    pub fn new(next: Arc<dyn Transport>) -> Arc<Self> {
        let filter = Arc::new(Self {
            next,
            listener: ListenerSlot::new(),
        });
        filter
            .next
            .set_listener(filter.clone() as Arc<dyn TransportListener>);
        filter
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn start(&self) -> Result<(), TransportError> {
        debug!(remote = %self.next.remote_address(), "starting transport");
        self.next.start().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        debug!(remote = %self.next.remote_address(), "stopping transport");
        self.next.stop().await
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        debug!(
            command = command.type_name(),
            id = command.command_id(),
            "sending"
        );
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
        self.next.is_connected()
    }

    fn remote_address(&self) -> String {
        self.next.remote_address()
    }
}

impl TransportListener for LoggingTransport {
    fn on_command(&self, command: Command) {
        debug!(
            command = command.type_name(),
            id = command.command_id(),
            "received"
        );
        self.listener.on_command(command);
    }

    fn on_exception(&self, error: TransportError) {
        debug!(%error, "transport exception");
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        debug!("transport interrupted");
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        debug!("transport resumed");
        self.listener.transport_resumed();
    }
}

impl std::fmt::Debug for LoggingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingTransport").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandPayload;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn test_passes_commands_through_unchanged() {
        let mock = MockTransport::new("broker");
        let logging = LoggingTransport::new(mock.clone());

        let command = Command::new(CommandPayload::KeepAliveInfo);
        logging.oneway(command.clone()).await.unwrap();

        assert_eq!(mock.sent(), vec![command]);
    }

    #[tokio::test]
    async fn test_forwards_inbound_in_order() {
        let mock = MockTransport::new("broker");
        let logging = LoggingTransport::new(mock.clone());

        struct Sink(parking_lot::Mutex<Vec<u32>>);
        impl TransportListener for Sink {
            fn on_command(&self, command: Command) {
                self.0.lock().push(command.command_id());
            }
            fn on_exception(&self, _: TransportError) {}
        }
        let sink = Arc::new(Sink(parking_lot::Mutex::new(Vec::new())));
        logging.set_listener(sink.clone());
        logging.start().await.unwrap();

        for id in 1..=3 {
            let mut command = Command::new(CommandPayload::KeepAliveInfo);
            command.set_command_id(id);
            mock.inject_command(command);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*sink.0.lock(), vec![1, 2, 3]);
    }
}
