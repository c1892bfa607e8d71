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

//! Shared harness: a registry scheme backed by scripted mock transports,
//! so tests drive a full connection against an in-memory "broker".

// Each test binary uses a different slice of this harness.
#![allow(dead_code)]

use async_trait::async_trait;
use mqlink::commands::{
    Command, CommandPayload, ConsumerId, Destination, Message, MessageBody, MessageDispatch,
    MessageId,
};
use mqlink::core::ConnectionBuilder;
use mqlink::transport::{
    MockTransport, Transport, TransportConnector, TransportError, TransportRegistry, TransportUri,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Hands out auto-responding mock transports and keeps their handles.
pub struct TestConnector {
    handed_out: Mutex<Vec<Arc<MockTransport>>>,
    refuse: AtomicBool,
}

impl TestConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handed_out: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
        })
    }

    /// Makes further connection attempts fail until re-enabled.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// The transport currently backing the connection.
    pub fn latest(&self) -> Arc<MockTransport> {
        self.handed_out.lock().last().cloned().expect("no transport handed out")
    }

    /// How many connections have been handed out.
    pub fn connections(&self) -> usize {
        self.handed_out.lock().len()
    }
}

#[async_trait]
impl TransportConnector for TestConnector {
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                address: uri.address(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        let mock = MockTransport::auto_responding(uri.address());
        self.handed_out.lock().push(mock.clone());
        Ok(mock)
    }
}

/// A connection builder wired to the scripted connector under the given
/// transport URI (use `test://broker` or a `failover:(test://...)` form).
pub fn builder_over(connector: &Arc<TestConnector>, uri: &str) -> ConnectionBuilder {
    let registry = TransportRegistry::new();
    registry.register("test", connector.clone());
    ConnectionBuilder::new(uri).registry(Arc::new(registry))
}

/// Builds an inbound delivery for `consumer_id`.
pub fn dispatch(consumer_id: &ConsumerId, sequence: u64, text: &str) -> Command {
    let producer = mqlink::commands::ConnectionId::new("ID:broker")
        .session_id(1)
        .producer_id(1);
    Command::new(CommandPayload::MessageDispatch(MessageDispatch {
        consumer_id: consumer_id.clone(),
        message: Message {
            message_id: MessageId::new(&producer, sequence),
            destination: Destination::queue("orders"),
            transaction_id: None,
            body: MessageBody::Text(text.to_string()),
            properties: HashMap::new(),
            persistent: true,
        },
        redelivery_counter: 0,
    }))
}

/// Type names of the commands in a wire trace, for order assertions.
pub fn type_names(trace: &[Command]) -> Vec<&'static str> {
    trace.iter().map(Command::type_name).collect()
}

/// The acks in a wire trace.
pub fn acks(trace: &[Command]) -> Vec<mqlink::commands::MessageAck> {
    trace
        .iter()
        .filter_map(|command| match command.payload() {
            CommandPayload::MessageAck(ack) => Some(ack.clone()),
            _ => None,
        })
        .collect()
}
