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

//! A full client round-trip against the in-memory mock broker: connect,
//! create a session and consumer, inject a delivery as the broker would,
//! and receive it.
//!
//! Run with: `cargo run --example mock_broker_roundtrip`

use async_trait::async_trait;
use mqlink::commands::{
    Command, CommandPayload, Destination, Message, MessageBody, MessageDispatch, MessageId,
};
use mqlink::core::{AckMode, ConnectionBuilder};
use mqlink::transport::{
    MockTransport, Transport, TransportConnector, TransportError, TransportRegistry, TransportUri,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Keeps a handle to the mock transport so we can play the broker.
struct DemoConnector {
    handle: Mutex<Option<Arc<MockTransport>>>,
}

#[async_trait]
impl TransportConnector for DemoConnector {
    async fn connect(&self, uri: &TransportUri) -> Result<Arc<dyn Transport>, TransportError> {
        let mock = MockTransport::auto_responding(uri.address());
        *self.handle.lock() = Some(mock.clone());
        Ok(mock)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let connector = Arc::new(DemoConnector {
        handle: Mutex::new(None),
    });
    let registry = TransportRegistry::new();
    registry.register("demo", connector.clone());

    let connection = ConnectionBuilder::new("demo://broker")
        .client_id("roundtrip-demo")
        .registry(Arc::new(registry))
        .connect()
        .await?;
    println!("connected as {}", connection.client_id());

    let session = connection.create_session(AckMode::Auto).await?;
    let consumer = session.create_consumer(Destination::queue("orders")).await?;

    // Play the broker: deliver one message to the consumer we created.
    let broker = connector.handle.lock().clone().expect("connected");
    let producer_id = mqlink::commands::ConnectionId::new("ID:broker")
        .session_id(1)
        .producer_id(1);
    broker.inject_command(Command::new(CommandPayload::MessageDispatch(
        MessageDispatch {
            consumer_id: consumer.consumer_id().clone(),
            message: Message {
                message_id: MessageId::new(&producer_id, 1),
                destination: Destination::queue("orders"),
                transaction_id: None,
                body: MessageBody::Text("hello from the broker".to_string()),
                properties: HashMap::new(),
                persistent: true,
            },
            redelivery_counter: 0,
        },
    )));

    let message = consumer.receive().await?;
    println!("received: {:?}", message.text());

    connection.close().await?;
    println!(
        "wire saw {} commands in total",
        broker.sent().len()
    );
    Ok(())
}
