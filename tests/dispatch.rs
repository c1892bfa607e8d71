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

//! Dispatch: inbound messages reach the consumer they name, a dispatch
//! for a closed consumer vanishes without error, and listener delivery
//! runs off the transport's read path.

mod common;

use mqlink::commands::{Destination, Message};
use mqlink::core::{AckMode, MessageListener};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn blocking_receive_gets_the_right_message() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let consumer_a = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();
    let consumer_b = session
        .create_consumer(Destination::queue("invoices"))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.inject_command(common::dispatch(consumer_b.consumer_id(), 1, "for-b"));
    mock.inject_command(common::dispatch(consumer_a.consumer_id(), 2, "for-a"));

    let message = consumer_a.receive().await.unwrap();
    assert_eq!(message.text(), Some("for-a"));
    let message = consumer_b.receive().await.unwrap();
    assert_eq!(message.text(), Some("for-b"));
}

#[tokio::test]
async fn auto_ack_fires_after_receive() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let consumer = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    mock.inject_command(common::dispatch(consumer.consumer_id(), 1, "payload"));

    consumer.receive().await.unwrap();
    let acks = common::acks(&mock.sent());
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].message_count, 1);
    assert_eq!(&acks[0].consumer_id, consumer.consumer_id());
}

#[tokio::test]
async fn dispatch_to_closed_consumer_is_a_noop() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let closed = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();
    let survivor = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    let closed_id = closed.consumer_id().clone();
    closed.close().await.unwrap();

    let mock = connector.latest();
    mock.inject_command(common::dispatch(&closed_id, 1, "orphan"));
    mock.inject_command(common::dispatch(survivor.consumer_id(), 2, "delivered"));

    // The orphan is dropped silently; the survivor sees only its own.
    let message = survivor.receive().await.unwrap();
    assert_eq!(message.text(), Some("delivered"));
    let nothing = survivor
        .receive_timeout(Duration::from_millis(50))
        .await
        .unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
async fn listener_delivery_and_error_suppresses_ack() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let consumer = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    struct Flaky {
        seen: Mutex<Vec<String>>,
    }
    impl MessageListener for Flaky {
        fn on_message(
            &self,
            message: &Message,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let text = message.text().unwrap_or_default().to_string();
            self.seen.lock().push(text.clone());
            if text == "poison" {
                return Err("cannot process".into());
            }
            Ok(())
        }
    }
    let listener = Arc::new(Flaky {
        seen: Mutex::new(Vec::new()),
    });
    consumer.set_listener(listener.clone()).await.unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    mock.inject_command(common::dispatch(consumer.consumer_id(), 1, "good"));
    mock.inject_command(common::dispatch(consumer.consumer_id(), 2, "poison"));
    mock.inject_command(common::dispatch(consumer.consumer_id(), 3, "also-good"));

    tokio::time::timeout(Duration::from_secs(2), async {
        while listener.seen.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener never saw all messages");

    // Successful deliveries ack; the failed one does not.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let acks = common::acks(&mock.sent());
    assert_eq!(acks.len(), 2);
    let acked: Vec<u64> = acks.iter().map(|a| a.last_message_id.sequence()).collect();
    assert_eq!(acked, vec![1, 3]);

    // Receive while a listener is installed is a usage error.
    assert!(consumer.receive().await.is_err());
}

#[tokio::test]
async fn closing_connection_wakes_blocked_receive() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let consumer = Arc::new(
        session
            .create_consumer(Destination::queue("orders"))
            .await
            .unwrap(),
    );

    let blocked = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    connection.close().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("receive hung across close")
        .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn client_ack_batches_until_acknowledge() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Client).await.unwrap();
    let consumer = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    for sequence in 1..=3 {
        mock.inject_command(common::dispatch(consumer.consumer_id(), sequence, "m"));
    }
    let mut last = None;
    for _ in 0..3 {
        last = Some(consumer.receive().await.unwrap());
    }
    assert!(common::acks(&mock.sent()).is_empty());

    consumer.acknowledge(&last.unwrap()).await.unwrap();
    let acks = common::acks(&mock.sent());
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].message_count, 3);
    assert_eq!(acks[0].first_message_id.sequence(), 1);
    assert_eq!(acks[0].last_message_id.sequence(), 3);
}
