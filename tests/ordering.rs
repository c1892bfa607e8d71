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

//! Send ordering: commands sent by one task reach the wire in call
//! order, including under concurrent senders.

mod common;

use mqlink::commands::{CommandPayload, Destination};
use mqlink::core::AckMode;
use std::sync::Arc;

#[tokio::test]
async fn sequential_sends_reach_wire_in_order() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let producer = session
        .create_producer(Some(Destination::queue("orders")))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    for index in 0..20 {
        producer.send_text(format!("message-{}", index)).await.unwrap();
    }

    let sequences: Vec<u64> = mock
        .sent()
        .iter()
        .filter_map(|c| match c.payload() {
            CommandPayload::Message(message) => Some(message.message_id.sequence()),
            _ => None,
        })
        .collect();
    let expected: Vec<u64> = (1..=20).collect();
    assert_eq!(sequences, expected);
}

#[tokio::test]
async fn command_ids_increase_in_wire_order() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();
    let producer = session
        .create_producer(Some(Destination::queue("orders")))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    for _ in 0..10 {
        producer.send_text("m").await.unwrap();
    }

    let ids: Vec<u32> = mock.sent().iter().map(|c| c.command_id()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "wire order must match id assignment order");
}

#[tokio::test]
async fn concurrent_senders_preserve_per_task_order() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = Arc::new(connection.create_session(AckMode::Auto).await.unwrap());

    let mut producers = Vec::new();
    for _ in 0..4 {
        producers.push(Arc::new(
            session
                .create_producer(Some(Destination::queue("orders")))
                .await
                .unwrap(),
        ));
    }

    let mock = connector.latest();
    mock.clear_sent();
    let mut handles = Vec::new();
    for producer in &producers {
        let producer = producer.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                producer.send_text("m").await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // All 100 messages arrived, and each producer's sequence numbers
    // appear in its own send order.
    let mut per_producer: std::collections::HashMap<String, Vec<u64>> =
        std::collections::HashMap::new();
    for command in mock.sent() {
        if let CommandPayload::Message(message) = command.payload() {
            per_producer
                .entry(message.message_id.producer().to_string())
                .or_default()
                .push(message.message_id.sequence());
        }
    }
    assert_eq!(per_producer.values().map(Vec::len).sum::<usize>(), 100);
    for sequences in per_producer.values() {
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        assert_eq!(sequences, &sorted);
    }
}
