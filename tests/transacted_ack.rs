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

//! Transacted acknowledgment batching: nothing on the wire before
//! commit, one batched ack at commit, and nothing ever after rollback.

mod common;

use mqlink::commands::{CommandPayload, Destination, TransactionAction};
use mqlink::core::{AckMode, Synchronization};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn acks_defer_until_commit() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Transacted).await.unwrap();
    let consumer = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    for sequence in 1..=5 {
        mock.inject_command(common::dispatch(consumer.consumer_id(), sequence, "m"));
    }
    for _ in 0..5 {
        consumer.receive().await.unwrap();
    }

    // No ack frame before commit.
    assert!(common::acks(&mock.sent()).is_empty());

    session.commit().await.unwrap();

    let trace = mock.sent();
    let acks = common::acks(&trace);
    assert_eq!(acks.len(), 1, "one batched ack per consumer");
    assert_eq!(acks[0].message_count, 5);
    assert_eq!(acks[0].first_message_id.sequence(), 1);
    assert_eq!(acks[0].last_message_id.sequence(), 5);
    let transaction_id = acks[0].transaction_id.clone().expect("ack carries tx id");

    // The ack precedes the commit command for the same transaction.
    let ack_position = trace
        .iter()
        .position(|c| matches!(c.payload(), CommandPayload::MessageAck(_)))
        .unwrap();
    let commit_position = trace
        .iter()
        .position(|c| match c.payload() {
            CommandPayload::TransactionInfo(info) => {
                info.action == TransactionAction::Commit
                    && info.transaction_id == transaction_id
            }
            _ => false,
        })
        .expect("commit command on the wire");
    assert!(ack_position < commit_position);
}

#[tokio::test]
async fn rollback_discards_the_batch_forever() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Transacted).await.unwrap();
    let consumer = session
        .create_consumer(Destination::queue("orders"))
        .await
        .unwrap();

    let mock = connector.latest();
    mock.clear_sent();
    for sequence in 1..=5 {
        mock.inject_command(common::dispatch(consumer.consumer_id(), sequence, "m"));
    }
    for _ in 0..5 {
        consumer.receive().await.unwrap();
    }

    session.rollback().await.unwrap();

    // Rollback went out; no acks ever, and the next commit sends none
    // either.
    assert!(common::acks(&mock.sent()).is_empty());
    assert!(mock.sent().iter().any(|c| match c.payload() {
        CommandPayload::TransactionInfo(info) => info.action == TransactionAction::Rollback,
        _ => false,
    }));

    session.commit().await.unwrap();
    assert!(common::acks(&mock.sent()).is_empty());
}

#[tokio::test]
async fn synchronizations_fire_in_order_around_commit_and_rollback() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Transacted).await.unwrap();

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }
    impl Synchronization for Recorder {
        fn before_end(&self) {
            self.log.lock().push(format!("{}:before_end", self.name));
        }
        fn after_commit(&self) {
            self.log.lock().push(format!("{}:after_commit", self.name));
        }
        fn after_rollback(&self) {
            self.log.lock().push(format!("{}:after_rollback", self.name));
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second"] {
        session
            .add_synchronization(Arc::new(Recorder {
                name,
                log: log.clone(),
            }))
            .unwrap();
    }
    session.commit().await.unwrap();
    // Registration order is the documented contract (an assumption, not
    // confirmed broker behavior — see the design notes).
    assert_eq!(
        *log.lock(),
        vec![
            "first:before_end",
            "second:before_end",
            "first:after_commit",
            "second:after_commit",
        ]
    );

    log.lock().clear();
    session
        .add_synchronization(Arc::new(Recorder {
            name: "third",
            log: log.clone(),
        }))
        .unwrap();
    session.rollback().await.unwrap();
    assert_eq!(
        *log.lock(),
        vec!["third:before_end", "third:after_rollback"]
    );
}

#[tokio::test]
async fn transaction_operations_require_transacted_session() {
    let connector = common::TestConnector::new();
    let connection = common::builder_over(&connector, "test://broker")
        .connect()
        .await
        .unwrap();
    let session = connection.create_session(AckMode::Auto).await.unwrap();

    assert!(session.commit().await.is_err());
    assert!(session.rollback().await.is_err());
}
