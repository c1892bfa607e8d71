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

//! State tracking and replay.
//!
//! The tracker observes every command the failover transport sends and
//! mirrors the resources they create and destroy. After a reconnect,
//! [`restore`](ConnectionStateTracker::restore) drives the new transport
//! to recreate identical broker-side state: connection first, then each
//! session, its consumers and producers, then open transaction begins —
//! everything in original creation order. Any failure aborts the whole
//! attempt; replay is all-or-nothing per reconnect.

use super::ConnectionState;
use crate::commands::{
    Command, CommandPayload, RemoveInfo, TransactionAction,
};
use crate::transport::{Transport, TransportError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mirrors protocol-visible resources and replays them after failover.
///
/// Reads dominate (every outbound command passes [`track`](Self::track),
/// dispatch never touches it, replay is rare), so the state tree sits
/// behind a read-write lock.
#[derive(Debug, Default)]
pub struct ConnectionStateTracker {
    connections: RwLock<Vec<ConnectionState>>,
}

impl ConnectionStateTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes an outbound command, updating the mirrored state.
    ///
    /// Called before the command reaches the wire, so a failure mid-send
    /// still leaves the bookkeeping saying "this resource should exist" —
    /// which is exactly what replay needs.
    pub fn track(&self, command: &Command) {
        match command.payload() {
            CommandPayload::ConnectionInfo(info) => {
                let mut connections = self.connections.write();
                if connections
                    .iter()
                    .any(|c| c.info().connection_id == info.connection_id)
                {
                    return; // replayed connection create
                }
                connections.push(ConnectionState::new(info.clone()));
            }
            CommandPayload::SessionInfo(info) => {
                self.with_connection(info.session_id.connection_id(), |connection| {
                    connection.add_session(info.clone());
                });
            }
            CommandPayload::ConsumerInfo(info) => {
                let consumer_id = &info.consumer_id;
                self.with_connection(consumer_id.connection_id(), |connection| {
                    match connection.session_mut(&consumer_id.parent()) {
                        Some(session) => session.add_consumer(info.clone()),
                        None => warn!(consumer = %consumer_id, "consumer created on unknown session"),
                    }
                });
            }
            CommandPayload::ProducerInfo(info) => {
                let producer_id = &info.producer_id;
                self.with_connection(producer_id.connection_id(), |connection| {
                    match connection.session_mut(&producer_id.parent()) {
                        Some(session) => session.add_producer(info.clone()),
                        None => warn!(producer = %producer_id, "producer created on unknown session"),
                    }
                });
            }
            CommandPayload::TransactionInfo(info) => {
                let transaction_id = &info.transaction_id;
                self.with_connection(transaction_id.connection_id(), |connection| {
                    match info.action {
                        TransactionAction::Begin => connection.add_transaction(info.clone()),
                        TransactionAction::Commit | TransactionAction::Rollback => {
                            connection.remove_transaction(transaction_id);
                        }
                    }
                });
            }
            CommandPayload::RemoveInfo(remove) => self.track_remove(remove),
            _ => {}
        }
    }

    fn track_remove(&self, remove: &RemoveInfo) {
        match remove {
            RemoveInfo::Connection(id) => {
                self.connections
                    .write()
                    .retain(|c| &c.info().connection_id != id);
            }
            RemoveInfo::Session(id) => {
                self.with_connection(id.connection_id(), |connection| {
                    connection.remove_session(id);
                });
            }
            RemoveInfo::Consumer(id) => {
                self.with_connection(id.connection_id(), |connection| {
                    if let Some(session) = connection.session_mut(&id.parent()) {
                        session.remove_consumer(id);
                    }
                });
            }
            RemoveInfo::Producer(id) => {
                self.with_connection(id.connection_id(), |connection| {
                    if let Some(session) = connection.session_mut(&id.parent()) {
                        session.remove_producer(id);
                    }
                });
            }
        }
    }

    fn with_connection(&self, connection_id: &str, apply: impl FnOnce(&mut ConnectionState)) {
        let mut connections = self.connections.write();
        match connections
            .iter_mut()
            .find(|c| c.info().connection_id.value() == connection_id)
        {
            Some(connection) => apply(connection),
            None => warn!(connection = connection_id, "tracking against unknown connection"),
        }
    }

    /// Snapshot of the mirrored state, for inspection and replay.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionState> {
        self.connections.read().clone()
    }

    /// Replays the full state tree through `transport`.
    ///
    /// # Errors
    ///
    /// The first send failure aborts the replay; the caller treats it as a
    /// fresh connection failure and retries per its backoff policy.
    pub async fn restore(&self, transport: &Arc<dyn Transport>) -> Result<(), TransportError> {
        let connections = self.snapshot();
        for connection in connections {
            debug!(connection = %connection.info().connection_id, "restoring connection");
            transport
                .oneway(Command::new(CommandPayload::ConnectionInfo(
                    connection.info().clone(),
                )))
                .await?;

            for session in connection.sessions() {
                transport
                    .oneway(Command::new(CommandPayload::SessionInfo(
                        session.info().clone(),
                    )))
                    .await?;
                for consumer in session.consumers() {
                    transport
                        .oneway(Command::new(CommandPayload::ConsumerInfo(consumer.clone())))
                        .await?;
                }
                for producer in session.producers() {
                    transport
                        .oneway(Command::new(CommandPayload::ProducerInfo(producer.clone())))
                        .await?;
                }
            }

            for transaction in connection.transactions() {
                transport
                    .oneway(Command::new(CommandPayload::TransactionInfo(
                        transaction.clone(),
                    )))
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        ConnectionId, ConnectionInfo, ConsumerInfo, Destination, ProducerInfo, SessionInfo,
        TransactionInfo,
    };
    use crate::transport::MockTransport;

    fn track_connection(tracker: &ConnectionStateTracker, name: &str) -> ConnectionId {
        let connection_id = ConnectionId::new(name);
        tracker.track(&Command::new(CommandPayload::ConnectionInfo(
            ConnectionInfo {
                connection_id: connection_id.clone(),
                client_id: "client".to_string(),
            },
        )));
        connection_id
    }

    fn consumer(session: &crate::commands::SessionId, value: u32) -> ConsumerInfo {
        ConsumerInfo {
            consumer_id: session.consumer_id(value),
            destination: Destination::queue("orders"),
            selector: None,
            prefetch_size: 10,
            no_local: false,
        }
    }

    #[test]
    fn test_track_builds_state_tree() {
        let tracker = ConnectionStateTracker::new();
        let connection_id = track_connection(&tracker, "ID:c");
        let session_id = connection_id.session_id(1);

        tracker.track(&Command::new(CommandPayload::SessionInfo(SessionInfo {
            session_id: session_id.clone(),
        })));
        tracker.track(&Command::new(CommandPayload::ConsumerInfo(consumer(
            &session_id,
            1,
        ))));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].sessions().len(), 1);
        assert_eq!(snapshot[0].sessions()[0].consumers().len(), 1);
    }

    #[test]
    fn test_remove_is_the_only_way_out() {
        let tracker = ConnectionStateTracker::new();
        let connection_id = track_connection(&tracker, "ID:c");
        let session_id = connection_id.session_id(1);
        tracker.track(&Command::new(CommandPayload::SessionInfo(SessionInfo {
            session_id: session_id.clone(),
        })));
        tracker.track(&Command::new(CommandPayload::ConsumerInfo(consumer(
            &session_id,
            1,
        ))));

        tracker.track(&Command::new(CommandPayload::RemoveInfo(
            RemoveInfo::Consumer(session_id.consumer_id(1)),
        )));
        assert!(tracker.snapshot()[0].sessions()[0].consumers().is_empty());

        tracker.track(&Command::new(CommandPayload::RemoveInfo(
            RemoveInfo::Session(session_id),
        )));
        assert!(tracker.snapshot()[0].sessions().is_empty());
    }

    #[test]
    fn test_commit_clears_open_transaction() {
        let tracker = ConnectionStateTracker::new();
        let connection_id = track_connection(&tracker, "ID:c");
        let transaction_id = connection_id.transaction_id(1);

        tracker.track(&Command::new(CommandPayload::TransactionInfo(
            TransactionInfo {
                transaction_id: transaction_id.clone(),
                action: TransactionAction::Begin,
            },
        )));
        assert_eq!(tracker.snapshot()[0].transactions().len(), 1);

        tracker.track(&Command::new(CommandPayload::TransactionInfo(
            TransactionInfo {
                transaction_id,
                action: TransactionAction::Commit,
            },
        )));
        assert!(tracker.snapshot()[0].transactions().is_empty());
    }

    #[tokio::test]
    async fn test_restore_replays_in_creation_order() {
        let tracker = ConnectionStateTracker::new();
        let connection_id = track_connection(&tracker, "ID:c");
        let session_one = connection_id.session_id(1);
        let session_two = connection_id.session_id(2);

        for session_id in [&session_one, &session_two] {
            tracker.track(&Command::new(CommandPayload::SessionInfo(SessionInfo {
                session_id: session_id.clone(),
            })));
        }
        tracker.track(&Command::new(CommandPayload::ConsumerInfo(consumer(
            &session_one,
            1,
        ))));
        tracker.track(&Command::new(CommandPayload::ProducerInfo(ProducerInfo {
            producer_id: session_two.producer_id(1),
            destination: None,
        })));
        tracker.track(&Command::new(CommandPayload::TransactionInfo(
            TransactionInfo {
                transaction_id: connection_id.transaction_id(7),
                action: TransactionAction::Begin,
            },
        )));

        let mock = MockTransport::new("replacement");
        let transport: Arc<dyn Transport> = mock.clone();
        tracker.restore(&transport).await.unwrap();

        let replayed: Vec<&'static str> = mock.sent().iter().map(|c| c.type_name()).collect();
        assert_eq!(
            replayed,
            vec![
                "ConnectionInfo",
                "SessionInfo",
                "ConsumerInfo",
                "SessionInfo",
                "ProducerInfo",
                "TransactionInfo",
            ]
        );
    }

    #[tokio::test]
    async fn test_restore_aborts_on_failure() {
        let tracker = ConnectionStateTracker::new();
        track_connection(&tracker, "ID:c");

        let mock = MockTransport::new("replacement");
        mock.set_fail_sends(true);
        let transport: Arc<dyn Transport> = mock.clone();
        assert!(tracker.restore(&transport).await.is_err());
    }
}
