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

//! Mirror of protocol-visible resources.
//!
//! Entries are created before the corresponding creation command is sent
//! and removed only by explicit close/remove — a transport outage never
//! touches them. Insertion order is preserved because replay must recreate
//! resources in their original creation order.

use crate::commands::{
    ConnectionInfo, ConsumerId, ConsumerInfo, ProducerId, ProducerInfo, SessionId, SessionInfo,
    TransactionId, TransactionInfo,
};
use tracing::warn;

/// State of one live connection: its sessions and open transactions.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    info: ConnectionInfo,
    sessions: Vec<SessionState>,
    transactions: Vec<TransactionInfo>,
}

impl ConnectionState {
    /// Creates the state mirror for a connection.
    #[must_use]
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            sessions: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// The connection's creation info.
    #[must_use]
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Live sessions, in creation order.
    #[must_use]
    pub fn sessions(&self) -> &[SessionState] {
        &self.sessions
    }

    /// Open transactions, in begin order.
    #[must_use]
    pub fn transactions(&self) -> &[TransactionInfo] {
        &self.transactions
    }

    /// Registers a session. Sessions whose id names another connection are
    /// rejected.
    pub fn add_session(&mut self, info: SessionInfo) {
        if info.session_id.connection_id() != self.info.connection_id.value() {
            warn!(
                session = %info.session_id,
                connection = %self.info.connection_id,
                "ignoring session registered against a foreign connection"
            );
            return;
        }
        self.sessions.push(SessionState::new(info));
    }

    /// Removes a session and everything under it.
    pub fn remove_session(&mut self, id: &SessionId) {
        self.sessions.retain(|s| &s.info.session_id != id);
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut SessionState> {
        self.sessions.iter_mut().find(|s| &s.info.session_id == id)
    }

    /// Registers an open transaction.
    pub fn add_transaction(&mut self, info: TransactionInfo) {
        self.transactions.push(info);
    }

    /// Removes a transaction once committed or rolled back.
    pub fn remove_transaction(&mut self, id: &TransactionId) {
        self.transactions.retain(|t| &t.transaction_id != id);
    }
}

/// State of one live session: its consumers and producers.
#[derive(Debug, Clone)]
pub struct SessionState {
    info: SessionInfo,
    consumers: Vec<ConsumerInfo>,
    producers: Vec<ProducerInfo>,
}

impl SessionState {
    fn new(info: SessionInfo) -> Self {
        Self {
            info,
            consumers: Vec::new(),
            producers: Vec::new(),
        }
    }

    /// The session's creation info.
    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Live consumers, in creation order.
    #[must_use]
    pub fn consumers(&self) -> &[ConsumerInfo] {
        &self.consumers
    }

    /// Live producers, in creation order.
    #[must_use]
    pub fn producers(&self) -> &[ProducerInfo] {
        &self.producers
    }

    /// Registers a consumer.
    pub fn add_consumer(&mut self, info: ConsumerInfo) {
        self.consumers.push(info);
    }

    /// Removes a consumer.
    pub fn remove_consumer(&mut self, id: &ConsumerId) {
        self.consumers.retain(|c| &c.consumer_id != id);
    }

    /// Registers a producer.
    pub fn add_producer(&mut self, info: ProducerInfo) {
        self.producers.push(info);
    }

    /// Removes a producer.
    pub fn remove_producer(&mut self, id: &ProducerId) {
        self.producers.retain(|p| &p.producer_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ConnectionId, Destination};

    fn connection_state() -> (ConnectionId, ConnectionState) {
        let connection_id = ConnectionId::new("ID:test-1");
        let state = ConnectionState::new(ConnectionInfo {
            connection_id: connection_id.clone(),
            client_id: "client".to_string(),
        });
        (connection_id, state)
    }

    fn consumer_info(session: &SessionId, value: u32) -> ConsumerInfo {
        ConsumerInfo {
            consumer_id: session.consumer_id(value),
            destination: Destination::queue("orders"),
            selector: None,
            prefetch_size: 100,
            no_local: false,
        }
    }

    #[test]
    fn test_sessions_keep_insertion_order() {
        let (connection_id, mut state) = connection_state();
        for value in 1..=3 {
            state.add_session(SessionInfo {
                session_id: connection_id.session_id(value),
            });
        }
        let values: Vec<u32> = state.sessions().iter().map(|s| s.info().session_id.value()).collect();
        assert_eq!(values, vec![1, 2, 3]);

        state.remove_session(&connection_id.session_id(2));
        let values: Vec<u32> = state.sessions().iter().map(|s| s.info().session_id.value()).collect();
        assert_eq!(values, vec![1, 3]);
    }

    #[test]
    fn test_foreign_session_rejected() {
        let (_, mut state) = connection_state();
        state.add_session(SessionInfo {
            session_id: ConnectionId::new("ID:other").session_id(1),
        });
        assert!(state.sessions().is_empty());
    }

    #[test]
    fn test_consumers_and_producers_tracked_per_session() {
        let (connection_id, mut state) = connection_state();
        let session_id = connection_id.session_id(1);
        state.add_session(SessionInfo {
            session_id: session_id.clone(),
        });

        let session = state.session_mut(&session_id).unwrap();
        session.add_consumer(consumer_info(&session_id, 1));
        session.add_consumer(consumer_info(&session_id, 2));
        session.add_producer(ProducerInfo {
            producer_id: session_id.producer_id(1),
            destination: None,
        });

        assert_eq!(session.consumers().len(), 2);
        session.remove_consumer(&session_id.consumer_id(1));
        assert_eq!(session.consumers().len(), 1);
        assert_eq!(session.consumers()[0].consumer_id.value(), 2);
        assert_eq!(session.producers().len(), 1);
    }

    #[test]
    fn test_transactions_tracked() {
        let (connection_id, mut state) = connection_state();
        let tx = TransactionInfo {
            transaction_id: connection_id.transaction_id(1),
            action: crate::commands::TransactionAction::Begin,
        };
        state.add_transaction(tx.clone());
        assert_eq!(state.transactions(), &[tx]);
        state.remove_transaction(&connection_id.transaction_id(1));
        assert!(state.transactions().is_empty());
    }
}
