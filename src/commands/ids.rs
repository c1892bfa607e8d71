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

//! Typed identifiers for protocol-visible resources.
//!
//! Every resource the broker knows about is addressed by an id derived
//! hierarchically from the connection id: sessions are numbered within a
//! connection, consumers and producers within a session. The derivation
//! makes ids globally unique without any coordination with the broker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Identifier of a single client connection.
///
/// Connection ids are client-generated strings, unique per process and
/// per connection attempt so a broker never confuses two incarnations of
/// the same client.
///
/// # Example
///
/// ```rust
/// use mqlink::commands::ConnectionId;
///
/// let id = ConnectionId::new("ID:client-1");
/// assert_eq!(id.value(), "ID:client-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    value: String,
}

impl ConnectionId {
    /// Creates a connection id from an explicit value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Returns the string value of this id.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Derives the session id with the given sequence value.
    #[must_use]
    pub fn session_id(&self, value: u32) -> SessionId {
        SessionId {
            connection_id: self.value.clone(),
            value,
        }
    }

    /// Derives a transaction id with the given sequence value.
    #[must_use]
    pub fn transaction_id(&self, value: u32) -> TransactionId {
        TransactionId {
            connection_id: self.value.clone(),
            value,
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Identifier of a session within a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    connection_id: String,
    value: u32,
}

impl SessionId {
    /// Returns the owning connection id value.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Returns the session sequence value within the connection.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Derives the consumer id with the given sequence value.
    #[must_use]
    pub fn consumer_id(&self, value: u32) -> ConsumerId {
        ConsumerId {
            connection_id: self.connection_id.clone(),
            session_id: self.value,
            value,
        }
    }

    /// Derives the producer id with the given sequence value.
    #[must_use]
    pub fn producer_id(&self, value: u32) -> ProducerId {
        ProducerId {
            connection_id: self.connection_id.clone(),
            session_id: self.value,
            value,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

/// Identifier of a consumer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId {
    connection_id: String,
    session_id: u32,
    value: u32,
}

impl ConsumerId {
    /// Returns the owning connection id value.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Returns the owning session sequence value.
    #[must_use]
    pub const fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Returns the consumer sequence value within the session.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Returns the id of the owning session.
    #[must_use]
    pub fn parent(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_id,
        }
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// Identifier of a producer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerId {
    connection_id: String,
    session_id: u32,
    value: u32,
}

impl ProducerId {
    /// Returns the owning connection id value.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Returns the owning session sequence value.
    #[must_use]
    pub const fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Returns the producer sequence value within the session.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Returns the id of the owning session.
    #[must_use]
    pub fn parent(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_id,
        }
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// Identifier of a local transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    connection_id: String,
    value: u32,
}

impl TransactionId {
    /// Returns the owning connection id value.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Returns the transaction sequence value within the connection.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX:{}:{}", self.connection_id, self.value)
    }
}

/// Identifier of a single message, unique per producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    producer: String,
    sequence: u64,
}

impl MessageId {
    /// Creates a message id from a producer id and a sequence number.
    pub fn new(producer: &ProducerId, sequence: u64) -> Self {
        Self {
            producer: producer.to_string(),
            sequence,
        }
    }

    /// Returns the producer id string this message originated from.
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Returns the per-producer sequence number.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.sequence)
    }
}

/// Generates process-unique connection id values.
///
/// Ids combine a random per-process prefix with a monotonically increasing
/// sequence, so two processes on the same host cannot collide and two
/// connections in one process cannot either.
///
/// # Example
///
/// ```rust
/// use mqlink::commands::ConnectionIdGenerator;
///
/// let generator = ConnectionIdGenerator::new();
/// let a = generator.next();
/// let b = generator.next();
/// assert_ne!(a, b);
/// ```
#[derive(Debug)]
pub struct ConnectionIdGenerator {
    prefix: String,
    next_value: AtomicU64,
}

impl ConnectionIdGenerator {
    /// Creates a generator with a random process prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: format!("ID:{:08x}", rand::random::<u32>()),
            next_value: AtomicU64::new(1),
        }
    }

    /// Returns the next connection id.
    #[must_use]
    pub fn next(&self) -> ConnectionId {
        let value = self.next_value.fetch_add(1, Ordering::Relaxed);
        ConnectionId::new(format!("{}-{}", self.prefix, value))
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe sequence for session/consumer/producer/transaction values.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU32,
}

impl SequenceGenerator {
    /// Creates a sequence starting at 1. Value 0 is reserved for
    /// connection-level resources such as the advisory consumer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Returns the next sequence value.
    #[must_use]
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_derivation() {
        let connection = ConnectionId::new("ID:test-1");
        let session = connection.session_id(2);
        let consumer = session.consumer_id(3);
        let producer = session.producer_id(4);

        assert_eq!(session.connection_id(), "ID:test-1");
        assert_eq!(consumer.parent(), session);
        assert_eq!(producer.parent(), session);
        assert_eq!(consumer.to_string(), "ID:test-1:2:3");
        assert_eq!(producer.to_string(), "ID:test-1:2:4");
    }

    #[test]
    fn test_connection_id_generator_unique() {
        let generator = ConnectionIdGenerator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generator.next()));
        }
    }

    #[test]
    fn test_sequence_generator_starts_at_one() {
        let sequence = SequenceGenerator::new();
        assert_eq!(sequence.next(), 1);
        assert_eq!(sequence.next(), 2);
    }

    #[test]
    fn test_message_id_display() {
        let producer = ConnectionId::new("ID:c").session_id(1).producer_id(2);
        let id = MessageId::new(&producer, 7);
        assert_eq!(id.to_string(), "ID:c:1:2:7");
    }
}
