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

//! Payload types carried by commands.
//!
//! The `*Info` structures describe protocol-visible resources. They are the
//! values the state registry keeps so a new transport after failover can be
//! driven to recreate identical broker-side state: a `ConsumerInfo` sent once
//! at creation time is resent verbatim during replay.

use super::ids::{ConnectionId, ConsumerId, MessageId, ProducerId, SessionId, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A queue or topic the broker routes messages through.
///
/// # Example
///
/// ```rust
/// use mqlink::commands::Destination;
///
/// let orders = Destination::queue("orders");
/// assert_eq!(orders.name(), "orders");
/// assert!(!orders.is_topic());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    kind: DestinationKind,
    name: String,
}

/// Routing semantics of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationKind {
    /// Point-to-point: each message is consumed by exactly one consumer.
    Queue,
    /// Publish/subscribe: each message is delivered to every subscriber.
    Topic,
}

impl Destination {
    /// Topic the broker publishes destination add/remove advisories on.
    pub const ADVISORY_TOPIC: &'static str = "mqlink.advisory.destinations";

    /// Creates a queue destination.
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Queue,
            name: name.into(),
        }
    }

    /// Creates a topic destination.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: name.into(),
        }
    }

    /// Returns the destination name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the destination kind.
    #[must_use]
    pub const fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Returns `true` for topic destinations.
    #[must_use]
    pub const fn is_topic(&self) -> bool {
        matches!(self.kind, DestinationKind::Topic)
    }

    /// Returns `true` if this is the advisory topic.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        self.is_topic() && self.name == Self::ADVISORY_TOPIC
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Queue => write!(f, "queue://{}", self.name),
            DestinationKind::Topic => write!(f, "topic://{}", self.name),
        }
    }
}

/// Announces a new connection to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Id of the connection being created.
    pub connection_id: ConnectionId,
    /// Application-chosen client identity, stable across reconnects.
    pub client_id: String,
}

/// Announces a new session within a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Id of the session being created.
    pub session_id: SessionId,
}

/// Announces a new consumer; resent verbatim on failover replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    /// Id of the consumer being created.
    pub consumer_id: ConsumerId,
    /// Destination the consumer subscribes to.
    pub destination: Destination,
    /// Optional message selector expression evaluated by the broker.
    pub selector: Option<String>,
    /// Number of messages the broker may push ahead of acknowledgment.
    /// Zero means the consumer pulls explicitly.
    pub prefetch_size: u32,
    /// Suppress delivery of messages published on this same connection.
    pub no_local: bool,
}

/// Announces a new producer; resent verbatim on failover replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerInfo {
    /// Id of the producer being created.
    pub producer_id: ProducerId,
    /// Fixed destination, or `None` for an anonymous producer that names
    /// the destination per send.
    pub destination: Option<Destination>,
}

/// Transaction control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Id of the transaction being controlled.
    pub transaction_id: TransactionId,
    /// What to do with it.
    pub action: TransactionAction,
}

/// The action requested by a [`TransactionInfo`] command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAction {
    /// Open the transaction.
    Begin,
    /// Commit all work done under the transaction.
    Commit,
    /// Discard all work done under the transaction.
    Rollback,
}

/// An application message, published by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id assigned by the sending producer.
    pub message_id: MessageId,
    /// Destination the message is published to.
    pub destination: Destination,
    /// Transaction this publish belongs to, if any.
    pub transaction_id: Option<TransactionId>,
    /// Typed body.
    pub body: MessageBody,
    /// Application headers.
    pub properties: HashMap<String, String>,
    /// Survive a broker restart.
    pub persistent: bool,
}

impl Message {
    /// Returns the message body.
    #[must_use]
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Returns the body as text, if it is a text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Body of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// UTF-8 text payload.
    Text(String),
    /// Opaque binary payload.
    Bytes(Vec<u8>),
    /// Broker-generated advisory event, only seen on the advisory topic.
    Advisory(DestinationInfo),
}

/// Inbound delivery of one message to one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDispatch {
    /// Consumer the broker selected for this delivery.
    pub consumer_id: ConsumerId,
    /// The delivered message.
    pub message: Message,
    /// How many times this message has been delivered before.
    pub redelivery_counter: u32,
}

/// Acknowledges one or more delivered messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAck {
    /// Consumer the acknowledged messages were delivered to.
    pub consumer_id: ConsumerId,
    /// Transaction the acknowledgment belongs to, if any.
    pub transaction_id: Option<TransactionId>,
    /// First message id of the acknowledged range.
    pub first_message_id: MessageId,
    /// Last message id of the acknowledged range.
    pub last_message_id: MessageId,
    /// Number of messages covered by the range.
    pub message_count: u32,
    /// Acknowledgment semantics.
    pub ack_type: AckType,
}

/// Semantics of a [`MessageAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckType {
    /// Consume the covered range.
    Standard,
    /// Consume exactly the named message, out of order.
    Individual,
}

/// Requests one message for a zero-prefetch consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePull {
    /// Consumer requesting the message.
    pub consumer_id: ConsumerId,
    /// How long the broker may hold the pull open waiting for a message.
    pub timeout_millis: u64,
}

/// Tears down a previously created resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveInfo {
    /// Remove a connection and everything under it.
    Connection(ConnectionId),
    /// Remove a session and everything under it.
    Session(SessionId),
    /// Remove a consumer.
    Consumer(ConsumerId),
    /// Remove a producer.
    Producer(ProducerId),
}

/// Wire-format capabilities, exchanged during negotiation.
///
/// Both peers send their preferred info; the agreed configuration is the
/// piecewise minimum (version, inactivity window) and conjunction (flags)
/// of the two. See [`WireFormatInfo::negotiate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFormatInfo {
    /// Protocol version.
    pub version: u32,
    /// Use the tight (variable-length) encoding.
    pub tight_encoding: bool,
    /// Cache repeated values on the wire.
    pub cache_enabled: bool,
    /// Inactivity window in milliseconds; zero disables monitoring.
    pub max_inactivity_duration_ms: u64,
}

impl WireFormatInfo {
    /// Computes the configuration both peers can support.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mqlink::commands::WireFormatInfo;
    ///
    /// let ours = WireFormatInfo { version: 2, tight_encoding: true, cache_enabled: true, max_inactivity_duration_ms: 30_000 };
    /// let theirs = WireFormatInfo { version: 1, tight_encoding: true, cache_enabled: false, max_inactivity_duration_ms: 10_000 };
    /// let agreed = ours.negotiate(&theirs);
    /// assert_eq!(agreed.version, 1);
    /// assert!(agreed.tight_encoding);
    /// assert!(!agreed.cache_enabled);
    /// assert_eq!(agreed.max_inactivity_duration_ms, 10_000);
    /// ```
    #[must_use]
    pub fn negotiate(&self, peer: &WireFormatInfo) -> WireFormatInfo {
        WireFormatInfo {
            version: self.version.min(peer.version),
            tight_encoding: self.tight_encoding && peer.tight_encoding,
            cache_enabled: self.cache_enabled && peer.cache_enabled,
            max_inactivity_duration_ms: self
                .max_inactivity_duration_ms
                .min(peer.max_inactivity_duration_ms),
        }
    }
}

/// Broker advisory about a destination being added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationInfo {
    /// The destination the event is about.
    pub destination: Destination,
    /// What happened to it.
    pub operation: DestinationOperation,
}

/// The event carried by a [`DestinationInfo`] advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationOperation {
    /// The destination was created.
    Add,
    /// The destination was removed.
    Remove,
}

/// Error description reported by the broker in an exception response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerError {
    /// Human-readable failure description.
    pub message: String,
    /// Broker-side error class, when the broker reports one.
    pub exception_class: Option<String>,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exception_class {
            Some(class) => write!(f, "{}: {}", class, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::queue("orders").to_string(), "queue://orders");
        assert_eq!(Destination::topic("prices").to_string(), "topic://prices");
    }

    #[test]
    fn test_advisory_destination() {
        let advisory = Destination::topic(Destination::ADVISORY_TOPIC);
        assert!(advisory.is_advisory());
        // A queue by the same name is not an advisory destination.
        assert!(!Destination::queue(Destination::ADVISORY_TOPIC).is_advisory());
    }

    #[test]
    fn test_negotiate_takes_minimum() {
        let ours = WireFormatInfo {
            version: 3,
            tight_encoding: true,
            cache_enabled: true,
            max_inactivity_duration_ms: 30_000,
        };
        let theirs = WireFormatInfo {
            version: 5,
            tight_encoding: false,
            cache_enabled: true,
            max_inactivity_duration_ms: 60_000,
        };
        let agreed = ours.negotiate(&theirs);
        assert_eq!(agreed.version, 3);
        assert!(!agreed.tight_encoding);
        assert!(agreed.cache_enabled);
        assert_eq!(agreed.max_inactivity_duration_ms, 30_000);
    }

    #[test]
    fn test_broker_error_display() {
        let error = BrokerError {
            message: "no such destination".to_string(),
            exception_class: Some("InvalidDestination".to_string()),
        };
        assert_eq!(error.to_string(), "InvalidDestination: no such destination");
    }
}
