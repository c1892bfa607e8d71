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

//! The command model: wire-level message units, ids and payloads.
//!
//! A [`Command`] is the unit of exchange between client and broker,
//! regardless of which wire protocol carries it. Each command has an
//! identity assigned per connection, a response-required flag, and a
//! payload from a closed set: resource creation infos, message traffic,
//! acknowledgments, transaction control, negotiation and responses.

mod command;
mod ids;
mod info;

pub use command::{Command, CommandPayload, Response, ResponseBody};
pub use ids::{
    ConnectionId, ConnectionIdGenerator, ConsumerId, MessageId, ProducerId, SequenceGenerator,
    SessionId, TransactionId,
};
pub use info::{
    AckType, BrokerError, ConnectionInfo, ConsumerInfo, Destination, DestinationInfo,
    DestinationKind, DestinationOperation, Message, MessageAck, MessageBody, MessageDispatch,
    MessagePull, ProducerInfo, RemoveInfo, SessionInfo, TransactionAction, TransactionInfo,
    WireFormatInfo,
};
