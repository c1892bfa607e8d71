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

//! The wire-level unit of exchange.
//!
//! Every frame that crosses a transport is a [`Command`]: an id assigned by
//! the response correlator, a flag saying whether the sender expects a
//! [`Response`], and one payload out of a closed set. Commands are plain
//! values — failover replay and correlation each clone what they need
//! rather than sharing the original sender's copy.

use super::info::{
    BrokerError, ConnectionInfo, ConsumerInfo, DestinationInfo, Message, MessageAck,
    MessageDispatch, MessagePull, ProducerInfo, RemoveInfo, SessionInfo, TransactionInfo,
    WireFormatInfo,
};
use serde::{Deserialize, Serialize};

/// A single protocol-level message unit.
///
/// # Example
///
/// ```rust
/// use mqlink::commands::{Command, CommandPayload};
///
/// let command = Command::new(CommandPayload::KeepAliveInfo);
/// assert_eq!(command.command_id(), 0);
/// assert!(!command.response_required());
/// assert!(!command.is_response());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    command_id: u32,
    response_required: bool,
    payload: CommandPayload,
}

/// The closed set of payloads a [`Command`] can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Connection creation.
    ConnectionInfo(ConnectionInfo),
    /// Session creation.
    SessionInfo(SessionInfo),
    /// Consumer creation.
    ConsumerInfo(ConsumerInfo),
    /// Producer creation.
    ProducerInfo(ProducerInfo),
    /// Transaction begin/commit/rollback.
    TransactionInfo(TransactionInfo),
    /// Outbound message publish.
    Message(Message),
    /// Inbound message delivery.
    MessageDispatch(MessageDispatch),
    /// Message acknowledgment.
    MessageAck(MessageAck),
    /// Pull request for a zero-prefetch consumer.
    MessagePull(MessagePull),
    /// Resource teardown.
    RemoveInfo(RemoveInfo),
    /// Wire-format negotiation info.
    WireFormatInfo(WireFormatInfo),
    /// Liveness probe.
    KeepAliveInfo,
    /// Orderly connection shutdown.
    ShutdownInfo,
    /// Broker advisory about a destination.
    DestinationInfo(DestinationInfo),
    /// Answer to an earlier command.
    Response(Response),
}

impl CommandPayload {
    /// Short name of the payload variant, for logs.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            CommandPayload::ConnectionInfo(_) => "ConnectionInfo",
            CommandPayload::SessionInfo(_) => "SessionInfo",
            CommandPayload::ConsumerInfo(_) => "ConsumerInfo",
            CommandPayload::ProducerInfo(_) => "ProducerInfo",
            CommandPayload::TransactionInfo(_) => "TransactionInfo",
            CommandPayload::Message(_) => "Message",
            CommandPayload::MessageDispatch(_) => "MessageDispatch",
            CommandPayload::MessageAck(_) => "MessageAck",
            CommandPayload::MessagePull(_) => "MessagePull",
            CommandPayload::RemoveInfo(_) => "RemoveInfo",
            CommandPayload::WireFormatInfo(_) => "WireFormatInfo",
            CommandPayload::KeepAliveInfo => "KeepAliveInfo",
            CommandPayload::ShutdownInfo => "ShutdownInfo",
            CommandPayload::DestinationInfo(_) => "DestinationInfo",
            CommandPayload::Response(_) => "Response",
        }
    }
}

impl Command {
    /// Creates a command with id 0 and no response required.
    ///
    /// The response correlator assigns the real id when the command is
    /// handed to the transport chain.
    #[must_use]
    pub fn new(payload: CommandPayload) -> Self {
        Self {
            command_id: 0,
            response_required: false,
            payload,
        }
    }

    /// Returns the command id.
    #[must_use]
    pub const fn command_id(&self) -> u32 {
        self.command_id
    }

    /// Sets the command id.
    pub fn set_command_id(&mut self, id: u32) {
        self.command_id = id;
    }

    /// Returns `true` if the sender expects a [`Response`].
    #[must_use]
    pub const fn response_required(&self) -> bool {
        self.response_required
    }

    /// Sets the response-required flag.
    pub fn set_response_required(&mut self, required: bool) {
        self.response_required = required;
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &CommandPayload {
        &self.payload
    }

    /// Consumes the command and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> CommandPayload {
        self.payload
    }

    /// Returns `true` if this command is a response.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self.payload, CommandPayload::Response(_))
    }

    /// Returns `true` if this command is an inbound message delivery.
    #[must_use]
    pub const fn is_message_dispatch(&self) -> bool {
        matches!(self.payload, CommandPayload::MessageDispatch(_))
    }

    /// Returns `true` if this command carries wire-format negotiation info.
    #[must_use]
    pub const fn is_wire_format_info(&self) -> bool {
        matches!(self.payload, CommandPayload::WireFormatInfo(_))
    }

    /// Returns the response payload, if this command is one.
    #[must_use]
    pub fn as_response(&self) -> Option<&Response> {
        match &self.payload {
            CommandPayload::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Short name of the payload variant, for logs.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}

/// Answer to an earlier command, matched by correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    correlation_id: u32,
    body: ResponseBody,
}

/// The outcome a [`Response`] reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// The command succeeded; nothing to return.
    Ok,
    /// The command failed on the peer.
    Exception(BrokerError),
    /// The command succeeded and produced a value.
    Data(Box<CommandPayload>),
}

impl Response {
    /// Creates a success response correlated to `correlation_id`.
    #[must_use]
    pub const fn ok(correlation_id: u32) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Ok,
        }
    }

    /// Creates an exception response correlated to `correlation_id`.
    #[must_use]
    pub const fn exception(correlation_id: u32, error: BrokerError) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Exception(error),
        }
    }

    /// Creates a data response correlated to `correlation_id`.
    #[must_use]
    pub fn data(correlation_id: u32, payload: CommandPayload) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Data(Box::new(payload)),
        }
    }

    /// Returns the command id of the request this response answers.
    #[must_use]
    pub const fn correlation_id(&self) -> u32 {
        self.correlation_id
    }

    /// Returns the response body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Returns `true` if the response reports a peer-side failure.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception(_))
    }

    /// Returns the broker error, if this is an exception response.
    #[must_use]
    pub fn error(&self) -> Option<&BrokerError> {
        match &self.body {
            ResponseBody::Exception(error) => Some(error),
            _ => None,
        }
    }

    /// Wraps this response in a command, ready to send.
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::new(CommandPayload::Response(self))
    }
}
