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

//! The STOMP text protocol.
//!
//! A frame is a command line, a header block and a NUL-terminated body:
//!
//! ```text
//! SEND\n
//! destination:/queue/orders\n
//! content-length:5\n
//! \n
//! hello\0
//! ```
//!
//! Header names and values escape `\r`, `\n`, `:` and `\` per STOMP 1.2.
//! A bare newline is a heartbeat. Bodies with a `content-length` header may
//! contain NUL bytes; without one the body runs to the first NUL.
//!
//! Command mapping: commands STOMP can express become frames (`CONNECT`,
//! `SUBSCRIBE`, `UNSUBSCRIBE`, `SEND`, `ACK`, `BEGIN`/`COMMIT`/`ABORT`,
//! `DISCONNECT`, plus `RECEIPT`/`ERROR`/`MESSAGE`/`CONNECTED` inbound);
//! purely client-local commands (session and producer bookkeeping, message
//! pulls) have no frame and are skipped on write. The decoder accepts the
//! broker-originated verbs only — this is a client library.

use super::{ProtocolError, WireFormat, MAX_FRAME_SIZE};
use crate::commands::{
    AckType, BrokerError, Command, CommandPayload, ConnectionId, ConsumerId, Destination, Message,
    MessageBody, MessageDispatch, MessageId, RemoveInfo, Response, TransactionAction,
    WireFormatInfo,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted command or header line.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// A parsed STOMP frame.
///
/// # Example
///
/// ```rust
/// use mqlink::wireformat::StompFrame;
///
/// let frame = StompFrame::new("SEND")
///     .with_header("destination", "/queue/orders")
///     .with_body(b"hello".to_vec());
///
/// let encoded = frame.encode();
/// let decoded = StompFrame::decode(&encoded).unwrap();
/// assert_eq!(decoded.command(), "SEND");
/// assert_eq!(decoded.header("destination"), Some("/queue/orders"));
/// assert_eq!(decoded.body(), b"hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    command: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl StompFrame {
    /// Creates a frame with the given command verb.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a heartbeat: the empty frame encoded as a bare newline.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self {
            command: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Returns `true` if this frame is a heartbeat.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.command.is_empty()
    }

    /// Returns the command verb.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the first value of the named header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns all headers in order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Encodes the frame, NUL terminator included.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        if self.is_heartbeat() {
            return vec![b'\n'];
        }
        let mut bytes = Vec::with_capacity(64 + self.body.len());
        bytes.extend_from_slice(self.command.as_bytes());
        bytes.push(b'\n');
        for (name, value) in &self.headers {
            bytes.extend_from_slice(escape_header(name).as_bytes());
            bytes.push(b':');
            bytes.extend_from_slice(escape_header(value).as_bytes());
            bytes.push(b'\n');
        }
        bytes.push(b'\n');
        bytes.extend_from_slice(&self.body);
        bytes.push(0);
        bytes
    }

    /// Decodes exactly one frame from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the bytes are not exactly
    /// one well-formed frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = bytes;

        let command = take_line(&mut cursor)?;
        if command.is_empty() {
            return if cursor.is_empty() {
                Ok(Self::heartbeat())
            } else {
                Err(ProtocolError::Malformed {
                    reason: format!("{} trailing bytes after heartbeat", cursor.len()),
                })
            };
        }

        let mut headers = Vec::new();
        let mut content_length: Option<usize> = None;
        loop {
            let line = take_line(&mut cursor)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = split_header(&line)?;
            if name == "content-length" {
                content_length = Some(parse_content_length(&value)?);
            }
            headers.push((name, value));
        }

        let body_length = match content_length {
            Some(length) => length,
            None => cursor
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ProtocolError::Malformed {
                    reason: "body not NUL-terminated".to_string(),
                })?,
        };
        if cursor.len() < body_length + 1 || cursor[body_length] != 0 {
            return Err(ProtocolError::Malformed {
                reason: "body not NUL-terminated".to_string(),
            });
        }
        let body = cursor[..body_length].to_vec();
        let rest = &cursor[body_length + 1..];
        if !rest.is_empty() {
            return Err(ProtocolError::Malformed {
                reason: format!("{} trailing bytes after frame", rest.len()),
            });
        }

        Ok(Self {
            command,
            headers,
            body,
        })
    }

    /// Reads one frame (or heartbeat) off an async byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] for stream failures and
    /// [`ProtocolError::Malformed`] for grammar violations.
    pub async fn read_from(
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Self, ProtocolError> {
        // Command line. A bare EOL here is a heartbeat.
        let command = read_line(reader).await?;
        if command.is_empty() {
            return Ok(Self::heartbeat());
        }

        let mut headers = Vec::new();
        let mut content_length: Option<usize> = None;
        loop {
            let line = read_line(reader).await?;
            if line.is_empty() {
                break;
            }
            let (name, value) = split_header(&line)?;
            if name == "content-length" {
                content_length = Some(parse_content_length(&value)?);
            }
            headers.push((name, value));
        }

        let body = match content_length {
            Some(length) => {
                let mut body = vec![0u8; length];
                reader.read_exact(&mut body).await?;
                let terminator = reader.read_u8().await?;
                if terminator != 0 {
                    return Err(ProtocolError::Malformed {
                        reason: "body not NUL-terminated after content-length".to_string(),
                    });
                }
                body
            }
            None => {
                let mut body = Vec::new();
                loop {
                    let byte = reader.read_u8().await?;
                    if byte == 0 {
                        break;
                    }
                    if body.len() >= MAX_FRAME_SIZE {
                        return Err(ProtocolError::FrameTooLarge {
                            size: body.len() as u64 + 1,
                            limit: MAX_FRAME_SIZE as u64,
                        });
                    }
                    body.push(byte);
                }
                body
            }
        };

        Ok(Self {
            command,
            headers,
            body,
        })
    }

    /// Writes the frame to an async byte stream, flushing it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] for stream failures.
    pub async fn write_to(
        &self,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProtocolError> {
        let encoded = self.encode();
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Reads a line terminated by `\n`, stripping an optional `\r`.
async fn read_line(reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, ProtocolError> {
    let mut line = Vec::new();
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_LINE_LENGTH {
            return Err(ProtocolError::Malformed {
                reason: "header line too long".to_string(),
            });
        }
        line.push(byte);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| ProtocolError::Malformed {
        reason: "header line is not UTF-8".to_string(),
    })
}

/// Takes one `\n`-terminated line off a byte cursor, stripping `\r`.
fn take_line(cursor: &mut &[u8]) -> Result<String, ProtocolError> {
    let end = cursor
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| ProtocolError::Malformed {
            reason: "unterminated line".to_string(),
        })?;
    if end > MAX_LINE_LENGTH {
        return Err(ProtocolError::Malformed {
            reason: "header line too long".to_string(),
        });
    }
    let mut line = &cursor[..end];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let line = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Malformed {
            reason: "header line is not UTF-8".to_string(),
        })?
        .to_owned();
    *cursor = &cursor[end + 1..];
    Ok(line)
}

/// Splits a header line at the first unescaped separator.
fn split_header(line: &str) -> Result<(String, String), ProtocolError> {
    let split = line.find(':').ok_or_else(|| ProtocolError::Malformed {
        reason: format!("header line without separator: {:?}", line),
    })?;
    let name = unescape_header(&line[..split])?;
    let value = unescape_header(&line[split + 1..])?;
    Ok((name, value))
}

fn parse_content_length(value: &str) -> Result<usize, ProtocolError> {
    let length = value
        .parse::<usize>()
        .map_err(|_| ProtocolError::Malformed {
            reason: format!("invalid content-length: {:?}", value),
        })?;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length as u64,
            limit: MAX_FRAME_SIZE as u64,
        });
    }
    Ok(length)
}

fn escape_header(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            ':' => escaped.push_str("\\c"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_header(raw: &str) -> Result<String, ProtocolError> {
    let mut unescaped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            unescaped.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('r') => unescaped.push('\r'),
            Some('n') => unescaped.push('\n'),
            Some('c') => unescaped.push(':'),
            other => {
                return Err(ProtocolError::Malformed {
                    reason: format!("invalid header escape: \\{:?}", other),
                })
            }
        }
    }
    Ok(unescaped)
}

fn destination_to_path(destination: &Destination) -> String {
    if destination.is_topic() {
        format!("/topic/{}", destination.name())
    } else {
        format!("/queue/{}", destination.name())
    }
}

fn destination_from_path(path: &str) -> Result<Destination, ProtocolError> {
    if let Some(name) = path.strip_prefix("/queue/") {
        Ok(Destination::queue(name))
    } else if let Some(name) = path.strip_prefix("/topic/") {
        Ok(Destination::topic(name))
    } else {
        Err(ProtocolError::Malformed {
            reason: format!("invalid destination path: {:?}", path),
        })
    }
}

fn consumer_id_from_subscription(raw: &str) -> Result<ConsumerId, ProtocolError> {
    let mut parts = raw.rsplitn(3, ':');
    let value = parts.next().and_then(|p| p.parse::<u32>().ok());
    let session = parts.next().and_then(|p| p.parse::<u32>().ok());
    let connection = parts.next();
    match (connection, session, value) {
        (Some(connection), Some(session), Some(value)) => Ok(ConnectionId::new(connection)
            .session_id(session)
            .consumer_id(value)),
        _ => Err(ProtocolError::Malformed {
            reason: format!("invalid subscription id: {:?}", raw),
        }),
    }
}

fn message_id_from_header(raw: &str) -> Result<MessageId, ProtocolError> {
    let mut parts = raw.rsplitn(2, ':');
    let sequence = parts.next().and_then(|p| p.parse::<u64>().ok());
    let producer = parts.next();
    match (producer, sequence) {
        (Some(producer), Some(sequence)) => Ok(raw_message_id(producer, sequence)),
        _ => Err(ProtocolError::Malformed {
            reason: format!("invalid message id: {:?}", raw),
        }),
    }
}

/// Builds a message id from the raw producer string carried on the wire.
fn raw_message_id(producer: &str, sequence: u64) -> MessageId {
    // MessageId derives from a ProducerId in local code; wire-side ids are
    // reconstructed from their string form without reparsing the hierarchy.
    let mut parts = producer.rsplitn(3, ':');
    let value = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    let session = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    let connection = parts.next().unwrap_or(producer);
    let producer_id = ConnectionId::new(connection)
        .session_id(session)
        .producer_id(value);
    MessageId::new(&producer_id, sequence)
}

/// Headers the MESSAGE decoder consumes; everything else becomes a property.
const RESERVED_HEADERS: &[&str] = &[
    "destination",
    "message-id",
    "subscription",
    "content-length",
    "redelivery-count",
    "persistent",
    "receipt",
    "transaction",
];

/// The STOMP wire format.
///
/// STOMP has no option negotiation; [`configure`](WireFormat::configure)
/// stores the info but nothing on the wire changes. Connections using this
/// format skip the negotiation filter entirely.
#[derive(Debug)]
pub struct StompWireFormat {
    options: RwLock<WireFormatInfo>,
}

impl StompWireFormat {
    /// Creates the STOMP wire format.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: RwLock::new(WireFormatInfo {
                version: 1,
                tight_encoding: false,
                cache_enabled: false,
                max_inactivity_duration_ms: 0,
            }),
        }
    }

    /// Maps a command to its frame, or `None` for client-local commands.
    fn command_to_frame(&self, command: &Command) -> Result<Option<StompFrame>, ProtocolError> {
        let mut frame = match command.payload() {
            CommandPayload::ConnectionInfo(info) => StompFrame::new("CONNECT")
                .with_header("accept-version", "1.2")
                .with_header("client-id", &info.client_id)
                .with_header("connection-id", info.connection_id.value()),
            CommandPayload::ConsumerInfo(info) => {
                let mut frame = StompFrame::new("SUBSCRIBE")
                    .with_header("destination", destination_to_path(&info.destination))
                    .with_header("id", info.consumer_id.to_string())
                    .with_header("ack", "client-individual")
                    .with_header("prefetch", info.prefetch_size.to_string());
                if let Some(selector) = &info.selector {
                    frame = frame.with_header("selector", selector);
                }
                if info.no_local {
                    frame = frame.with_header("no-local", "true");
                }
                frame
            }
            CommandPayload::RemoveInfo(RemoveInfo::Consumer(id)) => {
                StompFrame::new("UNSUBSCRIBE").with_header("id", id.to_string())
            }
            CommandPayload::RemoveInfo(RemoveInfo::Connection(_))
            | CommandPayload::ShutdownInfo => StompFrame::new("DISCONNECT"),
            CommandPayload::RemoveInfo(_) => return Ok(None),
            CommandPayload::Message(message) => {
                let mut frame = StompFrame::new("SEND")
                    .with_header("destination", destination_to_path(&message.destination))
                    .with_header("message-id", message.message_id.to_string())
                    .with_header("persistent", message.persistent.to_string());
                if let Some(transaction_id) = &message.transaction_id {
                    frame = frame.with_header("transaction", transaction_id.to_string());
                }
                for (name, value) in &message.properties {
                    frame = frame.with_header(name, value);
                }
                match &message.body {
                    MessageBody::Text(text) => frame.with_body(text.clone().into_bytes()),
                    MessageBody::Bytes(bytes) => frame
                        .with_header("content-length", bytes.len().to_string())
                        .with_body(bytes.clone()),
                    MessageBody::Advisory(_) => {
                        return Err(ProtocolError::UnsupportedCommand {
                            command: "Message(Advisory)",
                        })
                    }
                }
            }
            CommandPayload::MessageDispatch(dispatch) => {
                let message = &dispatch.message;
                let mut frame = StompFrame::new("MESSAGE")
                    .with_header("destination", destination_to_path(&message.destination))
                    .with_header("message-id", message.message_id.to_string())
                    .with_header("subscription", dispatch.consumer_id.to_string())
                    .with_header("redelivery-count", dispatch.redelivery_counter.to_string());
                match &message.body {
                    MessageBody::Text(text) => frame.with_body(text.clone().into_bytes()),
                    MessageBody::Bytes(bytes) => frame
                        .with_header("content-length", bytes.len().to_string())
                        .with_body(bytes.clone()),
                    MessageBody::Advisory(_) => {
                        return Err(ProtocolError::UnsupportedCommand {
                            command: "MessageDispatch(Advisory)",
                        })
                    }
                }
            }
            CommandPayload::MessageAck(ack) => {
                let mut frame = StompFrame::new("ACK")
                    .with_header("subscription", ack.consumer_id.to_string())
                    .with_header("message-id", ack.last_message_id.to_string())
                    .with_header("count", ack.message_count.to_string());
                if matches!(ack.ack_type, AckType::Individual) {
                    frame = frame.with_header("ack-type", "individual");
                }
                if let Some(transaction_id) = &ack.transaction_id {
                    frame = frame.with_header("transaction", transaction_id.to_string());
                }
                frame
            }
            CommandPayload::TransactionInfo(info) => {
                let verb = match info.action {
                    TransactionAction::Begin => "BEGIN",
                    TransactionAction::Commit => "COMMIT",
                    TransactionAction::Rollback => "ABORT",
                };
                StompFrame::new(verb).with_header("transaction", info.transaction_id.to_string())
            }
            CommandPayload::KeepAliveInfo => StompFrame::heartbeat(),
            CommandPayload::Response(response) => match response.error() {
                None => {
                    StompFrame::new("RECEIPT")
                        .with_header("receipt-id", response.correlation_id().to_string())
                }
                Some(error) => StompFrame::new("ERROR")
                    .with_header("receipt-id", response.correlation_id().to_string())
                    .with_header("message", &error.message)
                    .with_body(error.message.clone().into_bytes()),
            },
            CommandPayload::SessionInfo(_)
            | CommandPayload::ProducerInfo(_)
            | CommandPayload::MessagePull(_)
            | CommandPayload::WireFormatInfo(_)
            | CommandPayload::DestinationInfo(_) => return Ok(None),
        };
        if command.response_required() && !frame.is_heartbeat() && frame.command() != "CONNECT" {
            frame = frame.with_header("receipt", command.command_id().to_string());
        }
        Ok(Some(frame))
    }

    /// Maps a broker-originated frame back to a command.
    fn frame_to_command(&self, frame: StompFrame) -> Result<Command, ProtocolError> {
        if frame.is_heartbeat() {
            return Ok(Command::new(CommandPayload::KeepAliveInfo));
        }
        match frame.command() {
            // CONNECT carries no receipt header, but it is always the first
            // command on a connection, so CONNECTED answers command id 1.
            "CONNECTED" => Ok(Response::ok(1).into_command()),
            "RECEIPT" => {
                let correlation_id = frame
                    .header("receipt-id")
                    .and_then(|v| v.parse::<u32>().ok())
                    .ok_or_else(|| ProtocolError::Malformed {
                        reason: "RECEIPT without numeric receipt-id".to_string(),
                    })?;
                Ok(Response::ok(correlation_id).into_command())
            }
            "ERROR" => {
                let correlation_id = frame
                    .header("receipt-id")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(0);
                let message = frame
                    .header("message")
                    .map(str::to_owned)
                    .unwrap_or_else(|| String::from_utf8_lossy(frame.body()).into_owned());
                let error = BrokerError {
                    message,
                    exception_class: None,
                };
                Ok(Response::exception(correlation_id, error).into_command())
            }
            "MESSAGE" => {
                let destination = destination_from_path(frame.header("destination").ok_or_else(
                    || ProtocolError::Malformed {
                        reason: "MESSAGE without destination".to_string(),
                    },
                )?)?;
                let message_id =
                    message_id_from_header(frame.header("message-id").ok_or_else(|| {
                        ProtocolError::Malformed {
                            reason: "MESSAGE without message-id".to_string(),
                        }
                    })?)?;
                let consumer_id = consumer_id_from_subscription(
                    frame
                        .header("subscription")
                        .ok_or_else(|| ProtocolError::Malformed {
                            reason: "MESSAGE without subscription".to_string(),
                        })?,
                )?;
                let redelivery_counter = frame
                    .header("redelivery-count")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(0);
                let persistent = frame
                    .header("persistent")
                    .map(|v| v == "true")
                    .unwrap_or(true);
                let mut properties = HashMap::new();
                for (name, value) in frame.headers() {
                    if !RESERVED_HEADERS.contains(&name.as_str()) {
                        properties.insert(name.clone(), value.clone());
                    }
                }
                let body = if frame.header("content-length").is_some() {
                    MessageBody::Bytes(frame.body().to_vec())
                } else {
                    match String::from_utf8(frame.body().to_vec()) {
                        Ok(text) => MessageBody::Text(text),
                        Err(error) => MessageBody::Bytes(error.into_bytes()),
                    }
                };
                Ok(Command::new(CommandPayload::MessageDispatch(
                    MessageDispatch {
                        consumer_id,
                        message: Message {
                            message_id,
                            destination,
                            transaction_id: None,
                            body,
                            properties,
                            persistent,
                        },
                        redelivery_counter,
                    },
                )))
            }
            other => Err(ProtocolError::UnknownCommand {
                name: other.to_string(),
            }),
        }
    }
}

impl Default for StompWireFormat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WireFormat for StompWireFormat {
    fn name(&self) -> &'static str {
        "stomp"
    }

    fn preferred_wire_format_info(&self) -> WireFormatInfo {
        self.options.read().clone()
    }

    fn configure(&self, info: &WireFormatInfo) {
        *self.options.write() = info.clone();
    }

    fn current_wire_format_info(&self) -> WireFormatInfo {
        self.options.read().clone()
    }

    fn marshal(&self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        match self.command_to_frame(command)? {
            Some(frame) => Ok(frame.encode()),
            None => Err(ProtocolError::UnsupportedCommand {
                command: command.type_name(),
            }),
        }
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Command, ProtocolError> {
        self.frame_to_command(StompFrame::decode(bytes)?)
    }

    async fn read_command(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, ProtocolError> {
        let frame = StompFrame::read_from(reader).await?;
        self.frame_to_command(frame)
    }

    async fn write_command(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProtocolError> {
        match self.command_to_frame(command)? {
            Some(frame) => frame.write_to(writer).await,
            None => {
                tracing::trace!(
                    command = command.type_name(),
                    "command has no STOMP representation, skipping"
                );
                Ok(())
            }
        }
    }
}
