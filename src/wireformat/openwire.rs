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

//! The binary wire protocol.
//!
//! Frames are a 4-byte big-endian length prefix followed by the command
//! body in a compact binary encoding:
//!
//! ```text
//! +-------------------+-------------------+
//! | Length (4 bytes)  | Body (N bytes)    |
//! +-------------------+-------------------+
//! ```
//!
//! The protocol negotiates per-connection options (version, tight
//! encoding, value caching, inactivity window) through a
//! [`WireFormatInfo`] exchange driven by the negotiation filter.

use super::{ProtocolError, WireFormat, MAX_FRAME_SIZE};
use crate::commands::{Command, WireFormatInfo};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version this implementation speaks.
pub const OPENWIRE_VERSION: u32 = 1;

/// Default inactivity window proposed during negotiation (30 seconds).
pub const DEFAULT_MAX_INACTIVITY_MS: u64 = 30_000;

/// Size of the frame length prefix in bytes.
const FRAME_HEADER_SIZE: usize = 4;

/// The binary wire format.
///
/// # Example
///
/// ```rust
/// use mqlink::commands::{Command, CommandPayload};
/// use mqlink::wireformat::{OpenWireFormat, WireFormat};
///
/// let wire_format = OpenWireFormat::new();
/// let command = Command::new(CommandPayload::KeepAliveInfo);
///
/// let bytes = wire_format.marshal(&command).unwrap();
/// let decoded = wire_format.unmarshal(&bytes).unwrap();
/// assert_eq!(command, decoded);
/// ```
#[derive(Debug)]
pub struct OpenWireFormat {
    preferred: WireFormatInfo,
    options: RwLock<WireFormatInfo>,
}

impl OpenWireFormat {
    /// Creates a wire format with the default preferred options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_preferred(WireFormatInfo {
            version: OPENWIRE_VERSION,
            tight_encoding: true,
            cache_enabled: false,
            max_inactivity_duration_ms: DEFAULT_MAX_INACTIVITY_MS,
        })
    }

    /// Creates a wire format proposing the given options.
    #[must_use]
    pub fn with_preferred(preferred: WireFormatInfo) -> Self {
        let options = RwLock::new(preferred.clone());
        Self { preferred, options }
    }
}

impl Default for OpenWireFormat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WireFormat for OpenWireFormat {
    fn name(&self) -> &'static str {
        "openwire"
    }

    fn preferred_wire_format_info(&self) -> WireFormatInfo {
        self.preferred.clone()
    }

    fn configure(&self, info: &WireFormatInfo) {
        *self.options.write() = info.clone();
    }

    fn current_wire_format_info(&self) -> WireFormatInfo {
        self.options.read().clone()
    }

    fn marshal(&self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        let body = postcard::to_allocvec(command).map_err(|e| ProtocolError::Encode {
            reason: e.to_string(),
        })?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: body.len() as u64,
                limit: MAX_FRAME_SIZE as u64,
            });
        }
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Command, ProtocolError> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Malformed {
                reason: format!("frame shorter than length prefix: {} bytes", bytes.len()),
            });
        }
        let length = u32::from_be_bytes(
            bytes[0..FRAME_HEADER_SIZE]
                .try_into()
                .expect("prefix is four bytes"),
        ) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length as u64,
                limit: MAX_FRAME_SIZE as u64,
            });
        }
        let body = &bytes[FRAME_HEADER_SIZE..];
        if body.len() != length {
            return Err(ProtocolError::Malformed {
                reason: format!("frame announced {} body bytes, got {}", length, body.len()),
            });
        }
        postcard::from_bytes(body).map_err(|e| ProtocolError::Decode {
            reason: e.to_string(),
        })
    }

    async fn read_command(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, ProtocolError> {
        let mut prefix = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut prefix).await?;
        let length = u32::from_be_bytes(prefix) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length as u64,
                limit: MAX_FRAME_SIZE as u64,
            });
        }
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        postcard::from_bytes(&body).map_err(|e| ProtocolError::Decode {
            reason: e.to_string(),
        })
    }

    async fn write_command(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProtocolError> {
        let frame = self.marshal(command)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        CommandPayload, ConnectionId, ConnectionInfo, Destination, Message, MessageBody, MessageId,
        Response,
    };
    use std::collections::HashMap;

    fn sample_message() -> Command {
        let producer = ConnectionId::new("ID:t").session_id(1).producer_id(1);
        Command::new(CommandPayload::Message(Message {
            message_id: MessageId::new(&producer, 1),
            destination: Destination::queue("orders"),
            transaction_id: None,
            body: MessageBody::Text("hello".to_string()),
            properties: HashMap::new(),
            persistent: true,
        }))
    }

    #[test]
    fn test_marshal_unmarshal_roundtrip() {
        let wire_format = OpenWireFormat::new();
        let command = sample_message();
        let bytes = wire_format.marshal(&command).unwrap();
        assert_eq!(wire_format.unmarshal(&bytes).unwrap(), command);
    }

    #[test]
    fn test_frame_has_length_prefix() {
        let wire_format = OpenWireFormat::new();
        let bytes = wire_format
            .marshal(&Command::new(CommandPayload::KeepAliveInfo))
            .unwrap();
        let announced = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(announced, bytes.len() - 4);
    }

    #[test]
    fn test_unmarshal_truncated_frame() {
        let wire_format = OpenWireFormat::new();
        let mut bytes = wire_format.marshal(&sample_message()).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            wire_format.unmarshal(&bytes),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unmarshal_oversized_frame() {
        let wire_format = OpenWireFormat::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_be_bytes());
        assert!(matches!(
            wire_format.unmarshal(&bytes),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_configure_replaces_options() {
        let wire_format = OpenWireFormat::new();
        let negotiated = WireFormatInfo {
            version: 1,
            tight_encoding: false,
            cache_enabled: false,
            max_inactivity_duration_ms: 5_000,
        };
        wire_format.configure(&negotiated);
        assert_eq!(wire_format.current_wire_format_info(), negotiated);
        // The preferred info is what negotiation proposes, unchanged.
        assert_eq!(
            wire_format.preferred_wire_format_info().max_inactivity_duration_ms,
            DEFAULT_MAX_INACTIVITY_MS
        );
    }

    #[tokio::test]
    async fn test_stream_roundtrip() {
        let wire_format = OpenWireFormat::new();
        let commands = vec![
            sample_message(),
            Command::new(CommandPayload::ConnectionInfo(ConnectionInfo {
                connection_id: ConnectionId::new("ID:t"),
                client_id: "client".to_string(),
            })),
            Response::ok(7).into_command(),
        ];

        let mut buffer = Vec::new();
        for command in &commands {
            wire_format
                .write_command(command, &mut buffer)
                .await
                .unwrap();
        }

        let mut reader = &buffer[..];
        for expected in &commands {
            let decoded = wire_format.read_command(&mut reader).await.unwrap();
            assert_eq!(&decoded, expected);
        }
    }

    #[tokio::test]
    async fn test_read_eof_is_io_error() {
        let wire_format = OpenWireFormat::new();
        let mut reader: &[u8] = &[];
        let result = wire_format.read_command(&mut reader).await;
        assert!(matches!(result, Err(ProtocolError::Io { .. })));
    }
}
