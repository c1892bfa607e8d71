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

//! Wire formats: encoding and decoding of commands with framing.
//!
//! A [`WireFormat`] turns [`Command`]s into bytes and back, and knows how to
//! delimit them on a byte stream. Two implementations ship with the crate:
//!
//! - [`OpenWireFormat`]: length-prefixed frames with a compact binary body.
//!   Supports the full command set and per-connection option negotiation.
//! - [`StompWireFormat`]: the STOMP text protocol. Commands that STOMP can
//!   express map to frames; purely client-local commands (session and
//!   producer bookkeeping) have no wire representation and are skipped.
//!
//! The wire format object is shared between the raw transport (which calls
//! [`read_command`](WireFormat::read_command) /
//! [`write_command`](WireFormat::write_command)) and the negotiation filter
//! (which calls [`configure`](WireFormat::configure) once the peer's
//! [`WireFormatInfo`] arrives), so option storage uses interior mutability.

mod error;
mod openwire;
mod stomp;

pub use error::ProtocolError;
pub use openwire::{OpenWireFormat, DEFAULT_MAX_INACTIVITY_MS, OPENWIRE_VERSION};
pub use stomp::{StompFrame, StompWireFormat};

use crate::commands::{Command, WireFormatInfo};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Largest frame either codec will produce or accept (16 MB).
///
/// The limit bounds memory consumed by a single inbound frame; a peer
/// announcing more is treated as desynchronized.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode/decode capability for one wire protocol.
///
/// The core depends only on this contract, never on a specific byte layout.
#[async_trait]
pub trait WireFormat: Send + Sync {
    /// Short protocol name, e.g. `"openwire"` or `"stomp"`.
    fn name(&self) -> &'static str;

    /// The options this side proposes during negotiation.
    fn preferred_wire_format_info(&self) -> WireFormatInfo;

    /// Applies negotiated options. Called by the negotiation filter before
    /// any non-negotiation traffic is allowed through.
    fn configure(&self, info: &WireFormatInfo);

    /// The currently effective options: the negotiated set once
    /// [`configure`](Self::configure) has run, the preferred set before.
    fn current_wire_format_info(&self) -> WireFormatInfo;

    /// Encodes a command to its framed byte representation.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsupportedCommand`] if the protocol cannot
    /// express the command, or an encode error.
    fn marshal(&self, command: &Command) -> Result<Vec<u8>, ProtocolError>;

    /// Decodes a single framed command from bytes.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the bytes do not form exactly one valid
    /// frame.
    fn unmarshal(&self, bytes: &[u8]) -> Result<Command, ProtocolError>;

    /// Reads the next command off an async byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] for stream failures (including EOF)
    /// and codec errors for malformed frames.
    async fn read_command(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Command, ProtocolError>;

    /// Writes one command to an async byte stream, flushing it.
    ///
    /// Commands the protocol cannot express are skipped silently — the
    /// caller treats the write as complete. Only [`marshal`](Self::marshal)
    /// reports inexpressible commands as errors.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] for stream failures and encode errors
    /// for unencodable payloads.
    async fn write_command(
        &self,
        command: &Command,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProtocolError>;
}
