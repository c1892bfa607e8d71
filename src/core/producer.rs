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

//! Message producers.

use super::session::{AckMode, SessionCore};
use crate::commands::{
    CommandPayload, Destination, Message, MessageBody, MessageId, ProducerId, ProducerInfo,
};
use crate::error::MqlinkError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A producer on a session.
///
/// Producers created with a destination publish there; anonymous
/// producers name a destination per send. On a transacted session every
/// publish is tagged with the open transaction.
pub struct MessageProducer {
    info: ProducerInfo,
    session: Arc<SessionCore>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl MessageProducer {
    pub(crate) fn new(info: ProducerInfo, session: Arc<SessionCore>) -> Self {
        Self {
            info,
            session,
            sequence: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// This producer's id.
    #[must_use]
    pub fn producer_id(&self) -> &ProducerId {
        &self.info.producer_id
    }

    /// Publishes a text message to the producer's destination.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] on an anonymous producer; transport errors
    /// if the send fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<MessageId, MqlinkError> {
        self.send_with(None, MessageBody::Text(text.into()), HashMap::new(), true)
            .await
    }

    /// Publishes a binary message to the producer's destination.
    ///
    /// # Errors
    ///
    /// Same as [`send_text`](Self::send_text).
    pub async fn send_bytes(&self, bytes: Vec<u8>) -> Result<MessageId, MqlinkError> {
        self.send_with(None, MessageBody::Bytes(bytes), HashMap::new(), true)
            .await
    }

    /// Publishes to an explicit destination, overriding the default.
    ///
    /// # Errors
    ///
    /// Transport errors if the send fails.
    pub async fn send_to(
        &self,
        destination: &Destination,
        body: MessageBody,
    ) -> Result<MessageId, MqlinkError> {
        self.send_with(Some(destination), body, HashMap::new(), true)
            .await
    }

    /// Publishes with full control over destination, properties and
    /// persistence.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] when no destination is available.
    pub async fn send_with(
        &self,
        destination: Option<&Destination>,
        body: MessageBody,
        properties: HashMap<String, String>,
        persistent: bool,
    ) -> Result<MessageId, MqlinkError> {
        self.check_open("send")?;
        let destination = destination
            .or(self.info.destination.as_ref())
            .ok_or_else(|| MqlinkError::usage("anonymous producer requires a destination"))?
            .clone();

        let transaction_id = if self.session.ack_mode == AckMode::Transacted {
            match self.session.transaction.lock().as_ref() {
                Some(context) => Some(context.id().clone()),
                None => return Err(MqlinkError::usage("send outside an open transaction")),
            }
        } else {
            None
        };

        let message_id = MessageId::new(
            &self.info.producer_id,
            self.sequence.fetch_add(1, Ordering::Relaxed),
        );
        let message = Message {
            message_id: message_id.clone(),
            destination,
            transaction_id,
            body,
            properties,
            persistent,
        };
        self.session
            .connection
            .oneway(CommandPayload::Message(message))
            .await?;
        Ok(message_id)
    }

    /// Closes the producer. Idempotent.
    pub async fn close(&self) -> Result<(), MqlinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.close_producer(&self.info.producer_id).await
    }

    fn check_open(&self, operation: &str) -> Result<(), MqlinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqlinkError::closed(
                format!("producer {}", self.info.producer_id),
                operation,
            ));
        }
        self.session.check_open(operation)
    }
}

impl std::fmt::Debug for MessageProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProducer")
            .field("producer_id", &self.info.producer_id)
            .field("destination", &self.info.destination)
            .finish()
    }
}
