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

//! Sessions: the unit of message ordering and acknowledgment.
//!
//! A session creates consumers and producers and owns the acknowledgment
//! policy. Resource registration always precedes the creation command on
//! the wire, so failover replay sees every resource that should exist.
//!
//! Transacted sessions batch acknowledgments into the open transaction:
//! nothing reaches the wire until [`commit`](Session::commit); after
//! [`rollback`](Session::rollback) the batch is discarded and never sent.

use super::connection::ConnectionCore;
use super::consumer::{ConsumerOptions, MessageConsumer};
use super::producer::MessageProducer;
use super::transaction::{Synchronization, TransactionContext};
use crate::commands::{
    AckType, CommandPayload, ConsumerId, ConsumerInfo, Destination, MessageAck, MessageId,
    ProducerId, ProducerInfo, RemoveInfo, SessionInfo, TransactionAction, TransactionInfo,
};
use crate::error::MqlinkError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Acknowledgment discipline of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Each message is acknowledged as soon as it is delivered (or after
    /// the listener returns without error).
    Auto,
    /// The application acknowledges explicitly; one acknowledgment covers
    /// everything delivered to that consumer since the last one.
    Client,
    /// The application acknowledges each message individually, possibly
    /// out of order.
    Individual,
    /// Acknowledgments batch into the open transaction and reach the wire
    /// at commit.
    Transacted,
}

/// A session on an open connection.
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    pub(crate) fn from_core(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Creates a consumer with default options.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or the broker is unreachable.
    pub async fn create_consumer(
        &self,
        destination: Destination,
    ) -> Result<MessageConsumer, MqlinkError> {
        self.create_consumer_with(destination, ConsumerOptions::default())
            .await
    }

    /// Creates a consumer with explicit options.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or the broker is unreachable.
    pub async fn create_consumer_with(
        &self,
        destination: Destination,
        options: ConsumerOptions,
    ) -> Result<MessageConsumer, MqlinkError> {
        self.core.check_open("create_consumer")?;
        let consumer_id = self
            .core
            .info
            .session_id
            .consumer_id(self.core.consumer_seq.next());
        let info = ConsumerInfo {
            consumer_id: consumer_id.clone(),
            destination,
            selector: options.selector,
            prefetch_size: options.prefetch_size,
            no_local: options.no_local,
        };

        // Queue first, then announce: a dispatch racing the creation
        // response must already find the queue.
        let receiver = self.core.connection.dispatcher.register(consumer_id.clone());
        self.core.consumers.lock().push(consumer_id.clone());

        if let Err(error) = self
            .core
            .connection
            .request(CommandPayload::ConsumerInfo(info.clone()))
            .await
        {
            self.core.connection.dispatcher.unregister(&consumer_id);
            self.core.consumers.lock().retain(|c| c != &consumer_id);
            return Err(error);
        }
        debug!(consumer = %consumer_id, destination = %info.destination, "consumer created");
        Ok(MessageConsumer::new(info, self.core.clone(), receiver))
    }

    /// Creates a producer. With `None` the producer is anonymous and each
    /// send names its destination.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or the broker is unreachable.
    pub async fn create_producer(
        &self,
        destination: Option<Destination>,
    ) -> Result<MessageProducer, MqlinkError> {
        self.core.check_open("create_producer")?;
        let producer_id = self
            .core
            .info
            .session_id
            .producer_id(self.core.producer_seq.next());
        let info = ProducerInfo {
            producer_id: producer_id.clone(),
            destination,
        };

        self.core.producers.lock().push(producer_id.clone());
        if let Err(error) = self
            .core
            .connection
            .oneway(CommandPayload::ProducerInfo(info.clone()))
            .await
        {
            self.core.producers.lock().retain(|p| p != &producer_id);
            return Err(error);
        }
        debug!(producer = %producer_id, "producer created");
        Ok(MessageProducer::new(info, self.core.clone()))
    }

    /// The session's acknowledgment mode.
    #[must_use]
    pub fn ack_mode(&self) -> AckMode {
        self.core.ack_mode
    }

    /// Registers a synchronization on the open transaction. Callbacks
    /// fire in registration order.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] on non-transacted sessions.
    pub fn add_synchronization(
        &self,
        synchronization: Arc<dyn Synchronization>,
    ) -> Result<(), MqlinkError> {
        self.core.check_open("add_synchronization")?;
        let mut transaction = self.core.transaction.lock();
        match transaction.as_mut() {
            Some(context) => {
                context.add_synchronization(synchronization);
                Ok(())
            }
            None => Err(MqlinkError::usage(
                "synchronizations require a transacted session",
            )),
        }
    }

    /// Commits the open transaction: deferred acknowledgments reach the
    /// wire, then the commit itself, then a fresh transaction begins.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] on non-transacted sessions;
    /// [`MqlinkError::Remote`] if the broker rejects the commit — the
    /// transaction is then rolled back locally.
    pub async fn commit(&self) -> Result<(), MqlinkError> {
        self.core.check_open("commit")?;
        let mut context = self.take_transaction("commit")?;

        context.fire_before_end();
        let transaction_id = context.id().clone();
        for ack in context.take_acks() {
            self.core
                .connection
                .oneway(CommandPayload::MessageAck(ack))
                .await?;
        }

        let result = self
            .core
            .connection
            .request(CommandPayload::TransactionInfo(TransactionInfo {
                transaction_id: transaction_id.clone(),
                action: TransactionAction::Commit,
            }))
            .await;

        match result {
            Ok(_) => {
                context.fire_after_commit();
                debug!(transaction = %transaction_id, "transaction committed");
                SessionCore::begin_transaction_on(&self.core).await?;
                Ok(())
            }
            Err(error) => {
                context.fire_after_rollback();
                warn!(transaction = %transaction_id, %error, "commit failed, rolled back");
                SessionCore::begin_transaction_on(&self.core).await?;
                Err(error)
            }
        }
    }

    /// Rolls the open transaction back. The deferred acknowledgment batch
    /// is discarded — nothing is ever sent for it — and a fresh
    /// transaction begins.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] on non-transacted sessions.
    pub async fn rollback(&self) -> Result<(), MqlinkError> {
        self.core.check_open("rollback")?;
        let mut context = self.take_transaction("rollback")?;

        context.fire_before_end();
        let transaction_id = context.id().clone();
        // Deferred acks die with the transaction.
        context.take_acks();

        self.core
            .connection
            .oneway(CommandPayload::TransactionInfo(TransactionInfo {
                transaction_id: transaction_id.clone(),
                action: TransactionAction::Rollback,
            }))
            .await?;
        context.fire_after_rollback();
        debug!(transaction = %transaction_id, "transaction rolled back");
        SessionCore::begin_transaction_on(&self.core).await?;
        Ok(())
    }

    /// Closes the session and everything under it. Idempotent.
    pub async fn close(&self) -> Result<(), MqlinkError> {
        SessionCore::close(&self.core).await
    }

    fn take_transaction(&self, operation: &str) -> Result<TransactionContext, MqlinkError> {
        if self.core.ack_mode != AckMode::Transacted {
            return Err(MqlinkError::usage(format!(
                "{} requires a transacted session",
                operation
            )));
        }
        self.core
            .transaction
            .lock()
            .take()
            .ok_or_else(|| MqlinkError::usage("no open transaction"))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.core.info.session_id)
            .field("ack_mode", &self.core.ack_mode)
            .finish()
    }
}

/// Shared session internals.
pub(crate) struct SessionCore {
    pub(crate) info: SessionInfo,
    pub(crate) ack_mode: AckMode,
    pub(crate) connection: Arc<ConnectionCore>,
    pub(crate) consumer_seq: crate::commands::SequenceGenerator,
    pub(crate) producer_seq: crate::commands::SequenceGenerator,
    consumers: Mutex<Vec<ConsumerId>>,
    producers: Mutex<Vec<ProducerId>>,
    pub(crate) transaction: Mutex<Option<TransactionContext>>,
    closed: AtomicBool,
}

impl SessionCore {
    pub(crate) fn new(
        info: SessionInfo,
        ack_mode: AckMode,
        connection: Arc<ConnectionCore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            info,
            ack_mode,
            connection,
            consumer_seq: crate::commands::SequenceGenerator::new(),
            producer_seq: crate::commands::SequenceGenerator::new(),
            consumers: Mutex::new(Vec::new()),
            producers: Mutex::new(Vec::new()),
            transaction: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn check_open(&self, operation: &str) -> Result<(), MqlinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqlinkError::closed(
                format!("session {}", self.info.session_id),
                operation,
            ));
        }
        self.connection.check_open(operation)
    }

    /// Opens the first transaction of a transacted session.
    pub(crate) async fn begin_transaction(this: &Arc<Self>) -> Result<(), MqlinkError> {
        Self::begin_transaction_on(this).await
    }

    async fn begin_transaction_on(this: &Arc<Self>) -> Result<(), MqlinkError> {
        let transaction_id = this
            .connection
            .connection_id
            .transaction_id(this.connection.transaction_seq.next());
        this.connection
            .oneway(CommandPayload::TransactionInfo(TransactionInfo {
                transaction_id: transaction_id.clone(),
                action: TransactionAction::Begin,
            }))
            .await?;
        *this.transaction.lock() = Some(TransactionContext::new(transaction_id));
        Ok(())
    }

    /// Post-delivery acknowledgment policy, shared by `receive()` and the
    /// listener path.
    pub(crate) async fn on_delivered(
        &self,
        consumer_id: &ConsumerId,
        message_id: &MessageId,
    ) -> Result<(), MqlinkError> {
        match self.ack_mode {
            AckMode::Auto => {
                self.send_ack(consumer_id, message_id, message_id, 1, AckType::Standard)
                    .await
            }
            AckMode::Transacted => {
                let mut transaction = self.transaction.lock();
                match transaction.as_mut() {
                    Some(context) => {
                        context.defer_ack(consumer_id, message_id);
                        Ok(())
                    }
                    None => Err(MqlinkError::usage("delivery outside an open transaction")),
                }
            }
            // The application acknowledges explicitly.
            AckMode::Client | AckMode::Individual => Ok(()),
        }
    }

    /// Client-mode acknowledgment of everything delivered so far.
    pub(crate) async fn acknowledge_batch(
        &self,
        consumer_id: &ConsumerId,
        delivered: Vec<MessageId>,
    ) -> Result<(), MqlinkError> {
        let (Some(first), Some(last)) = (delivered.first().cloned(), delivered.last().cloned())
        else {
            return Ok(());
        };
        self.send_ack(
            consumer_id,
            &first,
            &last,
            delivered.len() as u32,
            AckType::Standard,
        )
        .await
    }

    /// Individual-mode acknowledgment of exactly one message.
    pub(crate) async fn acknowledge_one(
        &self,
        consumer_id: &ConsumerId,
        message_id: &MessageId,
    ) -> Result<(), MqlinkError> {
        self.send_ack(consumer_id, message_id, message_id, 1, AckType::Individual)
            .await
    }

    async fn send_ack(
        &self,
        consumer_id: &ConsumerId,
        first: &MessageId,
        last: &MessageId,
        count: u32,
        ack_type: AckType,
    ) -> Result<(), MqlinkError> {
        self.connection
            .oneway(CommandPayload::MessageAck(MessageAck {
                consumer_id: consumer_id.clone(),
                transaction_id: None,
                first_message_id: first.clone(),
                last_message_id: last.clone(),
                message_count: count,
                ack_type,
            }))
            .await
    }

    /// Removes one consumer: queue first, then the broker.
    pub(crate) async fn close_consumer(&self, consumer_id: &ConsumerId) -> Result<(), MqlinkError> {
        let known = {
            let mut consumers = self.consumers.lock();
            let before = consumers.len();
            consumers.retain(|c| c != consumer_id);
            consumers.len() != before
        };
        if !known {
            return Ok(()); // already closed
        }
        self.connection.dispatcher.unregister(consumer_id);
        self.connection
            .oneway(CommandPayload::RemoveInfo(RemoveInfo::Consumer(
                consumer_id.clone(),
            )))
            .await
    }

    /// Removes one producer.
    pub(crate) async fn close_producer(&self, producer_id: &ProducerId) -> Result<(), MqlinkError> {
        let known = {
            let mut producers = self.producers.lock();
            let before = producers.len();
            producers.retain(|p| p != producer_id);
            producers.len() != before
        };
        if !known {
            return Ok(());
        }
        self.connection
            .oneway(CommandPayload::RemoveInfo(RemoveInfo::Producer(
                producer_id.clone(),
            )))
            .await
    }

    /// Full session teardown: open transaction rolled back, consumers and
    /// producers removed, then the session itself.
    pub(crate) async fn close(this: &Arc<Self>) -> Result<(), MqlinkError> {
        if this.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(session = %this.info.session_id, "closing session");

        if let Some(mut context) = this.transaction.lock().take() {
            context.fire_before_end();
            context.take_acks();
            context.fire_after_rollback();
            let _ = this
                .connection
                .oneway(CommandPayload::TransactionInfo(TransactionInfo {
                    transaction_id: context.id().clone(),
                    action: TransactionAction::Rollback,
                }))
                .await;
        }

        let consumers: Vec<_> = this.consumers.lock().drain(..).collect();
        for consumer_id in consumers {
            this.connection.dispatcher.unregister(&consumer_id);
            let _ = this
                .connection
                .oneway(CommandPayload::RemoveInfo(RemoveInfo::Consumer(consumer_id)))
                .await;
        }
        let producers: Vec<_> = this.producers.lock().drain(..).collect();
        for producer_id in producers {
            let _ = this
                .connection
                .oneway(CommandPayload::RemoveInfo(RemoveInfo::Producer(producer_id)))
                .await;
        }

        let _ = this
            .connection
            .oneway(CommandPayload::RemoveInfo(RemoveInfo::Session(
                this.info.session_id.clone(),
            )))
            .await;
        Ok(())
    }
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("session_id", &self.info.session_id)
            .field("ack_mode", &self.ack_mode)
            .finish()
    }
}
