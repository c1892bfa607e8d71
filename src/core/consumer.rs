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

//! Message consumers.
//!
//! A consumer drains its dispatch queue either through blocking
//! [`receive`](MessageConsumer::receive) calls or through a
//! [`MessageListener`] running on a dedicated delivery task — never on the
//! transport's read task, so slow application code cannot stall the
//! connection. A listener error suppresses the automatic acknowledgment,
//! leaving the message eligible for redelivery.

use super::session::{AckMode, SessionCore};
use crate::commands::{
    CommandPayload, ConsumerId, ConsumerInfo, Message, MessageDispatch, MessageId, MessagePull,
};
use crate::error::MqlinkError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Options for creating a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Broker-side message selector expression.
    pub selector: Option<String>,
    /// Messages the broker may push ahead of acknowledgment; zero makes
    /// the consumer pull-only.
    pub prefetch_size: u32,
    /// Suppress messages published on this same connection.
    pub no_local: bool,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            selector: None,
            prefetch_size: 1000,
            no_local: false,
        }
    }
}

/// Application callback for asynchronous delivery.
///
/// Runs on the consumer's delivery task. Returning an error suppresses
/// the automatic acknowledgment in auto-ack mode.
pub trait MessageListener: Send + Sync {
    /// One message arrived.
    fn on_message(
        &self,
        message: &Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A consumer on a session.
pub struct MessageConsumer {
    info: ConsumerInfo,
    session: Arc<SessionCore>,
    receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<MessageDispatch>>>,
    delivered: Arc<Mutex<Vec<MessageId>>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MessageConsumer {
    pub(crate) fn new(
        info: ConsumerInfo,
        session: Arc<SessionCore>,
        receiver: mpsc::UnboundedReceiver<MessageDispatch>,
    ) -> Self {
        Self {
            info,
            session,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
            delivered: Arc::new(Mutex::new(Vec::new())),
            listener_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// This consumer's id.
    #[must_use]
    pub fn consumer_id(&self) -> &ConsumerId {
        &self.info.consumer_id
    }

    /// The creation info announced to the broker.
    #[must_use]
    pub fn info(&self) -> &ConsumerInfo {
        &self.info
    }

    /// Waits for the next message.
    ///
    /// Zero-prefetch consumers issue a pull first. Closing the consumer,
    /// session or connection makes a blocked call return promptly with a
    /// closed error.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Closed`] once the consumer is gone;
    /// [`MqlinkError::Usage`] while a listener is installed.
    pub async fn receive(&self) -> Result<Message, MqlinkError> {
        self.check_open("receive")?;
        if self.info.prefetch_size == 0 {
            self.pull(0).await?;
        }
        let mut guard = self.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| MqlinkError::usage("receive while a listener is installed"))?;
        match receiver.recv().await {
            Some(dispatch) => self.deliver(dispatch).await,
            None => Err(self.closed_error("receive")),
        }
    }

    /// Waits for the next message up to `timeout`; `Ok(None)` on
    /// expiry.
    ///
    /// # Errors
    ///
    /// Same as [`receive`](Self::receive).
    pub async fn receive_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, MqlinkError> {
        self.check_open("receive")?;
        if self.info.prefetch_size == 0 {
            self.pull(timeout.as_millis() as u64).await?;
        }
        let mut guard = self.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| MqlinkError::usage("receive while a listener is installed"))?;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(dispatch)) => Ok(Some(self.deliver(dispatch).await?)),
            Ok(None) => Err(self.closed_error("receive")),
            Err(_) => Ok(None),
        }
    }

    /// Returns an already-queued message without waiting.
    ///
    /// # Errors
    ///
    /// Same as [`receive`](Self::receive).
    pub async fn receive_no_wait(&self) -> Result<Option<Message>, MqlinkError> {
        self.check_open("receive")?;
        let mut guard = self.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| MqlinkError::usage("receive while a listener is installed"))?;
        match receiver.try_recv() {
            Ok(dispatch) => {
                drop(guard);
                Ok(Some(self.deliver(dispatch).await?))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(self.closed_error("receive")),
        }
    }

    /// Installs an asynchronous listener, taking over the dispatch queue.
    ///
    /// # Errors
    ///
    /// [`MqlinkError::Usage`] if a listener is already installed.
    pub async fn set_listener(
        &self,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), MqlinkError> {
        self.check_open("set_listener")?;
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| MqlinkError::usage("listener already installed"))?;

        let session = self.session.clone();
        let consumer_id = self.info.consumer_id.clone();
        let delivered = self.delivered.clone();
        let ack_mode = self.session.ack_mode;

        let task = tokio::spawn(async move {
            let mut receiver = receiver;
            while let Some(dispatch) = receiver.recv().await {
                let message = dispatch.message;
                match listener.on_message(&message) {
                    Ok(()) => {
                        if ack_mode == AckMode::Client {
                            delivered.lock().push(message.message_id.clone());
                        }
                        if let Err(error) = session
                            .on_delivered(&consumer_id, &message.message_id)
                            .await
                        {
                            warn!(%error, consumer = %consumer_id, "post-delivery ack failed");
                        }
                    }
                    Err(error) => {
                        // No ack: the broker redelivers or expires it.
                        warn!(
                            %error,
                            message = %message.message_id,
                            "listener failed, message left unacknowledged"
                        );
                    }
                }
            }
            debug!(consumer = %consumer_id, "delivery task finished");
        });
        *self.listener_task.lock() = Some(task);
        Ok(())
    }

    /// Acknowledges delivered messages, per the session's ack mode.
    ///
    /// - `Individual`: acknowledges exactly `message`.
    /// - `Client`: acknowledges everything delivered to this consumer
    ///   since the last acknowledgment.
    /// - `Auto`/`Transacted`: a no-op; delivery and commit handle it.
    ///
    /// # Errors
    ///
    /// Fails if the ack command cannot be sent.
    pub async fn acknowledge(&self, message: &Message) -> Result<(), MqlinkError> {
        self.check_open("acknowledge")?;
        match self.session.ack_mode {
            AckMode::Individual => {
                self.delivered
                    .lock()
                    .retain(|id| id != &message.message_id);
                self.session
                    .acknowledge_one(&self.info.consumer_id, &message.message_id)
                    .await
            }
            AckMode::Client => {
                let batch: Vec<MessageId> = self.delivered.lock().drain(..).collect();
                self.session
                    .acknowledge_batch(&self.info.consumer_id, batch)
                    .await
            }
            AckMode::Auto | AckMode::Transacted => Ok(()),
        }
    }

    /// Closes the consumer: its queue ends and the broker removes the
    /// subscription. Idempotent.
    pub async fn close(&self) -> Result<(), MqlinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.listener_task.lock().take() {
            task.abort();
        }
        self.session.close_consumer(&self.info.consumer_id).await
    }

    /// Runs the shared post-delivery path for one dispatch.
    async fn deliver(&self, dispatch: MessageDispatch) -> Result<Message, MqlinkError> {
        let message = dispatch.message;
        if self.session.ack_mode == AckMode::Client {
            self.delivered.lock().push(message.message_id.clone());
        }
        self.session
            .on_delivered(&self.info.consumer_id, &message.message_id)
            .await?;
        Ok(message)
    }

    async fn pull(&self, timeout_millis: u64) -> Result<(), MqlinkError> {
        self.session
            .connection
            .oneway(CommandPayload::MessagePull(MessagePull {
                consumer_id: self.info.consumer_id.clone(),
                timeout_millis,
            }))
            .await
    }

    fn check_open(&self, operation: &str) -> Result<(), MqlinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error(operation));
        }
        self.session.check_open(operation)
    }

    fn closed_error(&self, operation: &str) -> MqlinkError {
        MqlinkError::closed(
            format!("consumer {}", self.info.consumer_id),
            operation,
        )
    }
}

impl std::fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("consumer_id", &self.info.consumer_id)
            .field("destination", &self.info.destination)
            .finish()
    }
}
