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

//! Inbound message dispatch.
//!
//! Routes [`MessageDispatch`] commands to the queue of the consumer they
//! name. Dispatch runs on the transport's read task and only enqueues —
//! delivery to application code happens on the consumer's own task, so a
//! slow listener can never stall the connection.
//!
//! A dispatch for an unknown consumer id is dropped without error: the
//! consumer closed racily with the in-flight delivery, and broker-side
//! redelivery or expiry handles the message.

use crate::commands::{ConsumerId, MessageDispatch};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Routes inbound dispatches to registered consumer queues.
#[derive(Debug, Default)]
pub struct Dispatcher {
    consumers: RwLock<HashMap<ConsumerId, mpsc::UnboundedSender<MessageDispatch>>>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer, returning the receiving end of its queue.
    ///
    /// Registration happens before the consumer's creation command is
    /// sent, so a dispatch arriving immediately after the broker creates
    /// the consumer always finds the queue.
    #[must_use]
    pub fn register(&self, id: ConsumerId) -> mpsc::UnboundedReceiver<MessageDispatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.write().insert(id, tx);
        rx
    }

    /// Unregisters a consumer. Its queue ends, waking any blocked
    /// receive with a closed result.
    pub fn unregister(&self, id: &ConsumerId) {
        self.consumers.write().remove(id);
    }

    /// Routes one dispatch to its consumer. Unknown ids are a no-op.
    pub fn dispatch(&self, dispatch: MessageDispatch) {
        let sender = self.consumers.read().get(&dispatch.consumer_id).cloned();
        match sender {
            Some(sender) => {
                if sender.send(dispatch).is_err() {
                    // Consumer dropped its receiver between lookup and
                    // send; same no-op as an unknown id.
                }
            }
            None => {
                debug!(
                    consumer = %dispatch.consumer_id,
                    message = %dispatch.message.message_id,
                    "dropping dispatch for unknown consumer"
                );
            }
        }
    }

    /// Ends every consumer queue, waking all blocked receives.
    pub fn shutdown(&self) {
        self.consumers.write().clear();
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.read().len()
    }

    /// Returns `true` if no consumers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ConnectionId, Destination, Message, MessageBody, MessageId};
    use std::collections::HashMap;

    fn dispatch_for(id: &ConsumerId, sequence: u64) -> MessageDispatch {
        let producer = ConnectionId::new("ID:p").session_id(1).producer_id(1);
        MessageDispatch {
            consumer_id: id.clone(),
            message: Message {
                message_id: MessageId::new(&producer, sequence),
                destination: Destination::queue("orders"),
                transaction_id: None,
                body: MessageBody::Text("payload".to_string()),
                properties: HashMap::new(),
                persistent: true,
            },
            redelivery_counter: 0,
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_consumer() {
        let dispatcher = Dispatcher::new();
        let id = ConnectionId::new("ID:c").session_id(1).consumer_id(1);
        let mut rx = dispatcher.register(id.clone());

        dispatcher.dispatch(dispatch_for(&id, 1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message.message_id.sequence(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_to_unknown_consumer_is_noop() {
        let dispatcher = Dispatcher::new();
        let known = ConnectionId::new("ID:c").session_id(1).consumer_id(1);
        let unknown = ConnectionId::new("ID:c").session_id(1).consumer_id(9);
        let mut rx = dispatcher.register(known);

        dispatcher.dispatch(dispatch_for(&unknown, 1));
        // Nothing raised, nothing delivered anywhere.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_ends_queue() {
        let dispatcher = Dispatcher::new();
        let id = ConnectionId::new("ID:c").session_id(1).consumer_id(1);
        let mut rx = dispatcher.register(id.clone());

        dispatcher.unregister(&id);
        assert!(rx.recv().await.is_none());
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_all_queues() {
        let dispatcher = Dispatcher::new();
        let first = ConnectionId::new("ID:c").session_id(1).consumer_id(1);
        let second = ConnectionId::new("ID:c").session_id(1).consumer_id(2);
        let mut rx1 = dispatcher.register(first);
        let mut rx2 = dispatcher.register(second);

        dispatcher.shutdown();
        assert!(rx1.recv().await.is_none());
        assert!(rx2.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dispatches_keep_order_per_consumer() {
        let dispatcher = Dispatcher::new();
        let id = ConnectionId::new("ID:c").session_id(1).consumer_id(1);
        let mut rx = dispatcher.register(id.clone());

        for sequence in 1..=5 {
            dispatcher.dispatch(dispatch_for(&id, sequence));
        }
        for expected in 1..=5 {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.message.message_id.sequence(), expected);
        }
    }
}
