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

//! Local transaction bookkeeping.
//!
//! A transacted session owns one open [`TransactionContext`] at a time.
//! Acknowledgments issued under the transaction are deferred here — no ack
//! reaches the wire until commit; rollback discards them so nothing is
//! ever sent for the batch. Synchronization callbacks fire in
//! registration order: this matches the behavior observed in comparable
//! clients but is a documented assumption, not a wire contract, and the
//! tests flag it as such.

use crate::commands::{AckType, ConsumerId, MessageAck, MessageId, TransactionId};
use std::sync::Arc;

/// Callbacks observing a transaction's lifecycle.
///
/// Registered via `Session::add_synchronization`; all callbacks fire on
/// the task driving the commit or rollback.
pub trait Synchronization: Send + Sync {
    /// The transaction is about to complete (commit or rollback).
    fn before_end(&self) {}
    /// The transaction committed.
    fn after_commit(&self) {}
    /// The transaction rolled back.
    fn after_rollback(&self) {}
}

/// One deferred acknowledgment batch per consumer.
#[derive(Debug, Clone)]
struct PendingAck {
    consumer_id: ConsumerId,
    first: MessageId,
    last: MessageId,
    count: u32,
}

/// State of one open transaction.
pub(crate) struct TransactionContext {
    id: TransactionId,
    synchronizations: Vec<Arc<dyn Synchronization>>,
    pending_acks: Vec<PendingAck>,
}

impl TransactionContext {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            synchronizations: Vec::new(),
            pending_acks: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> &TransactionId {
        &self.id
    }

    pub(crate) fn add_synchronization(&mut self, synchronization: Arc<dyn Synchronization>) {
        self.synchronizations.push(synchronization);
    }

    /// Defers one delivered message's acknowledgment until commit,
    /// extending the consumer's batch.
    pub(crate) fn defer_ack(&mut self, consumer_id: &ConsumerId, message_id: &MessageId) {
        match self
            .pending_acks
            .iter_mut()
            .find(|p| &p.consumer_id == consumer_id)
        {
            Some(pending) => {
                pending.last = message_id.clone();
                pending.count += 1;
            }
            None => self.pending_acks.push(PendingAck {
                consumer_id: consumer_id.clone(),
                first: message_id.clone(),
                last: message_id.clone(),
                count: 1,
            }),
        }
    }

    /// The deferred batches as wire acks, one per consumer, carrying the
    /// transaction id.
    pub(crate) fn take_acks(&mut self) -> Vec<MessageAck> {
        self.pending_acks
            .drain(..)
            .map(|pending| MessageAck {
                consumer_id: pending.consumer_id,
                transaction_id: Some(self.id.clone()),
                first_message_id: pending.first,
                last_message_id: pending.last,
                message_count: pending.count,
                ack_type: AckType::Standard,
            })
            .collect()
    }

    pub(crate) fn fire_before_end(&self) {
        for synchronization in &self.synchronizations {
            synchronization.before_end();
        }
    }

    pub(crate) fn fire_after_commit(&self) {
        for synchronization in &self.synchronizations {
            synchronization.after_commit();
        }
    }

    pub(crate) fn fire_after_rollback(&self) {
        for synchronization in &self.synchronizations {
            synchronization.after_rollback();
        }
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("synchronizations", &self.synchronizations.len())
            .field("pending_acks", &self.pending_acks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ConnectionId;
    use parking_lot::Mutex;

    fn context() -> TransactionContext {
        TransactionContext::new(ConnectionId::new("ID:c").transaction_id(1))
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Synchronization for Recorder {
        fn before_end(&self) {
            self.log.lock().push(format!("{}:before_end", self.name));
        }
        fn after_commit(&self) {
            self.log.lock().push(format!("{}:after_commit", self.name));
        }
        fn after_rollback(&self) {
            self.log.lock().push(format!("{}:after_rollback", self.name));
        }
    }

    // Registration order is the documented contract for callback order;
    // it is an assumption carried over from comparable clients rather
    // than a verified broker requirement.
    #[test]
    fn test_synchronizations_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut context = context();
        for name in ["first", "second", "third"] {
            context.add_synchronization(Arc::new(Recorder {
                name,
                log: log.clone(),
            }));
        }

        context.fire_before_end();
        context.fire_after_commit();

        assert_eq!(
            *log.lock(),
            vec![
                "first:before_end",
                "second:before_end",
                "third:before_end",
                "first:after_commit",
                "second:after_commit",
                "third:after_commit",
            ]
        );
    }

    #[test]
    fn test_deferred_acks_batch_per_consumer() {
        let mut context = context();
        let session = ConnectionId::new("ID:c").session_id(1);
        let consumer_a = session.consumer_id(1);
        let consumer_b = session.consumer_id(2);
        let producer = session.producer_id(1);

        for sequence in 1..=3 {
            context.defer_ack(&consumer_a, &MessageId::new(&producer, sequence));
        }
        context.defer_ack(&consumer_b, &MessageId::new(&producer, 10));

        let acks = context.take_acks();
        assert_eq!(acks.len(), 2);

        let ack_a = acks.iter().find(|a| a.consumer_id == consumer_a).unwrap();
        assert_eq!(ack_a.message_count, 3);
        assert_eq!(ack_a.first_message_id.sequence(), 1);
        assert_eq!(ack_a.last_message_id.sequence(), 3);
        assert!(ack_a.transaction_id.is_some());

        let ack_b = acks.iter().find(|a| a.consumer_id == consumer_b).unwrap();
        assert_eq!(ack_b.message_count, 1);

        // Taking drains the batch.
        assert!(context.take_acks().is_empty());
    }
}
