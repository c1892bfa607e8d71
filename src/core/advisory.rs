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

//! The advisory consumer.
//!
//! A connection-level consumer on the advisory topic, sharing the
//! ordinary dispatch path: the broker delivers `MessageDispatch` commands
//! whose bodies carry [`DestinationInfo`] events instead of user
//! payloads. This task decodes them and drives the connection's
//! [`DestinationListener`](super::DestinationListener).

use super::connection::ConnectionCore;
use crate::commands::{DestinationOperation, MessageBody, MessageDispatch};
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawns the advisory delivery task.
pub(crate) fn spawn(
    core: Weak<ConnectionCore>,
    mut receiver: mpsc::UnboundedReceiver<MessageDispatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(dispatch) = receiver.recv().await {
            let Some(core) = core.upgrade() else { break };
            match dispatch.message.body {
                MessageBody::Advisory(info) => {
                    debug!(
                        destination = %info.destination,
                        operation = ?info.operation,
                        "destination advisory"
                    );
                    let listener = core.destination_listener.read().clone();
                    if let Some(listener) = listener {
                        match info.operation {
                            DestinationOperation::Add => {
                                listener.on_destination_added(&info.destination);
                            }
                            DestinationOperation::Remove => {
                                listener.on_destination_removed(&info.destination);
                            }
                        }
                    }
                }
                ref other => {
                    warn!(
                        message = %dispatch.message.message_id,
                        body = ?other,
                        "non-advisory payload on advisory consumer"
                    );
                }
            }
        }
    })
}
