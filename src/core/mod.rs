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

//! The application-facing session layer.
//!
//! [`ConnectionBuilder`] opens a [`Connection`] over a transport chain;
//! connections create [`Session`]s; sessions create [`MessageConsumer`]s
//! and [`MessageProducer`]s. The [`Dispatcher`] routes inbound deliveries
//! to consumer queues, acknowledgment follows the session's [`AckMode`],
//! and transacted sessions batch acknowledgments behind
//! commit/rollback with [`Synchronization`] callbacks.

mod advisory;
mod connection;
mod consumer;
mod dispatcher;
mod producer;
mod session;
mod transaction;

pub use connection::{
    Connection, ConnectionBuilder, DestinationListener, ExceptionListener,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use consumer::{ConsumerOptions, MessageConsumer, MessageListener};
pub use dispatcher::Dispatcher;
pub use producer::MessageProducer;
pub use session::{AckMode, Session};
pub use transaction::Synchronization;
