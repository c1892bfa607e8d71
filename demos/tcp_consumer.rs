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

//! Consume from a live broker over TCP with failover.
//!
//! Run with:
//! `cargo run --example tcp_consumer -- "failover:(tcp://localhost:61616)" orders`

use mqlink::commands::Destination;
use mqlink::core::{AckMode, ConnectionBuilder, ExceptionListener};
use mqlink::MqlinkError;
use std::sync::Arc;

struct LogExceptions;

impl ExceptionListener for LogExceptions {
    fn on_exception(&self, error: &MqlinkError) {
        eprintln!("connection failed: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let uri = args
        .next()
        .unwrap_or_else(|| "tcp://localhost:61616".to_string());
    let queue = args.next().unwrap_or_else(|| "orders".to_string());

    let connection = ConnectionBuilder::new(&uri)
        .client_id("tcp-consumer-demo")
        .connect()
        .await?;
    connection.set_exception_listener(Arc::new(LogExceptions));
    println!("connected to {}", uri);

    let session = connection.create_session(AckMode::Client).await?;
    let consumer = session.create_consumer(Destination::queue(&queue)).await?;
    println!("consuming from queue://{}", queue);

    loop {
        let message = consumer.receive().await?;
        println!("[{}] {:?}", message.message_id, message.text());
        consumer.acknowledge(&message).await?;
    }
}
