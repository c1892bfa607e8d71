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

//! Broker discovery.
//!
//! A [`DiscoveryAgent`] learns about brokers and reports them as
//! add/remove events to a [`DiscoveryListener`] — in practice the failover
//! transport's candidate pool, which grows and shrinks with the events.
//! [`StaticDiscoveryAgent`] is the degenerate agent announcing a fixed
//! list once; network discovery protocols plug in behind the same trait.

use super::TransportError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// A broker appearing or disappearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    /// Transport URI of the discovered service.
    pub uri: String,
}

impl DiscoveryEvent {
    /// Creates an event for the given transport URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Receives discovery events.
pub trait DiscoveryListener: Send + Sync {
    /// A broker became available.
    fn on_service_add(&self, event: &DiscoveryEvent);
    /// A broker went away.
    fn on_service_remove(&self, event: &DiscoveryEvent);
}

/// Source of broker add/remove events.
#[async_trait]
pub trait DiscoveryAgent: Send + Sync {
    /// Registers the listener receiving events. Must be called before
    /// [`start`](Self::start).
    fn set_listener(&self, listener: Arc<dyn DiscoveryListener>);

    /// Starts discovery; already-known services are announced immediately.
    async fn start(&self) -> Result<(), TransportError>;

    /// Stops discovery. No further events are delivered.
    async fn stop(&self) -> Result<(), TransportError>;
}

/// Discovery agent announcing a fixed list of brokers.
pub struct StaticDiscoveryAgent {
    services: Vec<DiscoveryEvent>,
    listener: RwLock<Option<Arc<dyn DiscoveryListener>>>,
}

impl StaticDiscoveryAgent {
    /// Creates an agent announcing `uris` on start.
    #[must_use]
    pub fn new(uris: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            services: uris.iter().map(|uri| DiscoveryEvent::new(*uri)).collect(),
            listener: RwLock::new(None),
        })
    }
}

#[async_trait]
impl DiscoveryAgent for StaticDiscoveryAgent {
    fn set_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        *self.listener.write() = Some(listener);
    }

    async fn start(&self) -> Result<(), TransportError> {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            for service in &self.services {
                listener.on_service_add(service);
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        added: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl DiscoveryListener for Recorder {
        fn on_service_add(&self, event: &DiscoveryEvent) {
            self.added.lock().push(event.uri.clone());
        }
        fn on_service_remove(&self, event: &DiscoveryEvent) {
            self.removed.lock().push(event.uri.clone());
        }
    }

    #[tokio::test]
    async fn test_static_agent_announces_on_start() {
        let agent = StaticDiscoveryAgent::new(&["tcp://a:61616", "tcp://b:61616"]);
        let recorder = Arc::new(Recorder {
            added: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        });
        agent.set_listener(recorder.clone());
        agent.start().await.unwrap();

        assert_eq!(
            *recorder.added.lock(),
            vec!["tcp://a:61616".to_string(), "tcp://b:61616".to_string()]
        );
        assert!(recorder.removed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_listener_is_harmless() {
        let agent = StaticDiscoveryAgent::new(&["tcp://a:61616"]);
        agent.start().await.unwrap();
        agent.stop().await.unwrap();
    }
}
