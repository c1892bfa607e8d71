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

//! Candidate broker pool.
//!
//! Holds the URIs failover cycles through: the static list from the
//! composite URI plus whatever a discovery agent adds and removes at
//! runtime. The pool is also the [`DiscoveryListener`], so an agent plugs
//! straight in.

use crate::transport::discovery::{DiscoveryEvent, DiscoveryListener};
use crate::transport::uri::TransportUri;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Prioritized, mutable list of candidate broker URIs.
#[derive(Debug)]
pub struct UriPool {
    uris: Mutex<Vec<TransportUri>>,
    randomize: bool,
}

impl UriPool {
    /// Creates a pool seeded with `initial`; `randomize` shuffles the
    /// candidate order every round.
    #[must_use]
    pub fn new(initial: Vec<TransportUri>, randomize: bool) -> Self {
        Self {
            uris: Mutex::new(initial),
            randomize,
        }
    }

    /// Adds a candidate unless already present.
    pub fn add(&self, uri: TransportUri) {
        let mut uris = self.uris.lock();
        if uris.iter().any(|u| u.as_str() == uri.as_str()) {
            return;
        }
        debug!(uri = %uri, "candidate added");
        uris.push(uri);
    }

    /// Removes a candidate by its raw URI string.
    pub fn remove(&self, raw: &str) {
        let mut uris = self.uris.lock();
        let before = uris.len();
        uris.retain(|u| u.as_str() != raw);
        if uris.len() != before {
            debug!(uri = raw, "candidate removed");
        }
    }

    /// The candidates to try this round, shuffled when randomizing.
    #[must_use]
    pub fn candidates(&self) -> Vec<TransportUri> {
        let mut candidates = self.uris.lock().clone();
        if self.randomize {
            candidates.shuffle(&mut rand::thread_rng());
        }
        candidates
    }

    /// Number of known candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.uris.lock().len()
    }

    /// Returns `true` if no candidates are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uris.lock().is_empty()
    }
}

impl DiscoveryListener for UriPool {
    fn on_service_add(&self, event: &DiscoveryEvent) {
        match TransportUri::parse(&event.uri) {
            Ok(uri) => self.add(uri),
            Err(error) => warn!(uri = %event.uri, %error, "ignoring undiscoverable service URI"),
        }
    }

    fn on_service_remove(&self, event: &DiscoveryEvent) {
        self.remove(&event.uri);
    }
}
