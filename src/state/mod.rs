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

//! Connection/session/consumer/producer state registry.
//!
//! Mirrors every locally created protocol-visible resource so that a new
//! transport after failover can be driven to recreate identical broker
//! state without application involvement, and so that informational
//! queries never need a round trip.

mod connection_state;
mod tracker;

pub use connection_state::{ConnectionState, SessionState};
pub use tracker::ConnectionStateTracker;
