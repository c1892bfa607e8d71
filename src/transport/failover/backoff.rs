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

//! Reconnect delay policy.
//!
//! Exponential backoff with jitter between reconnect rounds. Jitter
//! spreads reconnect storms from many clients that lost the same broker
//! at the same moment.

use std::time::Duration;

/// Computes the delay before each reconnect round.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    use_exponential: bool,
    jitter: bool,
}

impl ReconnectBackoff {
    /// Creates a policy growing from `initial_delay` to `max_delay`.
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            use_exponential: true,
            jitter: true,
        }
    }

    /// Sets the exponential growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables exponential growth. Disabled means a fixed
    /// `initial_delay` between rounds.
    #[must_use]
    pub fn exponential(mut self, use_exponential: bool) -> Self {
        self.use_exponential = use_exponential;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before reconnect round `round` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, round: u32) -> Duration {
        let base = if self.use_exponential {
            let millis =
                self.initial_delay.as_millis() as f64 * self.multiplier.powi(round as i32);
            Duration::from_millis(millis as u64)
        } else {
            self.initial_delay
        };
        let capped = base.min(self.max_delay);

        if self.jitter {
            // Random point in (capped/2, capped]: bounded below so a
            // delay never collapses to zero, bounded above by the cap.
            let half = capped.as_millis() as f64 / 2.0;
            let jittered = half + rand::random::<f64>() * half;
            Duration::from_millis(jittered.ceil() as u64)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .jitter(false);
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_millis(500))
            .jitter(false);
        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_delay() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .exponential(false)
            .jitter(false);
        assert_eq!(backoff.delay_for(7), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(10));
        for round in 0..8 {
            let unjittered = ReconnectBackoff::new(
                Duration::from_millis(100),
                Duration::from_secs(10),
            )
            .jitter(false)
            .delay_for(round);
            let delay = backoff.delay_for(round);
            assert!(delay <= unjittered);
            assert!(delay >= unjittered / 2);
        }
    }
}
