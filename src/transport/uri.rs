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

//! Transport URI parsing.
//!
//! Transports are addressed by scheme-qualified URIs with an option bag:
//!
//! ```text
//! tcp://broker:61616?wireFormat=openwire&soTimeout=30000
//! mock://broker-a
//! failover:(tcp://a:61616,tcp://b:61616)?maxReconnectAttempts=8
//! ```
//!
//! Recognized options and their effects:
//!
//! | Option | Applies to | Effect |
//! |---|---|---|
//! | `wireFormat` | any | `openwire` (default) or `stomp` |
//! | `trace` | any | insert a [`LoggingTransport`](super::LoggingTransport) |
//! | `connectTimeout` | tcp | connect deadline, milliseconds |
//! | `soTimeout` | tcp | negotiation window, milliseconds |
//! | `maxInactivityDuration` | openwire | proposed inactivity window, ms |
//! | `requestTimeout` | any | default `request()` deadline, ms |
//! | `initialReconnectDelay` | failover | first backoff delay, ms |
//! | `maxReconnectDelay` | failover | backoff cap, ms |
//! | `useExponentialBackOff` | failover | grow delays exponentially |
//! | `backOffMultiplier` | failover | exponential growth factor |
//! | `maxReconnectAttempts` | failover | give up after N rounds |
//! | `startupMaxReconnectAttempts` | failover | rounds before first connect |
//! | `randomize` | failover | shuffle candidates each round |

use super::TransportError;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// A parsed transport URI.
///
/// # Example
///
/// ```rust
/// use mqlink::transport::TransportUri;
///
/// let uri = TransportUri::parse("tcp://broker:61616?trace=true").unwrap();
/// assert_eq!(uri.scheme(), "tcp");
/// assert_eq!(uri.address(), "broker:61616");
/// assert_eq!(uri.bool_option("trace", false).unwrap(), true);
///
/// let composite = TransportUri::parse("failover:(tcp://a:1,tcp://b:2)").unwrap();
/// assert_eq!(composite.composite().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportUri {
    raw: String,
    scheme: String,
    host: String,
    port: Option<u16>,
    options: HashMap<String, String>,
    composite: Vec<TransportUri>,
}

impl TransportUri {
    /// Parses a transport URI, including the `failover:(...)` composite
    /// form.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] for malformed input.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        if let Some(rest) = raw.strip_prefix("failover:") {
            return Self::parse_composite(raw, rest);
        }

        let url = Url::parse(raw).map_err(|e| invalid(raw, &e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid(raw, "missing host"))?
            .to_string();
        let options = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            raw: raw.to_string(),
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            options,
            composite: Vec::new(),
        })
    }

    fn parse_composite(raw: &str, rest: &str) -> Result<Self, TransportError> {
        // Accept both "failover:(a,b)?opts" and the bare "failover:a,b".
        let (list, query) = match rest.strip_prefix('(') {
            Some(inner) => {
                let close = inner
                    .find(')')
                    .ok_or_else(|| invalid(raw, "unterminated candidate list"))?;
                let query = inner[close + 1..].strip_prefix('?').unwrap_or("");
                (&inner[..close], query)
            }
            None => (rest, ""),
        };
        if list.is_empty() {
            return Err(invalid(raw, "empty candidate list"));
        }

        let composite = list
            .split(',')
            .map(|candidate| Self::parse(candidate.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut options = HashMap::new();
        if !query.is_empty() {
            for pair in query.split('&') {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid(raw, &format!("malformed option {:?}", pair)))?;
                options.insert(name.to_string(), value.to_string());
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme: "failover".to_string(),
            host: String::new(),
            port: None,
            options,
            composite,
        })
    }

    /// Returns the URI scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns `host` or `host:port` for addressing.
    #[must_use]
    pub fn address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Returns the URI as originally given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Candidate URIs of a composite `failover:` URI; empty otherwise.
    #[must_use]
    pub fn composite(&self) -> &[TransportUri] {
        &self.composite
    }

    /// Returns the raw value of an option, if present.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    /// Returns a boolean option, or `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if the value is neither
    /// `true` nor `false`.
    pub fn bool_option(&self, name: &str, default: bool) -> Result<bool, TransportError> {
        match self.option(name) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(invalid(
                &self.raw,
                &format!("option {} must be true or false, got {:?}", name, other),
            )),
        }
    }

    /// Returns a numeric option, or `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if the value is not a
    /// non-negative integer.
    pub fn u64_option(&self, name: &str, default: u64) -> Result<u64, TransportError> {
        match self.option(name) {
            None => Ok(default),
            Some(value) => value.parse::<u64>().map_err(|_| {
                invalid(
                    &self.raw,
                    &format!("option {} must be an integer, got {:?}", name, value),
                )
            }),
        }
    }

    /// Returns a float option, or `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if the value is not a number.
    pub fn f64_option(&self, name: &str, default: f64) -> Result<f64, TransportError> {
        match self.option(name) {
            None => Ok(default),
            Some(value) => value.parse::<f64>().map_err(|_| {
                invalid(
                    &self.raw,
                    &format!("option {} must be a number, got {:?}", name, value),
                )
            }),
        }
    }

    /// Returns a millisecond option as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if the value is not a
    /// non-negative integer.
    pub fn duration_option(
        &self,
        name: &str,
        default: Duration,
    ) -> Result<Duration, TransportError> {
        Ok(Duration::from_millis(
            self.u64_option(name, default.as_millis() as u64)?,
        ))
    }
}

impl std::fmt::Display for TransportUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn invalid(uri: &str, reason: &str) -> TransportError {
    TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}
