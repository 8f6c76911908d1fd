// SPDX-License-Identifier: MIT

//! Per-category circuit breakers
//!
//! One registry is shared by every session in the process. A category trips
//! open after `failure_threshold` consecutive failures, half-opens once
//! `recovery_timeout` has passed since the last failure, and closes again on
//! the next success. While half-open only one probe call is in flight; other
//! callers are refused until it reports back, or until a probe that never
//! reported is older than `recovery_timeout`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::base::runtime::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

impl BreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

#[derive(Debug, Clone)]
struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// Start of the outstanding half-open probe
    probe_started: Option<Instant>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_started: None,
        }
    }
}

/// Thread-safe breaker state keyed by step category
pub struct CircuitBreakerRegistry {
    settings: BreakerSettings,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a call in `category` may proceed.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and
    /// lets exactly one probe call through.
    pub fn allow(&self, category: &str) -> bool {
        let Ok(mut breakers) = self.breakers.lock() else {
            return true;
        };
        let breaker = breakers.entry(category.to_string()).or_default();
        let now = self.clock.now();
        let timeout = self.settings.recovery_timeout();
        let elapsed = |since: Option<Instant>| {
            since.map_or(true, |at| now.saturating_duration_since(at) >= timeout)
        };

        match breaker.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if !elapsed(breaker.probe_started) {
                    return false;
                }
                if breaker.probe_started.is_some() {
                    log::warn!("Probe for '{}' never reported, allowing another", category);
                }
                breaker.probe_started = Some(now);
                true
            }
            CircuitState::Open => {
                if !elapsed(breaker.last_failure) {
                    return false;
                }
                log::info!("Circuit for '{}' half-open, allowing a probe call", category);
                breaker.state = CircuitState::HalfOpen;
                breaker.probe_started = Some(now);
                true
            }
        }
    }

    pub fn record_success(&self, category: &str) {
        let Ok(mut breakers) = self.breakers.lock() else {
            return;
        };
        let breaker = breakers.entry(category.to_string()).or_default();
        if breaker.state == CircuitState::HalfOpen {
            log::info!("Circuit for '{}' closed after successful probe", category);
        }
        breaker.state = CircuitState::Closed;
        breaker.consecutive_failures = 0;
        breaker.probe_started = None;
    }

    pub fn record_failure(&self, category: &str) {
        let Ok(mut breakers) = self.breakers.lock() else {
            return;
        };
        let breaker = breakers.entry(category.to_string()).or_default();
        breaker.consecutive_failures += 1;
        breaker.last_failure = Some(self.clock.now());
        breaker.probe_started = None;

        match breaker.state {
            CircuitState::HalfOpen => {
                log::warn!("Probe for '{}' failed, circuit re-opened", category);
                breaker.state = CircuitState::Open;
            }
            CircuitState::Closed
                if breaker.consecutive_failures >= self.settings.failure_threshold =>
            {
                log::warn!(
                    "Circuit for '{}' opened after {} consecutive failures",
                    category,
                    breaker.consecutive_failures
                );
                breaker.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    /// Current state without triggering the open to half-open transition
    pub fn state(&self, category: &str) -> CircuitState {
        self.breakers
            .lock()
            .ok()
            .and_then(|b| b.get(category).map(|breaker| breaker.state))
            .unwrap_or(CircuitState::Closed)
    }

    pub fn consecutive_failures(&self, category: &str) -> u32 {
        self.breakers
            .lock()
            .ok()
            .and_then(|b| b.get(category).map(|breaker| breaker.consecutive_failures))
            .unwrap_or(0)
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("settings", &self.settings)
            .finish()
    }
}
