// SPDX-License-Identifier: MIT

//! Collaborators the executor is built with

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::base::runtime::{Sleeper, TokioSleeper};
use crate::warden::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::warden::resilience::{
    CircuitBreakerRegistry, ErrorClassifier, ErrorSink, ErrorTranslator, MemoryErrorLog,
    RecoveryManager, RetryPolicy,
};

/// Traversal limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Node visits allowed per `run`/`resume` call
    pub max_steps: u32,
    /// Retries allowed across all nodes of one call
    pub retry_budget: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            retry_budget: 10,
        }
    }
}

/// Everything the failure pipeline and persistence need.
///
/// The breaker registry is shared: hand the same `Arc` to every executor in
/// the process so categories trip across sessions.
#[derive(Clone)]
pub struct ExecutorServices {
    pub classifier: ErrorClassifier,
    pub retry: RetryPolicy,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub recovery: RecoveryManager,
    pub translator: ErrorTranslator,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub error_sink: Arc<dyn ErrorSink>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for ExecutorServices {
    fn default() -> Self {
        Self {
            classifier: ErrorClassifier::default(),
            retry: RetryPolicy::default(),
            breakers: Arc::new(CircuitBreakerRegistry::default()),
            recovery: RecoveryManager::default(),
            translator: ErrorTranslator::new(),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            error_sink: Arc::new(MemoryErrorLog::new()),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl ExecutorServices {
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryManager) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }
}
