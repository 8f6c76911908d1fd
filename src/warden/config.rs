// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from `warden.yaml`
//!
//! Every section has defaults, so a missing file or a partial file is
//! fine. `WARDEN_CHECKPOINT_DIR` and `WARDEN_ADMISSION_LIMIT_GB` take
//! precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::base::error::WardenError;
use crate::warden::admission::AdmissionSettings;
use crate::warden::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::warden::resilience::{
    BreakerSettings, CircuitBreakerRegistry, ErrorClassifier, ErrorSink, JsonlErrorLog,
    MemoryErrorLog, RecoveryManager, RecoverySettings, RetryPolicy, RuleSpec,
};
use crate::warden::workflow::graph::{ExecutorServices, ExecutorSettings};

pub const DEFAULT_CONFIG_FILE: &str = "warden.yaml";
pub const ENV_CHECKPOINT_DIR: &str = "WARDEN_CHECKPOINT_DIR";
pub const ENV_ADMISSION_LIMIT_GB: &str = "WARDEN_ADMISSION_LIMIT_GB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: BreakerSettings,
    pub admission: AdmissionSettings,
    pub executor: ExecutorSettings,
    pub checkpoint: CheckpointConfig,
    pub error_log: ErrorLogConfig,
    pub recovery: RecoverySettings,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// One JSON file per thread under this directory; `None` keeps
    /// checkpoints in memory
    pub dir: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from(".warden/checkpoints")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    /// JSON-lines file; `None` keeps records in memory
    pub path: Option<PathBuf>,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from(".warden/errors.jsonl")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Appended after the built-in rules
    pub extra_rules: Vec<RuleSpec>,
}

impl WardenConfig {
    /// Load from `path`, or defaults when the file does not exist, then
    /// apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WardenError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::parse_yaml(&contents)?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, WardenError> {
        let config: WardenConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`WardenConfig::load`])
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), WardenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CHECKPOINT_DIR).filter(|v| !v.is_empty()) {
            self.checkpoint.dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup(ENV_ADMISSION_LIMIT_GB).filter(|v| !v.is_empty()) {
            let gb: f64 = raw.trim().parse().map_err(|_| {
                WardenError::config(format!("{} must be a number, got '{}'", ENV_ADMISSION_LIMIT_GB, raw))
            })?;
            self.admission.hard_limit_gb = gb;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), WardenError> {
        if self.admission.hard_limit_gb <= 0.0 {
            return Err(WardenError::config("admission.hard_limit_gb must be positive"));
        }
        if self.admission.soft_limit_gb > self.admission.hard_limit_gb {
            log::warn!(
                "admission.soft_limit_gb ({}) is above the hard limit ({}); every admitted query will execute without advice",
                self.admission.soft_limit_gb,
                self.admission.hard_limit_gb
            );
        }
        if self.retry.max_attempts == 0 {
            return Err(WardenError::config("retry.max_attempts must be at least 1"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(WardenError::config("circuit_breaker.failure_threshold must be at least 1"));
        }
        Ok(())
    }

    pub fn checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        match &self.checkpoint.dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir)),
            None => Arc::new(InMemoryCheckpointStore::new()),
        }
    }

    pub fn error_sink(&self) -> Arc<dyn ErrorSink> {
        match &self.error_log.path {
            Some(path) => Arc::new(JsonlErrorLog::new(path)),
            None => Arc::new(MemoryErrorLog::new()),
        }
    }

    /// Executor services wired from this configuration.
    ///
    /// The breaker registry is passed in so several executors can share it.
    pub fn services(&self, breakers: Arc<CircuitBreakerRegistry>) -> Result<ExecutorServices, WardenError> {
        Ok(ExecutorServices::default()
            .with_classifier(ErrorClassifier::with_rules(&self.classifier.extra_rules)?)
            .with_retry(self.retry.clone())
            .with_breakers(breakers)
            .with_recovery(RecoveryManager::new(self.recovery.clone()))
            .with_checkpoints(self.checkpoint_store())
            .with_error_sink(self.error_sink()))
    }

    pub fn breaker_registry(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::new(self.circuit_breaker.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::resilience::ErrorCategory;
    use std::collections::HashMap;

    #[test]
    fn test_default_values() {
        let config = WardenConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.admission.hard_limit_gb, 200.0);
        assert_eq!(config.admission.cost_per_tib_usd, 5.0);
        assert_eq!(config.executor.max_steps, 100);
        assert!(config.classifier.extra_rules.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
retry:
  max_attempts: 5
  jitter: false
admission:
  hard_limit_gb: 50
checkpoint:
  dir: null
classifier:
  extra_rules:
    - category: quota
      pattern: "slot.*unavailable"
"#;
        let config = WardenConfig::parse_yaml(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.admission.hard_limit_gb, 50.0);
        assert_eq!(config.admission.soft_limit_gb, 100.0);
        assert!(config.checkpoint.dir.is_none());
        assert_eq!(config.classifier.extra_rules[0].category, ErrorCategory::Quota);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            WardenConfig::parse_yaml("retry:\n  max_attempts: 0\n"),
            Err(WardenError::Config(_))
        ));
        assert!(matches!(
            WardenConfig::parse_yaml("admission:\n  hard_limit_gb: -1\n"),
            Err(WardenError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let vars: HashMap<&str, &str> = [
            (ENV_CHECKPOINT_DIR, "/tmp/warden-cp"),
            (ENV_ADMISSION_LIMIT_GB, "75.5"),
        ]
        .into_iter()
        .collect();
        let mut config = WardenConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.checkpoint.dir, Some(PathBuf::from("/tmp/warden-cp")));
        assert_eq!(config.admission.hard_limit_gb, 75.5);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = WardenConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_ADMISSION_LIMIT_GB).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_bad_extra_rule_fails_services() {
        let mut config = WardenConfig::default();
        config.checkpoint.dir = None;
        config.error_log.path = None;
        config.classifier.extra_rules.push(RuleSpec {
            category: ErrorCategory::Quota,
            pattern: "([unclosed".to_string(),
        });
        let registry = config.breaker_registry();
        assert!(config.services(registry).is_err());
    }
}
