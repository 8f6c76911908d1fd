// SPDX-License-Identifier: MIT

//! Append-only failure log and per-category aggregation
//!
//! Every classified failure is written as one JSON line with secrets
//! redacted and long strings truncated. Writing never fails the workflow;
//! I/O problems are reported through `log::warn!` and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use super::category::{ErrorCategory, Severity};
use super::context::ErrorContext;

const REDACTED: &str = "***REDACTED***";
const SENSITIVE_KEY_PARTS: [&str; 5] = ["key", "token", "password", "secret", "credential"];
const MAX_VALUE_CHARS: usize = 500;
const MAX_REQUEST_CHARS: usize = 200;

/// One line of the error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub step_name: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub retry_count: u32,
    pub user_request: String,
    pub sanitized_context: Map<String, Value>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorLogRecord {
    pub fn from_context(ctx: &ErrorContext) -> Self {
        Self {
            timestamp: ctx.timestamp,
            session_id: ctx.session_id.clone(),
            step_name: ctx.step_name.clone(),
            category: ctx.category,
            severity: ctx.severity,
            message: ctx.message.clone(),
            retry_count: ctx.retry_count,
            user_request: ctx.user_request.chars().take(MAX_REQUEST_CHARS).collect(),
            sanitized_context: sanitize(&ctx.additional_context),
            recovery_suggestions: ctx.recovery_suggestions.clone(),
        }
    }
}

/// Redact secret-looking keys and truncate long strings, recursively
pub fn sanitize(context: &Map<String, Value>) -> Map<String, Value> {
    context
        .iter()
        .map(|(key, value)| {
            let lowered = key.to_lowercase();
            let clean = if SENSITIVE_KEY_PARTS.iter().any(|part| lowered.contains(part)) {
                Value::String(REDACTED.to_string())
            } else {
                sanitize_value(value)
            };
            (key.clone(), clean)
        })
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > MAX_VALUE_CHARS => {
            let head: String = s.chars().take(MAX_VALUE_CHARS).collect();
            Value::String(format!("{}...", head))
        }
        Value::Object(map) => Value::Object(sanitize(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Where the executor reports every classified failure
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, ctx: &ErrorContext);
}

/// Default number of hourly buckets kept for trend reporting
pub const DEFAULT_TREND_RETENTION_HOURS: i64 = 24 * 7;

/// Counts by category and by hour.
///
/// Hourly buckets older than the retention window, measured back from the
/// newest bucket, are dropped as records arrive. Category totals are kept
/// for the life of the aggregator.
#[derive(Debug)]
pub struct ErrorAggregator {
    retention: ChronoDuration,
    inner: Mutex<AggregatorInner>,
}

#[derive(Debug, Default)]
struct AggregatorInner {
    counts: BTreeMap<String, u64>,
    trends: BTreeMap<DateTime<Utc>, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors_by_category: BTreeMap<String, u64>,
    pub recent_trends: BTreeMap<String, BTreeMap<String, u64>>,
    pub most_common_errors: Vec<(String, u64)>,
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::with_retention(DEFAULT_TREND_RETENTION_HOURS)
    }
}

fn hour_of(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(ChronoDuration::hours(1)).unwrap_or(at)
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(hours: i64) -> Self {
        Self {
            retention: ChronoDuration::hours(hours.max(1)),
            inner: Mutex::new(AggregatorInner::default()),
        }
    }

    pub fn record(&self, category: ErrorCategory, at: DateTime<Utc>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        *inner.counts.entry(category.to_string()).or_insert(0) += 1;
        *inner
            .trends
            .entry(hour_of(at))
            .or_default()
            .entry(category.to_string())
            .or_insert(0) += 1;

        if let Some(newest) = inner.trends.keys().next_back().copied() {
            let keep_from = newest - self.retention;
            inner.trends = inner.trends.split_off(&keep_from);
        }
    }

    /// Totals, trends for the last `hours` hours, and the five most common
    /// categories (ties broken alphabetically)
    pub fn summary(&self, hours: i64, now: DateTime<Utc>) -> ErrorSummary {
        let Ok(inner) = self.inner.lock() else {
            return ErrorSummary {
                total_errors_by_category: BTreeMap::new(),
                recent_trends: BTreeMap::new(),
                most_common_errors: Vec::new(),
            };
        };

        let cutoff = hour_of(now - ChronoDuration::hours(hours));
        let recent_trends = inner
            .trends
            .range(cutoff..)
            .map(|(hour, counts)| (hour.format("%Y-%m-%d %H:00").to_string(), counts.clone()))
            .collect();

        let mut most_common: Vec<(String, u64)> =
            inner.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_common.truncate(5);

        ErrorSummary {
            total_errors_by_category: inner.counts.clone(),
            recent_trends,
            most_common_errors: most_common,
        }
    }
}

/// JSON-lines file log
#[derive(Debug)]
pub struct JsonlErrorLog {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    aggregator: ErrorAggregator,
}

impl JsonlErrorLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
            aggregator: ErrorAggregator::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn aggregator(&self) -> &ErrorAggregator {
        &self.aggregator
    }

    async fn append(&self, record: &ErrorLogRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl ErrorSink for JsonlErrorLog {
    async fn record(&self, ctx: &ErrorContext) {
        self.aggregator.record(ctx.category, ctx.timestamp);
        let record = ErrorLogRecord::from_context(ctx);
        if let Err(e) = self.append(&record).await {
            log::warn!(
                "Failed to append to error log {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Keeps records in memory; the default sink and the one tests inspect
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    records: Mutex<Vec<ErrorLogRecord>>,
    aggregator: ErrorAggregator,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ErrorLogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn aggregator(&self) -> &ErrorAggregator {
        &self.aggregator
    }
}

#[async_trait]
impl ErrorSink for MemoryErrorLog {
    async fn record(&self, ctx: &ErrorContext) {
        self.aggregator.record(ctx.category, ctx.timestamp);
        if let Ok(mut records) = self.records.lock() {
            records.push(ErrorLogRecord::from_context(ctx));
        }
    }
}
