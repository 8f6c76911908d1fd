// SPDX-License-Identifier: MIT

//! Interfaces to the remote query service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::controller::AdmissionTicket;

/// One result row, column name to value
pub type Row = Map<String, Value>;

/// What the service is asked to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub sql: String,
    /// Free-form labels forwarded to the service (dataset, requester, ...)
    #[serde(default)]
    pub labels: Map<String, Value>,
}

impl QueryDescriptor {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            labels: Map::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: Value) -> Self {
        self.labels.insert(key.into(), value);
        self
    }
}

/// Result of a dry run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeEstimate {
    pub bytes: u64,
    pub rows_hint: Option<u64>,
}

/// Ceiling the service enforces while a query runs for real
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBudget {
    pub max_bytes_billed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub bytes_processed: u64,
}

/// Failures reported by the query service.
///
/// `Invalid` means the query itself is at fault and should be regenerated;
/// `Service` is anything else (quota, timeout, permissions, outages).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    Invalid(String),

    #[error("Query service error: {0}")]
    Service(String),
}

/// No-side-effect size probe
#[async_trait]
pub trait QueryProbe: Send + Sync {
    async fn estimate(&self, query: &QueryDescriptor) -> Result<ProbeEstimate, QueryError>;
}

/// Runs a query for real. Requires a ticket minted by an admitting decision.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        query: &QueryDescriptor,
        budget: ExecutionBudget,
        ticket: &AdmissionTicket,
    ) -> Result<QueryResult, QueryError>;
}
