// SPDX-License-Identifier: MIT

//! Turns dry-run estimates into admission verdicts

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::probe::{ExecutionBudget, ProbeEstimate, QueryDescriptor, QueryError, QueryProbe};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Suggestions attached to refused or downsized queries, most effective first
const OPTIMIZATION_SUGGESTIONS: [&str; 5] = [
    "Narrow date range: add a stricter date filter",
    "Add filters: restrict the WHERE clause to the brands, channels or regions you need",
    "Aggregate instead of returning raw rows",
    "Add limit: add or lower the LIMIT clause",
    "Split into smaller time windows and query them one at a time",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Scans above this are refused
    pub hard_limit_gb: f64,
    /// Scans above this run, but come back with optimization advice
    pub soft_limit_gb: f64,
    pub cost_per_tib_usd: f64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            hard_limit_gb: 200.0,
            soft_limit_gb: 100.0,
            cost_per_tib_usd: 5.0,
        }
    }
}

impl AdmissionSettings {
    pub fn hard_limit_bytes(&self) -> u64 {
        (self.hard_limit_gb * BYTES_PER_GIB) as u64
    }

    pub fn soft_limit_bytes(&self) -> u64 {
        (self.soft_limit_gb * BYTES_PER_GIB) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Execute,
    Optimize,
    Reject,
}

/// Proof that a query was admitted. Only [`AdmissionController`] mints these.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionTicket {
    id: Uuid,
    estimated_bytes: u64,
    budget: ExecutionBudget,
}

impl AdmissionTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.estimated_bytes
    }

    pub fn budget(&self) -> ExecutionBudget {
        self.budget
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionDecision {
    pub bytes: u64,
    pub gb: f64,
    pub estimated_cost_usd: f64,
    pub rows_hint: Option<u64>,
    pub verdict: Verdict,
    pub admitted: bool,
    pub rationale: String,
    /// Empty when the verdict is `Execute`
    pub suggestions: Vec<String>,
    #[serde(skip)]
    ticket: Option<AdmissionTicket>,
}

impl AdmissionDecision {
    /// Present exactly when the query was admitted
    pub fn ticket(&self) -> Option<&AdmissionTicket> {
        self.ticket.as_ref()
    }
}

pub struct AdmissionController {
    probe: Arc<dyn QueryProbe>,
    settings: AdmissionSettings,
}

impl AdmissionController {
    pub fn new(probe: Arc<dyn QueryProbe>, settings: AdmissionSettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    /// Dry-run the query and decide whether it may run.
    ///
    /// Probe failures are returned as-is; nothing is admitted without an
    /// estimate.
    pub async fn estimate(&self, query: &QueryDescriptor) -> Result<AdmissionDecision, QueryError> {
        let estimate = self.probe.estimate(query).await?;
        let decision = self.decide(estimate);
        match decision.verdict {
            Verdict::Reject => log::warn!("Admission refused: {}", decision.rationale),
            _ => log::info!(
                "Admission {:?}: {} (~${:.4})",
                decision.verdict,
                decision.rationale,
                decision.estimated_cost_usd
            ),
        }
        Ok(decision)
    }

    pub fn decide(&self, estimate: ProbeEstimate) -> AdmissionDecision {
        let settings = &self.settings;
        let gb = estimate.bytes as f64 / BYTES_PER_GIB;
        let estimated_cost_usd = gb / 1024.0 * settings.cost_per_tib_usd;

        let (verdict, rationale) = if estimate.bytes > settings.hard_limit_bytes() {
            (
                Verdict::Reject,
                format!(
                    "Estimated scan of {:.2} GB exceeds the {:.0} GB limit by {:.2} GB",
                    gb,
                    settings.hard_limit_gb,
                    gb - settings.hard_limit_gb
                ),
            )
        } else if estimate.bytes > settings.soft_limit_bytes() {
            (
                Verdict::Optimize,
                format!(
                    "Estimated scan of {:.2} GB is within the {:.0} GB limit but above the {:.0} GB advisory threshold",
                    gb, settings.hard_limit_gb, settings.soft_limit_gb
                ),
            )
        } else {
            (
                Verdict::Execute,
                format!("Estimated scan of {:.2} GB is within the safe range", gb),
            )
        };

        let admitted = verdict != Verdict::Reject;
        let suggestions = if verdict == Verdict::Execute {
            Vec::new()
        } else {
            OPTIMIZATION_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        };
        let ticket = admitted.then(|| AdmissionTicket {
            id: Uuid::new_v4(),
            estimated_bytes: estimate.bytes,
            budget: ExecutionBudget {
                max_bytes_billed: settings.hard_limit_bytes(),
            },
        });

        AdmissionDecision {
            bytes: estimate.bytes,
            gb,
            estimated_cost_usd,
            rows_hint: estimate.rows_hint,
            verdict,
            admitted,
            rationale,
            suggestions,
            ticket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const GIB: u64 = 1024 * 1024 * 1024;

    struct FixedProbe(Result<ProbeEstimate, QueryError>);

    #[async_trait]
    impl QueryProbe for FixedProbe {
        async fn estimate(&self, _query: &QueryDescriptor) -> Result<ProbeEstimate, QueryError> {
            self.0.clone()
        }
    }

    fn controller(bytes: u64) -> AdmissionController {
        AdmissionController::new(
            Arc::new(FixedProbe(Ok(ProbeEstimate {
                bytes,
                rows_hint: Some(10),
            }))),
            AdmissionSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_250_gb_is_rejected_with_suggestions() {
        let decision = controller(250 * GIB)
            .estimate(&QueryDescriptor::new("SELECT * FROM sales"))
            .await
            .unwrap();

        assert_eq!(decision.verdict, Verdict::Reject);
        assert!(!decision.admitted);
        assert!(decision.ticket().is_none());
        assert!(decision.rationale.contains("250.00 GB"));
        assert!(decision.rationale.contains("by 50.00 GB"));

        let lower: Vec<String> = decision.suggestions.iter().map(|s| s.to_lowercase()).collect();
        assert!(lower[0].contains("narrow date range"));
        assert!(lower.iter().any(|s| s.contains("add limit")));
    }

    #[tokio::test]
    async fn test_small_scan_executes_with_ticket() {
        let decision = controller(2 * GIB)
            .estimate(&QueryDescriptor::new("SELECT 1"))
            .await
            .unwrap();
        assert_eq!(decision.verdict, Verdict::Execute);
        assert!(decision.suggestions.is_empty());
        assert_eq!(decision.rows_hint, Some(10));

        let ticket = decision.ticket().unwrap();
        assert_eq!(ticket.estimated_bytes(), 2 * GIB);
        assert_eq!(ticket.budget().max_bytes_billed, 200 * GIB);
    }

    #[test]
    fn test_between_limits_is_optimize() {
        let decision = controller(0).decide(ProbeEstimate {
            bytes: 150 * GIB,
            rows_hint: None,
        });
        assert_eq!(decision.verdict, Verdict::Optimize);
        assert!(decision.admitted);
        assert!(decision.ticket().is_some());
        assert_eq!(decision.suggestions.len(), 5);
    }

    #[test]
    fn test_cost_estimate_per_tib() {
        let decision = controller(0).decide(ProbeEstimate {
            bytes: 1024 * GIB,
            rows_hint: None,
        });
        assert!((decision.estimated_cost_usd - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_executes_above_limit() {
        let ctl = controller(0);
        let limit = ctl.settings().hard_limit_bytes();
        for bytes in [limit - 1, limit, limit + 1, limit * 2, u64::MAX] {
            let decision = ctl.decide(ProbeEstimate {
                bytes,
                rows_hint: None,
            });
            assert_eq!(bytes > limit, decision.verdict == Verdict::Reject, "bytes={}", bytes);
            assert_eq!(decision.admitted, decision.ticket().is_some());
        }
    }

    #[tokio::test]
    async fn test_probe_failure_is_returned() {
        let ctl = AdmissionController::new(
            Arc::new(FixedProbe(Err(QueryError::Invalid("Syntax error at [1:8]".into())))),
            AdmissionSettings::default(),
        );
        let err = ctl.estimate(&QueryDescriptor::new("SELEC")).await.unwrap_err();
        assert!(matches!(err, QueryError::Invalid(_)));
    }
}
