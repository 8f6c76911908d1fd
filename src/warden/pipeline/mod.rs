// SPDX-License-Identifier: MIT

//! The analytical pipeline: question to approved report
//!
//! The graph itself lives in `pipeline.yaml`; this module supplies the
//! steps it names and wires them to a set of [`Collaborators`].

pub mod collaborators;
pub mod simulated;
pub mod state;
pub mod steps;

pub use collaborators::{
    Collaborators, Interpretation, PlanRequest, QueryPlanner, QuestionInterpreter, Report,
    ReportRequest, ReportWriter, ResultValidator, Validation,
};
pub use state::{PipelineState, ValidationDecision};

use std::sync::Arc;

use crate::base::error::WardenError;
use crate::warden::admission::{AdmissionController, AdmissionSettings};
use crate::warden::workflow::builder::GraphBuilder;
use crate::warden::workflow::graph::{ExecutorServices, ExecutorSettings, StateGraphExecutor};
use crate::warden::workflow::loader::GraphLoader;
use crate::warden::workflow::registry::StepRegistry;
use steps::{
    AnalyzeQuestion, ExecuteQuery, GenerateQuery, GenerateReport, HandleError, HumanReview,
    RecordReview, ValidateResults,
};

/// Graph definition of the pipeline
pub const PIPELINE_GRAPH: &str = include_str!("pipeline.yaml");

/// Register every pipeline step against `collaborators`
pub async fn register_steps(
    registry: &StepRegistry,
    collaborators: Collaborators,
    admission: AdmissionSettings,
    services: &ExecutorServices,
) {
    let controller = AdmissionController::new(collaborators.probe, admission);
    registry
        .register(Arc::new(AnalyzeQuestion::new(collaborators.interpreter)))
        .await;
    registry
        .register(Arc::new(GenerateQuery::new(collaborators.planner)))
        .await;
    registry
        .register(Arc::new(ExecuteQuery::new(controller, collaborators.executor)))
        .await;
    registry
        .register(Arc::new(ValidateResults::new(collaborators.validator)))
        .await;
    registry.register(Arc::new(HumanReview)).await;
    registry.register(Arc::new(RecordReview)).await;
    registry
        .register(Arc::new(GenerateReport::new(collaborators.writer)))
        .await;
    registry
        .register(Arc::new(HandleError::new(services.error_sink.clone())))
        .await;
}

/// Build the pipeline executor
pub async fn build_pipeline(
    collaborators: Collaborators,
    admission: AdmissionSettings,
    services: ExecutorServices,
    settings: ExecutorSettings,
) -> Result<StateGraphExecutor, WardenError> {
    let registry = StepRegistry::new();
    register_steps(&registry, collaborators, admission, &services).await;
    let def = GraphLoader::parse_yaml(PIPELINE_GRAPH)?;
    GraphBuilder::new(registry, services)
        .with_settings(settings)
        .build(&def)
        .await
}
