// SPDX-License-Identifier: MIT

//! Graph builder - compiles definitions into executors
//!
//! Every step name, node reference and edge condition is resolved here, so
//! a definition that builds cannot fail on a typo mid-run.

use crate::base::error::{GraphError, WardenError};
use crate::warden::workflow::graph::{
    EdgeGuard, ExecutorServices, ExecutorSettings, Node, StateGraphExecutor,
};
use crate::warden::workflow::loader::GraphLoader;
use crate::warden::workflow::registry::StepRegistry;
use crate::warden::workflow::types::GraphDefinition;

use std::path::Path;

/// Builds executors from graph definitions
pub struct GraphBuilder {
    loader: GraphLoader,
    registry: StepRegistry,
    services: ExecutorServices,
    settings: ExecutorSettings,
}

impl GraphBuilder {
    pub fn new(registry: StepRegistry, services: ExecutorServices) -> Self {
        Self {
            loader: GraphLoader::new(),
            registry,
            services,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build an executor from a YAML file path
    pub async fn build_file<P: AsRef<Path>>(&self, path: P) -> Result<StateGraphExecutor, WardenError> {
        let def = self.loader.load_graph(path)?;
        self.build(&def).await
    }

    /// Build an executor from a parsed definition
    pub async fn build(&self, def: &GraphDefinition) -> Result<StateGraphExecutor, WardenError> {
        let mut executor = StateGraphExecutor::new(def.name.clone(), self.services.clone())
            .with_schema(def.state.clone())
            .with_settings(self.settings.clone());
        if let Some(path) = &def.request_path {
            executor = executor.with_request_path(path.clone());
        }

        for node_def in &def.nodes {
            let Some(step) = self.registry.get(node_def.step_name()).await else {
                log::error!(
                    "Node '{}' uses unregistered step '{}'; registered: {:?}",
                    node_def.id,
                    node_def.step_name(),
                    self.registry.names().await
                );
                return Err(GraphError::UnknownStep(node_def.step_name().to_string()).into());
            };

            let mut node = Node::new(node_def.id.clone(), step);
            if let Some(category) = &node_def.category {
                node = node.with_category(category.clone());
            }
            if let Some(retry_on) = &node_def.retry_on {
                node = node.retry_on(retry_on.clone());
            }
            for (key, path) in &node_def.capture {
                node = node.capture(key.clone(), path.clone());
            }
            executor.register(node)?;
        }

        for edge in &def.edges {
            match &edge.when {
                Some(condition) => {
                    let guard = EdgeGuard::parse(condition)?;
                    if let EdgeGuard::Condition { expr, .. } = &guard {
                        log::debug!("Edge {} -> {} reads {:?}", edge.from, edge.to, expr.paths());
                    }
                    executor.connect(&edge.from, Some(guard), &edge.to)?;
                }
                None => executor.connect_always(&edge.from, &edge.to)?,
            }
        }

        executor.set_entry(&def.entry)?;
        if let Some(error_node) = &def.error_node {
            executor.set_error_node(error_node)?;
        }

        log::info!(
            "Built graph '{}' with {} nodes and {} edges",
            def.name,
            def.nodes.len(),
            def.edges.len()
        );
        Ok(executor)
    }
}
