// SPDX-License-Identifier: MIT

use crate::warden::workflow::step::Step;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Step implementations addressable by name from graph definitions
#[derive(Clone)]
pub struct StepRegistry {
    steps: Arc<RwLock<HashMap<String, Arc<dyn Step>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register under the step's own name; a later registration replaces it
    pub async fn register(&self, step: Arc<dyn Step>) {
        let mut steps = self.steps.write().await;
        steps.insert(step.name().to_string(), step);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        let steps = self.steps.read().await;
        steps.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let steps = self.steps.read().await;
        let mut names: Vec<String> = steps.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
