// SPDX-License-Identifier: MIT

//! Step-graph executor with checkpointed suspension and a failure pipeline
//!
//! The cursor starts at the entry node and follows the first outgoing edge
//! whose guard matches the merged state. A failing step is classified, gated
//! by its category's circuit breaker, checked against the retry policy and
//! offered to recovery before it is re-invoked. When the executor gives up,
//! the translated error and its full context are stored under `error`, the
//! error node runs once, and the run ends as `Failed`.

use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::node::{Edge, EdgeGuard, Node, END};
use super::outcome::{Completion, Failure, HaltReason, RunOutcome, Suspension};
use super::services::{ExecutorServices, ExecutorSettings};
use crate::base::error::{GraphError, WardenError};
use crate::warden::checkpoint::{CheckpointRecord, ResumeInput};
use crate::warden::resilience::{ErrorCategory, ErrorContext, RecoveryDisposition};
use crate::warden::workflow::state::{StatePatch, StateSchema, WorkflowState};
use crate::warden::workflow::step::{StepError, StepOutcome, SuspensionPayload};

/// State field that receives `{user, technical}` on a halt
pub const ERROR_FIELD: &str = "error";

pub struct StateGraphExecutor {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Vec<Edge>>,
    entry: Option<String>,
    error_node: Option<String>,
    request_path: Option<String>,
    settings: ExecutorSettings,
    services: ExecutorServices,
    active: Mutex<HashSet<String>>,
}

/// Removes the thread from the active set when the call ends
struct ActiveThread<'a> {
    active: &'a Mutex<HashSet<String>>,
    thread_id: String,
}

impl Drop for ActiveThread<'_> {
    fn drop(&mut self) {
        match self.active.lock() {
            Ok(mut active) => {
                active.remove(&self.thread_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.thread_id);
            }
        }
    }
}

/// Per-call bookkeeping
struct Cursor {
    thread_id: String,
    retries_used: u32,
    path: Vec<String>,
}

enum NodeResult {
    Advanced,
    Suspended(SuspensionPayload),
    Halted(Halt),
}

struct Halt {
    reason: HaltReason,
    context: ErrorContext,
    patch: StatePatch,
}

impl StateGraphExecutor {
    pub fn new(name: impl Into<String>, services: ExecutorServices) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::default(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            error_node: None,
            request_path: None,
            settings: ExecutorSettings::default(),
            services,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// State path holding the user's request text, quoted in error contexts
    pub fn with_request_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &ExecutorServices {
        &self.services
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn error_node(&self) -> Option<&str> {
        self.error_node.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Outgoing edges of `id` in registration order
    pub fn edges_from(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn register(&mut self, node: Node) -> Result<(), GraphError> {
        if node.id() == END {
            return Err(GraphError::DuplicateNode(END.to_string()));
        }
        if self.nodes.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode(node.id().to_string()));
        }
        self.nodes.insert(node.id().to_string(), node);
        Ok(())
    }

    /// Add an edge; edges out of one node are tried in the order added
    pub fn connect(
        &mut self,
        from: &str,
        guard: Option<EdgeGuard>,
        to: &str,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownNode(from.to_string()));
        }
        if to != END && !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode(to.to_string()));
        }
        self.edges.entry(from.to_string()).or_default().push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            guard,
        });
        Ok(())
    }

    pub fn connect_always(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        self.connect(from, None, to)
    }

    /// Edge guarded by a condition expression such as `review.decision == 'modify'`
    pub fn connect_when(&mut self, from: &str, condition: &str, to: &str) -> Result<(), WardenError> {
        let guard = EdgeGuard::parse(condition)?;
        self.connect(from, Some(guard), to)?;
        Ok(())
    }

    pub fn set_entry(&mut self, id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::UnknownNode(id.to_string()));
        }
        self.entry = Some(id.to_string());
        Ok(())
    }

    /// Node run once when a failure halts the workflow
    pub fn set_error_node(&mut self, id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::UnknownNode(id.to_string()));
        }
        self.error_node = Some(id.to_string());
        Ok(())
    }

    /// Run from the entry node
    pub async fn run(
        &self,
        initial: WorkflowState,
        thread_id: &str,
    ) -> Result<RunOutcome, WardenError> {
        let _active = self.claim(thread_id)?;
        let entry = self.entry.clone().ok_or(GraphError::MissingEntry)?;
        log::info!("Graph '{}' starting thread '{}' at '{}'", self.name, thread_id, entry);

        let state = initial.with_schema(&self.schema);
        self.drive(thread_id, state, entry).await
    }

    /// Continue a suspended thread after the pending node.
    ///
    /// The suspended node is not re-run. The checkpoint is deleted once the
    /// thread completes; it is kept when the continuation fails so the
    /// decision can be resubmitted.
    pub async fn resume(
        &self,
        thread_id: &str,
        input: ResumeInput,
    ) -> Result<RunOutcome, WardenError> {
        let _active = self.claim(thread_id)?;
        let resumed = self.services.checkpoints.resume(thread_id, input).await?;
        if !self.nodes.contains_key(&resumed.pending_node) {
            return Err(GraphError::UnknownNode(resumed.pending_node).into());
        }
        log::info!(
            "Graph '{}' resuming thread '{}' after '{}' with decision '{}'",
            self.name,
            thread_id,
            resumed.pending_node,
            resumed.decision
        );

        let state = resumed.state.with_schema(&self.schema);
        let outcome = match self.next_node(&resumed.pending_node, &state)? {
            Some(next) => self.drive(thread_id, state, next).await?,
            None => RunOutcome::Completed(Completion {
                thread_id: thread_id.to_string(),
                state,
                path: Vec::new(),
            }),
        };

        if outcome.is_completed() {
            self.services.checkpoints.delete(thread_id).await?;
        }
        Ok(outcome)
    }

    fn claim(&self, thread_id: &str) -> Result<ActiveThread<'_>, WardenError> {
        self.services.checkpoints.validate_thread_id(thread_id)?;
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !active.insert(thread_id.to_string()) {
            return Err(WardenError::SessionBusy(thread_id.to_string()));
        }
        Ok(ActiveThread {
            active: &self.active,
            thread_id: thread_id.to_string(),
        })
    }

    /// First matching edge wins; `None` means the run is over
    fn next_node(&self, from: &str, state: &WorkflowState) -> Result<Option<String>, GraphError> {
        let edges = self.edges_from(from);
        if edges.is_empty() {
            return Ok(None);
        }
        match edges.iter().find(|edge| edge.matches(state)) {
            Some(edge) if edge.to == END => Ok(None),
            Some(edge) => Ok(Some(edge.to.clone())),
            None => Err(GraphError::NoRoute(from.to_string())),
        }
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        start: String,
    ) -> Result<RunOutcome, WardenError> {
        let mut cursor = Cursor {
            thread_id: thread_id.to_string(),
            retries_used: 0,
            path: Vec::new(),
        };
        let mut current = start;

        loop {
            if cursor.path.len() as u32 >= self.settings.max_steps {
                log::error!(
                    "Thread '{}' exceeded {} node visits",
                    thread_id,
                    self.settings.max_steps
                );
                return Err(GraphError::StepLimit(self.settings.max_steps).into());
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;
            cursor.path.push(current.clone());

            match self.invoke(node, &mut state, &mut cursor).await {
                NodeResult::Advanced => {}
                NodeResult::Suspended(payload) => {
                    let record = CheckpointRecord::new(thread_id, &state, node.id(), payload.clone())?;
                    self.services.checkpoints.save(record).await?;
                    log::info!("Thread '{}' suspended at '{}'", thread_id, node.id());
                    return Ok(RunOutcome::Suspended(Suspension {
                        thread_id: thread_id.to_string(),
                        pending_node: node.id().to_string(),
                        payload,
                    }));
                }
                NodeResult::Halted(halt) => {
                    return Ok(self.halt(node, state, halt, cursor).await);
                }
            }

            match self.next_node(&current, &state)? {
                Some(next) => {
                    log::info!("Thread '{}': '{}' -> '{}'", thread_id, current, next);
                    current = next;
                }
                None => {
                    log::info!("Thread '{}' completed at '{}'", thread_id, current);
                    return Ok(RunOutcome::Completed(Completion {
                        thread_id: thread_id.to_string(),
                        state,
                        path: cursor.path,
                    }));
                }
            }
        }
    }

    /// Run one node, retrying through the failure pipeline
    async fn invoke(&self, node: &Node, state: &mut WorkflowState, cursor: &mut Cursor) -> NodeResult {
        let services = &self.services;
        let mut attempt: u32 = 0;
        let mut chain: Option<ErrorContext> = None;

        loop {
            if !services.breakers.allow(node.category()) {
                let message = format!(
                    "Circuit for '{}' is open; '{}' was not invoked",
                    node.category(),
                    node.id()
                );
                let context = self
                    .new_context(node, state, cursor, ErrorCategory::CircuitOpen, message)
                    .with_context(node.captured(state))
                    .with_retry_count(attempt);
                services.error_sink.record(&context).await;
                return NodeResult::Halted(Halt {
                    reason: HaltReason::CircuitOpen,
                    context,
                    patch: StatePatch::new(),
                });
            }

            log::info!("Executing node '{}' (attempt {})", node.id(), attempt + 1);
            let err = match node.step().run(state).await {
                Ok(StepOutcome::Update(patch)) => {
                    services.breakers.record_success(node.category());
                    state.apply(patch);
                    return NodeResult::Advanced;
                }
                Ok(StepOutcome::Suspend(request)) => {
                    services.breakers.record_success(node.category());
                    state.apply(request.patch);
                    return NodeResult::Suspended(request.payload);
                }
                Err(err) => err,
            };

            services.breakers.record_failure(node.category());
            attempt += 1;

            let context = self.wrap_failure(node, state, cursor, chain.take(), err, attempt);
            let recovery = services.recovery.attempt_recovery(&context);
            let context = context.with_suggestions(recovery.actions.clone());
            services.error_sink.record(&context).await;

            let category = context.category;
            let reason = if !category.is_retryable() || !node.allows_retry(category) {
                Some(HaltReason::NonRetryable)
            } else if !services.retry.should_retry(category, attempt) {
                Some(HaltReason::RetriesExhausted)
            } else if recovery.disposition == RecoveryDisposition::Declined {
                Some(HaltReason::RecoveryDeclined)
            } else if cursor.retries_used >= self.settings.retry_budget {
                Some(HaltReason::RetryBudgetExhausted)
            } else {
                None
            };

            if let Some(reason) = reason {
                return NodeResult::Halted(Halt {
                    reason,
                    context,
                    patch: node.map_recovery_patch(recovery.patch),
                });
            }

            cursor.retries_used += 1;
            if recovery.disposition == RecoveryDisposition::Patched {
                state.apply(node.map_recovery_patch(recovery.patch));
            }
            let delay = services.retry.get_delay(attempt);
            log::warn!(
                "Node '{}' failed with {} ({}); retrying in {:?}",
                node.id(),
                category,
                context.message,
                delay
            );
            services.sleeper.sleep(delay).await;
            chain = Some(context);
        }
    }

    fn new_context(
        &self,
        node: &Node,
        state: &WorkflowState,
        cursor: &Cursor,
        category: ErrorCategory,
        message: String,
    ) -> ErrorContext {
        let request = self
            .request_path
            .as_deref()
            .and_then(|path| state.get_str(path))
            .unwrap_or_default();
        ErrorContext::new(cursor.thread_id.as_str(), node.id(), category, message)
            .with_user_request(request)
    }

    /// Classify the first failure of a chain; later failures inherit its
    /// category and severity.
    fn wrap_failure(
        &self,
        node: &Node,
        state: &WorkflowState,
        cursor: &Cursor,
        previous: Option<ErrorContext>,
        err: StepError,
        attempt: u32,
    ) -> ErrorContext {
        let mut extra = node.captured(state);
        extra.extend(err.context);

        match previous {
            Some(previous) => previous.next_attempt(err.message, extra),
            None => {
                let (category, confidence) = match err.category {
                    Some(category) => (category, 1.0),
                    None => self.services.classifier.classify(&err.message),
                };
                self.new_context(node, state, cursor, category, err.message)
                    .with_confidence(confidence)
                    .with_context(extra)
                    .with_retry_count(attempt)
            }
        }
    }

    async fn halt(&self, node: &Node, mut state: WorkflowState, halt: Halt, cursor: Cursor) -> RunOutcome {
        let translated = self.services.translator.translate(&halt.context);
        log::error!(
            "Thread '{}' halted at '{}' ({:?}): {} [{}]",
            cursor.thread_id,
            node.id(),
            halt.reason,
            halt.context.message,
            halt.context.category
        );

        state.apply(halt.patch);
        state.update(
            ERROR_FIELD,
            json!({
                "user": translated.user_message,
                "technical": halt.context,
                "reason": halt.reason,
            }),
        );

        let mut path = cursor.path;
        if let Some(error_node) = self.error_node.as_deref().filter(|id| *id != node.id()) {
            if let Some(handler) = self.nodes.get(error_node) {
                path.push(error_node.to_string());
                match handler.step().run(&state).await {
                    Ok(StepOutcome::Update(patch)) => state.apply(patch),
                    Ok(StepOutcome::Suspend(_)) => {
                        log::warn!("Error node '{}' tried to suspend; ignored", error_node)
                    }
                    Err(e) => log::error!("Error node '{}' failed: {}", error_node, e),
                }
            }
        }

        RunOutcome::Failed(Box::new(Failure {
            thread_id: cursor.thread_id,
            node: node.id().to_string(),
            reason: halt.reason,
            error: translated,
            context: halt.context,
            state,
            path,
        }))
    }
}

impl std::fmt::Debug for StateGraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<&String> = self.nodes.keys().collect();
        nodes.sort();
        f.debug_struct("StateGraphExecutor")
            .field("name", &self.name)
            .field("nodes", &nodes)
            .field("entry", &self.entry)
            .field("error_node", &self.error_node)
            .field("settings", &self.settings)
            .finish()
    }
}
