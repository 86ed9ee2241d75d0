//! Task orchestration
//!
//! A task moves through `RECEIVED → PLANNING → EXECUTING → AGGREGATING →
//! DONE | FAILED`. Every retriever or reasoner call is spawned onto the
//! runtime and awaited against the task deadline; each attempt counts toward
//! the iteration limit and transient failures are retried with exponential
//! backoff.

mod planner;
mod report;

pub use planner::{plan, Plan, PlanSummary, Source};
pub use report::{
    Invocation, PartialResults, StateTransition, TaskMetadata, TaskReport, TaskResult, TaskState,
};

use crate::document::{Content, ContentType, DocumentFragment, FragmentSummary};
use crate::error::ErrorKind;
use crate::reasoning::{AnalysisResult, Extraction, Reasoner, ReasoningError};
use crate::retrieval::{Query, RetrievalError, Retriever};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, Span};
use uuid::Uuid;

/// A unit of work: free-text description plus structured context
///
/// Recognized context keys: `query`, `k`, `document_id`, `content`,
/// `content_type`, `schema`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Map<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn timeout(limit: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("task did not finish within {:?}", limit),
        )
    }
}

impl From<RetrievalError> for TaskError {
    fn from(e: RetrievalError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<ReasoningError> for TaskError {
    fn from(e: ReasoningError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Sub-call attempts allowed per task, retries included
    pub max_iterations: usize,
    /// Deadline measured from when the task is received
    pub timeout: Duration,
    /// Extra attempts for retryable failures
    pub retry_budget: u32,
    /// First retry delay; doubles per attempt
    pub retry_backoff: Duration,
    pub default_k: usize,
    pub fragments_per_pass: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout: Duration::from_secs(300),
            retry_budget: 2,
            retry_backoff: Duration::from_millis(200),
            default_k: 5,
            fragments_per_pass: 4,
        }
    }
}

/// What the executing stage hands to aggregation
struct Outcome {
    insight: String,
    extracted: Option<Extraction>,
    confidence: f32,
}

/// `start + wait`, or roughly thirty years out when that overflows
fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .unwrap_or_else(|| start + Duration::from_secs(86_400 * 365 * 30))
}

/// Mutable bookkeeping for one task
struct Execution {
    config: OrchestratorConfig,
    received: Instant,
    deadline: Instant,
    iterations: usize,
    history: Vec<StateTransition>,
    invocations: Vec<Invocation>,
    components: Vec<String>,
    plan: Option<PlanSummary>,
    partial: PartialResults,
}

impl Execution {
    fn new(config: &OrchestratorConfig) -> Self {
        let received = Instant::now();
        let mut execution = Self {
            config: config.clone(),
            received,
            deadline: deadline_after(received, config.timeout),
            iterations: 0,
            history: Vec::new(),
            invocations: Vec::new(),
            components: Vec::new(),
            plan: None,
            partial: PartialResults::default(),
        };
        execution.transition(TaskState::Received);
        execution
    }

    fn elapsed_ms(&self) -> u64 {
        self.received.elapsed().as_millis() as u64
    }

    fn transition(&mut self, state: TaskState) {
        let at_ms = self.elapsed_ms();
        tracing::debug!(state = ?state, at_ms, "Task state");
        self.history.push(StateTransition { state, at_ms });
    }

    fn uses(&mut self, component: &str) {
        if !self.components.iter().any(|c| c == component) {
            self.components.push(component.to_string());
        }
    }

    /// Run one sub-call with the iteration limit, deadline and retry policy
    async fn call<T, F, Fut>(
        &mut self,
        component: &str,
        operation: &str,
        make: F,
    ) -> Result<T, TaskError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
        T: Send + 'static,
    {
        self.uses(component);
        let mut attempt: u32 = 0;

        loop {
            if Instant::now() >= self.deadline {
                return Err(TaskError::timeout(self.config.timeout));
            }

            attempt += 1;
            self.iterations += 1;
            if self.iterations > self.config.max_iterations {
                return Err(TaskError::new(
                    ErrorKind::IterationLimitExceeded,
                    format!(
                        "{}.{} would exceed the limit of {} sub-calls",
                        component, operation, self.config.max_iterations
                    ),
                ));
            }

            let started = Instant::now();
            let handle = tokio::spawn(make());

            // Dropping the handle on timeout detaches the sub-call
            let outcome = match tokio::time::timeout_at(self.deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(TaskError::new(
                    ErrorKind::Backend,
                    format!("{}.{} aborted: {}", component, operation, join_error),
                )),
                Err(_) => Err(TaskError::timeout(self.config.timeout)),
            };

            self.invocations.push(Invocation {
                component: component.to_string(),
                operation: operation.to_string(),
                attempt,
                elapsed_ms: started.elapsed().as_millis() as u64,
                error: outcome.as_ref().err().map(|e| e.kind),
            });

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.kind.is_retryable() || attempt > self.config.retry_budget {
                return Err(error);
            }

            let backoff = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            tracing::warn!(
                component,
                operation,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying after {}",
                error
            );

            let wake = deadline_after(Instant::now(), backoff).min(self.deadline);
            tokio::time::sleep_until(wake).await;
            if Instant::now() >= self.deadline {
                return Err(TaskError::timeout(self.config.timeout));
            }
        }
    }
}

/// Plans, executes and aggregates tasks over a retriever and a reasoner
pub struct Orchestrator {
    retriever: Arc<dyn Retriever>,
    reasoner: Arc<dyn Reasoner>,
    config: OrchestratorConfig,
    span: Span,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        reasoner: Arc<dyn Reasoner>,
        config: OrchestratorConfig,
    ) -> Self {
        let span = tracing::info_span!(
            "orchestrator",
            retriever = retriever.name(),
            reasoner = reasoner.name(),
        );
        Self {
            retriever,
            reasoner,
            config,
            span,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Run a task to completion; failures are reported, never returned
    pub async fn dispatch_task(&self, task: Task) -> TaskReport {
        let task_id = Uuid::new_v4();
        let span = tracing::info_span!(parent: &self.span, "task", %task_id);
        self.run(task_id, task).instrument(span).await
    }

    async fn run(&self, task_id: Uuid, task: Task) -> TaskReport {
        let mut execution = Execution::new(&self.config);
        tracing::info!(description = %task.description, "Task received");

        execution.transition(TaskState::Planning);
        let outcome = match plan(&task, self.config.default_k) {
            Ok(plan) => {
                execution.uses("planner");
                execution.plan = Some(plan.summary());
                execution.transition(TaskState::Executing);
                self.execute(plan, &mut execution).await
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(outcome) => {
                execution.transition(TaskState::Aggregating);
                let result = TaskResult {
                    complete: true,
                    insight: outcome.insight,
                    extracted: outcome.extracted,
                    confidence: outcome.confidence,
                    fragments: std::mem::take(&mut execution.partial.fragments),
                };
                execution.transition(TaskState::Done);
                tracing::info!(
                    iterations = execution.iterations,
                    elapsed_ms = execution.elapsed_ms(),
                    "Task done"
                );
                Self::report(task_id, task, TaskState::Done, result, execution, None)
            }
            Err(error) => {
                execution.transition(TaskState::Failed);
                tracing::warn!(
                    kind = %error.kind,
                    iterations = execution.iterations,
                    "Task failed: {}",
                    error.message
                );
                let result = TaskResult::default();
                Self::report(task_id, task, TaskState::Failed, result, execution, Some(error))
            }
        }
    }

    fn report(
        task_id: Uuid,
        task: Task,
        state: TaskState,
        result: TaskResult,
        execution: Execution,
        error: Option<TaskError>,
    ) -> TaskReport {
        let elapsed_ms = execution.elapsed_ms();
        let partial = match &error {
            Some(_) => Some(execution.partial),
            None => None,
        };

        TaskReport {
            state,
            result,
            metadata: TaskMetadata {
                task_id,
                description: task.description,
                plan: execution.plan,
                state_history: execution.history,
                invocations: execution.invocations,
                iterations: execution.iterations,
                components: execution.components,
                elapsed_ms,
                partial,
                error,
            },
        }
    }

    async fn execute(&self, plan: Plan, execution: &mut Execution) -> Result<Outcome, TaskError> {
        match plan {
            Plan::Extract { source, schema } => {
                let (content, content_type) = self.resolve(source, execution).await?;
                let reasoner = self.reasoner.clone();
                let schema = Arc::new(schema);
                let content = Arc::new(content);

                let extracted = execution
                    .call("reasoner", "extract_information", || {
                        let reasoner = reasoner.clone();
                        let schema = schema.clone();
                        let content = content.clone();
                        async move {
                            reasoner
                                .extract_information(&content, content_type, &schema)
                                .await
                                .map_err(TaskError::from)
                        }
                    })
                    .await?;
                execution.partial.extracted = Some(extracted.clone());

                let resolved = extracted.values().filter(|v| !v.is_null()).count();
                let total = extracted.len();
                Ok(Outcome {
                    insight: format!("Extracted {} of {} fields", resolved, total),
                    confidence: if total == 0 { 0.0 } else { resolved as f32 / total as f32 },
                    extracted: Some(extracted),
                })
            }
            Plan::Analyze { source, query } => {
                let (content, content_type) = self.resolve(source, execution).await?;
                let analysis = self
                    .analyze_content(execution, "analyze_document", content, content_type, query)
                    .await?;
                Ok(Outcome {
                    insight: analysis.insight,
                    extracted: analysis.extracted,
                    confidence: analysis.confidence,
                })
            }
            Plan::RetrieveThenReason {
                query,
                k,
                document_id,
            } => {
                let mut request = Query::new(query.clone(), k);
                if let Some(id) = document_id {
                    request = request.with_document_filter(id);
                }

                let retriever = self.retriever.clone();
                let request = Arc::new(request);
                let fragments = execution
                    .call("retriever", "retrieve", || {
                        let retriever = retriever.clone();
                        let request = request.clone();
                        async move { retriever.retrieve(&request).await.map_err(TaskError::from) }
                    })
                    .await?;

                tracing::debug!(fragments = fragments.len(), "Retrieved");
                execution.partial.fragments = fragments.iter().map(FragmentSummary::from).collect();
                self.reason_in_passes(execution, fragments, query).await
            }
        }
    }

    /// Inline content as is, or the whole document fetched through the retriever
    async fn resolve(
        &self,
        source: Source,
        execution: &mut Execution,
    ) -> Result<(Content, ContentType), TaskError> {
        match source {
            Source::Inline {
                content,
                content_type,
            } => Ok((content, content_type)),
            Source::Document(id) => {
                let retriever = self.retriever.clone();
                let id = Arc::new(id);
                let document = execution
                    .call("retriever", "fetch_document", || {
                        let retriever = retriever.clone();
                        let id = id.clone();
                        async move { retriever.fetch_document(&id).await.map_err(TaskError::from) }
                    })
                    .await?;
                Ok((document.content, document.content_type))
            }
        }
    }

    async fn analyze_content(
        &self,
        execution: &mut Execution,
        operation: &str,
        content: Content,
        content_type: ContentType,
        query: String,
    ) -> Result<AnalysisResult, TaskError> {
        let reasoner = self.reasoner.clone();
        let content = Arc::new(content);
        let query = Arc::new(query);

        execution
            .call("reasoner", operation, || {
                let reasoner = reasoner.clone();
                let content = content.clone();
                let query = query.clone();
                async move {
                    reasoner
                        .analyze_document(&content, content_type, &query)
                        .await
                        .map_err(TaskError::from)
                }
            })
            .await
    }

    async fn reason_in_passes(
        &self,
        execution: &mut Execution,
        fragments: Vec<DocumentFragment>,
        query: String,
    ) -> Result<Outcome, TaskError> {
        if fragments.is_empty() {
            return Ok(Outcome {
                insight: "No relevant fragments were retrieved.".to_string(),
                extracted: None,
                confidence: 0.0,
            });
        }

        let query = Arc::new(query);
        let per_pass = self.config.fragments_per_pass.max(1);

        for (pass, batch) in fragments.chunks(per_pass).enumerate() {
            let reasoner = self.reasoner.clone();
            let batch: Arc<Vec<DocumentFragment>> = Arc::new(batch.to_vec());
            let pass_query = query.clone();

            let analysis = execution
                .call("reasoner", "analyze_fragments", || {
                    let reasoner = reasoner.clone();
                    let batch = batch.clone();
                    let query = pass_query.clone();
                    async move {
                        reasoner
                            .analyze_fragments(&batch, &query)
                            .await
                            .map_err(TaskError::from)
                    }
                })
                .await?;

            tracing::debug!(
                pass,
                fragments = batch.len(),
                confidence = analysis.confidence,
                "Pass complete"
            );
            execution.partial.passes.push(analysis);
        }

        if let [only] = execution.partial.passes.as_slice() {
            return Ok(Outcome {
                insight: only.insight.clone(),
                extracted: None,
                confidence: only.confidence,
            });
        }

        let combined = execution
            .partial
            .passes
            .iter()
            .map(|p| p.insight.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let synthesis = self
            .analyze_content(
                execution,
                "synthesize",
                Content::Text(combined),
                ContentType::Text,
                query.to_string(),
            )
            .await?;

        let mean = execution.partial.passes.iter().map(|p| p.confidence).sum::<f32>()
            / execution.partial.passes.len() as f32;

        Ok(Outcome {
            insight: synthesis.insight,
            extracted: None,
            confidence: synthesis.confidence.max(mean).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::reasoning::{ExtractiveBackend, MultimodalReasoner, ReasonerConfig};
    use async_trait::async_trait;

    /// Retriever over a fixed fragment list
    struct FixedRetriever {
        document: Document,
        fragments: Vec<DocumentFragment>,
    }

    impl FixedRetriever {
        fn new(texts: &[&str]) -> Self {
            let document = Document::new("doc", "doc.txt", texts.join("\n"), ContentType::Text);
            let fragments = texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let content = Content::Text(t.to_string());
                    DocumentFragment::new(&document, i, content, ContentType::Text)
                        .with_score(1.0 / (i + 1) as f32)
                })
                .collect();
            Self { document, fragments }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &Query) -> Result<Vec<DocumentFragment>, RetrievalError> {
            query.validate()?;
            Ok(self.fragments.iter().take(query.k).cloned().collect())
        }

        async fn fetch_document(&self, id: &str) -> Result<Document, RetrievalError> {
            if id == self.document.id {
                Ok(self.document.clone())
            } else {
                Err(RetrievalError::DocumentNotFound(id.to_string()))
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn orchestrator(retriever: FixedRetriever, config: OrchestratorConfig) -> Orchestrator {
        let reasoner = MultimodalReasoner::new(
            Arc::new(ExtractiveBackend::default()),
            ReasonerConfig::default(),
        );
        Orchestrator::new(Arc::new(retriever), Arc::new(reasoner), config)
    }

    #[tokio::test]
    async fn test_retrieve_then_reason() {
        let orchestrator = orchestrator(
            FixedRetriever::new(&["Refunds take 14 days.", "Shipping is free."]),
            OrchestratorConfig::default(),
        );

        let report = orchestrator.dispatch_task(Task::new("how long do refunds take")).await;
        assert!(report.is_done(), "{:?}", report.error());
        assert!(report.result.complete);
        assert_eq!(report.result.insight, "Refunds take 14 days.");
        assert_eq!(report.result.fragments.len(), 2);
        assert_eq!(report.metadata.iterations, 2);
        assert_eq!(report.metadata.components, vec!["planner", "retriever", "reasoner"]);
        assert!(report.metadata.partial.is_none());

        let states: Vec<TaskState> = report
            .metadata
            .state_history
            .iter()
            .map(|t| t.state)
            .collect();
        assert_eq!(
            states,
            vec![
                TaskState::Received,
                TaskState::Planning,
                TaskState::Executing,
                TaskState::Aggregating,
                TaskState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_multiple_passes_are_synthesized() {
        let orchestrator = orchestrator(
            FixedRetriever::new(&["Alpha costs 5.", "Beta costs 7.", "Gamma costs 9."]),
            OrchestratorConfig {
                fragments_per_pass: 1,
                ..OrchestratorConfig::default()
            },
        );

        let report = orchestrator
            .dispatch_task(Task::new("costs").with("k", 3))
            .await;
        assert!(report.is_done());
        // retrieve + 3 passes + synthesis
        assert_eq!(report.metadata.iterations, 5);
        assert!(report
            .metadata
            .invocations
            .iter()
            .any(|i| i.operation == "synthesize"));
    }

    #[tokio::test]
    async fn test_invalid_task_fails_in_planning() {
        let orchestrator = orchestrator(FixedRetriever::new(&["x"]), OrchestratorConfig::default());
        let report = orchestrator.dispatch_task(Task::new("   ")).await;

        assert_eq!(report.state, TaskState::Failed);
        assert!(!report.result.complete);
        assert_eq!(report.error().map(|e| e.kind), Some(ErrorKind::InvalidQuery));
        assert_eq!(report.metadata.iterations, 0);
        assert_eq!(
            report.metadata.state_history.last().map(|t| t.state),
            Some(TaskState::Failed)
        );
    }

    #[tokio::test]
    async fn test_missing_document() {
        let orchestrator = orchestrator(FixedRetriever::new(&["x"]), OrchestratorConfig::default());
        let report = orchestrator
            .dispatch_task(Task::new("extract fields {a} from doc ghost"))
            .await;
        assert_eq!(report.error().map(|e| e.kind), Some(ErrorKind::DocumentNotFound));
    }

    #[tokio::test]
    async fn test_inline_analysis_needs_no_retriever() {
        let orchestrator = orchestrator(FixedRetriever::new(&[]), OrchestratorConfig::default());
        let report = orchestrator
            .dispatch_task(
                Task::new("summarize")
                    .with("content", "name,qty\nbolts,40\n")
                    .with("content_type", "table")
                    .with("query", "bolts"),
            )
            .await;

        assert!(report.is_done());
        assert!(report.result.insight.contains("bolts"));
        assert_eq!(report.metadata.components, vec!["planner", "reasoner"]);
    }

    #[tokio::test]
    async fn test_very_long_timeout_is_accepted() {
        let orchestrator = orchestrator(
            FixedRetriever::new(&["Refunds take 14 days."]),
            OrchestratorConfig {
                timeout: Duration::from_secs(u64::MAX),
                retry_backoff: Duration::from_secs(u64::MAX),
                ..OrchestratorConfig::default()
            },
        );

        let report = orchestrator.dispatch_task(Task::new("refunds")).await;
        assert!(report.is_done(), "{:?}", report.error());
    }

    #[tokio::test]
    async fn test_expired_deadline_starts_no_sub_call() {
        let mut execution = Execution::new(&OrchestratorConfig {
            timeout: Duration::ZERO,
            ..OrchestratorConfig::default()
        });
        let started = std::sync::atomic::AtomicUsize::new(0);

        let outcome = execution
            .call("retriever", "retrieve", || {
                started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<_, TaskError>(()) }
            })
            .await;

        assert_eq!(outcome.unwrap_err().kind, ErrorKind::Timeout);
        assert_eq!(started.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(execution.invocations.is_empty());
        assert_eq!(execution.iterations, 0);
    }

    #[test]
    fn test_task_error_from_module_errors() {
        let e = TaskError::from(RetrievalError::unavailable("qdrant", "down"));
        assert_eq!(e.kind, ErrorKind::RetrievalUnavailable);
        assert!(e.kind.is_retryable());
        assert_eq!(
            TaskError::from(ReasoningError::Backend("bad".into())).kind,
            ErrorKind::Backend
        );
    }
}
