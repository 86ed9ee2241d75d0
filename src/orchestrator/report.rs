//! Task outcome and execution trace

use super::{PlanSummary, TaskError};
use crate::document::FragmentSummary;
use crate::error::ErrorKind;
use crate::reasoning::{AnalysisResult, Extraction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Received,
    Planning,
    Executing,
    Aggregating,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: TaskState,
    /// Milliseconds since the task was received
    pub at_ms: u64,
}

/// One sub-call attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub component: String,
    pub operation: String,
    pub attempt: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Whatever a task gathered before it stopped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialResults {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<FragmentSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passes: Vec<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extraction>,
}

impl PartialResults {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.passes.is_empty() && self.extracted.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    /// False when the task failed; the other fields are then empty
    pub complete: bool,
    pub insight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extraction>,
    pub confidence: f32,
    pub fragments: Vec<FragmentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: Uuid,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    pub state_history: Vec<StateTransition>,
    pub invocations: Vec<Invocation>,
    /// Sub-call attempts, retries included
    pub iterations: usize,
    /// Components involved, in first-use order
    pub components: Vec<String>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub state: TaskState,
    pub result: TaskResult,
    pub metadata: TaskMetadata,
}

impl TaskReport {
    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.metadata.error.as_ref()
    }

    /// The report when the task finished, its error otherwise
    pub fn into_result(self) -> Result<TaskReport, TaskError> {
        match self.metadata.error.clone() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}
