//! Run state: the step machine, the error ledger and collaborator pass-through outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formalizer_types::{ErrorKind, FormalizationStatus, FormalizerError, Rule};

/// Pipeline steps, in execution order. `Failed` is reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    #[default]
    Pending,
    Loading,
    Parsing,
    Formalizing,
    Verifying,
    DynamicsExtraction,
    TestGeneration,
    Exporting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Completed,
    CompletedWithErrors,
    Failed,
}

/// One entry of the error ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub error_type: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl ErrorEntry {
    pub fn new(error_type: ErrorKind, message: impl Into<String>, rule_id: Option<&str>) -> Self {
        Self {
            error_type,
            message: message.into(),
            rule_id: rule_id.map(str::to_string),
        }
    }

    pub fn from_error(err: &FormalizerError, rule_id: Option<&str>) -> Self {
        Self::new(err.kind(), err.to_string(), rule_id)
    }
}

/// A function reference found in rule text (`DAYS_BETWEEN(visit_date, baseline_date)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReference {
    pub name: String,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsExtraction {
    pub rule_id: String,
    pub functions: Vec<FunctionReference>,
}

/// Test cases produced by a test-generation collaborator, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTests {
    pub rule_id: String,
    pub cases: Vec<serde_json::Value>,
}

/// Everything one run produced. Owned by exactly one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub current_step: PipelineStep,
    pub status: RunStatus,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub dynamics: Vec<DynamicsExtraction>,
    #[serde(default)]
    pub test_cases: Vec<GeneratedTests>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            current_step: PipelineStep::Pending,
            status: RunStatus::Pending,
            rules: Vec::new(),
            dynamics: Vec::new(),
            test_cases: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, entry: ErrorEntry) {
        tracing::debug!(
            kind = ?entry.error_type,
            rule = entry.rule_id.as_deref().unwrap_or("-"),
            message = %entry.message,
            "Error recorded"
        );
        self.errors.push(entry);
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn count_with_status(&self, status: FormalizationStatus) -> usize {
        self.rules.iter().filter(|r| r.status == status).count()
    }

    pub fn errors_of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorEntry> {
        self.errors.iter().filter(move |e| e.error_type == kind)
    }

    /// Status for a run that reached the end without a fatal error.
    pub(crate) fn settled_status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
