//! Shared types, errors, and specification model for the edit-check formalization pipeline.
//!
//! This crate provides the foundational types used across all other formalizer crates:
//! - `FormalizerError`: unified error taxonomy
//! - `ErrorKind`: ledger tag for recoverable, per-rule errors
//! - `Rule` / `RuleRecord`: edit-check rules as loaded and as formalized
//! - `StudySpecification`: the form/field schema rules are checked against

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Unified error type for all formalizer subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FormalizerError {
    // === Reasoning Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Source Errors ===
    #[error("Failed to load {source_name}: {message}")]
    LoadError {
        source_name: String,
        message: String,
    },

    #[error("Rule '{rule_id}' does not match the study specification: {message}")]
    SchemaError { rule_id: String, message: String },

    // === Reasoning Errors ===
    #[error("Reasoning failed for rule '{rule_id}': {message}")]
    ReasoningError { rule_id: String, message: String },

    // === Causal Graph Errors ===
    #[error("Unknown causal variable '{node}': no recorded edges")]
    UnknownNode { node: String },

    // === Run Errors ===
    #[error("Run deadline exceeded before rule '{rule_id}' was processed")]
    Timeout { rule_id: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FormalizerError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FormalizerError::RateLimited { .. }
                | FormalizerError::RequestTimeout { .. }
                | FormalizerError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error aborts a whole run rather than a single rule.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FormalizerError::LoadError { .. } | FormalizerError::ConfigError(_)
        )
    }

    /// The ledger tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FormalizerError::LoadError { .. }
            | FormalizerError::Io(_)
            | FormalizerError::Json(_) => ErrorKind::LoadError,
            FormalizerError::SchemaError { .. } => ErrorKind::SchemaError,
            FormalizerError::ProviderError { .. }
            | FormalizerError::RateLimited { .. }
            | FormalizerError::AuthError { .. }
            | FormalizerError::RequestTimeout { .. }
            | FormalizerError::ReasoningError { .. } => ErrorKind::ReasoningError,
            FormalizerError::Timeout { .. } => ErrorKind::TimeoutError,
            FormalizerError::ConfigError(_) => ErrorKind::ConfigError,
            FormalizerError::UnknownNode { .. } | FormalizerError::Other(_) => {
                ErrorKind::CollaboratorError
            }
        }
    }
}

/// A convenience alias for `Result<T, FormalizerError>`.
pub type Result<T> = std::result::Result<T, FormalizerError>;

// ---------------------------------------------------------------------------
// ErrorKind: tag used in the pipeline's error ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LoadError,
    SchemaError,
    ReasoningError,
    TimeoutError,
    VerificationError,
    CollaboratorError,
    ConfigError,
}

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    #[serde(alias = "ERROR", alias = "Error")]
    Error,
    #[serde(alias = "WARNING", alias = "Warning")]
    Warning,
}

/// Where a rule stands in the formalization workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormalizationStatus {
    #[default]
    Unformalized,
    StructurallyResolved,
    SemanticallyResolved,
    Escalated,
    Clarified,
    Failed,
}

impl FormalizationStatus {
    /// `true` once the rule has a resolution the pipeline will not revisit this run.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            FormalizationStatus::StructurallyResolved
                | FormalizationStatus::SemanticallyResolved
                | FormalizationStatus::Clarified
        )
    }
}

/// Verdict returned by an external verification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Sat,
    Unsat,
    Unknown,
}

/// A rule row as delivered by a rule source (one spreadsheet row per rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(alias = "id")]
    pub check_id: String,
    pub condition: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub forms: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// An edit-check rule and everything the pipeline learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub condition: String,
    pub message: String,
    pub severity: Severity,
    pub forms: BTreeSet<String>,
    pub fields: BTreeSet<String>,
    pub status: FormalizationStatus,
    /// Model-produced explanation for a semantically resolved rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Human clarification text for a clarified rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Confounding variables that touched this rule during structural resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confounders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Rule {
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            condition: condition.into(),
            message: String::new(),
            severity: Severity::Error,
            forms: BTreeSet::new(),
            fields: BTreeSet::new(),
            status: FormalizationStatus::Unformalized,
            explanation: None,
            feedback: None,
            failure: None,
            confounders: Vec::new(),
            verdict: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forms = forms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the rule failed, keeping it in the run for auditing.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = FormalizationStatus::Failed;
        self.failure = Some(reason.into());
    }
}

impl From<RuleRecord> for Rule {
    fn from(record: RuleRecord) -> Self {
        let mut rule = Rule::new(record.check_id, record.condition)
            .with_forms(record.forms)
            .with_fields(record.fields);
        rule.message = record.message;
        rule.severity = record.severity;
        rule
    }
}

// ---------------------------------------------------------------------------
// Study specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Datetime,
    Categorical,
    Boolean,
    Time,
    File,
}

impl FieldType {
    /// Map a free-form type name from a specification sheet. Unknown names fall back to `Text`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "int" | "float" | "double" | "decimal" => {
                FieldType::Number
            }
            "date" => FieldType::Date,
            "datetime" | "timestamp" => FieldType::Datetime,
            "categorical" | "category" | "enum" | "enumeration" | "codelist" => {
                FieldType::Categorical
            }
            "boolean" | "bool" | "logical" | "yes/no" => FieldType::Boolean,
            "time" => FieldType::Time,
            "file" | "attachment" | "binary" => FieldType::File,
            _ => FieldType::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

/// One row of a flat specification sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecRow {
    pub form_name: String,
    pub field_name: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub valid_values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudySpecification {
    pub forms: BTreeMap<String, Form>,
}

impl StudySpecification {
    /// Build a specification from flat rows, creating forms on first sight.
    pub fn from_rows(rows: impl IntoIterator<Item = SpecRow>) -> Self {
        let mut spec = StudySpecification::default();
        for row in rows {
            let form = spec
                .forms
                .entry(row.form_name.clone())
                .or_insert_with(|| Form {
                    name: row.form_name.clone(),
                    ..Form::default()
                });
            form.fields.insert(
                row.field_name.clone(),
                FieldSpec {
                    name: row.field_name,
                    field_type: FieldType::parse(&row.field_type),
                    required: row.required,
                    valid_values: row.valid_values,
                },
            );
        }
        spec
    }

    pub fn has_form(&self, form: &str) -> bool {
        self.forms.contains_key(form)
    }

    pub fn field(&self, form: &str, field: &str) -> Option<&FieldSpec> {
        self.forms.get(form).and_then(|f| f.fields.get(field))
    }

    /// `true` if any form declares `field`.
    pub fn has_field_anywhere(&self, field: &str) -> bool {
        self.field_anywhere(field).is_some()
    }

    /// The first declaration of `field`, in form-name order.
    pub fn field_anywhere(&self, field: &str) -> Option<&FieldSpec> {
        self.forms.values().find_map(|f| f.fields.get(field))
    }
}
