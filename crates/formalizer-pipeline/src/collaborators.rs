//! Interfaces to the systems around the formalization core: rule and
//! specification sources, verification, test generation and dynamics extraction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use formalizer_types::{
    FormalizerError, Result, Rule, RuleRecord, SpecRow, StudySpecification, Verdict,
};

use crate::state::FunctionReference;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn load_rules(&self) -> Result<Vec<RuleRecord>>;
}

#[async_trait]
pub trait SpecificationSource: Send + Sync {
    async fn load_specification(&self) -> Result<StudySpecification>;
}

/// A JSON array of rule records.
#[derive(Debug, Clone)]
pub struct JsonRuleFile {
    path: PathBuf,
}

impl JsonRuleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RuleSource for JsonRuleFile {
    async fn load_rules(&self) -> Result<Vec<RuleRecord>> {
        let records: Vec<RuleRecord> = read_json(&self.path).await?;
        tracing::info!(path = %self.path.display(), rules = records.len(), "Rules loaded");
        Ok(records)
    }
}

/// A specification file: either a flat array of rows or a `{"forms": …}` object.
#[derive(Debug, Clone)]
pub struct JsonSpecificationFile {
    path: PathBuf,
}

impl JsonSpecificationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecDocument {
    Rows(Vec<SpecRow>),
    Structured(StudySpecification),
}

#[async_trait]
impl SpecificationSource for JsonSpecificationFile {
    async fn load_specification(&self) -> Result<StudySpecification> {
        let spec = match read_json::<SpecDocument>(&self.path).await? {
            SpecDocument::Rows(rows) => StudySpecification::from_rows(rows),
            SpecDocument::Structured(spec) => spec,
        };
        tracing::info!(path = %self.path.display(), forms = spec.forms.len(), "Specification loaded");
        Ok(spec)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let load_error = |message: String| FormalizerError::LoadError {
        source_name: path.display().to_string(),
        message,
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| load_error(e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| load_error(e.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRules(pub Vec<RuleRecord>);

#[async_trait]
impl RuleSource for InMemoryRules {
    async fn load_rules(&self) -> Result<Vec<RuleRecord>> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySpecification(pub StudySpecification);

#[async_trait]
impl SpecificationSource for InMemorySpecification {
    async fn load_specification(&self) -> Result<StudySpecification> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Optional steps
// ---------------------------------------------------------------------------

/// Formal verification of a formalized rule. The pipeline only records the verdict.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, rule: &Rule) -> Result<Verdict>;
}

/// Produces test cases for a formalized rule. Output is kept verbatim.
#[async_trait]
pub trait TestGenerator: Send + Sync {
    async fn generate(
        &self,
        rule: &Rule,
        techniques: &BTreeSet<String>,
        cases_per_rule: usize,
    ) -> Result<Vec<serde_json::Value>>;
}

pub trait DynamicsExtractor: Send + Sync {
    fn extract(&self, condition: &str) -> Vec<FunctionReference>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_rule_file_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        tokio::fs::write(
            &path,
            r#"[{"check_id": "R001", "condition": "Demographics.age >= 18",
                 "severity": "ERROR", "forms": ["Demographics"], "fields": ["age"]}]"#,
        )
        .await
        .unwrap();

        let rules = JsonRuleFile::new(&path).load_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].check_id, "R001");
    }

    #[tokio::test]
    async fn missing_rule_file_is_a_fatal_load_error() {
        let err = JsonRuleFile::new("/definitely/not/here.json")
            .load_rules()
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, FormalizerError::LoadError { source_name, .. } if source_name.ends_with("here.json")));
    }

    #[tokio::test]
    async fn malformed_rule_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = JsonRuleFile::new(&path).load_rules().await.unwrap_err();
        assert!(matches!(err, FormalizerError::LoadError { .. }));
    }

    #[tokio::test]
    async fn specification_file_accepts_rows_or_forms() {
        let dir = tempfile::tempdir().unwrap();

        let rows = dir.path().join("rows.json");
        tokio::fs::write(
            &rows,
            r#"[{"form_name": "Labs", "field_name": "glucose", "field_type": "float"}]"#,
        )
        .await
        .unwrap();
        let spec = JsonSpecificationFile::new(&rows)
            .load_specification()
            .await
            .unwrap();
        assert!(spec.field("Labs", "glucose").is_some());

        let structured = dir.path().join("spec.json");
        tokio::fs::write(&structured, serde_json::to_string(&spec).unwrap())
            .await
            .unwrap();
        let again = JsonSpecificationFile::new(&structured)
            .load_specification()
            .await
            .unwrap();
        assert!(again.has_field_anywhere("glucose"));
    }
}
