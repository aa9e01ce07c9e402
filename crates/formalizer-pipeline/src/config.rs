//! Run configuration, loadable from JSON with every field defaulted.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use formalizer_llm::ProviderKind;
use formalizer_types::{FormalizerError, Result};

use crate::retry::BackoffPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub formalize_rules: bool,
    pub verify_with_z3: bool,
    pub generate_tests: bool,
    pub test_techniques: BTreeSet<String>,
    pub test_cases_per_rule: usize,
    pub parallel_test_generation: bool,
    pub max_retries: usize,
    pub process_dynamics: bool,
    pub reasoning_provider: String,
    pub reasoning_parallelism: usize,
    /// Run the per-rule loop on a worker pool bounded by `reasoning_parallelism`.
    pub parallel_formalization: bool,
    /// No new rule is started once this many seconds have elapsed.
    pub run_timeout_secs: Option<u64>,
    pub reasoning_max_tokens: u32,
    /// Build the full hypothesis/explanation trace for confounded rules.
    pub explain_resolutions: bool,
    pub backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            formalize_rules: true,
            verify_with_z3: true,
            generate_tests: true,
            test_techniques: ["boundary", "equivalence"]
                .into_iter()
                .map(String::from)
                .collect(),
            test_cases_per_rule: 5,
            parallel_test_generation: true,
            max_retries: 3,
            process_dynamics: true,
            reasoning_provider: "openai".to_string(),
            reasoning_parallelism: 4,
            parallel_formalization: false,
            run_timeout_secs: None,
            reasoning_max_tokens: 256,
            explain_resolutions: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FormalizerError::LoadError {
                source_name: path.display().to_string(),
                message: e.to_string(),
            })?;
        let config: PipelineConfig = serde_json::from_str(&json)
            .map_err(|e| FormalizerError::ConfigError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reasoning_parallelism == 0 {
            return Err(FormalizerError::ConfigError(
                "reasoning_parallelism must be at least 1".into(),
            ));
        }
        if self.generate_tests && self.test_cases_per_rule == 0 {
            return Err(FormalizerError::ConfigError(
                "test_cases_per_rule must be at least 1 when generate_tests is on".into(),
            ));
        }
        self.provider_kind()?;
        Ok(())
    }

    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.reasoning_provider.parse()
    }

    pub fn run_timeout(&self) -> Option<std::time::Duration> {
        self.run_timeout_secs.map(std::time::Duration::from_secs)
    }
}
