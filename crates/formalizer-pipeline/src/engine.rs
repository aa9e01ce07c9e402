//! Formalization engine: the run loop and the per-rule resolution ladder.
//!
//! Steps: loading → parsing → formalizing → verifying → dynamics_extraction →
//! test_generation → exporting. Each rule climbs feedback → structural →
//! semantic → escalation. Only load and configuration errors end a run early.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use formalizer_causal::{CausalGraphEngine, EdgeMetadata};
use formalizer_llm::{Reasoner, ReasoningResult};
use formalizer_types::{
    ErrorKind, FormalizationStatus, FormalizerError, Result, Rule, StudySpecification,
};

use crate::collaborators::{
    DynamicsExtractor, RuleSource, SpecificationSource, TestGenerator, Verifier,
};
use crate::config::PipelineConfig;
use crate::dynamics::RegexDynamicsExtractor;
use crate::events::{EventEmitter, PipelineEvent};
use crate::extraction::{extract_candidate_edges, rule_variables};
use crate::feedback::FeedbackStore;
use crate::state::{
    DynamicsExtraction, ErrorEntry, GeneratedTests, PipelineState, PipelineStep, RunStatus,
};
use crate::thoughts::{reason_about_rule, ReasoningPolicy, SemanticOutcome};
use crate::validation::{validate_rule_or_raise, Severity};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Drives one or more formalization runs over a rule source.
///
/// The causal graph and the feedback store outlive a single run, so a rerun
/// after feedback was recorded sees the clarifications.
pub struct FormalizationPipeline {
    config: PipelineConfig,
    rule_source: Box<dyn RuleSource>,
    spec_source: Box<dyn SpecificationSource>,
    reasoner: Arc<dyn Reasoner>,
    feedback: Arc<FeedbackStore>,
    causal: CausalGraphEngine,
    verifier: Option<Arc<dyn Verifier>>,
    test_generator: Option<Arc<dyn TestGenerator>>,
    dynamics: Box<dyn DynamicsExtractor>,
    events: EventEmitter,
}

/// Work for one rule that reached structural analysis.
#[derive(Debug, Clone)]
struct RuleJob {
    index: usize,
    rule: Rule,
    /// Confounders among the rule's variables, with their recorded causes.
    touched: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug)]
enum Judgement {
    Structural,
    Semantic {
        touched: Vec<String>,
        outcome: SemanticOutcome,
    },
    Escalate {
        touched: Vec<String>,
        ambiguity: String,
        /// `None` when reasoning is switched off and no call was made.
        outcome: Option<SemanticOutcome>,
    },
    TimedOut,
}

// ---------------------------------------------------------------------------
// FormalizationPipeline
// ---------------------------------------------------------------------------

impl FormalizationPipeline {
    pub fn new(
        config: PipelineConfig,
        rule_source: impl RuleSource + 'static,
        spec_source: impl SpecificationSource + 'static,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        Self {
            config,
            rule_source: Box::new(rule_source),
            spec_source: Box::new(spec_source),
            reasoner,
            feedback: Arc::new(FeedbackStore::new()),
            causal: CausalGraphEngine::new(),
            verifier: None,
            test_generator: None,
            dynamics: Box::new(RegexDynamicsExtractor),
            events: EventEmitter::default(),
        }
    }

    pub fn with_feedback_store(mut self, store: Arc<FeedbackStore>) -> Self {
        self.feedback = store;
        self
    }

    pub fn with_causal_engine(mut self, engine: CausalGraphEngine) -> Self {
        self.causal = engine;
        self
    }

    pub fn with_verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn with_test_generator(mut self, generator: impl TestGenerator + 'static) -> Self {
        self.test_generator = Some(Arc::new(generator));
        self
    }

    pub fn with_dynamics_extractor(mut self, extractor: impl DynamicsExtractor + 'static) -> Self {
        self.dynamics = Box::new(extractor);
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn feedback_store(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    pub fn causal_engine(&self) -> &CausalGraphEngine {
        &self.causal
    }

    pub fn causal_engine_mut(&mut self) -> &mut CausalGraphEngine {
        &mut self.causal
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Execute one run. The returned state always carries a definitive status.
    pub async fn run(&mut self) -> PipelineState {
        let started = Instant::now();
        let deadline = self.config.run_timeout().map(|t| started + t);
        let mut state = PipelineState::new();
        let run_id = state.run_id.to_string();

        tracing::info!(run = %run_id, provider = self.reasoner.name(), "Formalization run started");
        self.events.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
        });

        match self.execute(&mut state, deadline).await {
            Ok(()) => {
                state.status = state.settled_status();
                self.enter(&mut state, PipelineStep::Completed);
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    run = %run_id,
                    status = ?state.status,
                    rules = state.rules.len(),
                    errors = state.errors.len(),
                    duration_ms,
                    "Formalization run finished"
                );
                self.events.emit(PipelineEvent::RunCompleted {
                    run_id,
                    status: state.status,
                    duration_ms,
                });
            }
            Err(e) => {
                tracing::error!(run = %run_id, error = %e, step = ?state.current_step, "Formalization run failed");
                state.record_error(ErrorEntry::from_error(&e, None));
                state.status = RunStatus::Failed;
                state.current_step = PipelineStep::Failed;
                self.events.emit(PipelineEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
            }
        }

        state.finished_at = Some(chrono::Utc::now());
        state
    }

    async fn execute(&mut self, state: &mut PipelineState, deadline: Option<Instant>) -> Result<()> {
        self.config.validate()?;

        self.enter(state, PipelineStep::Loading);
        let records = self.rule_source.load_rules().await?;
        let spec = self.spec_source.load_specification().await?;
        state.rules = records.into_iter().map(Rule::from).collect();

        self.enter(state, PipelineStep::Parsing);
        parse_rules(state, &spec);

        if self.config.formalize_rules {
            self.enter(state, PipelineStep::Formalizing);
            self.formalize(state, deadline).await;
        } else {
            tracing::info!("Formalization disabled, rules left unformalized");
        }

        if self.config.verify_with_z3 {
            match self.verifier.clone() {
                Some(verifier) => {
                    self.enter(state, PipelineStep::Verifying);
                    verify_rules(state, verifier.as_ref()).await;
                }
                None => tracing::warn!("Verification enabled but no verifier attached, skipping"),
            }
        }

        if self.config.process_dynamics {
            self.enter(state, PipelineStep::DynamicsExtraction);
            self.extract_dynamics(state);
        }

        if self.config.generate_tests {
            match self.test_generator.clone() {
                Some(generator) => {
                    self.enter(state, PipelineStep::TestGeneration);
                    self.generate_tests(state, generator).await;
                }
                None => {
                    tracing::warn!("Test generation enabled but no generator attached, skipping")
                }
            }
        }

        self.enter(state, PipelineStep::Exporting);
        tracing::info!(
            structural = state.count_with_status(FormalizationStatus::StructurallyResolved),
            semantic = state.count_with_status(FormalizationStatus::SemanticallyResolved),
            clarified = state.count_with_status(FormalizationStatus::Clarified),
            escalated = state.count_with_status(FormalizationStatus::Escalated),
            failed = state.count_with_status(FormalizationStatus::Failed),
            "Formalization summary"
        );
        Ok(())
    }

    fn enter(&self, state: &mut PipelineState, step: PipelineStep) {
        tracing::debug!(step = ?step, "Entering step");
        state.current_step = step;
        self.events.emit(PipelineEvent::StepEntered { step });
    }

    // -----------------------------------------------------------------------
    // Formalizing
    // -----------------------------------------------------------------------

    async fn formalize(&mut self, state: &mut PipelineState, deadline: Option<Instant>) {
        // Rules already answered by a human skip analysis entirely.
        for rule in state
            .rules
            .iter_mut()
            .filter(|r| r.status != FormalizationStatus::Failed)
        {
            if let Some(latest) = self.feedback.latest_feedback(&rule.id).await {
                rule.status = FormalizationStatus::Clarified;
                rule.feedback = Some(latest.feedback);
                tracing::info!(rule = %rule.id, author = %latest.author, "Rule clarified by feedback");
                self.events.emit(PipelineEvent::RuleResolved {
                    rule_id: rule.id.clone(),
                    status: rule.status,
                });
            }
        }

        // Every candidate edge, clarified rules included, is registered before
        // any rule is judged; rerunning the same rules reproduces the same graph.
        let mut variables: Vec<(usize, BTreeSet<String>)> = Vec::new();
        for (index, rule) in state.rules.iter().enumerate() {
            if rule.status == FormalizationStatus::Failed {
                continue;
            }
            let candidates = extract_candidate_edges(rule);
            for (cause, effect) in candidates.pairs() {
                let mut metadata = EdgeMetadata::new();
                metadata.insert("rule_id".into(), serde_json::json!(rule.id));
                self.causal.add_causal_relation(&cause, &effect, Some(metadata));
            }
            if rule.status == FormalizationStatus::Unformalized {
                variables.push((index, rule_variables(rule, &candidates)));
            }
        }

        let confounders = self.causal.detect_confounders();
        tracing::info!(
            rules = variables.len(),
            edges = self.causal.edge_count(),
            confounders = confounders.len(),
            "Causal graph built"
        );

        let jobs: Vec<RuleJob> = variables
            .into_iter()
            .map(|(index, vars)| RuleJob {
                index,
                rule: state.rules[index].clone(),
                touched: vars
                    .intersection(&confounders)
                    .map(|v| (v.clone(), self.causal.parents(v)))
                    .collect(),
            })
            .collect();

        let policy = ReasoningPolicy {
            max_tokens: self.config.reasoning_max_tokens,
            max_retries: self.config.max_retries,
            backoff: self.config.backoff.clone(),
            explain: self.config.explain_resolutions,
        };

        if self.config.parallel_formalization {
            self.formalize_parallel(state, jobs, policy, deadline).await;
        } else {
            for job in jobs {
                let judgement = if expired(deadline) {
                    Judgement::TimedOut
                } else {
                    judge(&job, self.reasoner.as_ref(), &policy, &self.events).await
                };
                self.apply(state, job.index, judgement).await;
            }
        }
    }

    async fn formalize_parallel(
        &self,
        state: &mut PipelineState,
        jobs: Vec<RuleJob>,
        policy: ReasoningPolicy,
        deadline: Option<Instant>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.reasoning_parallelism));
        let mut pending: BTreeSet<usize> = jobs.iter().map(|j| j.index).collect();
        let mut set = JoinSet::new();

        for job in jobs {
            let semaphore = semaphore.clone();
            let reasoner = self.reasoner.clone();
            let policy = policy.clone();
            let events = self.events.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if expired(deadline) {
                    return (job.index, Judgement::TimedOut);
                }
                let judgement = judge(&job, reasoner.as_ref(), &policy, &events).await;
                (job.index, judgement)
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Formalization worker aborted"),
            }
        }

        // Applied in rule order so ledger and request order match a sequential run.
        results.sort_by_key(|(index, _)| *index);
        for (index, judgement) in results {
            pending.remove(&index);
            self.apply(state, index, judgement).await;
        }

        for index in pending {
            let rule = &mut state.rules[index];
            rule.fail("worker aborted");
            let entry = ErrorEntry::new(
                ErrorKind::ReasoningError,
                "formalization worker aborted",
                Some(&rule.id),
            );
            state.record_error(entry);
        }
    }

    /// Write a judgement into the run state. The only place rule status changes
    /// during formalizing.
    async fn apply(&self, state: &mut PipelineState, index: usize, judgement: Judgement) {
        let rule = &mut state.rules[index];
        let rule_id = rule.id.clone();

        match judgement {
            Judgement::Structural => {
                rule.status = FormalizationStatus::StructurallyResolved;
                tracing::debug!(rule = %rule_id, "Structurally resolved");
            }
            Judgement::Semantic { touched, outcome } => {
                rule.status = FormalizationStatus::SemanticallyResolved;
                rule.confounders = touched;
                rule.explanation = outcome.explanation;
                store_trace(rule, &outcome.trace, outcome.attempts);
                tracing::info!(rule = %rule_id, attempts = outcome.attempts, "Semantically resolved");
            }
            Judgement::Escalate {
                touched,
                ambiguity,
                outcome,
            } => {
                rule.status = FormalizationStatus::Escalated;
                rule.confounders = touched;
                let mut failure = None;
                if let Some(outcome) = &outcome {
                    store_trace(rule, &outcome.trace, outcome.attempts);
                    if let ReasoningResult::Failed(f) = &outcome.result {
                        failure = Some(
                            FormalizerError::ReasoningError {
                                rule_id: rule_id.clone(),
                                message: f.message.clone(),
                            },
                        );
                    }
                }
                let request = self.feedback.request_clarification(&rule_id, &ambiguity).await;
                if let Some(err) = failure {
                    state.record_error(ErrorEntry::from_error(&err, Some(&rule_id)));
                }
                tracing::info!(rule = %rule_id, request = %request.id, "Rule escalated");
                self.events.emit(PipelineEvent::RuleEscalated {
                    rule_id,
                    request_id: request.id.to_string(),
                });
                return;
            }
            Judgement::TimedOut => {
                rule.fail("timeout");
                tracing::warn!(rule = %rule_id, "Run deadline passed, rule not started");
                let err = FormalizerError::Timeout {
                    rule_id: rule_id.clone(),
                };
                state.record_error(ErrorEntry::from_error(&err, Some(&rule_id)));
                return;
            }
        }

        let status = state.rules[index].status;
        self.events.emit(PipelineEvent::RuleResolved { rule_id, status });
    }

    // -----------------------------------------------------------------------
    // Optional steps
    // -----------------------------------------------------------------------

    fn extract_dynamics(&self, state: &mut PipelineState) {
        for rule in state
            .rules
            .iter()
            .filter(|r| r.status != FormalizationStatus::Failed)
        {
            let functions = self.dynamics.extract(&rule.condition);
            if !functions.is_empty() {
                tracing::debug!(rule = %rule.id, functions = functions.len(), "Dynamics extracted");
                state.dynamics.push(DynamicsExtraction {
                    rule_id: rule.id.clone(),
                    functions,
                });
            }
        }
    }

    async fn generate_tests(&self, state: &mut PipelineState, generator: Arc<dyn TestGenerator>) {
        let targets: Vec<Rule> = state
            .rules
            .iter()
            .filter(|r| r.status.is_resolved())
            .cloned()
            .collect();
        let techniques = self.config.test_techniques.clone();
        let count = self.config.test_cases_per_rule;

        let mut results: Vec<(usize, String, Result<Vec<serde_json::Value>>)> = Vec::new();
        if self.config.parallel_test_generation {
            let semaphore = Arc::new(Semaphore::new(self.config.reasoning_parallelism));
            let mut set = JoinSet::new();
            for (order, rule) in targets.into_iter().enumerate() {
                let semaphore = semaphore.clone();
                let generator = generator.clone();
                let techniques = techniques.clone();
                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let cases = generator.generate(&rule, &techniques, count).await;
                    (order, rule.id, cases)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => state.record_error(ErrorEntry::new(
                        ErrorKind::CollaboratorError,
                        format!("test generation worker aborted: {e}"),
                        None,
                    )),
                }
            }
            results.sort_by_key(|(order, _, _)| *order);
        } else {
            for (order, rule) in targets.iter().enumerate() {
                let cases = generator.generate(rule, &techniques, count).await;
                results.push((order, rule.id.clone(), cases));
            }
        }

        for (_, rule_id, cases) in results {
            match cases {
                Ok(cases) => state.test_cases.push(GeneratedTests { rule_id, cases }),
                Err(e) => {
                    tracing::warn!(rule = %rule_id, error = %e, "Test generation failed");
                    state.record_error(ErrorEntry::new(
                        ErrorKind::CollaboratorError,
                        e.to_string(),
                        Some(&rule_id),
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Schema checks: duplicates and lint errors fail the rule and add a `schema_error`.
fn parse_rules(state: &mut PipelineState, spec: &StudySpecification) {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for rule in state.rules.iter_mut() {
        if !seen.insert(rule.id.clone()) {
            let err = FormalizerError::SchemaError {
                rule_id: rule.id.clone(),
                message: "duplicate rule id".into(),
            };
            rule.fail(err.to_string());
            entries.push(ErrorEntry::from_error(&err, Some(&rule.id)));
            continue;
        }
        match validate_rule_or_raise(rule, spec) {
            Ok(diagnostics) => {
                for d in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
                    tracing::warn!(rule = %rule.id, lint = %d.lint, "{}", d.message);
                }
            }
            Err(err) => {
                tracing::warn!(rule = %rule.id, error = %err, "Rule failed schema validation");
                rule.fail(err.to_string());
                entries.push(ErrorEntry::from_error(&err, Some(&rule.id)));
            }
        }
    }
    for entry in entries {
        state.record_error(entry);
    }
}

async fn verify_rules(state: &mut PipelineState, verifier: &dyn Verifier) {
    let mut entries = Vec::new();
    for rule in state.rules.iter_mut().filter(|r| r.status.is_resolved()) {
        match verifier.verify(rule).await {
            Ok(verdict) => rule.verdict = Some(verdict),
            Err(e) => {
                tracing::warn!(rule = %rule.id, error = %e, "Verification failed");
                entries.push(ErrorEntry::new(
                    ErrorKind::VerificationError,
                    e.to_string(),
                    Some(&rule.id),
                ));
            }
        }
    }
    for entry in entries {
        state.record_error(entry);
    }
}

fn store_trace(rule: &mut Rule, trace: &crate::thoughts::ThoughtGraph, attempts: usize) {
    if let Ok(value) = serde_json::to_value(trace) {
        rule.metadata.insert("reasoning_trace".into(), value);
    }
    rule.metadata.insert("reasoning_attempts".into(), serde_json::json!(attempts));
}

fn describe_ambiguity(touched: &BTreeMap<String, BTreeSet<String>>) -> String {
    let parts: Vec<String> = touched
        .iter()
        .map(|(var, causes)| {
            let causes: Vec<&str> = causes.iter().map(String::as_str).collect();
            format!("{var} <- {}", causes.join(", "))
        })
        .collect();
    format!("confounded variables: {}", parts.join("; "))
}

/// Decide a rule's fate without touching shared state.
async fn judge(
    job: &RuleJob,
    reasoner: &dyn Reasoner,
    policy: &ReasoningPolicy,
    events: &EventEmitter,
) -> Judgement {
    if job.touched.is_empty() {
        return Judgement::Structural;
    }

    let touched: Vec<String> = job.touched.keys().cloned().collect();
    let ambiguity = describe_ambiguity(&job.touched);

    if !reasoner.is_enabled() {
        tracing::debug!(rule = %job.rule.id, "Reasoning disabled, escalating");
        return Judgement::Escalate {
            touched,
            ambiguity,
            outcome: None,
        };
    }

    let confounders: BTreeSet<String> = job.touched.keys().cloned().collect();
    let parents_of = |var: &str| job.touched.get(var).cloned().unwrap_or_default();
    let outcome =
        reason_about_rule(reasoner, &job.rule, &confounders, parents_of, policy, events).await;

    if outcome.result.is_usable() {
        Judgement::Semantic { touched, outcome }
    } else {
        tracing::info!(rule = %job.rule.id, result = ?outcome.result, "Semantic resolution inconclusive");
        Judgement::Escalate {
            touched,
            ambiguity,
            outcome: Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryRules, InMemorySpecification};
    use formalizer_llm::ReasoningBackend;
    use formalizer_types::{RuleRecord, SpecRow};

    fn record(id: &str, condition: &str, fields: &[&str]) -> RuleRecord {
        RuleRecord {
            check_id: id.into(),
            condition: condition.into(),
            message: String::new(),
            severity: Default::default(),
            forms: vec![],
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn spec() -> StudySpecification {
        let rows = ["age", "glucose", "diabetes", "medication"].map(|f| SpecRow {
            form_name: "CRF".into(),
            field_name: f.into(),
            field_type: "text".into(),
            required: false,
            valid_values: vec![],
        });
        StudySpecification::from_rows(rows)
    }

    fn offline_config() -> PipelineConfig {
        PipelineConfig {
            verify_with_z3: false,
            generate_tests: false,
            reasoning_provider: "local".into(),
            backoff: crate::retry::BackoffPolicy::None,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(records: Vec<RuleRecord>, config: PipelineConfig) -> FormalizationPipeline {
        FormalizationPipeline::new(
            config,
            InMemoryRules(records),
            InMemorySpecification(spec()),
            Arc::new(ReasoningBackend::local()),
        )
    }

    #[test]
    fn ambiguity_lists_causes() {
        let mut touched = BTreeMap::new();
        touched.insert(
            "glucose".to_string(),
            ["diabetes", "medication"].iter().map(|s| s.to_string()).collect(),
        );
        assert_eq!(
            describe_ambiguity(&touched),
            "confounded variables: glucose <- diabetes, medication"
        );
    }

    #[tokio::test]
    async fn duplicate_ids_fail_the_second_rule() {
        let mut p = pipeline(
            vec![record("R1", "age > 1", &["age"]), record("R1", "age < 99", &["age"])],
            offline_config(),
        );
        let state = p.run().await;
        assert_eq!(state.rules.len(), 2);
        assert_eq!(state.rules[0].status, FormalizationStatus::StructurallyResolved);
        assert_eq!(state.rules[1].status, FormalizationStatus::Failed);
        assert_eq!(state.errors_of_kind(ErrorKind::SchemaError).count(), 1);
        assert_eq!(state.status, RunStatus::CompletedWithErrors);
    }

    #[tokio::test]
    async fn steps_are_announced_in_order() {
        let events = EventEmitter::new(64);
        let mut rx = events.subscribe();
        let mut p = pipeline(vec![record("R1", "age > 1", &["age"])], offline_config())
            .with_events(events);
        let state = p.run().await;
        assert_eq!(state.current_step, PipelineStep::Completed);

        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StepEntered { step } = event {
                steps.push(step);
            }
        }
        assert_eq!(
            steps,
            vec![
                PipelineStep::Loading,
                PipelineStep::Parsing,
                PipelineStep::Formalizing,
                PipelineStep::DynamicsExtraction,
                PipelineStep::Exporting,
                PipelineStep::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn edges_carry_rule_of_origin() {
        let mut p = pipeline(
            vec![record("R2", "IF diabetes = 'Y' THEN glucose > 126", &["diabetes", "glucose"])],
            offline_config(),
        );
        p.run().await;
        let meta = p.causal_engine().edge_metadata("diabetes", "glucose").unwrap();
        assert_eq!(meta["rule_id"], serde_json::json!("R2"));
    }
}
