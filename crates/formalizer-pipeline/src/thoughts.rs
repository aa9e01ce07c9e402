//! Graph-of-thoughts reasoning for confounded rules.
//!
//! A root validation thought asks the backend to disambiguate the rule. When
//! that succeeds, one hypothesis thought per confounding variable and a final
//! explanation thought follow. Every thought is an independent `reason` call;
//! the backend keeps no history.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use formalizer_llm::{Reasoner, ReasoningResult};
use formalizer_types::Rule;

use crate::events::EventEmitter;
use crate::retry::{execute_with_retry, BackoffPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    Validation,
    Hypothesis,
    Explanation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: usize,
    pub kind: ThoughtKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// The confounding variable a hypothesis is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub prompt: String,
    pub result: ReasoningResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThoughtGraph {
    pub thoughts: Vec<Thought>,
}

impl ThoughtGraph {
    fn push(
        &mut self,
        kind: ThoughtKind,
        parent: Option<usize>,
        subject: Option<String>,
        prompt: String,
        result: ReasoningResult,
    ) -> usize {
        let id = self.thoughts.len();
        self.thoughts.push(Thought {
            id,
            kind,
            parent,
            subject,
            prompt,
            result,
        });
        id
    }

    pub fn root(&self) -> Option<&Thought> {
        self.thoughts.first()
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = &Thought> {
        self.thoughts
            .iter()
            .filter(|t| t.kind == ThoughtKind::Hypothesis)
    }

    pub fn explanation(&self) -> Option<&Thought> {
        self.thoughts
            .iter()
            .find(|t| t.kind == ThoughtKind::Explanation)
    }

    pub fn children(&self, id: usize) -> impl Iterator<Item = &Thought> {
        self.thoughts.iter().filter(move |t| t.parent == Some(id))
    }
}

/// How the reasoning calls for one rule are made.
#[derive(Debug, Clone)]
pub struct ReasoningPolicy {
    pub max_tokens: u32,
    pub max_retries: usize,
    pub backoff: BackoffPolicy,
    pub explain: bool,
}

#[derive(Debug, Clone)]
pub struct SemanticOutcome {
    /// Final result of the root validation thought; decides the rule's fate.
    pub result: ReasoningResult,
    pub attempts: usize,
    pub trace: ThoughtGraph,
    /// Best explanation available: the explanation thought, else the root answer.
    pub explanation: Option<String>,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn join(vars: &BTreeSet<String>) -> String {
    vars.iter().cloned().collect::<Vec<_>>().join(", ")
}

pub fn validation_prompt(rule: &Rule, confounders: &BTreeSet<String>) -> String {
    format!(
        "Edit check {id} ({severity:?}): {condition}\n\
         The variables {vars} each have more than one recorded cause, so the rule's \
         outcome may be confounded. State the intended causal reading of this rule and \
         whether it is well defined.",
        id = rule.id,
        severity = rule.severity,
        condition = rule.condition,
        vars = join(confounders),
    )
}

pub fn hypothesis_prompt(rule: &Rule, variable: &str, parents: &BTreeSet<String>) -> String {
    format!(
        "In edit check {id} ({condition}), the variable '{variable}' is influenced by \
         {parents}. Which of these influences should the rule account for, and why?",
        id = rule.id,
        condition = rule.condition,
        parents = join(parents),
    )
}

pub fn explanation_prompt(rule: &Rule, trace: &ThoughtGraph) -> String {
    let mut prompt = format!(
        "Summarise for a clinical data manager how edit check {} ({}) should be read.\n",
        rule.id, rule.condition
    );
    for thought in &trace.thoughts {
        if let Some(answer) = thought.result.text() {
            prompt.push_str("- ");
            prompt.push_str(answer);
            prompt.push('\n');
        }
    }
    prompt
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run the thought graph for one rule. `parents_of` returns the recorded causes of a variable.
pub async fn reason_about_rule<P>(
    reasoner: &dyn Reasoner,
    rule: &Rule,
    confounders: &BTreeSet<String>,
    parents_of: P,
    policy: &ReasoningPolicy,
    events: &EventEmitter,
) -> SemanticOutcome
where
    P: Fn(&str) -> BTreeSet<String>,
{
    let mut trace = ThoughtGraph::default();

    let prompt = validation_prompt(rule, confounders);
    let root = execute_with_retry(
        || reasoner.reason(&prompt, policy.max_tokens),
        policy.max_retries,
        &policy.backoff,
        &rule.id,
        events,
    )
    .await;
    let root_id = trace.push(ThoughtKind::Validation, None, None, prompt, root.result.clone());

    if !root.result.is_usable() || !policy.explain {
        return SemanticOutcome {
            explanation: root.result.text().map(String::from),
            result: root.result,
            attempts: root.attempts,
            trace,
        };
    }

    for variable in confounders {
        let prompt = hypothesis_prompt(rule, variable, &parents_of(variable));
        let outcome = execute_with_retry(
            || reasoner.reason(&prompt, policy.max_tokens),
            policy.max_retries,
            &policy.backoff,
            &rule.id,
            events,
        )
        .await;
        trace.push(
            ThoughtKind::Hypothesis,
            Some(root_id),
            Some(variable.clone()),
            prompt,
            outcome.result,
        );
    }

    let prompt = explanation_prompt(rule, &trace);
    let outcome = execute_with_retry(
        || reasoner.reason(&prompt, policy.max_tokens),
        policy.max_retries,
        &policy.backoff,
        &rule.id,
        events,
    )
    .await;
    let explanation = outcome
        .result
        .text()
        .or_else(|| root.result.text())
        .map(String::from);
    trace.push(ThoughtKind::Explanation, Some(root_id), None, prompt, outcome.result);

    SemanticOutcome {
        result: root.result,
        attempts: root.attempts,
        trace,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every prompt with its own call number; fails the calls listed in `fail_on`.
    struct Echo {
        calls: Mutex<Vec<String>>,
        fail_on: Vec<usize>,
    }

    impl Echo {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl Reasoner for Echo {
        async fn reason(&self, prompt: &str, _max_tokens: u32) -> ReasoningResult {
            let mut calls = self.calls.lock().unwrap();
            calls.push(prompt.to_string());
            let n = calls.len();
            if self.fail_on.contains(&n) {
                ReasoningResult::failed("nope", false)
            } else {
                ReasoningResult::answer(format!("answer {n}"))
            }
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn policy(explain: bool) -> ReasoningPolicy {
        ReasoningPolicy {
            max_tokens: 64,
            max_retries: 0,
            backoff: BackoffPolicy::None,
            explain,
        }
    }

    fn glucose_rule() -> (Rule, BTreeSet<String>) {
        let rule = Rule::new("R2", "IF diabetes = 'Y' THEN glucose > 126")
            .with_fields(["diabetes", "glucose"]);
        (rule, ["glucose".to_string()].into_iter().collect())
    }

    fn parents(_: &str) -> BTreeSet<String> {
        ["diabetes", "medication"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn full_trace_has_root_hypotheses_and_explanation() {
        let (rule, confounders) = glucose_rule();
        let reasoner = Echo::new(vec![]);
        let outcome = reason_about_rule(
            &reasoner,
            &rule,
            &confounders,
            parents,
            &policy(true),
            &EventEmitter::default(),
        )
        .await;

        assert!(outcome.result.is_usable());
        assert_eq!(outcome.trace.thoughts.len(), 3);
        assert_eq!(outcome.trace.root().unwrap().kind, ThoughtKind::Validation);
        let hypotheses: Vec<_> = outcome.trace.hypotheses().collect();
        assert_eq!(hypotheses.len(), 1);
        assert_eq!(hypotheses[0].subject.as_deref(), Some("glucose"));
        assert!(hypotheses[0].prompt.contains("diabetes, medication"));
        assert_eq!(outcome.trace.children(0).count(), 2);
        assert_eq!(outcome.explanation.as_deref(), Some("answer 3"));

        let calls = reasoner.calls.lock().unwrap();
        assert!(calls[2].contains("answer 1"));
        assert!(calls[2].contains("answer 2"));
    }

    #[tokio::test]
    async fn failed_root_stops_the_trace() {
        let (rule, confounders) = glucose_rule();
        let outcome = reason_about_rule(
            &Echo::new(vec![1]),
            &rule,
            &confounders,
            parents,
            &policy(true),
            &EventEmitter::default(),
        )
        .await;
        assert!(!outcome.result.is_usable());
        assert_eq!(outcome.trace.thoughts.len(), 1);
        assert!(outcome.explanation.is_none());
    }

    #[tokio::test]
    async fn explanation_falls_back_to_root_answer() {
        let (rule, confounders) = glucose_rule();
        let outcome = reason_about_rule(
            &Echo::new(vec![3]),
            &rule,
            &confounders,
            parents,
            &policy(true),
            &EventEmitter::default(),
        )
        .await;
        assert!(outcome.result.is_usable());
        assert_eq!(outcome.explanation.as_deref(), Some("answer 1"));
    }

    #[tokio::test]
    async fn without_explain_only_root_is_asked() {
        let (rule, confounders) = glucose_rule();
        let reasoner = Echo::new(vec![]);
        let outcome = reason_about_rule(
            &reasoner,
            &rule,
            &confounders,
            parents,
            &policy(false),
            &EventEmitter::default(),
        )
        .await;
        assert_eq!(outcome.trace.thoughts.len(), 1);
        assert_eq!(reasoner.calls.lock().unwrap().len(), 1);
        assert_eq!(outcome.explanation.as_deref(), Some("answer 1"));
    }

    #[test]
    fn validation_prompt_names_rule_and_confounders() {
        let (rule, confounders) = glucose_rule();
        let prompt = validation_prompt(&rule, &confounders);
        assert!(prompt.contains("R2"));
        assert!(prompt.contains("glucose > 126"));
        assert!(prompt.contains("glucose each have"));
    }
}
