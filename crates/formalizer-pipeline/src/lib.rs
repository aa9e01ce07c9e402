//! Edit-check rule formalization pipeline.
//!
//! Loads rules and the study specification, validates rules against it, and
//! resolves each rule structurally (causal graph), semantically (reasoning
//! backend) or by escalation to a human via the [`FeedbackStore`].

pub mod collaborators;
pub mod config;
pub(crate) mod duration_serde;
pub mod dynamics;
pub mod engine;
pub mod events;
pub mod extraction;
pub mod feedback;
pub mod retry;
pub mod reviewer;
pub mod state;
pub mod thoughts;
pub mod validation;

pub use collaborators::{
    DynamicsExtractor, InMemoryRules, InMemorySpecification, JsonRuleFile,
    JsonSpecificationFile, RuleSource, SpecificationSource, TestGenerator, Verifier,
};
pub use config::PipelineConfig;
pub use dynamics::RegexDynamicsExtractor;
pub use engine::FormalizationPipeline;
pub use events::{EventEmitter, PipelineEvent};
pub use feedback::{ClarificationRecord, ClarificationRequest, FeedbackStore};
pub use retry::BackoffPolicy;
pub use reviewer::{
    collect_feedback, AutoSkipReviewer, ConsoleReviewer, RecordingReviewer, Reviewer,
};
pub use state::{
    DynamicsExtraction, ErrorEntry, FunctionReference, GeneratedTests, PipelineState,
    PipelineStep, RunStatus,
};
pub use thoughts::{ThoughtGraph, ThoughtKind};
