//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (progress output, audit logs, tests) can follow a run without
//! coupling to the engine internals.

use serde::{Deserialize, Serialize};

use formalizer_types::FormalizationStatus;

use crate::state::{PipelineStep, RunStatus};

/// Events emitted during a formalization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
    },
    StepEntered {
        step: PipelineStep,
    },
    RuleResolved {
        rule_id: String,
        status: FormalizationStatus,
    },
    RuleEscalated {
        rule_id: String,
        request_id: String,
    },
    ReasoningRetrying {
        rule_id: String,
        attempt: usize,
    },
    RunCompleted {
        run_id: String,
        status: RunStatus,
        duration_ms: u64,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
