use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Hook run around every provider call made by a [`crate::RemoteReasoner`].
pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        tracing::info!(
            model = %request.model,
            prompt_chars,
            max_tokens = ?request.max_tokens,
            "Reasoning request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "Reasoning response"
        );
    }
}

// ---------------------------------------------------------------------------
// UsageTracker
// ---------------------------------------------------------------------------

/// Accumulates token usage across every call of a run. Clones share counters.
#[derive(Clone, Default)]
pub struct UsageTracker {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
    calls: Arc<AtomicU64>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Middleware for UsageTracker {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}
