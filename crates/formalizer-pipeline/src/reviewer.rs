//! Human reviewers that answer clarification requests, and the loop that feeds
//! their answers into a [`FeedbackStore`].

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use formalizer_types::Result;

use crate::feedback::{ClarificationRecord, ClarificationRequest, FeedbackStore};

/// Answers a clarification request. `None` or empty text means "skip for now".
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ClarificationRequest) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// AutoSkipReviewer
// ---------------------------------------------------------------------------

pub struct AutoSkipReviewer;

#[async_trait]
impl Reviewer for AutoSkipReviewer {
    async fn review(&self, _request: &ClarificationRequest) -> Result<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// ConsoleReviewer
// ---------------------------------------------------------------------------

pub struct ConsoleReviewer;

#[async_trait]
impl Reviewer for ConsoleReviewer {
    async fn review(&self, request: &ClarificationRequest) -> Result<Option<String>> {
        let prompt = request.message.clone();
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            println!("\n{prompt}");
            print!("Clarification (empty to skip): ");
            std::io::stdout().flush()?;
            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            Ok(input)
        })
        .await
        .map_err(|e| formalizer_types::FormalizerError::Other(e.to_string()))??;

        let trimmed = answer.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingReviewer
// ---------------------------------------------------------------------------

/// Plays back scripted answers in order and remembers what it was asked.
pub struct RecordingReviewer {
    answers: Mutex<Vec<Option<String>>>,
    requests: Mutex<Vec<ClarificationRequest>>,
}

impl RecordingReviewer {
    pub fn new(answers: Vec<Option<String>>) -> Self {
        let mut reversed = answers;
        reversed.reverse();
        Self {
            answers: Mutex::new(reversed),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ClarificationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Reviewer for RecordingReviewer {
    async fn review(&self, request: &ClarificationRequest) -> Result<Option<String>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .flatten();
        Ok(answer)
    }
}

// ---------------------------------------------------------------------------
// Review loop
// ---------------------------------------------------------------------------

/// Ask `reviewer` about every pending request and record each non-empty answer
/// under `author`. Returns the records appended.
pub async fn collect_feedback(
    store: &FeedbackStore,
    reviewer: &dyn Reviewer,
    author: &str,
) -> Result<Vec<ClarificationRecord>> {
    let pending = store.pending_requests().await;
    tracing::info!(pending = pending.len(), "Collecting clarifications");

    let mut recorded = Vec::new();
    for request in &pending {
        match reviewer.review(request).await? {
            Some(text) if !text.trim().is_empty() => {
                recorded.push(store.record_feedback(&request.rule_id, text.trim(), author).await);
            }
            _ => tracing::debug!(rule = %request.rule_id, "Clarification skipped"),
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_skip_records_nothing() {
        let store = FeedbackStore::new();
        store.request_clarification("R1", "confounded").await;
        let recorded = collect_feedback(&store, &AutoSkipReviewer, "bot").await.unwrap();
        assert!(recorded.is_empty());
        assert_eq!(store.pending_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn recording_reviewer_answers_in_order() {
        let store = FeedbackStore::new();
        store.request_clarification("R1", "a").await;
        store.request_clarification("R2", "b").await;
        store.request_clarification("R3", "c").await;

        let reviewer = RecordingReviewer::new(vec![
            Some("diabetes is primary".into()),
            None,
            Some("   ".into()),
        ]);
        let recorded = collect_feedback(&store, &reviewer, "alice").await.unwrap();

        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].rule_id, "R1");
        assert_eq!(recorded[0].author, "alice");
        assert!(store.has_feedback("R1").await);
        assert!(!store.has_feedback("R2").await);
        assert_eq!(reviewer.requests().len(), 3);
        assert_eq!(store.pending_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn answered_rules_are_not_asked_again() {
        let store = FeedbackStore::new();
        store.request_clarification("R1", "a").await;
        store.record_feedback("R1", "done", "alice").await;

        let reviewer = RecordingReviewer::new(vec![]);
        collect_feedback(&store, &reviewer, "bob").await.unwrap();
        assert!(reviewer.requests().is_empty());
    }
}
