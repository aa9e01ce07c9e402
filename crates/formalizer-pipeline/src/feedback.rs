//! Append-only log of clarification requests and human responses, indexed by rule.
//!
//! Records are immutable once appended. The store is shared behind an `Arc`;
//! appends and reads go through one `RwLock`, so a read observes every append
//! that completed before it.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use formalizer_types::Result;

/// An advisory request for a human to resolve an ambiguity in a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub id: Uuid,
    pub rule_id: String,
    pub ambiguity: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRecord {
    pub rule_id: String,
    /// The ambiguity this feedback answers, when it answers a known request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity: Option<String>,
    pub feedback: String,
    pub author: String,
    /// Position in the store's global append order.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedbackLog {
    requests: Vec<ClarificationRequest>,
    records: HashMap<String, Vec<ClarificationRecord>>,
    next_sequence: u64,
}

#[derive(Debug, Default)]
pub struct FeedbackStore {
    inner: RwLock<FeedbackLog>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a clarification request and return it. Never blocks on a human.
    pub async fn request_clarification(
        &self,
        rule_id: &str,
        ambiguity: &str,
    ) -> ClarificationRequest {
        let request = ClarificationRequest {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            ambiguity: ambiguity.to_string(),
            message: format!("Clarification needed for rule {rule_id}: {ambiguity}"),
            created_at: Utc::now(),
        };
        tracing::info!(rule = %rule_id, request = %request.id, "Clarification requested");
        self.inner.write().await.requests.push(request.clone());
        request
    }

    /// Append a human clarification for `rule_id`.
    pub async fn record_feedback(
        &self,
        rule_id: &str,
        feedback: &str,
        author: &str,
    ) -> ClarificationRecord {
        let mut log = self.inner.write().await;
        let ambiguity = log
            .requests
            .iter()
            .rev()
            .find(|r| r.rule_id == rule_id)
            .map(|r| r.ambiguity.clone());
        let record = ClarificationRecord {
            rule_id: rule_id.to_string(),
            ambiguity,
            feedback: feedback.to_string(),
            author: author.to_string(),
            sequence: log.next_sequence,
            recorded_at: Utc::now(),
        };
        log.next_sequence += 1;
        log.records
            .entry(rule_id.to_string())
            .or_default()
            .push(record.clone());
        tracing::info!(rule = %rule_id, author = %author, "Feedback recorded");
        record
    }

    pub async fn has_feedback(&self, rule_id: &str) -> bool {
        self.inner
            .read()
            .await
            .records
            .get(rule_id)
            .is_some_and(|r| !r.is_empty())
    }

    /// Every record for `rule_id`, oldest first.
    pub async fn get_feedback(&self, rule_id: &str) -> Vec<ClarificationRecord> {
        self.inner
            .read()
            .await
            .records
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn latest_feedback(&self, rule_id: &str) -> Option<ClarificationRecord> {
        self.inner
            .read()
            .await
            .records
            .get(rule_id)
            .and_then(|r| r.last().cloned())
    }

    pub async fn requests(&self) -> Vec<ClarificationRequest> {
        self.inner.read().await.requests.clone()
    }

    /// Requests whose rule has no feedback yet, one per rule (the latest).
    pub async fn pending_requests(&self) -> Vec<ClarificationRequest> {
        let log = self.inner.read().await;
        let mut pending: Vec<ClarificationRequest> = Vec::new();
        for request in log.requests.iter().rev() {
            let answered = log.records.get(&request.rule_id).is_some_and(|r| !r.is_empty());
            if !answered && !pending.iter().any(|p| p.rule_id == request.rule_id) {
                pending.push(request.clone());
            }
        }
        pending.reverse();
        pending
    }

    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.values().map(Vec::len).sum()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the whole log as JSON, creating parent directories as needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = {
            let log = self.inner.read().await;
            serde_json::to_string_pretty(&*log)?
        };
        tokio::fs::write(path, json).await?;
        tracing::debug!(path = %path.display(), "Feedback store saved");
        Ok(())
    }

    /// Load a log written by [`FeedbackStore::save`]. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::new());
        }
        let json = tokio::fs::read_to_string(path).await?;
        let log: FeedbackLog = serde_json::from_str(&json)?;
        Ok(Self {
            inner: RwLock::new(log),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn request_is_logged_and_pending() {
        let store = FeedbackStore::new();
        let req = store
            .request_clarification("R002", "glucose has causes diabetes, medication")
            .await;
        assert_eq!(req.rule_id, "R002");
        assert!(req.message.contains("R002"));
        assert_eq!(store.requests().await, vec![req.clone()]);
        assert_eq!(store.pending_requests().await, vec![req]);
        assert!(!store.has_feedback("R002").await);
    }

    #[tokio::test]
    async fn feedback_is_visible_and_ordered() {
        let store = FeedbackStore::new();
        store.request_clarification("R002", "confounded").await;
        store.record_feedback("R002", "first", "alice").await;
        store.record_feedback("R002", "second", "bob").await;

        assert!(store.has_feedback("R002").await);
        let records = store.get_feedback("R002").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].feedback, "first");
        assert_eq!(records[1].feedback, "second");
        assert_eq!(records[1].author, "bob");
        assert!(records[0].sequence < records[1].sequence);
        assert_eq!(records[0].ambiguity.as_deref(), Some("confounded"));
        assert_eq!(
            store.latest_feedback("R002").await.map(|r| r.feedback),
            Some("second".to_string())
        );
        assert!(store.pending_requests().await.is_empty());
    }

    #[tokio::test]
    async fn feedback_without_request_is_accepted() {
        let store = FeedbackStore::new();
        let record = store.record_feedback("R9", "age is in years", "carol").await;
        assert!(record.ambiguity.is_none());
        assert!(store.get_feedback("other").await.is_empty());
    }

    #[tokio::test]
    async fn pending_requests_deduplicate_by_rule() {
        let store = FeedbackStore::new();
        store.request_clarification("R1", "first run").await;
        store.request_clarification("R2", "x").await;
        store.request_clarification("R1", "second run").await;

        let pending = store.pending_requests().await;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].rule_id, "R2");
        assert_eq!(pending[1].ambiguity, "second run");
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let store = Arc::new(FeedbackStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_feedback(&format!("R{}", i % 4), "ok", "reviewer")
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.record_count().await, 16);
        assert_eq!(store.get_feedback("R0").await.len(), 4);
    }

    #[tokio::test]
    async fn save_and_load_preserve_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feedback.json");

        let store = FeedbackStore::new();
        store.request_clarification("R2", "confounded").await;
        store.request_clarification("R3", "confounded").await;
        store.record_feedback("R2", "diabetes drives glucose", "alice").await;
        store.save(&path).await.unwrap();

        let loaded = FeedbackStore::load(&path).await.unwrap();
        assert!(loaded.has_feedback("R2").await);
        assert_eq!(loaded.requests().await.len(), 2);
        assert_eq!(loaded.pending_requests().await.len(), 1);

        let next = loaded.record_feedback("R3", "ok", "bob").await;
        assert_eq!(next.sequence, 1);
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::load(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(store.record_count().await, 0);
        assert!(store.requests().await.is_empty());
    }
}
