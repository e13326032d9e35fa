use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::ConversationSummary;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSummaryEntry {
    pub summary: ConversationSummary,
    pub created_at: DateTime<Utc>,
    pub message_count_at_creation: usize,
}

/// Latest background summary per user. Entries are replaced, never merged, and
/// live until the process exits; staleness only affects whether they are served.
pub struct SummaryCache {
    staleness: chrono::Duration,
    entries: RwLock<HashMap<String, CachedSummaryEntry>>,
}

impl SummaryCache {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX))),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached summary for `user_id` if it is still fresh.
    pub fn get(&self, user_id: &str) -> Option<ConversationSummary> {
        self.get_at(user_id, Utc::now())
    }

    /// Fresh means strictly younger than the staleness window at `now`.
    pub fn get_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<ConversationSummary> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(user_id)?;
        (now - entry.created_at < self.staleness).then(|| entry.summary.clone())
    }

    pub fn put(&self, user_id: &str, summary: ConversationSummary, message_count: usize) {
        self.put_at(user_id, summary, message_count, Utc::now());
    }

    pub fn put_at(
        &self,
        user_id: &str,
        summary: ConversationSummary,
        message_count: usize,
        created_at: DateTime<Utc>,
    ) {
        let entry = CachedSummaryEntry {
            summary,
            created_at,
            message_count_at_creation: message_count,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), entry);
    }

    /// Whether any entry exists for `user_id`, fresh or not.
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    pub fn entry(&self, user_id: &str) -> Option<CachedSummaryEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
