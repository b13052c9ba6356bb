//! Memory
//!
//! A recall/store contract for long-term context beyond the rolling
//! `Context` window. Recall is budgeted (default 50ms); a store that
//! doesn't answer in time is treated as having nothing relevant rather than
//! blocking the turn — an empty recall is a valid, unremarkable outcome.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub text: String,
    pub speaker: String,
}

#[async_trait]
pub trait Memory: Send + Sync {
    async fn recall(&self, query: &str, limit: usize) -> Vec<MemoryRecord>;

    async fn store(&self, record: MemoryRecord);
}

/// Runs `memory.recall` under `budget`, returning an empty vec on timeout
/// rather than propagating an error — recall is an enrichment, not a
/// requirement, for a turn to proceed.
pub async fn recall_with_budget(memory: &dyn Memory, query: &str, limit: usize, budget: Duration) -> Vec<MemoryRecord> {
    match tokio::time::timeout(budget, memory.recall(query, limit)).await {
        Ok(records) => records,
        Err(_) => Vec::new(),
    }
}

/// Deterministic reference implementation: records are scored by the count
/// of shared lowercase words with the query and returned highest-first. No
/// embeddings, no external service — good enough for development and for
/// reproducible end-to-end test scenarios.
#[derive(Default)]
pub struct KeywordOverlapMemory {
    records: parking_lot::RwLock<Vec<MemoryRecord>>,
}

impl KeywordOverlapMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn words(text: &str) -> HashSet<String> {
        text.split_whitespace().map(|w| w.to_lowercase()).collect()
    }
}

#[async_trait]
impl Memory for KeywordOverlapMemory {
    async fn recall(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let query_words = Self::words(query);
        let records = self.records.read();
        let mut scored: Vec<(usize, MemoryRecord)> = records
            .iter()
            .map(|r| {
                let overlap = Self::words(&r.text).intersection(&query_words).count();
                (overlap, r.clone())
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    async fn store(&self, record: MemoryRecord) {
        self.records.write().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recall_ranks_by_keyword_overlap() {
        let memory = KeywordOverlapMemory::new();
        memory.store(MemoryRecord { text: "the robot likes jazz music".into(), speaker: "user".into() }).await;
        memory.store(MemoryRecord { text: "the weather is sunny today".into(), speaker: "user".into() }).await;
        let results = memory.recall("what music does the robot like", 5).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("jazz"));
    }

    #[tokio::test]
    async fn recall_with_no_overlap_is_empty() {
        let memory = KeywordOverlapMemory::new();
        memory.store(MemoryRecord { text: "completely unrelated topic".into(), speaker: "user".into() }).await;
        let results = memory.recall("xyzzy plugh", 5).await;
        assert!(results.is_empty());
    }

    struct NeverRespondingMemory;

    #[async_trait]
    impl Memory for NeverRespondingMemory {
        async fn recall(&self, _query: &str, _limit: usize) -> Vec<MemoryRecord> {
            std::future::pending().await
        }

        async fn store(&self, _record: MemoryRecord) {}
    }

    #[tokio::test]
    async fn timeout_yields_empty_recall_not_an_error() {
        let results = recall_with_budget(&NeverRespondingMemory, "anything", 5, Duration::from_millis(10)).await;
        assert!(results.is_empty());
    }
}
