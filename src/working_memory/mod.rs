//! Per-robot working memory (§4.5): a token-budgeted cache supporting
//! eviction, recall promotion, and context assembly for LLM prompts.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{NodeId, Timestamp};

/// One cached entry. `access_count` and `importance` drive eviction scoring
/// and the `important`/`balanced` assembly strategies.
#[derive(Clone, Debug)]
pub struct Entry {
    /// The cached node's id.
    pub node_id: NodeId,
    /// The node's content, cached directly so assembly never re-reads storage.
    pub content: String,
    /// Token count, counted against the budget.
    pub token_count: u64,
    /// When this entry was added (or re-added after eviction).
    pub added_at: Timestamp,
    /// Number of times this entry has been touched since being added.
    pub access_count: u64,
    /// Caller-supplied importance; defaults to `1.0` (§4.5).
    pub importance: f64,
}

/// Context-assembly strategy (§4.5 `AssembleContext`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssembleStrategy {
    /// Most-recently-added entries first.
    Recent,
    /// Highest-importance entries first, ties broken by recency.
    Important,
    /// Interleaves importance and recency order, deduplicating.
    Balanced,
}

/// A token-budgeted, per-robot working-memory cache.
///
/// Every public method maintains the invariant `sum(token_count) <=
/// max_tokens` on return (§4.5).
pub struct WorkingMemory {
    max_tokens: u64,
    entries: RwLock<HashMap<NodeId, Entry>>,
}

impl WorkingMemory {
    /// Creates an empty working memory with the given token budget.
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a node to working memory, evicting lower-scored entries if the
    /// addition would overflow the budget (§4.5 `Add`). If `node_id` is
    /// already present, bumps `access_count` instead of re-inserting.
    ///
    /// `from_recall` has no effect on the outcome; it exists so callers can
    /// distinguish direct adds from recall-driven promotion in logs/metrics.
    pub fn add(
        &self,
        node_id: NodeId,
        content: String,
        token_count: u64,
        importance: Option<f64>,
        from_recall: bool,
    ) -> Vec<Entry> {
        let _ = from_recall;
        let mut entries = self.entries.write().expect("working memory lock poisoned");

        if let Some(existing) = entries.get_mut(&node_id) {
            existing.access_count += 1;
            return Vec::new();
        }

        let current_tokens: u64 = entries.values().map(|e| e.token_count).sum();
        let mut evicted = Vec::new();
        if current_tokens + token_count > self.max_tokens {
            evicted = evict_until_fits(&mut entries, self.max_tokens, token_count);
        }

        entries.insert(
            node_id,
            Entry {
                node_id,
                content,
                token_count,
                added_at: Timestamp::now(),
                access_count: 0,
                importance: importance.unwrap_or(1.0),
            },
        );
        evicted
    }

    /// Removes a node from working memory, if present.
    pub fn remove(&self, node_id: NodeId) -> Option<Entry> {
        let mut entries = self.entries.write().expect("working memory lock poisoned");
        entries.remove(&node_id)
    }

    /// True if `node_id` is currently cached.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.entries
            .read()
            .expect("working memory lock poisoned")
            .contains_key(&node_id)
    }

    /// Number of entries currently cached.
    pub fn node_count(&self) -> usize {
        self.entries.read().expect("working memory lock poisoned").len()
    }

    /// Sum of `token_count` across all cached entries.
    pub fn token_count(&self) -> u64 {
        self.entries
            .read()
            .expect("working memory lock poisoned")
            .values()
            .map(|e| e.token_count)
            .sum()
    }

    /// Fraction of the token budget currently in use, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.token_count() as f64 / self.max_tokens as f64
    }

    /// Assembles a context string from cached entries under `strategy`,
    /// bounded by `max_tokens` (falling back to the working memory's own
    /// budget when absent).
    pub fn assemble_context(&self, strategy: AssembleStrategy, max_tokens: Option<u64>) -> String {
        let budget = max_tokens.unwrap_or(self.max_tokens);
        let entries = self.entries.read().expect("working memory lock poisoned");
        let ordered = match strategy {
            AssembleStrategy::Recent => order_by_recency(&entries),
            AssembleStrategy::Important => order_by_importance(&entries),
            AssembleStrategy::Balanced => interleave_balanced(&entries),
        };

        let mut used = 0u64;
        let mut pieces = Vec::new();
        for entry in ordered {
            if used + entry.token_count > budget {
                continue;
            }
            used += entry.token_count;
            pieces.push(entry.content.clone());
        }
        pieces.join("\n\n")
    }

    /// Promotes a recall hit into working memory (§4.5 "Promotion from
    /// recall"): a no-op if already present, otherwise an eviction-aware add.
    pub fn promote_from_recall(&self, node_id: NodeId, content: String, token_count: u64) -> Vec<Entry> {
        if self.contains(node_id) {
            self.add(node_id, content, token_count, None, true);
            return Vec::new();
        }
        self.add(node_id, content, token_count, None, true)
    }
}

fn order_by_recency(entries: &HashMap<NodeId, Entry>) -> Vec<Entry> {
    let mut ordered: Vec<Entry> = entries.values().cloned().collect();
    ordered.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    ordered
}

fn order_by_importance(entries: &HashMap<NodeId, Entry>) -> Vec<Entry> {
    let mut ordered: Vec<Entry> = entries.values().cloned().collect();
    ordered.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.added_at.cmp(&a.added_at))
    });
    ordered
}

fn interleave_balanced(entries: &HashMap<NodeId, Entry>) -> Vec<Entry> {
    let by_importance = order_by_importance(entries);
    let by_recency = order_by_recency(entries);

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(entries.len());
    let mut importance_iter = by_importance.into_iter();
    let mut recency_iter = by_recency.into_iter();
    loop {
        let mut progressed = false;
        if let Some(entry) = importance_iter.next() {
            progressed = true;
            if seen.insert(entry.node_id) {
                result.push(entry);
            }
        }
        if let Some(entry) = recency_iter.next() {
            progressed = true;
            if seen.insert(entry.node_id) {
                result.push(entry);
            }
        }
        if !progressed {
            break;
        }
    }
    result
}

/// Evicts entries by ascending composite score until `incoming_tokens` more
/// fit within `max_tokens` (§4.5 eviction policy).
fn evict_until_fits(
    entries: &mut HashMap<NodeId, Entry>,
    max_tokens: u64,
    incoming_tokens: u64,
) -> Vec<Entry> {
    let mut evicted = Vec::new();
    let mut current_tokens: u64 = entries.values().map(|e| e.token_count).sum();

    while current_tokens + incoming_tokens > max_tokens && !entries.is_empty() {
        let scored = composite_scores(entries);
        let Some((victim_id, _)) = scored
            .into_iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            break;
        };
        if let Some(victim) = entries.remove(&victim_id) {
            current_tokens -= victim.token_count;
            evicted.push(victim);
        }
    }
    evicted
}

/// Computes `score = 0.4*recency + 0.4*access + 0.2*importance` for every
/// entry, with recency and access normalized to `[0, 1]` across the current
/// set (§4.5).
fn composite_scores(entries: &HashMap<NodeId, Entry>) -> Vec<(NodeId, f64)> {
    let min_added = entries.values().map(|e| e.added_at.as_millis()).min().unwrap_or(0);
    let max_added = entries.values().map(|e| e.added_at.as_millis()).max().unwrap_or(0);
    let added_span = (max_added - min_added).max(1) as f64;

    let max_access = entries.values().map(|e| e.access_count).max().unwrap_or(0).max(1) as f64;
    let max_importance = entries
        .values()
        .map(|e| e.importance)
        .fold(0.0_f64, f64::max)
        .max(f64::EPSILON);

    entries
        .values()
        .map(|entry| {
            let recency = (entry.added_at.as_millis() - min_added) as f64 / added_span;
            let access = entry.access_count as f64 / max_access;
            let importance = entry.importance / max_importance;
            let score = 0.4 * recency + 0.4 * access + 0.2 * importance;
            (entry.node_id, score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_then_contains() {
        let wm = WorkingMemory::new(1000);
        let id = NodeId::new();
        wm.add(id, "hello".to_string(), 10, None, false);
        assert!(wm.contains(id));
        assert_eq!(wm.token_count(), 10);
    }

    #[test]
    fn re_adding_bumps_access_count_without_duplicating() {
        let wm = WorkingMemory::new(1000);
        let id = NodeId::new();
        wm.add(id, "hello".to_string(), 10, None, false);
        wm.add(id, "hello".to_string(), 10, None, false);
        assert_eq!(wm.node_count(), 1);
        assert_eq!(wm.token_count(), 10);
    }

    #[test]
    fn budget_invariant_holds_after_overflowing_add() {
        let wm = WorkingMemory::new(15);
        wm.add(NodeId::new(), "a".repeat(5), 10, None, false);
        wm.add(NodeId::new(), "b".repeat(5), 10, None, false);
        assert!(wm.token_count() <= 15);
        assert_eq!(wm.node_count(), 1);
    }

    #[test]
    fn eviction_returns_evicted_entries() {
        let wm = WorkingMemory::new(10);
        let first = NodeId::new();
        wm.add(first, "first".to_string(), 10, None, false);
        let evicted = wm.add(NodeId::new(), "second".to_string(), 10, None, false);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].node_id, first);
        assert!(!wm.contains(first));
    }

    #[test]
    fn remove_drops_entry() {
        let wm = WorkingMemory::new(1000);
        let id = NodeId::new();
        wm.add(id, "hello".to_string(), 10, None, false);
        let removed = wm.remove(id);
        assert!(removed.is_some());
        assert!(!wm.contains(id));
    }

    #[test]
    fn utilization_reflects_token_usage() {
        let wm = WorkingMemory::new(100);
        wm.add(NodeId::new(), "x".to_string(), 25, None, false);
        assert!((wm.utilization() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn assemble_context_recent_orders_newest_first() {
        let wm = WorkingMemory::new(1000);
        let first = NodeId::new();
        wm.add(first, "first content".to_string(), 5, None, false);
        std::thread::sleep(std::time::Duration::from_millis(2));
        wm.add(NodeId::new(), "second content".to_string(), 5, None, false);
        let assembled = wm.assemble_context(AssembleStrategy::Recent, None);
        assert!(assembled.find("second content") < assembled.find("first content"));
    }

    #[test]
    fn assemble_context_important_orders_by_importance() {
        let wm = WorkingMemory::new(1000);
        wm.add(NodeId::new(), "low".to_string(), 5, Some(0.1), false);
        wm.add(NodeId::new(), "high".to_string(), 5, Some(0.9), false);
        let assembled = wm.assemble_context(AssembleStrategy::Important, None);
        assert!(assembled.find("high") < assembled.find("low"));
    }

    #[test]
    fn assemble_context_respects_token_budget() {
        let wm = WorkingMemory::new(1000);
        wm.add(NodeId::new(), "x".repeat(5), 50, None, false);
        wm.add(NodeId::new(), "y".repeat(5), 50, None, false);
        let assembled = wm.assemble_context(AssembleStrategy::Recent, Some(50));
        assert_eq!(assembled.split("\n\n").filter(|s| !s.is_empty()).count(), 1);
    }

    #[test]
    fn promote_from_recall_is_noop_if_already_present() {
        let wm = WorkingMemory::new(1000);
        let id = NodeId::new();
        wm.add(id, "hello".to_string(), 10, None, false);
        let evicted = wm.promote_from_recall(id, "hello".to_string(), 10);
        assert!(evicted.is_empty());
        assert_eq!(wm.node_count(), 1);
    }

    proptest! {
        /// §8 "Working-memory budget": `Σ tokenCount <= maxTokens` holds
        /// after every add, for any sequence of per-entry token counts that
        /// individually fit under the budget.
        #[test]
        fn budget_invariant_holds_across_random_add_sequences(
            max_tokens in 50u64..500,
            token_counts in proptest::collection::vec(1u64..50, 1..40),
        ) {
            let wm = WorkingMemory::new(max_tokens);
            for tokens in token_counts {
                wm.add(NodeId::new(), "x".to_string(), tokens, None, false);
                prop_assert!(wm.token_count() <= max_tokens);
            }
        }
    }
}
