//! Short-lived decision cache.
//!
//! Keys combine the agent, its activity state, and a coarse time bucket,
//! so an agent asking again within the same bucket and state reuses its
//! previous decision. Entries expire after a TTL. When the cache is full,
//! expired entries are purged first; if that frees nothing, the oldest
//! entry is evicted.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use botmind_types::{ActionKind, ActivityState, AgentId, BehaviorKind, Decision};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

/// Identity of a cached decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The agent.
    pub agent: AgentId,
    /// The agent's activity state at decision time.
    pub state: ActivityState,
    /// Time bucket index.
    pub bucket: i64,
}

/// A cached decision with its resolved behavior and plan.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDecision {
    /// The synthesized decision.
    pub decision: Decision,
    /// The behavior the selector chose.
    pub behavior: BehaviorKind,
    /// The planned actions.
    pub actions: Vec<ActionKind>,
    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
}

/// TTL-bounded, size-capped decision cache.
#[derive(Debug)]
pub struct DecisionCache {
    entries: Mutex<HashMap<CacheKey, CachedDecision>>,
    ttl: TimeDelta,
    max_entries: usize,
    bucket_ms: i64,
}

impl DecisionCache {
    /// Create a cache. A zero bucket width is treated as one millisecond.
    pub fn new(ttl_ms: u64, max_entries: usize, bucket_ms: u64) -> Self {
        let ttl_ms = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: TimeDelta::try_milliseconds(ttl_ms).unwrap_or(TimeDelta::MAX),
            max_entries,
            bucket_ms: i64::try_from(bucket_ms).unwrap_or(i64::MAX).max(1),
        }
    }

    /// Build the key for an agent in a state at `now`.
    pub fn key(&self, agent: AgentId, state: ActivityState, now: DateTime<Utc>) -> CacheKey {
        CacheKey {
            agent,
            state,
            bucket: now.timestamp_millis().div_euclid(self.bucket_ms),
        }
    }

    /// Look up an entry. Expired entries are removed and reported as misses.
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CachedDecision> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = entries.get(key).map(|entry| self.is_expired(entry, now))?;
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }

    /// Store an entry, making room first if the cache is full.
    pub fn insert(&self, key: CacheKey, entry: CachedDecision, now: DateTime<Utc>) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let before = entries.len();
            entries.retain(|_, cached| !self.is_expired(cached, now));
            let purged = before.saturating_sub(entries.len());
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.cached_at)
                    .map(|(k, _)| *k);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
            debug!(purged, remaining = entries.len(), "Decision cache made room");
        }
        entries.insert(key, entry);
    }

    /// Drop every entry belonging to an agent.
    pub fn remove_agent(&self, agent: AgentId) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|key, _| key.agent != agent);
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn is_expired(&self, entry: &CachedDecision, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.cached_at) > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn entry(cached_at: DateTime<Utc>) -> CachedDecision {
        let mut decision = Decision::new(cached_at);
        decision.set_behavior(BehaviorKind::Idle);
        decision.set_actions(vec![ActionKind::Wait]);
        decision.set_confidence(0.5);
        CachedDecision {
            decision,
            behavior: BehaviorKind::Idle,
            actions: vec![ActionKind::Wait],
            cached_at,
        }
    }

    #[test]
    fn keys_share_a_bucket_within_its_width() {
        let cache = DecisionCache::new(30_000, 10, 1000);
        let agent = AgentId::new(1);
        let a = cache.key(agent, ActivityState::Idle, at(1000));
        let b = cache.key(agent, ActivityState::Idle, at(1999));
        let c = cache.key(agent, ActivityState::Idle, at(2000));
        let d = cache.key(agent, ActivityState::Moving, at(1500));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = DecisionCache::new(30_000, 10, 1000);
        let key = cache.key(AgentId::new(1), ActivityState::Idle, at(0));
        cache.insert(key, entry(at(0)), at(0));

        assert!(cache.get(&key, at(30_000)).is_some());
        assert!(cache.get(&key, at(30_001)).is_none());
        assert!(cache.is_empty(), "expired entry removed on lookup");
    }

    #[test]
    fn full_cache_purges_expired_before_evicting() {
        let cache = DecisionCache::new(1000, 2, 1);
        let stale = cache.key(AgentId::new(1), ActivityState::Idle, at(0));
        let live = cache.key(AgentId::new(2), ActivityState::Idle, at(1500));
        cache.insert(stale, entry(at(0)), at(0));
        cache.insert(live, entry(at(1500)), at(1500));

        let newest = cache.key(AgentId::new(3), ActivityState::Idle, at(2000));
        cache.insert(newest, entry(at(2000)), at(2000));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&live, at(2000)).is_some());
        assert!(cache.get(&newest, at(2000)).is_some());
    }

    #[test]
    fn full_cache_without_expired_evicts_oldest() {
        let cache = DecisionCache::new(60_000, 2, 1);
        let first = cache.key(AgentId::new(1), ActivityState::Idle, at(0));
        let second = cache.key(AgentId::new(2), ActivityState::Idle, at(10));
        let third = cache.key(AgentId::new(3), ActivityState::Idle, at(20));
        cache.insert(first, entry(at(0)), at(0));
        cache.insert(second, entry(at(10)), at(10));
        cache.insert(third, entry(at(20)), at(20));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&first, at(20)).is_none());
        assert!(cache.get(&third, at(20)).is_some());
    }

    #[test]
    fn remove_agent_drops_only_that_agent() {
        let cache = DecisionCache::new(60_000, 10, 1000);
        let a = cache.key(AgentId::new(1), ActivityState::Idle, at(0));
        let b = cache.key(AgentId::new(2), ActivityState::Idle, at(0));
        cache.insert(a, entry(at(0)), at(0));
        cache.insert(b, entry(at(0)), at(0));
        cache.remove_agent(AgentId::new(1));
        assert!(cache.get(&a, at(0)).is_none());
        assert!(cache.get(&b, at(0)).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = DecisionCache::new(60_000, 0, 1000);
        let key = cache.key(AgentId::new(1), ActivityState::Idle, at(0));
        cache.insert(key, entry(at(0)), at(0));
        assert!(cache.is_empty());
    }
}
