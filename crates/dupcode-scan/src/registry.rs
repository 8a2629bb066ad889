//! Shared key registry
//!
//! The only mutable state shared between workers. Backed by a [`DashMap`]:
//! check-and-insert goes through the entry API, which holds the key's shard
//! write lock for the whole operation, so it is linearizable per key while
//! unrelated keys rarely contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::DEFAULT_REGISTRY_SHARDS;
use crate::types::{Key, KeyOrigin};

/// Result of [`KeyRegistry::check_and_insert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    /// Carries the origin recorded by the worker that inserted the key first
    AlreadyPresent(KeyOrigin),
}

#[derive(Debug)]
pub struct KeyRegistry {
    keys: DashMap<Key, KeyOrigin>,
    shards: usize,
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::with_shards(DEFAULT_REGISTRY_SHARDS)
    }
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with roughly `shards` locks
    ///
    /// The count is rounded up to a power of two, with a minimum of two.
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(2).next_power_of_two();
        Self {
            keys: DashMap::with_shard_amount(shards),
            shards,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Insert `key` unless it is already present
    ///
    /// Exactly one caller ever observes [`Insertion::Inserted`] for a given key.
    pub fn check_and_insert(&self, key: Key, origin: KeyOrigin) -> Insertion {
        // The entry is never held across an await, so a cancelled task cannot
        // leave a mutation half done.
        match self.keys.entry(key) {
            Entry::Occupied(entry) => Insertion::AlreadyPresent(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(origin);
                Insertion::Inserted
            },
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.keys.contains_key(key)
    }

    pub fn first_seen(&self, key: &Key) -> Option<KeyOrigin> {
        self.keys.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Snapshot of every key, sorted
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.keys.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::UnitId;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn origin(unit: &str, ordinal: u64) -> KeyOrigin {
        KeyOrigin {
            unit: UnitId::from(unit),
            ordinal,
        }
    }

    #[test]
    fn test_insert_then_collide() {
        let registry = KeyRegistry::new();

        assert_eq!(
            registry.check_and_insert(Key::from("100"), origin("a", 2)),
            Insertion::Inserted
        );
        assert_eq!(
            registry.check_and_insert(Key::from("100"), origin("b", 5)),
            Insertion::AlreadyPresent(origin("a", 2))
        );
        assert_eq!(registry.first_seen(&Key::from("100")), Some(origin("a", 2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shard_counts_are_normalized() {
        assert_eq!(KeyRegistry::with_shards(0).shard_count(), 2);
        assert_eq!(KeyRegistry::with_shards(1).shard_count(), 2);
        assert_eq!(KeyRegistry::with_shards(16).shard_count(), 16);
        assert_eq!(KeyRegistry::with_shards(20).shard_count(), 32);
    }

    #[test]
    fn test_small_registry_behaves_like_sharded() {
        let single = KeyRegistry::with_shards(1);
        let sharded = KeyRegistry::with_shards(8);

        for i in 0..500 {
            let key = Key::new(format!("code-{}", i % 250));
            let a = single.check_and_insert(key.clone(), origin("u", i));
            let b = sharded.check_and_insert(key, origin("u", i));
            assert_eq!(a, b);
        }

        assert_eq!(single.len(), 250);
        assert_eq!(sharded.len(), 250);
        assert_eq!(single.keys(), sharded.keys());
    }

    #[test]
    fn test_empty_registry() {
        let registry = KeyRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains(&Key::from("x")));
        assert!(registry.keys().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_of_same_key_have_one_winner() {
        for contenders in [1usize, 2, 8, 64] {
            let registry = Arc::new(KeyRegistry::with_shards(4));
            let barrier = Arc::new(Barrier::new(contenders));

            let handles: Vec<_> = (0..contenders)
                .map(|i| {
                    let registry = registry.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        registry.check_and_insert(Key::from("shared"), origin("w", i as u64))
                    })
                })
                .collect();

            let mut inserted = 0;
            let mut present = 0;
            for result in futures::future::join_all(handles).await {
                match result.unwrap() {
                    Insertion::Inserted => inserted += 1,
                    Insertion::AlreadyPresent(_) => present += 1,
                }
            }

            assert_eq!(inserted, 1, "contenders = {contenders}");
            assert_eq!(present, contenders - 1);
            assert_eq!(registry.len(), 1);
        }
    }
}
