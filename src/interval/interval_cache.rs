use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    hlc::timestamp::Timestamp,
    interval::interval_tree::IntervalTree,
    llrb::llrb::NodeValue,
    span::{Key, Span},
    timestamp_oracle::low_water::LowWaterMark,
};

// Flat per-entry cost on top of the key bytes: tree node, age index entry
// and value.
pub const ENTRY_OVERHEAD_BYTES: u64 = 64;

pub fn cache_entry_size(span: &Span) -> u64 {
    span.indexed_bytes() as u64 + ENTRY_OVERHEAD_BYTES
}

fn stored_entry_size(start_key: &[u8], end_key: &[u8]) -> u64 {
    (start_key.len() + end_key.len()) as u64 + ENTRY_OVERHEAD_BYTES
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheValue {
    pub timestamp: Timestamp,
    pub txn_id: Option<Uuid>,
}

impl NodeValue for CacheValue {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/**
 * Maps key spans to the (timestamp, txn_id) of the requests that touched
 * them. Entries are never merged; overlapping entries are resolved at query
 * time by taking the max timestamp.
 *
 * Memory is bounded by evicting the oldest entries first and folding their
 * timestamps into the low water mark.
 */
#[derive(Default)]
pub struct IntervalCache {
    tree: IntervalTree<Key, CacheValue>,
    // oldest entry first
    by_age: BTreeMap<(Timestamp, u64), Key>,
    next_id: u64,
    size_bytes: u64,
}

impl IntervalCache {
    pub fn new() -> Self {
        IntervalCache::default()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.by_age.clear();
        self.size_bytes = 0;
    }

    pub fn insert(&mut self, span: &Span, timestamp: Timestamp, txn_id: Option<Uuid>) {
        let id = self.next_id;
        self.next_id += 1;
        let start_key = span.key().to_vec();
        let end_key = span.exclusive_end().into_owned();
        self.size_bytes += stored_entry_size(&start_key, &end_key);
        self.by_age.insert((timestamp, id), start_key.clone());
        self.tree
            .insert(start_key, end_key, id, CacheValue { timestamp, txn_id });
    }

    /**
     * Returns the max timestamp of the entries overlapping the span, skipping
     * entries written by exclude_txn. If the max belongs to a single
     * transaction, its id is returned. If the max is shared by several
     * transactions (or by a transaction and a non-transactional request), no
     * transaction id is returned.
     *
     * Returns None if no entry overlaps.
     */
    pub fn max_overlap(
        &self,
        span: &Span,
        exclude_txn: Option<Uuid>,
    ) -> Option<(Timestamp, Option<Uuid>)> {
        let end_key = span.exclusive_end();
        let (timestamp, values) =
            self.tree
                .max_overlap(span.key(), &*end_key, |value: &CacheValue| {
                    exclude_txn.is_none() || value.txn_id != exclude_txn
                })?;
        let txn_id = values[0].txn_id;
        if values.iter().all(|value| value.txn_id == txn_id) {
            Some((timestamp, txn_id))
        } else {
            Some((timestamp, None))
        }
    }

    /**
     * Evicts the oldest entries until the cache fits in byte_budget. The low
     * water mark is raised to each entry's timestamp before the entry is
     * dropped. Returns the number of evicted entries.
     */
    pub fn evict_to(&mut self, byte_budget: u64, low_water: &mut LowWaterMark) -> usize {
        let mut evicted = 0;
        while self.size_bytes > byte_budget {
            let Some((&(timestamp, id), _)) = self.by_age.first_key_value() else {
                break;
            };
            low_water.raise(timestamp);
            let Some((_, start_key)) = self.by_age.pop_first() else {
                break;
            };
            if let Some(range_value) = self.tree.remove(&start_key, id) {
                self.size_bytes -= stored_entry_size(&range_value.start_key, &range_value.end_key);
            }
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    mod max_overlap {
        use uuid::Uuid;

        use crate::{
            helpers::test_helpers::{key_span, range_span, ts},
            interval::interval_cache::IntervalCache,
        };

        #[test]
        fn empty_cache_finds_nothing() {
            let cache = IntervalCache::new();
            assert_eq!(cache.max_overlap(&range_span("a", "z"), None), None);
        }

        #[test]
        fn test_overlap() {
            let mut cache = IntervalCache::new();
            cache.insert(&range_span("apple", "cat"), ts(3), None);
            cache.insert(&range_span("banana", "dog"), ts(12), None);
            assert_eq!(
                cache.max_overlap(&range_span("apple", "donkey"), None),
                Some((ts(12), None))
            );
            assert_eq!(
                cache.max_overlap(&range_span("apple", "banana"), None),
                Some((ts(3), None))
            );
        }

        #[test]
        fn no_overlap() {
            let mut cache = IntervalCache::new();
            cache.insert(&range_span("apple", "cat"), ts(3), None);
            cache.insert(&range_span("banana", "dog"), ts(12), None);
            assert_eq!(cache.max_overlap(&key_span("zebra"), None), None);
            assert_eq!(cache.max_overlap(&key_span("dog"), None), None);
        }

        #[test]
        fn single_key_entries() {
            let mut cache = IntervalCache::new();
            cache.insert(&key_span("b"), ts(4), None);
            assert_eq!(cache.max_overlap(&key_span("b"), None), Some((ts(4), None)));
            assert_eq!(cache.max_overlap(&key_span("b\x00"), None), None);
            assert_eq!(
                cache.max_overlap(&range_span("a", "c"), None),
                Some((ts(4), None))
            );
        }

        #[test]
        fn returns_owner_of_max() {
            let txn = Uuid::new_v4();
            let mut cache = IntervalCache::new();
            cache.insert(&range_span("a", "c"), ts(3), None);
            cache.insert(&range_span("a", "c"), ts(5), Some(txn));
            assert_eq!(
                cache.max_overlap(&key_span("b"), None),
                Some((ts(5), Some(txn)))
            );
        }

        #[test]
        fn shared_max_has_no_owner() {
            let txn_1 = Uuid::new_v4();
            let txn_2 = Uuid::new_v4();
            let mut cache = IntervalCache::new();
            cache.insert(&range_span("a", "c"), ts(5), Some(txn_1));
            cache.insert(&range_span("b", "d"), ts(5), Some(txn_2));
            assert_eq!(cache.max_overlap(&key_span("b"), None), Some((ts(5), None)));
            assert_eq!(
                cache.max_overlap(&key_span("a"), None),
                Some((ts(5), Some(txn_1)))
            );
        }

        #[test]
        fn excluded_txn_is_filtered_not_deprioritized() {
            let txn_1 = Uuid::new_v4();
            let txn_2 = Uuid::new_v4();
            let mut cache = IntervalCache::new();
            cache.insert(&range_span("a", "c"), ts(9), Some(txn_1));
            cache.insert(&range_span("a", "c"), ts(4), Some(txn_2));
            assert_eq!(
                cache.max_overlap(&key_span("b"), Some(txn_1)),
                Some((ts(4), Some(txn_2)))
            );
            assert_eq!(cache.max_overlap(&key_span("b"), Some(txn_2)).unwrap().0, ts(9));
        }

        #[test]
        fn only_excluded_entries_finds_nothing() {
            let txn = Uuid::new_v4();
            let mut cache = IntervalCache::new();
            cache.insert(&key_span("a"), ts(9), Some(txn));
            assert_eq!(cache.max_overlap(&key_span("a"), Some(txn)), None);
        }
    }

    mod evict_to {
        use crate::{
            helpers::test_helpers::{key_span, range_span, ts},
            interval::interval_cache::{cache_entry_size, IntervalCache},
            timestamp_oracle::low_water::LowWaterMark,
        };

        #[test]
        fn tracks_size() {
            let mut cache = IntervalCache::new();
            let span = range_span("aa", "bbb");
            cache.insert(&span, ts(1), None);
            cache.insert(&key_span("k"), ts(1), None);
            assert_eq!(
                cache.size_bytes(),
                cache_entry_size(&span) + cache_entry_size(&key_span("k"))
            );
        }

        #[test]
        fn evicts_oldest_first_and_raises_low_water() {
            let mut cache = IntervalCache::new();
            let mut low_water = LowWaterMark::new();
            cache.insert(&key_span("c"), ts(7), None);
            cache.insert(&key_span("a"), ts(2), None);
            cache.insert(&key_span("b"), ts(5), None);
            let entry = cache_entry_size(&key_span("a"));

            let evicted = cache.evict_to(entry * 2, &mut low_water);
            assert_eq!(evicted, 1);
            assert_eq!(low_water.get(), ts(2));
            assert_eq!(cache.max_overlap(&key_span("a"), None), None);
            assert_eq!(cache.max_overlap(&key_span("b"), None), Some((ts(5), None)));

            let evicted = cache.evict_to(0, &mut low_water);
            assert_eq!(evicted, 2);
            assert_eq!(low_water.get(), ts(7));
            assert!(cache.is_empty());
            assert_eq!(cache.size_bytes(), 0);
        }

        #[test]
        fn within_budget_is_a_noop() {
            let mut cache = IntervalCache::new();
            let mut low_water = LowWaterMark::new();
            cache.insert(&key_span("a"), ts(2), None);
            assert_eq!(cache.evict_to(u64::MAX, &mut low_water), 0);
            assert_eq!(low_water.get(), ts(0));
            assert_eq!(cache.len(), 1);
        }
    }
}
