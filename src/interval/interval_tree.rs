use std::borrow::Borrow;

use crate::{
    hlc::timestamp::Timestamp,
    llrb::llrb::{NodeKey, NodeValue, RangeValue, RbTree, NIL},
};

/**
 * Interval search tree over half-open intervals [start, end), backed by the
 * augmented LLRB tree.
 *
 * Based off of Robert Sedgewick's Interval Search Trees:
 * https://sedgewick.io/wp-content/uploads/2022/04/Algs10-SearchApplications.pdf
 */
pub struct IntervalTree<K: NodeKey, V: NodeValue> {
    rbtree: RbTree<K, V>,
}

pub fn does_range_overlap<Q: Ord + ?Sized>(
    first_start: &Q,
    first_end: &Q,
    second_start: &Q,
    second_end: &Q,
) -> bool {
    first_start < second_end && second_start < first_end
}

impl<K: NodeKey, V: NodeValue> Default for IntervalTree<K, V> {
    fn default() -> Self {
        IntervalTree::new()
    }
}

impl<K: NodeKey, V: NodeValue> IntervalTree<K, V> {
    pub fn new() -> Self {
        IntervalTree {
            rbtree: RbTree::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rbtree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rbtree.is_empty()
    }

    pub fn clear(&mut self) {
        self.rbtree.clear()
    }

    pub fn insert(&mut self, start_key: K, end_key: K, id: u64, value: V) {
        self.rbtree.insert(start_key, end_key, id, value)
    }

    pub fn remove(&mut self, start_key: &K, id: u64) -> Option<RangeValue<K, V>> {
        self.rbtree.remove(start_key, id)
    }

    /**
     * Returns every interval overlapping [start_key, end_key), ordered by
     * start key.
     */
    pub fn get_overlap<Q>(&self, start_key: &Q, end_key: &Q) -> Vec<RangeValue<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut vec = Vec::new();
        self.collect_overlapping_nodes(start_key, end_key, self.rbtree.root, &mut vec);
        vec
    }

    fn collect_overlapping_nodes<Q>(
        &self,
        start_key: &Q,
        end_key: &Q,
        node: usize,
        overlaps: &mut Vec<RangeValue<K, V>>,
    ) where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if node == NIL {
            return;
        }
        let n = &self.rbtree.nodes[node];
        let max_end: &Q = self.rbtree.nodes[n.max_end_node].end_key.borrow();
        // nothing in this subtree ends after start_key
        if max_end <= start_key {
            return;
        }
        self.collect_overlapping_nodes(start_key, end_key, n.left_node, overlaps);
        let node_start: &Q = n.start_key.borrow();
        let node_end: &Q = n.end_key.borrow();
        if node_start >= end_key {
            return;
        }
        if does_range_overlap(start_key, end_key, node_start, node_end) {
            overlaps.push(RangeValue {
                start_key: n.start_key.clone(),
                end_key: n.end_key.clone(),
                value: n.value.clone(),
            });
        }
        self.collect_overlapping_nodes(start_key, end_key, n.right_node, overlaps);
    }

    /**
     * Returns the largest timestamp among the intervals overlapping
     * [start_key, end_key) for which `include` returns true, along with every
     * included value carrying that timestamp. Returns None if no included
     * interval overlaps.
     *
     * Subtrees whose max timestamp is below the best found so far are never
     * visited.
     */
    pub fn max_overlap<Q, F>(
        &self,
        start_key: &Q,
        end_key: &Q,
        include: F,
    ) -> Option<(Timestamp, Vec<&V>)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        F: Fn(&V) -> bool,
    {
        let mut best = None;
        self.collect_max_nodes(start_key, end_key, self.rbtree.root, &include, &mut best);
        best
    }

    fn collect_max_nodes<'a, Q, F>(
        &'a self,
        start_key: &Q,
        end_key: &Q,
        node: usize,
        include: &F,
        best: &mut Option<(Timestamp, Vec<&'a V>)>,
    ) where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        F: Fn(&V) -> bool,
    {
        if node == NIL {
            return;
        }
        let n = &self.rbtree.nodes[node];
        let max_end: &Q = self.rbtree.nodes[n.max_end_node].end_key.borrow();
        if max_end <= start_key {
            return;
        }
        if let Some((best_timestamp, _)) = best {
            if n.max_timestamp < *best_timestamp {
                return;
            }
        }
        self.collect_max_nodes(start_key, end_key, n.left_node, include, best);
        let node_start: &Q = n.start_key.borrow();
        let node_end: &Q = n.end_key.borrow();
        if node_start >= end_key {
            return;
        }
        if node_end > start_key && include(&n.value) {
            let timestamp = n.value.timestamp();
            let replace = match best {
                Some((best_timestamp, values)) => {
                    if *best_timestamp == timestamp {
                        values.push(&n.value);
                    }
                    *best_timestamp < timestamp
                }
                None => true,
            };
            if replace {
                *best = Some((timestamp, vec![&n.value]));
            }
        }
        self.collect_max_nodes(start_key, end_key, n.right_node, include, best);
    }
}
