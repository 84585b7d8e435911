use std::{cmp::Ordering, fmt, mem};

use crate::hlc::timestamp::Timestamp;

pub const NIL: usize = usize::MAX;

pub trait NodeKey: Clone + Ord + Default + fmt::Debug {}

pub trait NodeValue: Clone + Default {
    fn timestamp(&self) -> Timestamp;
}

impl NodeValue for Timestamp {
    fn timestamp(&self) -> Timestamp {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum TreeColor {
    RED,
    BLACK,
}

impl TreeColor {
    fn flip(self) -> TreeColor {
        match self {
            TreeColor::RED => TreeColor::BLACK,
            TreeColor::BLACK => TreeColor::RED,
        }
    }
}

impl fmt::Display for TreeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeColor::RED => write!(f, "R"),
            TreeColor::BLACK => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeValue<K: NodeKey, V> {
    pub start_key: K,
    pub end_key: K,
    pub value: V,
}

#[derive(Debug, Clone)]
pub struct Node<K: NodeKey, V: NodeValue> {
    pub start_key: K,
    // exclusive
    pub end_key: K,
    pub id: u64,
    pub value: V,
    pub left_node: usize,
    pub right_node: usize,
    pub color: TreeColor,
    pub max_end_node: usize,
    pub max_timestamp: Timestamp,
}

/**
 * Left-leaning red-black tree of intervals, based off of Robert Sedgewick's
 * LLRB paper and the 2-3 tree variant in Algorithms (4th edition).
 *
 * Nodes live in an arena and reference each other by index, with NIL
 * standing in for the empty link. Nodes are ordered by (start_key, id) so
 * that any number of intervals may share a start key.
 *
 * Each node is augmented with the index of the node holding the largest
 * end_key in its subtree and the largest timestamp in its subtree. Both are
 * kept up to date through rotations, which is what lets the interval cache
 * prune its overlap searches.
 */
pub struct RbTree<K: NodeKey, V: NodeValue> {
    pub nodes: Vec<Node<K, V>>,
    pub root: usize,
    free_slots: Vec<usize>,
    len: usize,
}

impl<K: NodeKey, V: NodeValue> Default for RbTree<K, V> {
    fn default() -> Self {
        RbTree::new()
    }
}

impl<K: NodeKey, V: NodeValue> RbTree<K, V> {
    pub fn new() -> Self {
        RbTree {
            nodes: Vec::new(),
            root: NIL,
            free_slots: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_slots.clear();
        self.root = NIL;
        self.len = 0;
    }

    pub fn get(&self, start_key: &K, id: u64) -> Option<&V> {
        let node = self.find(start_key, id);
        if node == NIL {
            None
        } else {
            Some(&self.nodes[node].value)
        }
    }

    pub fn contains(&self, start_key: &K, id: u64) -> bool {
        self.find(start_key, id) != NIL
    }

    /**
     * Inserts the interval [start_key, end_key) under the given id. If an
     * interval with the same start_key and id is already present, its end_key
     * and value are replaced.
     */
    pub fn insert(&mut self, start_key: K, end_key: K, id: u64, value: V) {
        let root = self.insert_node(self.root, start_key, end_key, id, value);
        self.root = root;
        self.nodes[root].color = TreeColor::BLACK;
    }

    /**
     * Removes the interval stored under (start_key, id), returning it. Returns
     * None if no such interval exists.
     */
    pub fn remove(&mut self, start_key: &K, id: u64) -> Option<RangeValue<K, V>> {
        if !self.contains(start_key, id) {
            return None;
        }
        let root = self.root;
        if !self.is_red(self.left(root)) && !self.is_red(self.right(root)) {
            self.nodes[root].color = TreeColor::RED;
        }
        let mut removed = None;
        self.root = self.delete_node(root, start_key, id, &mut removed);
        if self.root != NIL {
            let root = self.root;
            self.nodes[root].color = TreeColor::BLACK;
        }
        self.len -= 1;
        removed
    }

    fn find(&self, start_key: &K, id: u64) -> usize {
        let mut node = self.root;
        while node != NIL {
            match self.compare(start_key, id, node) {
                Ordering::Less => node = self.nodes[node].left_node,
                Ordering::Greater => node = self.nodes[node].right_node,
                Ordering::Equal => return node,
            }
        }
        NIL
    }

    fn compare(&self, start_key: &K, id: u64, node: usize) -> Ordering {
        let n = &self.nodes[node];
        start_key.cmp(&n.start_key).then(id.cmp(&n.id))
    }

    fn insert_node(&mut self, node: usize, start_key: K, end_key: K, id: u64, value: V) -> usize {
        if node == NIL {
            return self.alloc(start_key, end_key, id, value);
        }
        match self.compare(&start_key, id, node) {
            Ordering::Less => {
                let left = self.insert_node(self.nodes[node].left_node, start_key, end_key, id, value);
                self.nodes[node].left_node = left;
            }
            Ordering::Greater => {
                let right =
                    self.insert_node(self.nodes[node].right_node, start_key, end_key, id, value);
                self.nodes[node].right_node = right;
            }
            Ordering::Equal => {
                self.nodes[node].end_key = end_key;
                self.nodes[node].value = value;
            }
        }
        self.balance(node)
    }

    fn delete_node(
        &mut self,
        node: usize,
        start_key: &K,
        id: u64,
        removed: &mut Option<RangeValue<K, V>>,
    ) -> usize {
        let mut h = node;
        if self.compare(start_key, id, h) == Ordering::Less {
            if !self.is_red(self.left(h)) && !self.is_red(self.left(self.left(h))) {
                h = self.move_red_left(h);
            }
            let left = self.delete_node(self.nodes[h].left_node, start_key, id, removed);
            self.nodes[h].left_node = left;
        } else {
            if self.is_red(self.left(h)) {
                h = self.rotate_right(h);
            }
            if self.compare(start_key, id, h) == Ordering::Equal && self.right(h) == NIL {
                let (_, payload) = self.take_payload(h);
                *removed = Some(payload);
                self.release(h);
                return NIL;
            }
            if !self.is_red(self.right(h)) && !self.is_red(self.left(self.right(h))) {
                h = self.move_red_right(h);
            }
            if self.compare(start_key, id, h) == Ordering::Equal {
                let (right, (min_id, min_payload)) = self.delete_min(self.nodes[h].right_node);
                self.nodes[h].right_node = right;
                let (_, payload) = self.take_payload(h);
                *removed = Some(payload);
                self.put_payload(h, min_id, min_payload);
            } else {
                let right = self.delete_node(self.nodes[h].right_node, start_key, id, removed);
                self.nodes[h].right_node = right;
            }
        }
        self.balance(h)
    }

    // Removes the minimum node of the subtree, returning the new subtree root
    // and the removed node's id and payload.
    fn delete_min(&mut self, node: usize) -> (usize, (u64, RangeValue<K, V>)) {
        let mut h = node;
        if self.left(h) == NIL {
            let payload = self.take_payload(h);
            self.release(h);
            return (NIL, payload);
        }
        if !self.is_red(self.left(h)) && !self.is_red(self.left(self.left(h))) {
            h = self.move_red_left(h);
        }
        let (left, payload) = self.delete_min(self.nodes[h].left_node);
        self.nodes[h].left_node = left;
        (self.balance(h), payload)
    }

    fn move_red_left(&mut self, node: usize) -> usize {
        let mut h = node;
        self.flip_colors(h);
        if self.is_red(self.left(self.right(h))) {
            let right = self.rotate_right(self.nodes[h].right_node);
            self.nodes[h].right_node = right;
            h = self.rotate_left(h);
            self.flip_colors(h);
        }
        h
    }

    fn move_red_right(&mut self, node: usize) -> usize {
        let mut h = node;
        self.flip_colors(h);
        if self.is_red(self.left(self.left(h))) {
            h = self.rotate_right(h);
            self.flip_colors(h);
        }
        h
    }

    fn balance(&mut self, node: usize) -> usize {
        let mut h = node;
        if self.is_red(self.right(h)) && !self.is_red(self.left(h)) {
            h = self.rotate_left(h);
        }
        if self.is_red(self.left(h)) && self.is_red(self.left(self.left(h))) {
            h = self.rotate_right(h);
        }
        if self.is_red(self.left(h)) && self.is_red(self.right(h)) {
            self.flip_colors(h);
        }
        self.update(h);
        h
    }

    fn rotate_left(&mut self, h: usize) -> usize {
        let x = self.nodes[h].right_node;
        self.nodes[h].right_node = self.nodes[x].left_node;
        self.nodes[x].left_node = h;
        self.nodes[x].color = self.nodes[h].color;
        self.nodes[h].color = TreeColor::RED;
        self.update(h);
        self.update(x);
        x
    }

    fn rotate_right(&mut self, h: usize) -> usize {
        let x = self.nodes[h].left_node;
        self.nodes[h].left_node = self.nodes[x].right_node;
        self.nodes[x].right_node = h;
        self.nodes[x].color = self.nodes[h].color;
        self.nodes[h].color = TreeColor::RED;
        self.update(h);
        self.update(x);
        x
    }

    fn flip_colors(&mut self, h: usize) {
        for node in [h, self.nodes[h].left_node, self.nodes[h].right_node] {
            if node != NIL {
                self.nodes[node].color = self.nodes[node].color.flip();
            }
        }
    }

    // Recomputes the augmented fields of h from its children.
    fn update(&mut self, h: usize) {
        let mut max_end_node = h;
        let mut max_timestamp = self.nodes[h].value.timestamp();
        for child in [self.nodes[h].left_node, self.nodes[h].right_node] {
            if child == NIL {
                continue;
            }
            let child_max_end = self.nodes[child].max_end_node;
            if self.nodes[child_max_end].end_key > self.nodes[max_end_node].end_key {
                max_end_node = child_max_end;
            }
            max_timestamp = max_timestamp.max(self.nodes[child].max_timestamp);
        }
        self.nodes[h].max_end_node = max_end_node;
        self.nodes[h].max_timestamp = max_timestamp;
    }

    fn is_red(&self, node: usize) -> bool {
        node != NIL && self.nodes[node].color == TreeColor::RED
    }

    fn left(&self, node: usize) -> usize {
        if node == NIL {
            NIL
        } else {
            self.nodes[node].left_node
        }
    }

    fn right(&self, node: usize) -> usize {
        if node == NIL {
            NIL
        } else {
            self.nodes[node].right_node
        }
    }

    fn alloc(&mut self, start_key: K, end_key: K, id: u64, value: V) -> usize {
        let max_timestamp = value.timestamp();
        let node = Node {
            start_key,
            end_key,
            id,
            value,
            left_node: NIL,
            right_node: NIL,
            color: TreeColor::RED,
            max_end_node: NIL,
            max_timestamp,
        };
        let idx = match self.free_slots.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.nodes[idx].max_end_node = idx;
        self.len += 1;
        idx
    }

    fn release(&mut self, node: usize) {
        let n = &mut self.nodes[node];
        n.left_node = NIL;
        n.right_node = NIL;
        n.max_end_node = NIL;
        self.free_slots.push(node);
    }

    fn take_payload(&mut self, node: usize) -> (u64, RangeValue<K, V>) {
        let n = &mut self.nodes[node];
        (
            n.id,
            RangeValue {
                start_key: mem::take(&mut n.start_key),
                end_key: mem::take(&mut n.end_key),
                value: mem::take(&mut n.value),
            },
        )
    }

    fn put_payload(&mut self, node: usize, id: u64, payload: RangeValue<K, V>) {
        let n = &mut self.nodes[node];
        n.id = id;
        n.start_key = payload.start_key;
        n.end_key = payload.end_key;
        n.value = payload.value;
    }

    // Turns the tree into a list of start keys. This is for testing purposes
    // to assert the sorted list against an expected list.
    pub fn to_inorder_list(&self) -> Vec<K> {
        let mut vec = Vec::with_capacity(self.len);
        self.to_inorder_list_internal(self.root, &mut vec);
        vec
    }

    fn to_inorder_list_internal(&self, node: usize, vec: &mut Vec<K>) {
        if node == NIL {
            return;
        }
        self.to_inorder_list_internal(self.nodes[node].left_node, vec);
        vec.push(self.nodes[node].start_key.clone());
        self.to_inorder_list_internal(self.nodes[node].right_node, vec);
    }

    /**
     * Walks the whole tree and panics if any red-black or augmentation
     * invariant is broken. Returns the black height.
     */
    #[cfg(test)]
    pub fn assert_invariants(&self) -> usize {
        assert!(!self.is_red(self.root), "root must be black");
        let (height, count) = self.assert_invariants_internal(self.root);
        assert_eq!(count, self.len);
        height
    }

    #[cfg(test)]
    fn assert_invariants_internal(&self, node: usize) -> (usize, usize) {
        if node == NIL {
            return (0, 0);
        }
        let n = &self.nodes[node];
        assert!(!self.is_red(n.right_node), "right links must be black");
        if n.color == TreeColor::RED {
            assert!(!self.is_red(n.left_node), "no two reds in a row");
        }
        let (left_height, left_count) = self.assert_invariants_internal(n.left_node);
        let (right_height, right_count) = self.assert_invariants_internal(n.right_node);
        assert_eq!(left_height, right_height, "black height mismatch");

        let mut max_end = &n.end_key;
        let mut max_timestamp = n.value.timestamp();
        for child in [n.left_node, n.right_node] {
            if child != NIL {
                let c = &self.nodes[child];
                if self.nodes[c.max_end_node].end_key > *max_end {
                    max_end = &self.nodes[c.max_end_node].end_key;
                }
                max_timestamp = max_timestamp.max(c.max_timestamp);
            }
        }
        assert_eq!(self.nodes[n.max_end_node].end_key, *max_end);
        assert_eq!(n.max_timestamp, max_timestamp);

        let black = if n.color == TreeColor::BLACK { 1 } else { 0 };
        (left_height + black, left_count + right_count + 1)
    }
}

impl NodeKey for i32 {}

impl NodeKey for Vec<u8> {}

#[cfg(test)]
mod tests {
    mod insert {
        use crate::{hlc::timestamp::Timestamp, llrb::llrb::RbTree};

        #[test]
        fn insert_into_empty_tree() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            tree.insert(2, 3, 1, Timestamp::new(1, 0));
            assert_eq!(tree.to_inorder_list(), Vec::from([2]));
            assert_eq!(tree.len(), 1);
            tree.assert_invariants();
        }

        #[test]
        fn insert_a_few_elements() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            tree.insert(2, 3, 1, Timestamp::new(1, 0));
            tree.insert(1, 3, 2, Timestamp::new(1, 0));
            tree.insert(3, 4, 3, Timestamp::new(1, 0));
            tree.insert(0, 3, 4, Timestamp::new(1, 0));
            assert_eq!(tree.to_inorder_list(), Vec::from([0, 1, 2, 3]));
            tree.assert_invariants();
        }

        #[test]
        fn duplicate_start_keys_are_distinguished_by_id() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            for id in 0..10 {
                tree.insert(5, 6, id, Timestamp::new(id, 0));
            }
            assert_eq!(tree.len(), 10);
            assert_eq!(tree.get(&5, 7), Some(&Timestamp::new(7, 0)));
            tree.assert_invariants();
        }

        #[test]
        fn same_key_and_id_replaces() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            tree.insert(5, 6, 1, Timestamp::new(1, 0));
            tree.insert(5, 9, 1, Timestamp::new(2, 0));
            assert_eq!(tree.len(), 1);
            assert_eq!(tree.get(&5, 1), Some(&Timestamp::new(2, 0)));
            tree.assert_invariants();
        }

        #[test]
        fn tracks_subtree_maximums() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            for i in 0..100 {
                tree.insert(i, i + (i % 7) + 1, i as u64, Timestamp::new((i * 13 % 31) as u64, 0));
            }
            tree.assert_invariants();
            let root = &tree.nodes[tree.root];
            assert_eq!(root.max_timestamp, Timestamp::new(30, 0));
            let expected_max_end = (0..100).map(|i| i + (i % 7) + 1).max().unwrap();
            assert_eq!(tree.nodes[root.max_end_node].end_key, expected_max_end);
        }
    }

    mod remove {
        use crate::{
            hlc::timestamp::Timestamp,
            llrb::llrb::{RangeValue, RbTree},
        };

        #[test]
        fn remove_missing_returns_none() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            tree.insert(1, 2, 1, Timestamp::new(1, 0));
            assert_eq!(tree.remove(&1, 2), None);
            assert_eq!(tree.remove(&3, 1), None);
            assert_eq!(tree.len(), 1);
        }

        #[test]
        fn remove_returns_interval() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            tree.insert(1, 2, 1, Timestamp::new(1, 0));
            tree.insert(4, 8, 2, Timestamp::new(3, 0));
            tree.insert(6, 7, 3, Timestamp::new(2, 0));
            assert_eq!(
                tree.remove(&4, 2),
                Some(RangeValue {
                    start_key: 4,
                    end_key: 8,
                    value: Timestamp::new(3, 0)
                })
            );
            assert_eq!(tree.to_inorder_list(), Vec::from([1, 6]));
            tree.assert_invariants();
            let root = &tree.nodes[tree.root];
            assert_eq!(root.max_timestamp, Timestamp::new(2, 0));
            assert_eq!(tree.nodes[root.max_end_node].end_key, 7);
        }

        #[test]
        fn remove_everything_in_mixed_order() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            let n = 200;
            for i in 0..n {
                let start = (i * 37) % n;
                tree.insert(start, start + 3, i as u64, Timestamp::new(i as u64, 0));
            }
            tree.assert_invariants();
            for i in (0..n).rev().step_by(2) {
                let start = (i * 37) % n;
                assert!(tree.remove(&start, i as u64).is_some());
                tree.assert_invariants();
            }
            for i in (0..n).filter(|i| i % 2 == 0) {
                let start = (i * 37) % n;
                assert!(tree.remove(&start, i as u64).is_some());
                tree.assert_invariants();
            }
            assert!(tree.is_empty());
        }

        #[test]
        fn freed_slots_are_reused() {
            let mut tree = RbTree::<i32, Timestamp>::new();
            for i in 0..8 {
                tree.insert(i, i + 1, i as u64, Timestamp::new(1, 0));
            }
            for i in 0..8 {
                tree.remove(&i, i as u64);
            }
            for i in 0..8 {
                tree.insert(i, i + 1, i as u64, Timestamp::new(1, 0));
            }
            assert_eq!(tree.nodes.len(), 8);
            tree.assert_invariants();
        }
    }
}
