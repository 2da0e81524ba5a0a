use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Merges named, key-ordered sequences into groups of items sharing a key.
///
/// Only the head item of each sequence is held at a time, so memory grows
/// with the number of sequences rather than their length.
pub struct Merger<'a, K, T, F>
where
    F: Fn(&T) -> K,
{
    key_fn: F,
    sources: Vec<(String, Box<dyn Iterator<Item = T> + 'a>)>,
}

impl<'a, K, T, F> Merger<'a, K, T, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    pub fn new(key_fn: F) -> Self {
        Self {
            key_fn,
            sources: Vec::new(),
        }
    }

    /// Adds a sequence, replacing any earlier one registered under `name`.
    /// Items must already be in ascending key order.
    pub fn include<I>(&mut self, name: impl Into<String>, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        let name = name.into();
        let iter: Box<dyn Iterator<Item = T> + 'a> = Box::new(items.into_iter());
        match self.sources.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = iter,
            None => self.sources.push((name, iter)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Yields `(key, items)` in ascending key order. Items within a group
    /// follow the order their sequences were included in.
    pub fn merge(self) -> MergedGroups<'a, K, T, F> {
        let mut groups = MergedGroups {
            key_fn: self.key_fn,
            sources: self.sources.into_iter().map(|(_, iter)| iter).collect(),
            heap: BinaryHeap::new(),
        };
        for source in 0..groups.sources.len() {
            groups.refill(source);
        }
        groups
    }
}

struct HeapEntry<K, T> {
    key: K,
    source: usize,
    item: T,
}

impl<K: Ord, T> PartialEq for HeapEntry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl<K: Ord, T> Eq for HeapEntry<K, T> {}

impl<K: Ord, T> PartialOrd for HeapEntry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, T> Ord for HeapEntry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest key first
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Iterator returned by [`Merger::merge`].
pub struct MergedGroups<'a, K, T, F>
where
    F: Fn(&T) -> K,
{
    key_fn: F,
    sources: Vec<Box<dyn Iterator<Item = T> + 'a>>,
    heap: BinaryHeap<HeapEntry<K, T>>,
}

impl<'a, K, T, F> MergedGroups<'a, K, T, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    fn refill(&mut self, source: usize) {
        if let Some(item) = self.sources.get_mut(source).and_then(|iter| iter.next()) {
            self.heap.push(HeapEntry {
                key: (self.key_fn)(&item),
                source,
                item,
            });
        }
    }
}

impl<'a, K, T, F> Iterator for MergedGroups<'a, K, T, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    type Item = (K, Vec<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.heap.pop()?;
        let key = first.key;
        let mut group = vec![first.item];
        self.refill(first.source);

        while self.heap.peek().is_some_and(|entry| entry.key == key) {
            if let Some(entry) = self.heap.pop() {
                group.push(entry.item);
                self.refill(entry.source);
            }
        }
        Some((key, group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Item {
        idx: i32,
        val: i32,
    }

    fn v(idx: i32, val: i32) -> Item {
        Item { idx, val }
    }

    fn s1() -> Vec<Item> {
        vec![v(1, 10), v(2, 20), v(3, 30), v(4, 40)]
    }
    fn s2() -> Vec<Item> {
        vec![v(1, 11), v(2, 22), v(3, 33), v(4, 44)]
    }
    fn s3() -> Vec<Item> {
        vec![v(1, 12), v(2, 24), v(3, 36), v(4, 48)]
    }

    fn by_idx(item: &Item) -> i32 {
        item.idx
    }

    #[test]
    fn empty_merge_yields_nothing() {
        let merger: Merger<'_, i32, Item, _> = Merger::new(by_idx);
        assert!(merger.is_empty());
        assert_eq!(merger.merge().count(), 0);
    }

    #[test]
    fn uniform_sequences_group_by_key() {
        let mut merger = Merger::new(by_idx);
        merger.include("S1", s1()).include("S2", s2()).include("S3", s3());

        let results: Vec<(i32, Vec<Item>)> = merger.merge().collect();
        assert_eq!(results.len(), 4);
        for (i, (key, group)) in results.iter().enumerate() {
            let expected = i as i32 + 1;
            assert_eq!(*key, expected);
            assert_eq!(group.len(), 3);
            assert_eq!(group.iter().map(|g| g.val).sum::<i32>(), expected * 30 + expected * 3);
        }
    }

    #[test]
    fn sparse_sequences_interleave() {
        let mut merger = Merger::new(by_idx);
        merger
            .include("S1", s1())
            .include("S2", s2())
            .include("S3", s3())
            .include("S4", vec![v(0, 100)])
            .include("S5", vec![v(5, 500)])
            .include("S6", vec![v(3, -99), v(4, -131)]);

        let mut groups = merger.merge();
        for (idx, cnt, tot) in [(0, 1, 100), (1, 3, 33), (2, 3, 66), (3, 4, 0), (4, 4, 1), (5, 1, 500)] {
            let (key, group) = groups.next().unwrap();
            assert_eq!(key, idx);
            assert_eq!(group.len(), cnt);
            assert_eq!(group.iter().map(|g| g.val).sum::<i32>(), tot);
        }
        assert!(groups.next().is_none());
    }

    #[test]
    fn disjoint_sequences_yield_singletons() {
        let mut merger = Merger::new(by_idx);
        merger
            .include("odd", vec![v(1, 1), v(3, 3), v(5, 5)])
            .include("even", vec![v(2, 2), v(4, 4)]);

        let keys: Vec<(i32, usize)> = merger.merge().map(|(k, g)| (k, g.len())).collect();
        assert_eq!(keys, vec![(1, 1), (2, 1), (3, 1), (4, 1), (5, 1)]);
    }

    #[test]
    fn group_order_follows_inclusion_order() {
        let mut merger = Merger::new(by_idx);
        merger.include("b", vec![v(1, 2)]).include("a", vec![v(1, 1)]);
        let (_, group) = merger.merge().next().unwrap();
        assert_eq!(group, vec![v(1, 2), v(1, 1)]);
    }

    #[test]
    fn including_same_name_replaces_sequence() {
        let mut merger = Merger::new(by_idx);
        merger.include("S1", s1()).include("S1", vec![v(9, 9)]);
        assert_eq!(merger.len(), 1);
        let keys: Vec<i32> = merger.merge().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![9]);
    }

    #[test]
    fn sequences_are_pulled_lazily() {
        use std::cell::Cell;
        let pulled = Cell::new(0);
        let counting = (0..1000).map(|i| {
            pulled.set(pulled.get() + 1);
            v(i, i)
        });

        let mut merger = Merger::new(by_idx);
        merger.include("long", counting);
        let first: Vec<(i32, Vec<Item>)> = merger.merge().take(2).collect();
        assert_eq!(first.len(), 2);
        assert!(pulled.get() <= 3);
    }
}
