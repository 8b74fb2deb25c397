use std::hash::Hash;
use std::ops::{Index, IndexMut};

use hashbrown::HashMap;

pub trait KeyIndexKey<K> {
    fn key(&self) -> &K;
}

/// A vector that keeps insertion order and can be looked up by key.
///
/// Removal preserves the relative order of the remaining items, so an
/// item's position is a stable tie-breaker for anything derived from the
/// insertion sequence.
#[derive(Debug, Clone)]
pub struct KeyIndexVec<K: Copy + Eq + Hash, V: KeyIndexKey<K>> {
    items: Vec<V>,
    idx_by_key: HashMap<K, usize>,
}

impl<K, V> Default for KeyIndexVec<K, V>
where
    K: Copy + Eq + Hash,
    V: KeyIndexKey<K>,
{
    fn default() -> Self {
        Self {
            items: Vec::new(),
            idx_by_key: HashMap::new(),
        }
    }
}

impl<K, V> KeyIndexVec<K, V>
where
    K: Copy + Eq + Hash,
    V: KeyIndexKey<K>,
{
    /// Appends `v` unless an item with the same key exists.
    /// Returns the item's index and whether it was inserted.
    pub fn insert(&mut self, v: V) -> (usize, bool) {
        let key = *v.key();
        if let Some(idx) = self.idx_by_key.get(&key) {
            return (*idx, false);
        }

        let idx = self.items.len();
        self.idx_by_key.insert(key, idx);
        self.items.push(v);
        (idx, true)
    }

    pub fn remove_by_key(&mut self, key: &K) -> Option<V> {
        let idx = self.idx_by_key.remove(key)?;
        let removed = self.items.remove(idx);
        assert!(*removed.key() == *key);

        for (pos, item) in self.items.iter().enumerate().skip(idx) {
            self.idx_by_key.insert(*item.key(), pos);
        }

        Some(removed)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.items.len(), self.idx_by_key.len());
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.idx_by_key.contains_key(key)
    }

    pub fn index_of_key(&self, key: &K) -> Option<usize> {
        self.idx_by_key.get(key).copied()
    }

    pub fn by_key(&self, key: &K) -> Option<&V> {
        self.index_of_key(key).map(|idx| &self.items[idx])
    }

    pub fn by_key_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.index_of_key(key)?;
        Some(&mut self.items[idx])
    }
}

impl<K, V> Index<usize> for KeyIndexVec<K, V>
where
    K: Copy + Eq + Hash,
    V: KeyIndexKey<K>,
{
    type Output = V;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.items[idx]
    }
}

impl<K, V> IndexMut<usize> for KeyIndexVec<K, V>
where
    K: Copy + Eq + Hash,
    V: KeyIndexKey<K>,
{
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.items[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestItem {
        id: u32,
        value: i32,
    }

    impl KeyIndexKey<u32> for TestItem {
        fn key(&self) -> &u32 {
            &self.id
        }
    }

    #[test]
    fn insert_is_idempotent_by_key() {
        let mut vec = KeyIndexVec::<u32, TestItem>::default();
        assert_eq!(vec.insert(TestItem { id: 1, value: 10 }), (0, true));
        assert_eq!(vec.insert(TestItem { id: 2, value: 20 }), (1, true));
        assert_eq!(vec.insert(TestItem { id: 1, value: 99 }), (0, false));

        assert_eq!(vec.len(), 2);
        assert_eq!(vec.by_key(&1).unwrap().value, 10);
    }

    #[test]
    fn remove_keeps_relative_order() {
        let mut vec = KeyIndexVec::<u32, TestItem>::default();
        for id in [10, 20, 30, 40] {
            vec.insert(TestItem { id, value: 0 });
        }

        let removed = vec.remove_by_key(&20).unwrap();
        assert_eq!(removed.id, 20);
        assert!(vec.remove_by_key(&20).is_none());

        let ids: Vec<u32> = vec.iter().map(|item| item.id).collect();
        assert_eq!(ids, [10, 30, 40]);
        assert_eq!(vec.index_of_key(&30), Some(1));
        assert_eq!(vec.index_of_key(&40), Some(2));
        assert_eq!(vec[2].id, 40);
    }
}
