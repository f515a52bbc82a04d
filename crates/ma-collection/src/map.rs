//! Hashed and ordered maps with an optional inverse (value -> key) index.

use std::hash::Hash;
use std::rc::Rc;

use crate::comparator::{DefaultEquality, EqualityComparator, KeyIndex};
use crate::error::{CollectionError, InvariantViolation};
use crate::event::EventKind;
use crate::frozen::SuspendToken;
use crate::iter::{EntryIter, ValueIter};
use crate::listener::{Listener, ListenerId};
use crate::modification::{ModificationKind, Operands};
use crate::node::{Derivation, Node};
use crate::ops;
use crate::options::CollectionOptions;
use crate::set::{range_bounds, MaSet};
use crate::store::{Keying, Store, StoreStats};
use crate::suspend;
use crate::view_info::ViewInfo;

/// A mutation-aware map.
///
/// With bidirectional options every value is held by at most one key:
/// putting a value that another key already maps detaches that entry first
/// (or fails with [`CollectionError::Conflict`] under
/// [`crate::ConflictPolicy::RejectNew`]), and [`MaMap::inverse_lookup`]
/// answers in constant time.
pub struct MaMap<K, V> {
    node: Rc<Node<K, V>>,
}

impl<K, V> Clone for MaMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<K: Hash + Eq + Clone + 'static, V: Clone + PartialEq + 'static> MaMap<K, V> {
    pub fn hashed() -> Self {
        Self::with_comparators(KeyIndex::hashed(), None, CollectionOptions::default())
    }
}

impl<K: Ord + Clone + 'static, V: Clone + PartialEq + 'static> MaMap<K, V> {
    pub fn ordered() -> Self {
        Self::with_comparators(KeyIndex::ordered(), None, CollectionOptions::default())
    }
}

impl<K: Hash + Eq + Clone + 'static, V: Hash + Eq + Clone + 'static> MaMap<K, V> {
    pub fn hashed_bidi() -> Self {
        Self::hashed_with(CollectionOptions::bidi())
    }

    pub fn hashed_with(options: CollectionOptions) -> Self {
        Self::with_comparators(KeyIndex::hashed(), Some(default_value_eq()), options)
    }
}

impl<K: Ord + Clone + 'static, V: Hash + Eq + Clone + 'static> MaMap<K, V> {
    pub fn ordered_with(options: CollectionOptions) -> Self {
        Self::with_comparators(KeyIndex::ordered(), Some(default_value_eq()), options)
    }
}

fn default_value_eq<V: Hash + Eq + 'static>() -> Rc<dyn EqualityComparator<V>> {
    Rc::new(DefaultEquality::new())
}

impl<K: Clone + 'static, V: Clone + PartialEq + 'static> MaMap<K, V> {
    /// The inverse index is kept only when `options` are bidirectional and a
    /// value comparator is given.
    pub fn with_comparators(
        index: KeyIndex<K>,
        value_eq: Option<Rc<dyn EqualityComparator<V>>>,
        options: CollectionOptions,
    ) -> Self {
        let value_eq = value_eq.filter(|_| options.is_bidi());
        let store = Store::new(Keying::from(index), value_eq, options);
        Self {
            node: Node::root(store, EventKind::Entry),
        }
    }

    pub fn len(&self) -> usize {
        let store = self.node.shared.store.borrow();
        self.node.visible_len(&store)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let store = self.node.shared.store.borrow();
        self.node
            .locate(&store, key)
            .map(|s| store.slot(s).value.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let store = self.node.shared.store.borrow();
        self.node.locate(&store, key).is_some()
    }

    pub fn contains_value(&self, value: &V) -> bool {
        let store = self.node.shared.store.borrow();
        if store.value_eq().is_some() && self.node.bounds().is_unbounded() {
            return store.find_value(value).is_some();
        }
        self.node
            .visible_slots(&store)
            .into_iter()
            .any(|s| values_match(&store, &store.slot(s).value, value))
    }

    /// Key currently mapping `value`, through the inverse index. `None` for
    /// maps without one.
    pub fn inverse_lookup(&self, value: &V) -> Option<K> {
        let store = self.node.shared.store.borrow();
        store
            .find_value(value)
            .map(|s| &store.slot(s).key)
            .filter(|key| self.node.admits_key(&store, key))
            .cloned()
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        let store = self.node.shared.store.borrow();
        self.node
            .visible_slots(&store)
            .into_iter()
            .map(|s| {
                let entry = store.slot(s);
                (entry.key.clone(), entry.value.clone())
            })
            .collect()
    }

    pub fn first_entry(&self) -> Option<(K, V)> {
        let store = self.node.shared.store.borrow();
        self.node.visible_at(&store, 0).map(|s| {
            let entry = store.slot(s);
            (entry.key.clone(), entry.value.clone())
        })
    }

    pub fn last_entry(&self) -> Option<(K, V)> {
        let store = self.node.shared.store.borrow();
        let len = self.node.visible_len(&store);
        len.checked_sub(1)
            .and_then(|i| self.node.visible_at(&store, i))
            .map(|s| {
                let entry = store.slot(s);
                (entry.key.clone(), entry.value.clone())
            })
    }

    /// Maps `key` to `value`. An existing key keeps its stored key object and
    /// reports a replace; the previous value is returned.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>, CollectionError> {
        self.check_keys(std::slice::from_ref(&key))?;
        let operands = Operands::Entry {
            key: key.clone(),
            value: value.clone(),
        };
        let (old, _) = ops::modify(&self.node, ModificationKind::PutOne, operands, |planner, store| {
            let old = store.find_key(&key).map(|s| store.slot(s).value.clone());
            planner.put(key, value)?;
            Ok(old)
        })?;
        Ok(old)
    }

    pub fn put_all(&self, entries: Vec<(K, V)>) -> Result<(), CollectionError> {
        let keys: Vec<K> = entries.iter().map(|(k, _)| k.clone()).collect();
        self.check_keys(&keys)?;
        let operands = Operands::Entries(entries.clone());
        ops::modify(&self.node, ModificationKind::PutAll, operands, |planner, _| {
            for (key, value) in entries {
                planner.put(key, value)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn check_keys(&self, keys: &[K]) -> Result<(), CollectionError> {
        let store = self.node.shared.store.borrow();
        if keys.iter().all(|key| self.node.admits_key(&store, key)) {
            Ok(())
        } else {
            Err(CollectionError::KeyOutOfRange)
        }
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>, CollectionError> {
        let operands = Operands::Element(key.clone());
        let (old, _) = ops::modify(&self.node, ModificationKind::Remove, operands, |planner, store| {
            let hit = self.node.locate(store, key);
            if let Some(slot) = hit {
                planner.remove(slot);
            }
            Ok(hit.map(|s| store.slot(s).value.clone()))
        })?;
        Ok(old)
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        ops::clear(&self.node)
    }

    pub fn head_map(&self, bound: K, inclusive: bool) -> Result<MaMap<K, V>, CollectionError> {
        let info = ViewInfo::HeadSet {
            bound: bound.clone(),
            inclusive,
        };
        self.range(info, None, Some((bound, inclusive)))
    }

    pub fn tail_map(&self, bound: K, inclusive: bool) -> Result<MaMap<K, V>, CollectionError> {
        let info = ViewInfo::TailSet {
            bound: bound.clone(),
            inclusive,
        };
        self.range(info, Some((bound, inclusive)), None)
    }

    pub fn sub_map(
        &self,
        from: K,
        from_inclusive: bool,
        to: K,
        to_inclusive: bool,
    ) -> Result<MaMap<K, V>, CollectionError> {
        let info = ViewInfo::SubSet {
            from: from.clone(),
            from_inclusive,
            to: to.clone(),
            to_inclusive,
        };
        self.range(info, Some((from, from_inclusive)), Some((to, to_inclusive)))
    }

    fn range(
        &self,
        info: ViewInfo<K>,
        start: Option<(K, bool)>,
        end: Option<(K, bool)>,
    ) -> Result<MaMap<K, V>, CollectionError> {
        let bounds = {
            let store = self.node.shared.store.borrow();
            let cmp = store
                .keying()
                .order()
                .ok_or(CollectionError::Unsupported("range views need an ordered map"))?;
            range_bounds(cmp.as_ref(), self.node.bounds(), self.node.is_descending(), start, end)?
        };
        Ok(Self {
            node: self.node.derive(Derivation::new(info).bounds(bounds)),
        })
    }

    pub fn descending_map(&self) -> MaMap<K, V> {
        Self {
            node: self
                .node
                .derive(Derivation::new(ViewInfo::Reversed).reversed()),
        }
    }

    /// Live view of the keys. Removal through it removes the entry.
    pub fn key_set(&self) -> MaSet<K, V> {
        MaSet::from_node(
            self.node
                .derive(Derivation::new(ViewInfo::KeyProjection).kind(EventKind::Key)),
        )
    }

    pub fn descending_key_set(&self) -> MaSet<K, V> {
        self.key_set().descending_set()
    }

    pub fn values(&self) -> Values<K, V> {
        Values {
            node: self
                .node
                .derive(Derivation::new(ViewInfo::ValueProjection).kind(EventKind::Value)),
        }
    }

    pub fn iter(&self) -> EntryIter<K, V> {
        EntryIter::new(
            self.node.derive(Derivation::new(ViewInfo::Iterator)),
            |key, value| (key.clone(), value.clone()),
        )
    }

    /// View of the single entry stored under `key`.
    pub fn entry(&self, key: &K) -> Result<EntryView<K, V>, CollectionError> {
        let stored = {
            let store = self.node.shared.store.borrow();
            let slot = self
                .node
                .locate(&store, key)
                .ok_or(CollectionError::NoSuchElement)?;
            store.slot(slot).key.clone()
        };
        let info = ViewInfo::SingleEntry {
            key: stored.clone(),
        };
        Ok(EntryView {
            node: self.node.derive(Derivation::new(info)),
            key: stored,
        })
    }

    /// Detaches the entry of `key` while a field its hash or order depends
    /// on changes.
    pub fn suspend(&self, key: &K) -> Result<SuspendToken, CollectionError> {
        suspend::suspend_key(&self.node.root_node(), key)
    }

    /// Detaches the entry holding `value` while a field its hash depends on
    /// changes. Bidirectional maps only.
    pub fn suspend_value(&self, value: &V) -> Result<SuspendToken, CollectionError> {
        suspend::suspend_value(&self.node.root_node(), value)
    }

    pub fn resume(&self, token: SuspendToken) -> Result<(), CollectionError> {
        suspend::resume(&self.node.root_node(), token)
    }

    pub fn add_listener(&self, listener: impl Into<Listener<K, V>>) -> ListenerId {
        self.node.add_listener(listener.into())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node.remove_listener(id)
    }

    pub fn view_info(&self) -> Option<ViewInfo<K>> {
        self.node.info().cloned()
    }

    pub fn integrity(&self) -> Result<(), InvariantViolation> {
        ops::integrity(&self.node)
    }

    pub fn debug_stats(&self) -> StoreStats {
        ops::stats(&self.node)
    }
}

fn values_match<K, V: PartialEq>(store: &Store<K, V>, a: &V, b: &V) -> bool {
    match store.value_eq() {
        Some(eq) => eq.equals(a, b),
        None => a == b,
    }
}

/// Live view of a map's values.
pub struct Values<K, V> {
    node: Rc<Node<K, V>>,
}

impl<K: Clone + 'static, V: Clone + PartialEq + 'static> Values<K, V> {
    pub fn len(&self) -> usize {
        let store = self.node.shared.store.borrow();
        self.node.visible_len(&store)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<V> {
        let store = self.node.shared.store.borrow();
        self.node
            .visible_slots(&store)
            .into_iter()
            .map(|s| store.slot(s).value.clone())
            .collect()
    }

    pub fn contains(&self, value: &V) -> bool {
        let store = self.node.shared.store.borrow();
        self.node
            .visible_slots(&store)
            .into_iter()
            .any(|s| values_match(&store, &store.slot(s).value, value))
    }

    /// Removes the first entry holding `value`.
    pub fn remove(&self, value: &V) -> Result<bool, CollectionError> {
        let operands = Operands::Value(value.clone());
        let (removed, _) = ops::modify(&self.node, ModificationKind::Remove, operands, |planner, store| {
            let hit = self
                .node
                .visible_slots(store)
                .into_iter()
                .find(|&s| values_match(store, &store.slot(s).value, value));
            if let Some(slot) = hit {
                planner.remove(slot);
            }
            Ok(hit.is_some())
        })?;
        Ok(removed)
    }

    pub fn remove_all(&self, values: &[V]) -> Result<usize, CollectionError> {
        ops::remove_matching(
            &self.node,
            ModificationKind::RemoveAll,
            Operands::Values(values.to_vec()),
            |store, slot| values.iter().any(|v| values_match(store, &slot.value, v)),
        )
    }

    pub fn retain_all(&self, values: &[V]) -> Result<usize, CollectionError> {
        ops::remove_matching(
            &self.node,
            ModificationKind::RetainAll,
            Operands::Values(values.to_vec()),
            |store, slot| !values.iter().any(|v| values_match(store, &slot.value, v)),
        )
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        ops::clear(&self.node)
    }

    pub fn iter(&self) -> ValueIter<K, V> {
        ValueIter::new(
            self.node.derive(Derivation::new(ViewInfo::Iterator)),
            |_, value| value.clone(),
        )
    }

    pub fn add_listener(&self, listener: impl Into<Listener<K, V>>) -> ListenerId {
        self.node.add_listener(listener.into())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node.remove_listener(id)
    }

    pub fn view_info(&self) -> Option<ViewInfo<K>> {
        self.node.info().cloned()
    }
}

/// View of one map entry. Goes stale once its key leaves the map.
pub struct EntryView<K, V> {
    node: Rc<Node<K, V>>,
    key: K,
}

impl<K: Clone + 'static, V: Clone + 'static> EntryView<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> Result<V, CollectionError> {
        let store = self.node.shared.store.borrow();
        let slot = self.slot(&store)?;
        Ok(store.slot(slot).value.clone())
    }

    /// Replaces the entry's value, returning the previous one.
    pub fn set_value(&self, value: V) -> Result<V, CollectionError> {
        let operands = Operands::Entry {
            key: self.key.clone(),
            value: value.clone(),
        };
        let (old, _) = ops::modify(
            &self.node,
            ModificationKind::EntrySetValue,
            operands,
            |planner, store| {
                let slot = self.slot(store)?;
                let entry = store.slot(slot);
                let old = entry.value.clone();
                planner.put(entry.key.clone(), value)?;
                Ok(old)
            },
        )?;
        Ok(old)
    }

    fn slot(&self, store: &Store<K, V>) -> Result<usize, CollectionError> {
        self.node
            .locate(store, &self.key)
            .ok_or(CollectionError::StaleView {
                view: self.node.view_name(),
            })
    }

    pub fn add_listener(&self, listener: impl Into<Listener<K, V>>) -> ListenerId {
        self.node.add_listener(listener.into())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node.remove_listener(id)
    }

    pub fn view_info(&self) -> Option<ViewInfo<K>> {
        self.node.info().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidi_put_moves_value_to_new_key() {
        let map: MaMap<&str, i32> = MaMap::hashed_bidi();
        map.put("a", 1).unwrap();
        map.put("b", 1).unwrap();
        assert_eq!(map.get(&"a"), None);
        assert_eq!(map.inverse_lookup(&1), Some("b"));
        map.integrity().unwrap();
    }

    #[test]
    fn entry_view_goes_stale_with_its_key() {
        let map: MaMap<i32, &str> = MaMap::ordered();
        map.put(1, "one").unwrap();
        let entry = map.entry(&1).unwrap();
        assert_eq!(entry.set_value("uno"), Ok("one"));
        assert_eq!(map.get(&1), Some("uno"));
        map.remove(&1).unwrap();
        assert!(entry.value().unwrap_err().is_stale());
    }

    #[test]
    fn key_set_removal_removes_entries() {
        let map: MaMap<i32, i32> = MaMap::ordered();
        map.put_all(vec![(1, 10), (2, 20), (3, 30)]).unwrap();
        let keys = map.key_set();
        assert!(keys.remove(&2).unwrap());
        assert_eq!(map.to_vec(), vec![(1, 10), (3, 30)]);
        assert_eq!(map.descending_key_set().to_vec(), vec![3, 1]);
    }
}
