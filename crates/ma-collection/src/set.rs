//! Hashed and ordered sets, their navigable sub-views and key projections.

use std::cmp::Ordering;
use std::hash::Hash;
use std::rc::Rc;

use crate::comparator::{KeyIndex, OrderComparator};
use crate::error::{CollectionError, InvariantViolation};
use crate::event::EventKind;
use crate::frozen::SuspendToken;
use crate::iter::SetIter;
use crate::listener::{Listener, ListenerId};
use crate::modification::{ModificationKind, Operands};
use crate::node::{Bounds, Derivation, Node};
use crate::ops;
use crate::options::CollectionOptions;
use crate::store::{Keying, Store, StoreStats};
use crate::suspend;
use crate::view_info::ViewInfo;

/// A mutation-aware set.
///
/// Hashed sets iterate in insertion order; ordered sets iterate in
/// comparator order and support navigation and range views. `MaSet<K, V>`
/// with a non-unit `V` is the key projection of a [`crate::MaMap`]: it
/// supports removal but not insertion.
pub struct MaSet<K, V = ()> {
    node: Rc<Node<K, V>>,
}

impl<K, V> Clone for MaSet<K, V> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

#[derive(Clone, Copy)]
enum Nav {
    Floor,
    Ceiling,
    Lower,
    Higher,
}

impl Nav {
    fn flipped(self) -> Self {
        match self {
            Nav::Floor => Nav::Ceiling,
            Nav::Ceiling => Nav::Floor,
            Nav::Lower => Nav::Higher,
            Nav::Higher => Nav::Lower,
        }
    }
}

impl<K: Hash + Eq + Clone + 'static> MaSet<K> {
    pub fn hashed() -> Self {
        Self::hashed_with(CollectionOptions::default())
    }

    pub fn hashed_with(options: CollectionOptions) -> Self {
        Self::with_index(KeyIndex::hashed(), options)
    }
}

impl<K: Ord + Clone + 'static> MaSet<K> {
    pub fn ordered() -> Self {
        Self::ordered_with(CollectionOptions::default())
    }

    pub fn ordered_with(options: CollectionOptions) -> Self {
        Self::with_index(KeyIndex::ordered(), options)
    }
}

impl<K: Clone + 'static> MaSet<K> {
    pub fn with_index(index: KeyIndex<K>, options: CollectionOptions) -> Self {
        let store = Store::new(Keying::from(index), None, options);
        Self {
            node: Node::root(store, EventKind::Element),
        }
    }

    /// Adds `key`, detaching an equal element first. Returns `false` when an
    /// equal element was already present.
    pub fn add(&self, key: K) -> Result<bool, CollectionError> {
        self.check_insertable(std::slice::from_ref(&key))?;
        let operands = Operands::Element(key.clone());
        let (absent, _) = ops::modify(&self.node, ModificationKind::Insert, operands, |planner, store| {
            let absent = store.find_key(&key).is_none();
            planner.insert(key, (), None)?;
            Ok(absent)
        })?;
        Ok(absent)
    }

    pub fn add_all(&self, keys: Vec<K>) -> Result<(), CollectionError> {
        self.check_insertable(&keys)?;
        let operands = Operands::Elements(keys.clone());
        ops::modify(&self.node, ModificationKind::InsertAll, operands, |planner, _| {
            for key in keys {
                planner.insert(key, (), None)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn check_insertable(&self, keys: &[K]) -> Result<(), CollectionError> {
        if self.node.kind() == EventKind::Key {
            return Err(CollectionError::Unsupported("add through a key projection"));
        }
        let store = self.node.shared.store.borrow();
        if keys.iter().all(|key| self.node.admits_key(&store, key)) {
            Ok(())
        } else {
            Err(CollectionError::KeyOutOfRange)
        }
    }
}

impl<K: Clone + 'static, V: Clone + 'static> MaSet<K, V> {
    pub(crate) fn from_node(node: Rc<Node<K, V>>) -> Self {
        Self { node }
    }

    pub fn len(&self) -> usize {
        let store = self.node.shared.store.borrow();
        self.node.visible_len(&store)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        let store = self.node.shared.store.borrow();
        self.node.locate(&store, key).is_some()
    }

    pub fn to_vec(&self) -> Vec<K> {
        let store = self.node.shared.store.borrow();
        self.node
            .visible_slots(&store)
            .into_iter()
            .map(|s| store.slot(s).key.clone())
            .collect()
    }

    pub fn first(&self) -> Option<K> {
        let store = self.node.shared.store.borrow();
        self.node
            .visible_at(&store, 0)
            .map(|s| store.slot(s).key.clone())
    }

    pub fn last(&self) -> Option<K> {
        let store = self.node.shared.store.borrow();
        let len = self.node.visible_len(&store);
        len.checked_sub(1)
            .and_then(|i| self.node.visible_at(&store, i))
            .map(|s| store.slot(s).key.clone())
    }

    /// Greatest element less than or equal to `key`, in view order.
    pub fn floor(&self, key: &K) -> Result<Option<K>, CollectionError> {
        self.navigate(key, Nav::Floor)
    }

    pub fn ceiling(&self, key: &K) -> Result<Option<K>, CollectionError> {
        self.navigate(key, Nav::Ceiling)
    }

    pub fn lower(&self, key: &K) -> Result<Option<K>, CollectionError> {
        self.navigate(key, Nav::Lower)
    }

    pub fn higher(&self, key: &K) -> Result<Option<K>, CollectionError> {
        self.navigate(key, Nav::Higher)
    }

    fn navigate(&self, key: &K, nav: Nav) -> Result<Option<K>, CollectionError> {
        let store = self.node.shared.store.borrow();
        let cmp = store
            .keying()
            .order()
            .ok_or(CollectionError::Unsupported("navigation needs an ordered set"))?;
        let nav = if self.node.is_descending() {
            nav.flipped()
        } else {
            nav
        };
        let (lo, hi) = self.node.visible_range(&store);
        let visible = &store.order()[lo..hi];
        let below = |strict: bool| {
            visible.partition_point(|&s| match cmp.compare(&store.slot(s).key, key) {
                Ordering::Less => true,
                Ordering::Equal => !strict,
                Ordering::Greater => false,
            })
        };
        let index = match nav {
            Nav::Floor => below(false).checked_sub(1),
            Nav::Lower => below(true).checked_sub(1),
            Nav::Ceiling => Some(below(true)),
            Nav::Higher => Some(below(false)),
        };
        Ok(index
            .and_then(|i| visible.get(i))
            .map(|&s| store.slot(s).key.clone()))
    }

    /// Elements before `bound` in view order.
    pub fn head_set(&self, bound: K, inclusive: bool) -> Result<MaSet<K, V>, CollectionError> {
        let info = ViewInfo::HeadSet {
            bound: bound.clone(),
            inclusive,
        };
        self.range(info, None, Some((bound, inclusive)))
    }

    /// Elements from `bound` on, in view order.
    pub fn tail_set(&self, bound: K, inclusive: bool) -> Result<MaSet<K, V>, CollectionError> {
        let info = ViewInfo::TailSet {
            bound: bound.clone(),
            inclusive,
        };
        self.range(info, Some((bound, inclusive)), None)
    }

    pub fn sub_set(
        &self,
        from: K,
        from_inclusive: bool,
        to: K,
        to_inclusive: bool,
    ) -> Result<MaSet<K, V>, CollectionError> {
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
    ) -> Result<MaSet<K, V>, CollectionError> {
        let bounds = {
            let store = self.node.shared.store.borrow();
            let cmp = store
                .keying()
                .order()
                .ok_or(CollectionError::Unsupported("range views need an ordered set"))?;
            range_bounds(cmp.as_ref(), self.node.bounds(), self.node.is_descending(), start, end)?
        };
        Ok(Self::from_node(
            self.node.derive(Derivation::new(info).bounds(bounds)),
        ))
    }

    pub fn descending_set(&self) -> MaSet<K, V> {
        Self::from_node(self.node.derive(Derivation::new(ViewInfo::Reversed).reversed()))
    }

    pub fn iter(&self) -> SetIter<K, V> {
        SetIter::new(
            self.node.derive(Derivation::new(ViewInfo::Iterator)),
            |key, _| key.clone(),
        )
    }

    pub fn descending_iter(&self) -> SetIter<K, V> {
        SetIter::new(
            self.node
                .derive(Derivation::new(ViewInfo::DescendingIterator).reversed()),
            |key, _| key.clone(),
        )
    }

    pub fn remove(&self, key: &K) -> Result<bool, CollectionError> {
        let operands = Operands::Element(key.clone());
        let (removed, _) = ops::modify(&self.node, ModificationKind::Remove, operands, |planner, store| {
            let hit = self.node.locate(store, key);
            if let Some(slot) = hit {
                planner.remove(slot);
            }
            Ok(hit.is_some())
        })?;
        Ok(removed)
    }

    pub fn remove_all(&self, keys: &[K]) -> Result<usize, CollectionError> {
        ops::remove_matching(
            &self.node,
            ModificationKind::RemoveAll,
            Operands::Elements(keys.to_vec()),
            |store, slot| keys.iter().any(|k| store.keys_equal(&slot.key, k)),
        )
    }

    pub fn retain_all(&self, keys: &[K]) -> Result<usize, CollectionError> {
        ops::remove_matching(
            &self.node,
            ModificationKind::RetainAll,
            Operands::Elements(keys.to_vec()),
            |store, slot| !keys.iter().any(|k| store.keys_equal(&slot.key, k)),
        )
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        ops::clear(&self.node)
    }

    /// Detaches `key` while a field its hash or order depends on changes.
    pub fn suspend(&self, key: &K) -> Result<SuspendToken, CollectionError> {
        suspend::suspend_key(&self.node.root_node(), key)
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

/// Bounds of a range view. `start` and `end` are in view order; a descending
/// view maps them onto the ascending bounds the node keeps.
pub(crate) fn range_bounds<K: Clone>(
    cmp: &dyn OrderComparator<K>,
    parent: &Bounds<K>,
    descending: bool,
    start: Option<(K, bool)>,
    end: Option<(K, bool)>,
) -> Result<Bounds<K>, CollectionError> {
    for (key, inclusive) in start.iter().chain(end.iter()) {
        if !parent.admits_bound(cmp, key, *inclusive) {
            return Err(CollectionError::KeyOutOfRange);
        }
    }
    let (lower, upper) = if descending { (end, start) } else { (start, end) };
    if let (Some((lo, _)), Some((hi, _))) = (&lower, &upper) {
        if cmp.compare(lo, hi) == Ordering::Greater {
            return Err(CollectionError::KeyOutOfRange);
        }
    }
    let mut bounds = parent.clone();
    if let Some((key, inclusive)) = lower {
        bounds = bounds.with_lower(key, inclusive);
    }
    if let Some((key, inclusive)) = upper {
        bounds = bounds.with_upper(key, inclusive);
    }
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_follows_view_direction() {
        let set = MaSet::ordered();
        set.add_all(vec![10, 20, 30]).unwrap();
        assert_eq!(set.floor(&25), Ok(Some(20)));
        assert_eq!(set.higher(&30), Ok(None));

        let desc = set.descending_set();
        assert_eq!(desc.to_vec(), vec![30, 20, 10]);
        assert_eq!(desc.floor(&25), Ok(Some(30)));
        assert_eq!(desc.higher(&20), Ok(Some(10)));
    }

    #[test]
    fn sub_set_rejects_bounds_outside_parent() {
        let set = MaSet::ordered();
        set.add_all(vec![1, 2, 3, 4, 5]).unwrap();
        let head = set.head_set(4, false).unwrap();
        assert_eq!(head.to_vec(), vec![1, 2, 3]);
        assert_eq!(head.tail_set(6, true).err(), Some(CollectionError::KeyOutOfRange));
        assert_eq!(head.add(4), Err(CollectionError::KeyOutOfRange));
        assert_eq!(head.tail_set(2, true).unwrap().to_vec(), vec![2, 3]);
    }

    #[test]
    fn hashed_set_has_no_navigation() {
        let set = MaSet::hashed();
        set.add(1).unwrap();
        assert!(matches!(set.floor(&1), Err(CollectionError::Unsupported(_))));
    }
}
