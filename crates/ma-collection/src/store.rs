//! Backing store shared by a root container and every view derived from it.
//!
//! Slots live in a [`Slab`]; `order` lists the visible slots in container
//! order (sequence order, insertion order or sorted order). Indexes hold slot
//! handles only, never a second copy of a key or value.

use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use rustc_hash::{FxHashMap, FxHashSet};
use slab::Slab;
use smallvec::SmallVec;

use crate::comparator::{EqualityComparator, KeyIndex, OrderComparator};
use crate::error::InvariantViolation;
use crate::options::CollectionOptions;
use crate::plan::{Commit, Sim};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

type Bucket = SmallVec<[usize; 1]>;

pub(crate) struct Slot<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    key_hash: Option<u64>,
    value_hash: Option<u64>,
}

/// How keys are located.
pub(crate) enum Keying<K> {
    /// Positional; the comparator is present for bidirectional sequences,
    /// which hold no two equal elements.
    Sequence(Option<Rc<dyn EqualityComparator<K>>>),
    Hashed(Rc<dyn EqualityComparator<K>>),
    Ordered(Rc<dyn OrderComparator<K>>),
}

impl<K> Keying<K> {
    pub(crate) fn equality(&self) -> Option<&Rc<dyn EqualityComparator<K>>> {
        match self {
            Keying::Sequence(eq) => eq.as_ref(),
            Keying::Hashed(eq) => Some(eq),
            Keying::Ordered(_) => None,
        }
    }

    pub(crate) fn order(&self) -> Option<&Rc<dyn OrderComparator<K>>> {
        match self {
            Keying::Ordered(cmp) => Some(cmp),
            _ => None,
        }
    }
}

impl<K> From<KeyIndex<K>> for Keying<K> {
    fn from(index: KeyIndex<K>) -> Self {
        match index {
            KeyIndex::Hashed(eq) => Keying::Hashed(eq),
            KeyIndex::Ordered(cmp) => Keying::Ordered(cmp),
        }
    }
}

pub(crate) struct Suspension {
    pub(crate) depth: u32,
    /// Position in `order` at the time of the outermost suspend.
    pub(crate) position: usize,
    pub(crate) stamp: u64,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub len: usize,
    pub slots: usize,
    pub inverse_len: usize,
    pub suspended: usize,
    pub mod_count: u64,
}

pub(crate) struct Store<K, V> {
    id: u64,
    slots: Slab<Slot<K, V>>,
    order: Vec<usize>,
    /// Slot -> index into `order`, rebuilt with it.
    positions: FxHashMap<usize, usize>,
    keying: Keying<K>,
    key_index: FxHashMap<u64, Bucket>,
    value_eq: Option<Rc<dyn EqualityComparator<V>>>,
    value_index: FxHashMap<u64, Bucket>,
    suspended: FxHashMap<usize, Suspension>,
    next_stamp: u64,
    mod_count: u64,
    options: CollectionOptions,
}

impl<K, V> Store<K, V> {
    pub(crate) fn new(
        keying: Keying<K>,
        value_eq: Option<Rc<dyn EqualityComparator<V>>>,
        options: CollectionOptions,
    ) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            slots: Slab::new(),
            order: Vec::new(),
            positions: FxHashMap::default(),
            keying,
            key_index: FxHashMap::default(),
            value_eq,
            value_index: FxHashMap::default(),
            suspended: FxHashMap::default(),
            next_stamp: 0,
            mod_count: 0,
            options,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub(crate) fn options(&self) -> &CollectionOptions {
        &self.options
    }

    pub(crate) fn keying(&self) -> &Keying<K> {
        &self.keying
    }

    pub(crate) fn value_eq(&self) -> Option<&Rc<dyn EqualityComparator<V>>> {
        self.value_eq.as_ref()
    }

    pub(crate) fn is_positional(&self) -> bool {
        matches!(self.keying, Keying::Sequence(_))
    }

    /// Whether no two visible slots may hold equal keys.
    pub(crate) fn unique_keys(&self) -> bool {
        !matches!(self.keying, Keying::Sequence(None))
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn slot(&self, slot: usize) -> &Slot<K, V> {
        &self.slots[slot]
    }

    pub(crate) fn key_candidates(&self, hash: u64) -> &[usize] {
        self.key_index.get(&hash).map_or(&[], |b| b.as_slice())
    }

    pub(crate) fn value_candidates(&self, hash: u64) -> &[usize] {
        self.value_index.get(&hash).map_or(&[], |b| b.as_slice())
    }

    pub(crate) fn keys_equal(&self, a: &K, b: &K) -> bool {
        match &self.keying {
            Keying::Sequence(None) => false,
            Keying::Sequence(Some(eq)) | Keying::Hashed(eq) => eq.equals(a, b),
            Keying::Ordered(cmp) => cmp.compare(a, b) == Ordering::Equal,
        }
    }

    pub(crate) fn values_equal(&self, a: &V, b: &V) -> bool {
        self.value_eq.as_ref().is_some_and(|eq| eq.equals(a, b))
    }

    /// Binary search over `order`; ordered stores only.
    pub(crate) fn search(&self, key: &K) -> Result<usize, usize> {
        match &self.keying {
            Keying::Ordered(cmp) => self
                .order
                .binary_search_by(|&s| cmp.compare(&self.slots[s].key, key)),
            _ => Err(self.order.len()),
        }
    }

    /// Visible slot holding `key`, through the key index.
    pub(crate) fn find_key(&self, key: &K) -> Option<usize> {
        match &self.keying {
            Keying::Sequence(None) => None,
            Keying::Sequence(Some(eq)) | Keying::Hashed(eq) => self
                .key_candidates(eq.hash(key))
                .iter()
                .copied()
                .find(|&s| eq.equals(&self.slots[s].key, key)),
            Keying::Ordered(_) => self.search(key).ok().map(|i| self.order[i]),
        }
    }

    /// Visible slot holding `value`, through the inverse index.
    pub(crate) fn find_value(&self, value: &V) -> Option<usize> {
        let eq = self.value_eq.as_ref()?;
        self.value_candidates(eq.hash(value))
            .iter()
            .copied()
            .find(|&s| eq.equals(&self.slots[s].value, value))
    }

    pub(crate) fn position_of(&self, slot: usize) -> Option<usize> {
        self.positions.get(&slot).copied()
    }

    pub(crate) fn suspension(&self, slot: usize) -> Option<&Suspension> {
        self.suspended.get(&slot)
    }

    pub(crate) fn find_suspended_key(&self, key: &K) -> Option<usize> {
        self.suspended
            .keys()
            .copied()
            .find(|&s| self.keys_equal(&self.slots[s].key, key))
    }

    pub(crate) fn find_suspended_value(&self, value: &V) -> Option<usize> {
        self.suspended
            .keys()
            .copied()
            .find(|&s| self.values_equal(&self.slots[s].value, value))
    }

    /// Nested suspend of an already suspended slot.
    pub(crate) fn deepen(&mut self, slot: usize) -> Option<u64> {
        let suspension = self.suspended.get_mut(&slot)?;
        suspension.depth += 1;
        Some(suspension.stamp)
    }

    /// Inner resume; `true` when the slot is still suspended afterwards.
    pub(crate) fn shallow_release(&mut self, slot: usize) -> bool {
        match self.suspended.get_mut(&slot) {
            Some(suspension) if suspension.depth > 1 => {
                suspension.depth -= 1;
                true
            }
            _ => false,
        }
    }

    /// Drops a suspended slot that could not be reattached.
    pub(crate) fn discard_suspended(&mut self, slot: usize) -> Option<(K, V)> {
        self.suspended.remove(&slot)?;
        self.slots
            .try_remove(slot)
            .map(|entry| (entry.key, entry.value))
    }

    pub(crate) fn apply(&mut self, commit: Commit<K, V>) {
        let Commit {
            order,
            detach,
            replace,
            fresh,
            reattach,
        } = commit;

        for removal in detach {
            self.unindex(removal.slot);
            match removal.suspend_at {
                Some(position) => {
                    self.next_stamp += 1;
                    self.suspended.insert(
                        removal.slot,
                        Suspension {
                            depth: 1,
                            position,
                            stamp: self.next_stamp,
                        },
                    );
                }
                None => {
                    self.slots.try_remove(removal.slot);
                }
            }
        }

        for (slot, key, value) in replace {
            self.unindex(slot);
            if let Some(entry) = self.slots.get_mut(slot) {
                entry.key = key;
                entry.value = value;
            }
            self.index(slot);
        }

        let mut fresh_slots = Vec::with_capacity(fresh.len());
        for item in fresh {
            let slot = item.map(|(key, value)| {
                let slot = self.slots.insert(Slot {
                    key,
                    value,
                    key_hash: None,
                    value_hash: None,
                });
                self.index(slot);
                slot
            });
            fresh_slots.push(slot);
        }

        for slot in reattach {
            self.suspended.remove(&slot);
            self.index(slot);
        }

        self.order = order
            .into_iter()
            .filter_map(|sim| match sim {
                Sim::Live(slot) => Some(slot),
                Sim::New(i) => fresh_slots.get(i).copied().flatten(),
            })
            .collect();
        self.positions = self
            .order
            .iter()
            .enumerate()
            .map(|(position, &slot)| (slot, position))
            .collect();
        self.mod_count += 1;
    }

    fn index(&mut self, slot: usize) {
        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        entry.key_hash = self.keying.equality().map(|eq| eq.hash(&entry.key));
        entry.value_hash = self.value_eq.as_ref().map(|eq| eq.hash(&entry.value));
        if let Some(hash) = entry.key_hash {
            self.key_index.entry(hash).or_default().push(slot);
        }
        if let Some(hash) = entry.value_hash {
            self.value_index.entry(hash).or_default().push(slot);
        }
    }

    fn unindex(&mut self, slot: usize) {
        let Some(entry) = self.slots.get(slot) else {
            return;
        };
        if let Some(hash) = entry.key_hash {
            unlink(&mut self.key_index, hash, slot);
        }
        if let Some(hash) = entry.value_hash {
            unlink(&mut self.value_index, hash, slot);
        }
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let inverse_len = if self.value_eq.is_some() {
            self.value_index.values().map(|b| b.len()).sum()
        } else if matches!(self.keying, Keying::Sequence(Some(_))) {
            self.key_index.values().map(|b| b.len()).sum()
        } else {
            0
        };
        StoreStats {
            len: self.order.len(),
            slots: self.slots.len(),
            inverse_len,
            suspended: self.suspended.len(),
            mod_count: self.mod_count,
        }
    }

    /// Cross-checks order, slots and both indexes. Suspended slots are
    /// expected to be absent from every index.
    pub(crate) fn integrity(&self) -> Result<(), InvariantViolation> {
        if self.order.len() + self.suspended.len() != self.slots.len() {
            return Err(InvariantViolation::new(format!(
                "{} visible + {} suspended slots but {} allocated",
                self.order.len(),
                self.suspended.len(),
                self.slots.len()
            )));
        }
        let mut seen = FxHashSet::default();
        for &slot in &self.order {
            if !self.slots.contains(slot) || self.suspended.contains_key(&slot) {
                return Err(InvariantViolation::new(format!(
                    "slot {slot} is ordered but not live"
                )));
            }
            if !seen.insert(slot) {
                return Err(InvariantViolation::new(format!(
                    "slot {slot} appears twice in order"
                )));
            }
        }
        if self.positions.len() != self.order.len()
            || self
                .order
                .iter()
                .enumerate()
                .any(|(position, slot)| self.positions.get(slot) != Some(&position))
        {
            return Err(InvariantViolation::new("position table out of step with order"));
        }

        if let Some(eq) = self.keying.equality() {
            check_index(&self.key_index, &self.order, "key", |s| {
                let entry = &self.slots[s];
                (entry.key_hash, eq.hash(&entry.key))
            })?;
            check_unique(&self.key_index, "key", |a, b| {
                eq.equals(&self.slots[a].key, &self.slots[b].key)
            })?;
        }
        if let Some(cmp) = self.keying.order() {
            for pair in self.order.windows(2) {
                if cmp.compare(&self.slots[pair[0]].key, &self.slots[pair[1]].key)
                    != Ordering::Less
                {
                    return Err(InvariantViolation::new(format!(
                        "slots {} and {} are out of order",
                        pair[0], pair[1]
                    )));
                }
            }
        }
        if let Some(eq) = &self.value_eq {
            check_index(&self.value_index, &self.order, "value", |s| {
                let entry = &self.slots[s];
                (entry.value_hash, eq.hash(&entry.value))
            })?;
            check_unique(&self.value_index, "value", |a, b| {
                eq.equals(&self.slots[a].value, &self.slots[b].value)
            })?;
        }
        Ok(())
    }
}

fn unlink(index: &mut FxHashMap<u64, Bucket>, hash: u64, slot: usize) {
    if let Some(bucket) = index.get_mut(&hash) {
        bucket.retain(|s| *s != slot);
        if bucket.is_empty() {
            index.remove(&hash);
        }
    }
}

fn check_index(
    index: &FxHashMap<u64, Bucket>,
    order: &[usize],
    what: &str,
    hashes: impl Fn(usize) -> (Option<u64>, u64),
) -> Result<(), InvariantViolation> {
    let indexed: usize = index.values().map(|b| b.len()).sum();
    if indexed != order.len() {
        return Err(InvariantViolation::new(format!(
            "{what} index holds {indexed} slots, {} are visible",
            order.len()
        )));
    }
    for &slot in order {
        let (cached, current) = hashes(slot);
        if cached != Some(current) {
            return Err(InvariantViolation::new(format!(
                "{what} of slot {slot} changed while indexed"
            )));
        }
        if !index.get(&current).is_some_and(|b| b.contains(&slot)) {
            return Err(InvariantViolation::new(format!(
                "slot {slot} missing from the {what} index"
            )));
        }
    }
    Ok(())
}

fn check_unique(
    index: &FxHashMap<u64, Bucket>,
    what: &str,
    equals: impl Fn(usize, usize) -> bool,
) -> Result<(), InvariantViolation> {
    for bucket in index.values() {
        for (i, &a) in bucket.iter().enumerate() {
            if let Some(&b) = bucket[i + 1..].iter().find(|&&b| equals(a, b)) {
                return Err(InvariantViolation::new(format!(
                    "slots {a} and {b} hold equal {what}s"
                )));
            }
        }
    }
    Ok(())
}
