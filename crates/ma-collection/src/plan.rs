//! Planning of one modification against a read-only store.
//!
//! A planner replays the requested steps over a simulated order, resolves
//! collisions (new-reference-wins or reject) and records the per-slot events
//! in source order. Nothing touches the store until the dispatcher commits
//! the finished [`Plan`], so a rejected modification leaves no trace.

use std::cmp::Ordering;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::CollectionError;
use crate::event::ChangeKind;
use crate::options::ConflictPolicy;
use crate::store::{Keying, Store};

/// Entry of the simulated order: a stored slot or a staged new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Sim {
    Live(usize),
    New(usize),
}

/// One side of a planned event, in root coordinates.
#[derive(Debug, Clone)]
pub(crate) struct Side<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) position: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedEvent<K, V> {
    pub(crate) change: ChangeKind,
    pub(crate) detached: Option<Side<K, V>>,
    pub(crate) attached: Option<Side<K, V>>,
    /// `false` for suspend detaches and resume attaches, which keep their
    /// freeze registrations.
    pub(crate) hooks: bool,
}

pub(crate) struct Removal {
    pub(crate) slot: usize,
    /// Set when the slot is suspended instead of dropped.
    pub(crate) suspend_at: Option<usize>,
}

pub(crate) struct Commit<K, V> {
    pub(crate) order: Vec<Sim>,
    pub(crate) detach: Vec<Removal>,
    pub(crate) replace: Vec<(usize, K, V)>,
    /// Indexed by `Sim::New`; `None` for staged entries that were dropped.
    pub(crate) fresh: Vec<Option<(K, V)>>,
    pub(crate) reattach: SmallVec<[usize; 1]>,
}

pub(crate) struct Plan<K, V> {
    pub(crate) events: Vec<PlannedEvent<K, V>>,
    pub(crate) commit: Commit<K, V>,
}

enum Draft<K, V> {
    Detach {
        key: K,
        value: V,
        position: Option<usize>,
        hooks: bool,
    },
    Attach {
        target: Sim,
        key: K,
        value: V,
        hooks: bool,
    },
    Replace {
        slot: usize,
        old_key: K,
        old_value: V,
        key: K,
        value: V,
        position: Option<usize>,
    },
}

/// A new element, or the new content of a replaced slot.
struct Staged<K, V> {
    key: K,
    value: V,
    draft: usize,
    alive: bool,
    slot: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hit {
    Live(usize),
    Staged(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryRef {
    Slot(usize),
    Fresh(usize),
}

enum Placement {
    At(usize),
    Append,
    Sorted,
}

pub(crate) struct Planner<'a, K, V> {
    store: &'a Store<K, V>,
    sim: Vec<Sim>,
    removed: FxHashSet<usize>,
    replaced: FxHashMap<usize, usize>,
    staged: Vec<Staged<K, V>>,
    drafts: Vec<Option<Draft<K, V>>>,
    detached: Vec<Removal>,
    reattached: SmallVec<[usize; 1]>,
    positions: Option<FxHashMap<usize, usize>>,
    /// Number of live entries in `sim`.
    live: usize,
}

impl<'a, K: Clone, V: Clone> Planner<'a, K, V> {
    pub(crate) fn new(store: &'a Store<K, V>) -> Self {
        Self {
            store,
            sim: store.order().iter().map(|&s| Sim::Live(s)).collect(),
            removed: FxHashSet::default(),
            replaced: FxHashMap::default(),
            staged: Vec::new(),
            drafts: Vec::new(),
            detached: Vec::new(),
            reattached: SmallVec::new(),
            positions: None,
            live: store.order().len(),
        }
    }

    /// Explicit removal of a visible slot.
    pub(crate) fn remove(&mut self, slot: usize) {
        if self.removed.contains(&slot) {
            return;
        }
        if let Some(i) = self.replaced.remove(&slot) {
            self.kill(i);
        }
        self.detach(slot, false);
    }

    /// Takes a slot out of order and indexes while keeping it allocated.
    pub(crate) fn suspend(&mut self, slot: usize) {
        self.detach(slot, true);
    }

    /// Adds an element. `at` is the root position for sequences and is
    /// ignored otherwise. Returns the position the element was placed at.
    pub(crate) fn insert(
        &mut self,
        key: K,
        value: V,
        at: Option<usize>,
    ) -> Result<usize, CollectionError> {
        let mut at = at;
        if let Some(hit) = self.find_key(&key) {
            if let (Some(p), Some(hp)) = (at, self.hit_position(hit)) {
                if hp < p {
                    at = Some(p - 1);
                }
            }
            self.evict(hit)?;
        }
        let placement = match self.store.keying() {
            Keying::Sequence(_) => Placement::At(at.unwrap_or_else(|| self.live_len())),
            Keying::Hashed(_) => Placement::Append,
            Keying::Ordered(_) => Placement::Sorted,
        };
        Ok(self.attach_new(key, value, placement))
    }

    /// Replaces the element of a sequence slot in place.
    pub(crate) fn replace_at(&mut self, slot: usize, key: K, value: V) -> Result<(), CollectionError> {
        if let Some(hit) = self.find_key(&key) {
            if self.entry_of(hit) != EntryRef::Slot(slot) {
                self.evict(hit)?;
            }
        }
        self.stage_replace(slot, key, value);
        Ok(())
    }

    /// Map put: replaces the value of an existing key, otherwise attaches.
    pub(crate) fn put(&mut self, key: K, value: V) -> Result<(), CollectionError> {
        let key_hit = self.find_key(&key);
        if self.store.value_eq().is_some() {
            if let Some(value_hit) = self.find_value(&value) {
                let same_entry = key_hit.map(|h| self.entry_of(h)) == Some(self.entry_of(value_hit));
                if !same_entry {
                    self.evict(value_hit)?;
                }
            }
        }
        match key_hit.map(|h| self.entry_of(h)) {
            Some(EntryRef::Slot(slot)) => {
                let stored = self.store.slot(slot).key.clone();
                self.stage_replace(slot, stored, value);
            }
            Some(EntryRef::Fresh(i)) => {
                self.kill(i);
                self.attach_new(key, value, self.natural_placement());
            }
            None => {
                self.attach_new(key, value, self.natural_placement());
            }
        }
        Ok(())
    }

    /// Puts a suspended slot back, computing its position from its current
    /// key.
    pub(crate) fn reattach(&mut self, slot: usize) -> Result<(), CollectionError> {
        let entry = self.store.slot(slot);
        let (key, value) = (entry.key.clone(), entry.value.clone());
        if let Some(hit) = self.find_key(&key) {
            self.evict(hit)?;
        }
        if self.store.value_eq().is_some() {
            if let Some(hit) = self.find_value(&value) {
                self.evict(hit)?;
            }
        }
        let placement = match self.store.keying() {
            Keying::Ordered(_) => Placement::Sorted,
            _ => {
                let previous = self.store.suspension(slot).map_or(0, |s| s.position);
                Placement::At(previous.min(self.live_len()))
            }
        };
        self.drafts.push(Some(Draft::Attach {
            target: Sim::Live(slot),
            key,
            value,
            hooks: false,
        }));
        self.reattached.push(slot);
        self.place(Sim::Live(slot), placement);
        Ok(())
    }

    pub(crate) fn finish(self) -> Plan<K, V> {
        let Planner {
            store,
            sim,
            removed,
            staged,
            drafts,
            detached,
            reattached,
            ..
        } = self;

        let live = |entry: &Sim| match *entry {
            Sim::Live(slot) => !removed.contains(&slot),
            Sim::New(i) => staged[i].alive,
        };
        let order: Vec<Sim> = sim.into_iter().filter(|e| live(e)).collect();
        let final_positions: FxHashMap<Sim, usize> = if store.is_positional() {
            order.iter().enumerate().map(|(i, e)| (*e, i)).collect()
        } else {
            FxHashMap::default()
        };

        let events = drafts
            .into_iter()
            .flatten()
            .map(|draft| match draft {
                Draft::Detach {
                    key,
                    value,
                    position,
                    hooks,
                } => PlannedEvent {
                    change: ChangeKind::Detach,
                    detached: Some(Side {
                        key,
                        value,
                        position,
                    }),
                    attached: None,
                    hooks,
                },
                Draft::Attach {
                    target,
                    key,
                    value,
                    hooks,
                } => PlannedEvent {
                    change: ChangeKind::Attach,
                    detached: None,
                    attached: Some(Side {
                        key,
                        value,
                        position: final_positions.get(&target).copied(),
                    }),
                    hooks,
                },
                Draft::Replace {
                    slot,
                    old_key,
                    old_value,
                    key,
                    value,
                    position,
                } => PlannedEvent {
                    change: ChangeKind::Replace,
                    detached: Some(Side {
                        key: old_key,
                        value: old_value,
                        position,
                    }),
                    attached: Some(Side {
                        key,
                        value,
                        position: final_positions.get(&Sim::Live(slot)).copied(),
                    }),
                    hooks: true,
                },
            })
            .collect();

        let mut replace = Vec::new();
        let mut fresh = Vec::with_capacity(staged.len());
        for entry in staged {
            match (entry.slot, entry.alive) {
                (Some(slot), true) => {
                    replace.push((slot, entry.key, entry.value));
                    fresh.push(None);
                }
                (None, true) => fresh.push(Some((entry.key, entry.value))),
                _ => fresh.push(None),
            }
        }

        Plan {
            events,
            commit: Commit {
                order,
                detach: detached,
                replace,
                fresh,
                reattach: reattached,
            },
        }
    }

    fn natural_placement(&self) -> Placement {
        match self.store.keying() {
            Keying::Ordered(_) => Placement::Sorted,
            Keying::Sequence(_) => Placement::At(self.live_len()),
            Keying::Hashed(_) => Placement::Append,
        }
    }

    fn detach(&mut self, slot: usize, suspend: bool) {
        let positional = self.store.is_positional();
        let original = if positional || suspend {
            self.original_position(slot)
        } else {
            None
        };
        if self.removed.insert(slot) {
            self.live -= 1;
        }
        let entry = self.store.slot(slot);
        self.drafts.push(Some(Draft::Detach {
            key: entry.key.clone(),
            value: entry.value.clone(),
            position: original.filter(|_| positional),
            hooks: !suspend,
        }));
        self.detached.push(Removal {
            slot,
            suspend_at: suspend.then(|| original.unwrap_or(0)),
        });
    }

    fn attach_new(&mut self, key: K, value: V, placement: Placement) -> usize {
        let i = self.staged.len();
        let draft = self.drafts.len();
        self.staged.push(Staged {
            key: key.clone(),
            value: value.clone(),
            draft,
            alive: true,
            slot: None,
        });
        self.drafts.push(Some(Draft::Attach {
            target: Sim::New(i),
            key,
            value,
            hooks: true,
        }));
        self.place(Sim::New(i), placement)
    }

    fn stage_replace(&mut self, slot: usize, key: K, value: V) {
        if let Some(previous) = self.replaced.remove(&slot) {
            self.kill(previous);
        }
        let position = if self.store.is_positional() {
            self.original_position(slot)
        } else {
            None
        };
        let entry = self.store.slot(slot);
        let i = self.staged.len();
        let draft = self.drafts.len();
        self.drafts.push(Some(Draft::Replace {
            slot,
            old_key: entry.key.clone(),
            old_value: entry.value.clone(),
            key: key.clone(),
            value: value.clone(),
            position,
        }));
        self.staged.push(Staged {
            key,
            value,
            draft,
            alive: true,
            slot: Some(slot),
        });
        self.replaced.insert(slot, i);
    }

    /// Drops a staged entry and its event.
    fn kill(&mut self, i: usize) {
        let entry = &mut self.staged[i];
        if entry.alive && entry.slot.is_none() {
            self.live -= 1;
        }
        entry.alive = false;
        if let Some(slot) = entry.slot {
            if self.replaced.get(&slot) == Some(&i) {
                self.replaced.remove(&slot);
            }
        }
        let draft = entry.draft;
        self.drafts[draft] = None;
    }

    /// Removes whatever entry `hit` refers to so that a new one can take its
    /// place.
    fn evict(&mut self, hit: Hit) -> Result<(), CollectionError> {
        if self.store.options().conflict == ConflictPolicy::RejectNew {
            return Err(CollectionError::Conflict);
        }
        match self.entry_of(hit) {
            EntryRef::Slot(slot) => self.remove(slot),
            EntryRef::Fresh(i) => self.kill(i),
        }
        Ok(())
    }

    fn entry_of(&self, hit: Hit) -> EntryRef {
        match hit {
            Hit::Live(slot) => EntryRef::Slot(slot),
            Hit::Staged(i) => match self.staged[i].slot {
                Some(slot) => EntryRef::Slot(slot),
                None => EntryRef::Fresh(i),
            },
        }
    }

    fn is_live(&self, entry: Sim) -> bool {
        match entry {
            Sim::Live(slot) => !self.removed.contains(&slot),
            Sim::New(i) => self.staged[i].alive,
        }
    }

    fn live_len(&self) -> usize {
        self.live
    }

    fn logical_position(&self, target: Sim) -> Option<usize> {
        let mut seen = 0;
        for entry in &self.sim {
            if *entry == target {
                return Some(seen);
            }
            if self.is_live(*entry) {
                seen += 1;
            }
        }
        None
    }

    fn hit_position(&self, hit: Hit) -> Option<usize> {
        match self.entry_of(hit) {
            EntryRef::Slot(slot) => self.logical_position(Sim::Live(slot)),
            EntryRef::Fresh(i) => self.logical_position(Sim::New(i)),
        }
    }

    fn original_position(&mut self, slot: usize) -> Option<usize> {
        let store = self.store;
        self.positions
            .get_or_insert_with(|| {
                store
                    .order()
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| (s, i))
                    .collect()
            })
            .get(&slot)
            .copied()
    }

    fn current_key(&self, entry: Sim) -> &K {
        match entry {
            Sim::Live(slot) => match self.replaced.get(&slot) {
                Some(&i) => &self.staged[i].key,
                None => &self.store.slot(slot).key,
            },
            Sim::New(i) => &self.staged[i].key,
        }
    }

    fn place(&mut self, entry: Sim, placement: Placement) -> usize {
        self.live += 1;
        match placement {
            Placement::At(p) if p >= self.live - 1 => {
                self.sim.push(entry);
                self.live - 1
            }
            Placement::At(p) => {
                let mut seen = 0;
                let mut index = self.sim.len();
                for (j, e) in self.sim.iter().enumerate() {
                    if self.is_live(*e) {
                        if seen == p {
                            index = j;
                            break;
                        }
                        seen += 1;
                    }
                }
                self.sim.insert(index, entry);
                seen
            }
            Placement::Append => {
                self.sim.push(entry);
                self.live - 1
            }
            Placement::Sorted => {
                let index = match self.store.keying().order() {
                    Some(cmp) => {
                        let key = self.current_key(entry);
                        self.sim.partition_point(|e| {
                            cmp.compare(self.current_key(*e), key) == Ordering::Less
                        })
                    }
                    None => self.sim.len(),
                };
                self.sim.insert(index, entry);
                0
            }
        }
    }

    fn find_key(&self, key: &K) -> Option<Hit> {
        let store = self.store;
        let live = match store.keying() {
            Keying::Sequence(None) => return None,
            Keying::Sequence(Some(eq)) | Keying::Hashed(eq) => store
                .key_candidates(eq.hash(key))
                .iter()
                .copied()
                .find(|&s| self.untouched(s) && eq.equals(&store.slot(s).key, key)),
            Keying::Ordered(_) => store
                .search(key)
                .ok()
                .map(|i| store.order()[i])
                .filter(|&s| self.untouched(s)),
        };
        if let Some(slot) = live {
            return Some(Hit::Live(slot));
        }
        self.staged
            .iter()
            .position(|st| st.alive && store.keys_equal(&st.key, key))
            .map(Hit::Staged)
    }

    fn find_value(&self, value: &V) -> Option<Hit> {
        let store = self.store;
        let eq = store.value_eq()?;
        let live = store
            .value_candidates(eq.hash(value))
            .iter()
            .copied()
            .find(|&s| self.untouched(s) && eq.equals(&store.slot(s).value, value));
        if let Some(slot) = live {
            return Some(Hit::Live(slot));
        }
        self.staged
            .iter()
            .position(|st| st.alive && eq.equals(&st.value, value))
            .map(Hit::Staged)
    }

    fn untouched(&self, slot: usize) -> bool {
        !self.removed.contains(&slot) && !self.replaced.contains_key(&slot)
    }
}
